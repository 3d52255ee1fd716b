//! Calls into native variadic functions.
//!
//! A [`VariadicFunction`] checks and converts its declared fixed arguments
//! through [`CType::coerce`] and forwards every trailing argument exactly as
//! given. Nothing past the fixed prefix is validated, the same as C varargs.

use std::ffi::{c_long, c_ulong, c_void, CString};
use std::ptr;

use libffi::middle::{Arg, Cif, CodePtr, Type};
use libffi::raw::ffi_arg;
use log::trace;

use super::ctype::{CType, CValue};
use crate::error::{MarshalError, MarshalResult};
use crate::lookup::{CallingConvention, Symbol};

/// One call, after the fixed prefix has been coerced.
#[derive(Debug, Clone, Copy)]
pub struct VariadicCall<'a> {
    pub fixed_types: &'a [CType],
    pub fixed: &'a [CValue],
    pub variadic: &'a [CValue],
    pub ret: &'a CType,
}

/// Performs the call once the fixed arguments are coerced.
pub trait VariadicCallee {
    fn invoke(&self, call: &VariadicCall<'_>) -> MarshalResult<CValue>;
}

/// A variadic native function with its declared fixed prefix.
#[derive(Debug, Clone)]
pub struct VariadicFunction<C> {
    callee: C,
    fixed: Vec<CType>,
    ret: CType,
}

impl<C: VariadicCallee> VariadicFunction<C> {
    pub fn new(callee: C, fixed: Vec<CType>, ret: CType) -> Self {
        Self { callee, fixed, ret }
    }

    pub fn fixed_types(&self) -> &[CType] {
        &self.fixed
    }

    pub fn return_type(&self) -> &CType {
        &self.ret
    }

    pub fn callee(&self) -> &C {
        &self.callee
    }

    /// Coerces `args[..fixed]`, forwards the rest untouched and calls.
    pub fn call(&self, args: &[CValue]) -> MarshalResult<CValue> {
        if args.len() < self.fixed.len() {
            return Err(MarshalError::ArgumentCount {
                expected: self.fixed.len(),
                found: args.len(),
            });
        }
        let (head, tail) = args.split_at(self.fixed.len());
        let fixed = self
            .fixed
            .iter()
            .zip(head)
            .enumerate()
            .map(|(index, (ty, value))| ty.coerce(index, value))
            .collect::<MarshalResult<Vec<_>>>()?;
        self.callee.invoke(&VariadicCall {
            fixed_types: &self.fixed,
            fixed: &fixed,
            variadic: tail,
            ret: &self.ret,
        })
    }
}

/// Calls a resolved [`Symbol`] through a variadic libffi call interface.
///
/// Fixed arguments are passed as their declared C types. Trailing arguments
/// keep the type they were given: `Int` as `int64_t`, `UInt` as `uint64_t`,
/// `Float` as `double`, pointers, null and byte strings as pointers.
/// Aggregate parameters and returns are reported as
/// [`MarshalError::UnsupportedSignature`].
#[derive(Debug, Clone)]
pub struct NativeCallee {
    symbol: Symbol,
}

impl NativeCallee {
    /// # Safety
    ///
    /// `symbol` must be a variadic C function whose fixed parameters match
    /// the types it will be called with, and it must stay loaded while this
    /// callee is used.
    pub unsafe fn new(symbol: Symbol) -> MarshalResult<Self> {
        if symbol.convention() != CallingConvention::Cdecl {
            return Err(MarshalError::unsupported(format!(
                "variadic functions use cdecl, {} is declared {}",
                symbol.name(),
                symbol.convention()
            )));
        }
        Ok(Self { symbol })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }
}

/// Argument storage the libffi call reads from.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FfiArgValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Long(c_long),
    ULong(c_ulong),
    F32(f32),
    F64(f64),
    Pointer(*const c_void),
}

impl FfiArgValue {
    fn ffi_type(&self) -> Type {
        match self {
            FfiArgValue::I8(_) => Type::i8(),
            FfiArgValue::U8(_) => Type::u8(),
            FfiArgValue::I16(_) => Type::i16(),
            FfiArgValue::U16(_) => Type::u16(),
            FfiArgValue::I32(_) => Type::i32(),
            FfiArgValue::U32(_) => Type::u32(),
            FfiArgValue::I64(_) => Type::i64(),
            FfiArgValue::U64(_) => Type::u64(),
            FfiArgValue::Long(_) => Type::c_long(),
            FfiArgValue::ULong(_) => Type::c_ulong(),
            FfiArgValue::F32(_) => Type::f32(),
            FfiArgValue::F64(_) => Type::f64(),
            FfiArgValue::Pointer(_) => Type::pointer(),
        }
    }

    fn as_arg(&self) -> Arg {
        match self {
            FfiArgValue::I8(v) => Arg::new(v),
            FfiArgValue::U8(v) => Arg::new(v),
            FfiArgValue::I16(v) => Arg::new(v),
            FfiArgValue::U16(v) => Arg::new(v),
            FfiArgValue::I32(v) => Arg::new(v),
            FfiArgValue::U32(v) => Arg::new(v),
            FfiArgValue::I64(v) => Arg::new(v),
            FfiArgValue::U64(v) => Arg::new(v),
            FfiArgValue::Long(v) => Arg::new(v),
            FfiArgValue::ULong(v) => Arg::new(v),
            FfiArgValue::F32(v) => Arg::new(v),
            FfiArgValue::F64(v) => Arg::new(v),
            FfiArgValue::Pointer(v) => Arg::new(v),
        }
    }
}

fn pointer_arg(value: &CValue, keep: &mut Vec<CString>) -> MarshalResult<Option<*const c_void>> {
    let pointer = match value {
        CValue::Null => ptr::null(),
        CValue::Pointer(p) => *p,
        CValue::Bytes(b) => {
            let s = b.to_cstring()?;
            let pointer = s.as_ptr().cast::<c_void>();
            keep.push(s);
            pointer
        }
        _ => return Ok(None),
    };
    Ok(Some(pointer))
}

/// Converts a coerced fixed argument to its declared C type.
fn fixed_arg(
    index: usize,
    ty: &CType,
    value: &CValue,
    keep: &mut Vec<CString>,
) -> MarshalResult<FfiArgValue> {
    let mismatch = || MarshalError::ArgumentType {
        index,
        expected: ty.to_string(),
        found: value.kind().to_string(),
    };
    let int = || match value {
        CValue::Int(v) => Ok(i128::from(*v)),
        CValue::UInt(v) => Ok(i128::from(*v)),
        _ => Err(mismatch()),
    };

    let arg = match ty {
        CType::Bool | CType::U8 => FfiArgValue::U8(int()? as u8),
        CType::Char | CType::I8 => FfiArgValue::I8(int()? as i8),
        CType::I16 => FfiArgValue::I16(int()? as i16),
        CType::U16 => FfiArgValue::U16(int()? as u16),
        CType::I32 => FfiArgValue::I32(int()? as i32),
        CType::U32 => FfiArgValue::U32(int()? as u32),
        CType::I64 => FfiArgValue::I64(int()? as i64),
        CType::U64 => FfiArgValue::U64(int()? as u64),
        CType::Long => FfiArgValue::Long(int()? as c_long),
        CType::ULong => FfiArgValue::ULong(int()? as c_ulong),
        CType::Float | CType::Double => {
            let CValue::Float(v) = value else {
                return Err(mismatch());
            };
            if *ty == CType::Float {
                FfiArgValue::F32(*v as f32)
            } else {
                FfiArgValue::F64(*v)
            }
        }
        CType::CharPtr | CType::VoidPtr | CType::Pointer(_) | CType::FnPtr => {
            FfiArgValue::Pointer(pointer_arg(value, keep)?.ok_or_else(mismatch)?)
        }
        CType::Void | CType::Array(..) | CType::Struct(_) | CType::Union(_) => {
            return Err(MarshalError::unsupported(format!(
                "argument {} of type {}",
                index, ty
            )))
        }
    };
    Ok(arg)
}

/// Passes a trailing argument in the type it was given.
fn variadic_arg(value: &CValue, keep: &mut Vec<CString>) -> MarshalResult<FfiArgValue> {
    let arg = match value {
        CValue::Int(v) => FfiArgValue::I64(*v),
        CValue::UInt(v) => FfiArgValue::U64(*v),
        CValue::Float(v) => FfiArgValue::F64(*v),
        CValue::Null | CValue::Pointer(_) | CValue::Bytes(_) => {
            FfiArgValue::Pointer(pointer_arg(value, keep)?.unwrap_or(ptr::null()))
        }
    };
    Ok(arg)
}

fn return_type(ret: &CType) -> MarshalResult<Type> {
    let ty = match ret {
        CType::Void => Type::void(),
        CType::Bool | CType::U8 => Type::u8(),
        CType::Char | CType::I8 => Type::i8(),
        CType::I16 => Type::i16(),
        CType::U16 => Type::u16(),
        CType::I32 => Type::i32(),
        CType::U32 => Type::u32(),
        CType::I64 => Type::i64(),
        CType::U64 => Type::u64(),
        CType::Long => Type::c_long(),
        CType::ULong => Type::c_ulong(),
        CType::Float => Type::f32(),
        CType::Double => Type::f64(),
        CType::CharPtr | CType::VoidPtr | CType::Pointer(_) | CType::FnPtr => Type::pointer(),
        CType::Array(..) | CType::Struct(_) | CType::Union(_) => {
            return Err(MarshalError::unsupported(format!("{} return", ret)))
        }
    };
    Ok(ty)
}

/// Narrows an integer return widened to `ffi_arg` by libffi.
fn from_ffi_arg(raw: ffi_arg, ret: &CType) -> CValue {
    match ret {
        CType::Bool => CValue::Int(i64::from(raw as u8 != 0)),
        CType::Char | CType::I8 => CValue::Int((raw as i8).into()),
        CType::U8 => CValue::UInt((raw as u8).into()),
        CType::I16 => CValue::Int((raw as i16).into()),
        CType::U16 => CValue::UInt((raw as u16).into()),
        CType::I32 => CValue::Int((raw as i32).into()),
        _ => CValue::UInt((raw as u32).into()),
    }
}

impl VariadicCallee for NativeCallee {
    fn invoke(&self, call: &VariadicCall<'_>) -> MarshalResult<CValue> {
        let result_type = return_type(call.ret)?;

        let mut keep = Vec::new();
        let mut values = Vec::with_capacity(call.fixed.len() + call.variadic.len());
        for (index, (ty, value)) in call.fixed_types.iter().zip(call.fixed).enumerate() {
            values.push(fixed_arg(index, ty, value, &mut keep)?);
        }
        for value in call.variadic {
            values.push(variadic_arg(value, &mut keep)?);
        }
        trace!(
            "Calling {} with {} fixed and {} variadic arguments",
            self.symbol.name(),
            call.fixed.len(),
            call.variadic.len()
        );

        let cif = Cif::new_variadic(
            values.iter().map(FfiArgValue::ffi_type).collect::<Vec<_>>(),
            call.fixed.len(),
            result_type,
        );
        let args: Vec<Arg> = values.iter().map(FfiArgValue::as_arg).collect();
        let code = CodePtr(self.symbol.address());

        // SAFETY: the constructor's contract covers the fixed prefix; `values`
        // and `keep` outlive the call.
        let value = unsafe {
            match call.ret {
                CType::Void => {
                    cif.call::<()>(code, &args);
                    CValue::Null
                }
                CType::Bool
                | CType::Char
                | CType::I8
                | CType::U8
                | CType::I16
                | CType::U16
                | CType::I32
                | CType::U32 => from_ffi_arg(cif.call::<ffi_arg>(code, &args), call.ret),
                CType::I64 => CValue::Int(cif.call::<i64>(code, &args)),
                CType::U64 => CValue::UInt(cif.call::<u64>(code, &args)),
                CType::Long => CValue::Int(cif.call::<c_long>(code, &args).into()),
                CType::ULong => CValue::UInt(cif.call::<c_ulong>(code, &args).into()),
                CType::Float => CValue::Float(cif.call::<f32>(code, &args).into()),
                CType::Double => CValue::Float(cif.call::<f64>(code, &args)),
                CType::CharPtr | CType::VoidPtr | CType::Pointer(_) | CType::FnPtr => {
                    CValue::Pointer(cif.call::<*const c_void>(code, &args))
                }
                CType::Array(..) | CType::Struct(_) | CType::Union(_) => {
                    return Err(MarshalError::unsupported(format!("{} return", call.ret)))
                }
            }
        };
        drop(keep);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::bytes::ByteString;
    use crate::marshal::ctype::{Aggregate, Field};
    use std::cell::RefCell;

    #[derive(Debug, Default)]
    struct Recorder {
        calls: RefCell<Vec<(Vec<CValue>, Vec<CValue>)>>,
    }

    impl VariadicCallee for Recorder {
        fn invoke(&self, call: &VariadicCall<'_>) -> MarshalResult<CValue> {
            self.calls
                .borrow_mut()
                .push((call.fixed.to_vec(), call.variadic.to_vec()));
            Ok(CValue::Int(0))
        }
    }

    #[test]
    fn test_only_fixed_prefix_is_coerced() {
        let function = VariadicFunction::new(
            Recorder::default(),
            vec![CType::U8, CType::VoidPtr],
            CType::I32,
        );
        let args = [
            CValue::Int(7),
            CValue::UInt(0x2000),
            CValue::Float(1.5),
            CValue::Bytes(ByteString::from("trailing")),
        ];
        function.call(&args).unwrap();

        let calls = function.callee().calls.borrow();
        let (fixed, variadic) = &calls[0];
        assert_eq!(
            fixed,
            &vec![CValue::UInt(7), CValue::Pointer(0x2000 as *const c_void)]
        );
        assert_eq!(variadic, &args[2..].to_vec());
    }

    #[test]
    fn test_fixed_argument_errors_propagate() {
        let function = VariadicFunction::new(Recorder::default(), vec![CType::U8], CType::Void);
        let err = function.call(&[CValue::Int(300)]).unwrap_err();
        assert!(matches!(err, MarshalError::OutOfRange { index: 0, .. }));
        assert!(function.callee().calls.borrow().is_empty());
    }

    #[test]
    fn test_too_few_arguments() {
        let function = VariadicFunction::new(
            Recorder::default(),
            vec![CType::CharPtr, CType::I32],
            CType::I32,
        );
        assert_eq!(
            function.call(&[CValue::Null]).unwrap_err(),
            MarshalError::ArgumentCount {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn test_return_narrowing() {
        assert_eq!(
            from_ffi_arg(ffi_arg::from(u32::MAX), &CType::I32),
            CValue::Int(-1)
        );
        assert_eq!(from_ffi_arg(0x1ff, &CType::U8), CValue::UInt(0xff));
        assert_eq!(from_ffi_arg(0x100, &CType::Bool), CValue::Int(0));
        assert_eq!(from_ffi_arg(2, &CType::Bool), CValue::Int(1));
        assert_eq!(from_ffi_arg(0x8000, &CType::I16), CValue::Int(-0x8000));
    }

    #[test]
    fn test_aggregate_return_rejected() {
        let agg = CType::Struct(Aggregate::new("pair", vec![Field::new("a", CType::I32)]));
        assert!(matches!(
            return_type(&agg),
            Err(MarshalError::UnsupportedSignature { .. })
        ));
        assert!(return_type(&CType::Double).is_ok());
        assert!(return_type(&CType::Void).is_ok());
    }

    #[test]
    fn test_fixed_args_keep_declared_width() {
        let mut keep = Vec::new();
        assert_eq!(
            fixed_arg(0, &CType::I16, &CValue::Int(-2), &mut keep).unwrap(),
            FfiArgValue::I16(-2)
        );
        assert_eq!(
            fixed_arg(1, &CType::Float, &CValue::Float(0.5), &mut keep).unwrap(),
            FfiArgValue::F32(0.5)
        );
        assert_eq!(
            fixed_arg(2, &CType::CharPtr, &CValue::from("x"), &mut keep).unwrap(),
            FfiArgValue::Pointer(keep[0].as_ptr().cast())
        );
        assert!(matches!(
            fixed_arg(3, &CType::I32, &CValue::Float(1.0), &mut keep),
            Err(MarshalError::ArgumentType { index: 3, .. })
        ));
    }

    #[test]
    fn test_trailing_args_keep_given_kind() {
        let mut keep = Vec::new();
        assert_eq!(
            variadic_arg(&CValue::Float(1.5), &mut keep).unwrap(),
            FfiArgValue::F64(1.5)
        );
        assert_eq!(
            variadic_arg(&CValue::Int(-1), &mut keep).unwrap(),
            FfiArgValue::I64(-1)
        );
        assert_eq!(
            variadic_arg(&CValue::Null, &mut keep).unwrap(),
            FfiArgValue::Pointer(ptr::null())
        );
        assert!(keep.is_empty());
    }
}
