//! C type descriptors, layouts and argument coercion.
//!
//! [`CType`] mirrors the C declarations that cross the SAI boundary. It
//! knows its size and alignment, so struct and union layouts (field order,
//! padding, union aliasing) can be checked against the Rust `#[repr(C)]`
//! definitions they describe.

use std::ffi::{c_long, c_ulong, c_void};
use std::fmt;
use std::mem::{align_of, size_of};

use super::bytes::ByteString;
use crate::error::{MarshalError, MarshalResult};

/// Single-character type code of the generic pointer type.
pub const GENERIC_POINTER_CODE: char = 'P';

/// Size and alignment of a C type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size: usize,
    pub align: usize,
}

impl Layout {
    pub const fn of<T>() -> Self {
        Self {
            size: size_of::<T>(),
            align: align_of::<T>(),
        }
    }
}

fn align_up(offset: usize, align: usize) -> usize {
    offset.div_ceil(align).saturating_mul(align)
}

/// A named member of a struct or union.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: CType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: CType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Field list of a struct or union declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Aggregate {
    pub name: String,
    pub fields: Vec<Field>,
}

impl Aggregate {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    fn max_align(&self) -> usize {
        self.fields
            .iter()
            .map(|f| f.ty.layout().align)
            .max()
            .unwrap_or(1)
    }
}

/// A C type as declared in the SAI headers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CType {
    Void,
    Bool,
    Char,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    Long,
    ULong,
    Float,
    Double,
    /// `char *`
    CharPtr,
    /// `void *`
    VoidPtr,
    /// Typed pointer `T *`.
    Pointer(Box<CType>),
    /// Function pointer.
    FnPtr,
    Array(Box<CType>, usize),
    Struct(Aggregate),
    Union(Aggregate),
}

impl CType {
    pub fn pointer_to(ty: CType) -> Self {
        CType::Pointer(Box::new(ty))
    }

    pub fn array_of(ty: CType, len: usize) -> Self {
        CType::Array(Box::new(ty), len)
    }

    /// Type code of primitive types; `None` for aggregates, arrays, typed
    /// and function pointers, and `void`.
    pub fn type_code(&self) -> Option<char> {
        let code = match self {
            CType::Bool => '?',
            CType::Char => 'c',
            CType::I8 => 'b',
            CType::U8 => 'B',
            CType::I16 => 'h',
            CType::U16 => 'H',
            CType::I32 => 'i',
            CType::U32 => 'I',
            CType::Long => 'l',
            CType::ULong => 'L',
            CType::I64 => 'q',
            CType::U64 => 'Q',
            CType::Float => 'f',
            CType::Double => 'd',
            CType::CharPtr => 'z',
            CType::VoidPtr => GENERIC_POINTER_CODE,
            CType::Void
            | CType::Pointer(_)
            | CType::FnPtr
            | CType::Array(..)
            | CType::Struct(_)
            | CType::Union(_) => return None,
        };
        Some(code)
    }

    pub fn is_integer(&self) -> bool {
        self.int_bounds().is_some()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(
            self,
            CType::CharPtr | CType::VoidPtr | CType::Pointer(_) | CType::FnPtr
        )
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, CType::Struct(_) | CType::Union(_) | CType::Array(..))
    }

    /// C size and alignment. Array sizes saturate at `usize::MAX`.
    pub fn layout(&self) -> Layout {
        match self {
            CType::Void => Layout { size: 0, align: 1 },
            CType::Bool => Layout::of::<bool>(),
            CType::Char | CType::I8 => Layout::of::<i8>(),
            CType::U8 => Layout::of::<u8>(),
            CType::I16 => Layout::of::<i16>(),
            CType::U16 => Layout::of::<u16>(),
            CType::I32 => Layout::of::<i32>(),
            CType::U32 => Layout::of::<u32>(),
            CType::I64 => Layout::of::<i64>(),
            CType::U64 => Layout::of::<u64>(),
            CType::Long => Layout::of::<c_long>(),
            CType::ULong => Layout::of::<c_ulong>(),
            CType::Float => Layout::of::<f32>(),
            CType::Double => Layout::of::<f64>(),
            CType::CharPtr | CType::VoidPtr | CType::Pointer(_) | CType::FnPtr => {
                Layout::of::<*const c_void>()
            }
            CType::Array(elem, len) => {
                let elem = elem.layout();
                Layout {
                    size: elem.size.saturating_mul(*len),
                    align: elem.align,
                }
            }
            CType::Struct(agg) => {
                let align = agg.max_align();
                let end = agg.fields.iter().fold(0, |offset, f| {
                    let layout = f.ty.layout();
                    align_up(offset, layout.align).saturating_add(layout.size)
                });
                Layout {
                    size: align_up(end, align),
                    align,
                }
            }
            CType::Union(agg) => {
                let align = agg.max_align();
                let size = agg
                    .fields
                    .iter()
                    .map(|f| f.ty.layout().size)
                    .max()
                    .unwrap_or(0);
                Layout {
                    size: align_up(size, align),
                    align,
                }
            }
        }
    }

    /// Byte offset of each field. Union members all sit at offset 0.
    pub fn field_offsets(&self) -> Vec<(&str, usize)> {
        match self {
            CType::Struct(agg) => {
                let mut offset = 0;
                agg.fields
                    .iter()
                    .map(|f| {
                        let layout = f.ty.layout();
                        offset = align_up(offset, layout.align);
                        let at = offset;
                        offset = offset.saturating_add(layout.size);
                        (f.name.as_str(), at)
                    })
                    .collect()
            }
            CType::Union(agg) => agg.fields.iter().map(|f| (f.name.as_str(), 0)).collect(),
            _ => Vec::new(),
        }
    }

    pub fn field_offset(&self, name: &str) -> Option<usize> {
        self.field_offsets()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, offset)| offset)
    }

    fn int_bounds(&self) -> Option<(i128, i128)> {
        let bounds = match self {
            CType::Bool => (0, 1),
            CType::Char | CType::I8 => (i8::MIN as i128, i8::MAX as i128),
            CType::U8 => (0, u8::MAX as i128),
            CType::I16 => (i16::MIN as i128, i16::MAX as i128),
            CType::U16 => (0, u16::MAX as i128),
            CType::I32 => (i32::MIN as i128, i32::MAX as i128),
            CType::U32 => (0, u32::MAX as i128),
            CType::I64 => (i64::MIN as i128, i64::MAX as i128),
            CType::U64 => (0, u64::MAX as i128),
            CType::Long => (c_long::MIN as i128, c_long::MAX as i128),
            CType::ULong => (0, c_ulong::MAX as i128),
            _ => return None,
        };
        Some(bounds)
    }

    /// Converts `value` into the native representation of this type.
    ///
    /// `index` is the argument position reported in errors.
    pub fn coerce(&self, index: usize, value: &CValue) -> MarshalResult<CValue> {
        let mismatch = || MarshalError::ArgumentType {
            index,
            expected: self.to_string(),
            found: value.kind().to_string(),
        };

        if let Some((min, max)) = self.int_bounds() {
            let wide = match value {
                CValue::Int(v) => *v as i128,
                CValue::UInt(v) => *v as i128,
                _ => return Err(mismatch()),
            };
            if *self == CType::Bool {
                return Ok(CValue::Int(i64::from(wide != 0)));
            }
            if wide < min || wide > max {
                return Err(MarshalError::OutOfRange {
                    index,
                    expected: self.to_string(),
                    value: wide.to_string(),
                });
            }
            return Ok(if min < 0 {
                CValue::Int(wide as i64)
            } else {
                CValue::UInt(wide as u64)
            });
        }

        match (self, value) {
            (CType::Float | CType::Double, CValue::Float(v)) => Ok(CValue::Float(*v)),
            (CType::Float | CType::Double, CValue::Int(v)) => Ok(CValue::Float(*v as f64)),
            (CType::Float | CType::Double, CValue::UInt(v)) => Ok(CValue::Float(*v as f64)),
            (CType::CharPtr, CValue::Bytes(_) | CValue::Null | CValue::Pointer(_)) => {
                Ok(value.clone())
            }
            (
                CType::VoidPtr | CType::Pointer(_) | CType::FnPtr,
                CValue::Null | CValue::Pointer(_) | CValue::Bytes(_),
            ) => Ok(value.clone()),
            (CType::VoidPtr | CType::Pointer(_) | CType::FnPtr, CValue::Int(v)) => {
                Ok(CValue::Pointer(*v as usize as *const c_void))
            }
            (CType::VoidPtr | CType::Pointer(_) | CType::FnPtr, CValue::UInt(v)) => {
                Ok(CValue::Pointer(*v as usize as *const c_void))
            }
            _ => Err(mismatch()),
        }
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CType::Void => write!(f, "void"),
            CType::Bool => write!(f, "bool"),
            CType::Char => write!(f, "char"),
            CType::I8 => write!(f, "int8_t"),
            CType::U8 => write!(f, "uint8_t"),
            CType::I16 => write!(f, "int16_t"),
            CType::U16 => write!(f, "uint16_t"),
            CType::I32 => write!(f, "int32_t"),
            CType::U32 => write!(f, "uint32_t"),
            CType::I64 => write!(f, "int64_t"),
            CType::U64 => write!(f, "uint64_t"),
            CType::Long => write!(f, "long"),
            CType::ULong => write!(f, "unsigned long"),
            CType::Float => write!(f, "float"),
            CType::Double => write!(f, "double"),
            CType::CharPtr => write!(f, "char *"),
            CType::VoidPtr => write!(f, "void *"),
            CType::Pointer(inner) => write!(f, "{} *", inner),
            CType::FnPtr => write!(f, "function pointer"),
            CType::Array(inner, len) => write!(f, "{}[{}]", inner, len),
            CType::Struct(agg) => write!(f, "struct {}", agg.name),
            CType::Union(agg) => write!(f, "union {}", agg.name),
        }
    }
}

/// A value passed to or returned from a native call.
#[derive(Debug, Clone, PartialEq)]
pub enum CValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Pointer(*const c_void),
    Bytes(ByteString),
}

impl CValue {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            CValue::Null => "null",
            CValue::Int(_) => "int",
            CValue::UInt(_) => "unsigned int",
            CValue::Float(_) => "float",
            CValue::Pointer(_) => "pointer",
            CValue::Bytes(_) => "bytes",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CValue::Int(v) => Some(*v),
            CValue::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<*const c_void> {
        match self {
            CValue::Pointer(p) => Some(*p),
            CValue::Null => Some(std::ptr::null()),
            _ => None,
        }
    }
}

impl From<i32> for CValue {
    fn from(v: i32) -> Self {
        CValue::Int(v.into())
    }
}

impl From<i64> for CValue {
    fn from(v: i64) -> Self {
        CValue::Int(v)
    }
}

impl From<u32> for CValue {
    fn from(v: u32) -> Self {
        CValue::UInt(v.into())
    }
}

impl From<u64> for CValue {
    fn from(v: u64) -> Self {
        CValue::UInt(v)
    }
}

impl From<usize> for CValue {
    fn from(v: usize) -> Self {
        CValue::UInt(v as u64)
    }
}

impl From<f64> for CValue {
    fn from(v: f64) -> Self {
        CValue::Float(v)
    }
}

impl<T> From<*const T> for CValue {
    fn from(p: *const T) -> Self {
        CValue::Pointer(p.cast())
    }
}

impl<T> From<*mut T> for CValue {
    fn from(p: *mut T) -> Self {
        CValue::Pointer(p.cast_const().cast())
    }
}

impl From<ByteString> for CValue {
    fn from(b: ByteString) -> Self {
        CValue::Bytes(b)
    }
}

impl From<&str> for CValue {
    fn from(s: &str) -> Self {
        CValue::Bytes(ByteString::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mirrors `sai_ip_addr_t`.
    #[repr(C)]
    #[allow(dead_code)]
    union IpAddr {
        ip4: u32,
        ip6: [u8; 16],
    }

    /// Mirrors `sai_ip_address_t`.
    #[repr(C)]
    #[allow(dead_code)]
    struct IpAddress {
        addr_family: i32,
        addr: IpAddr,
    }

    /// Mirrors `sai_fdb_entry_t`.
    #[repr(C)]
    #[allow(dead_code)]
    struct FdbEntry {
        switch_id: u64,
        mac_address: [u8; 6],
        bv_id: u64,
    }

    fn ip_addr() -> CType {
        CType::Union(Aggregate::new(
            "sai_ip_addr_t",
            vec![
                Field::new("ip4", CType::U32),
                Field::new("ip6", CType::array_of(CType::U8, 16)),
            ],
        ))
    }

    #[test]
    fn test_union_layout_matches_repr_c() {
        let ty = ip_addr();
        assert_eq!(ty.layout(), Layout::of::<IpAddr>());
        assert_eq!(ty.field_offset("ip6"), Some(0));
    }

    #[test]
    fn test_struct_layout_matches_repr_c() {
        let ty = CType::Struct(Aggregate::new(
            "sai_ip_address_t",
            vec![Field::new("addr_family", CType::I32), Field::new("addr", ip_addr())],
        ));
        assert_eq!(ty.layout(), Layout::of::<IpAddress>());
        assert_eq!(ty.field_offset("addr"), Some(std::mem::offset_of!(IpAddress, addr)));
    }

    #[test]
    fn test_struct_padding() {
        let ty = CType::Struct(Aggregate::new(
            "sai_fdb_entry_t",
            vec![
                Field::new("switch_id", CType::U64),
                Field::new("mac_address", CType::array_of(CType::U8, 6)),
                Field::new("bv_id", CType::U64),
            ],
        ));
        assert_eq!(ty.layout(), Layout::of::<FdbEntry>());
        assert_eq!(ty.field_offset("bv_id"), Some(std::mem::offset_of!(FdbEntry, bv_id)));
    }

    #[test]
    fn test_array_layout_saturates() {
        let ty = CType::array_of(CType::U64, usize::MAX / 2);
        assert_eq!(ty.layout().size, usize::MAX);
        assert_eq!(ty.layout().align, std::mem::align_of::<u64>());
        assert_eq!(CType::array_of(CType::U16, 3).layout().size, 6);

        let wrapped = CType::Struct(Aggregate::new(
            "huge",
            vec![Field::new("tag", CType::U8), Field::new("body", ty)],
        ));
        assert_eq!(wrapped.layout().size, usize::MAX);
    }

    #[test]
    fn test_type_codes() {
        assert_eq!(CType::I32.type_code(), Some('i'));
        assert_eq!(CType::CharPtr.type_code(), Some('z'));
        assert_eq!(CType::VoidPtr.type_code(), Some(GENERIC_POINTER_CODE));
        assert_eq!(ip_addr().type_code(), None);
        assert_eq!(CType::pointer_to(CType::U32).type_code(), None);
    }

    #[test]
    fn test_coerce_integer_range() {
        assert_eq!(CType::U8.coerce(0, &CValue::Int(255)), Ok(CValue::UInt(255)));
        assert!(matches!(
            CType::U8.coerce(0, &CValue::Int(256)),
            Err(MarshalError::OutOfRange { index: 0, .. })
        ));
        assert!(matches!(
            CType::U32.coerce(1, &CValue::Int(-1)),
            Err(MarshalError::OutOfRange { index: 1, .. })
        ));
        assert_eq!(CType::I32.coerce(0, &CValue::UInt(7)), Ok(CValue::Int(7)));
        assert_eq!(CType::Bool.coerce(0, &CValue::Int(42)), Ok(CValue::Int(1)));
    }

    #[test]
    fn test_coerce_pointer_sources() {
        assert_eq!(
            CType::VoidPtr.coerce(0, &CValue::UInt(0x1000)),
            Ok(CValue::Pointer(0x1000 as *const c_void))
        );
        assert_eq!(CType::CharPtr.coerce(0, &CValue::Null), Ok(CValue::Null));
        assert_eq!(
            CType::CharPtr.coerce(0, &CValue::from("sai")),
            Ok(CValue::from("sai"))
        );
    }

    #[test]
    fn test_coerce_mismatch() {
        let err = CType::CharPtr.coerce(2, &CValue::Int(1)).unwrap_err();
        assert_eq!(
            err,
            MarshalError::ArgumentType {
                index: 2,
                expected: "char *".to_string(),
                found: "int".to_string(),
            }
        );
        assert!(CType::I32.coerce(0, &CValue::Float(1.0)).is_err());
        assert!(ip_addr().coerce(0, &CValue::Null).is_err());
    }
}
