//! Return-type policy for callbacks invoked from native code.
//!
//! Only returns with a primitive type code other than the generic pointer
//! are kept typed. Everything else, aggregates and unions included, is
//! returned as an untyped `void *`.

use super::ctype::{CType, GENERIC_POINTER_CODE};

/// The return type a callback is actually declared with.
pub fn unchecked_return(declared: &CType) -> CType {
    match declared.type_code() {
        Some(code) if code != GENERIC_POINTER_CODE => declared.clone(),
        _ => CType::VoidPtr,
    }
}

/// A callback signature with the return policy applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallbackSignature {
    declared: CType,
    ret: CType,
    args: Vec<CType>,
}

impl CallbackSignature {
    pub fn declare(ret: CType, args: Vec<CType>) -> Self {
        Self {
            ret: unchecked_return(&ret),
            declared: ret,
            args,
        }
    }

    /// Return type after the policy.
    pub fn ret(&self) -> &CType {
        &self.ret
    }

    /// Return type as written in the declaration.
    pub fn declared_ret(&self) -> &CType {
        &self.declared
    }

    pub fn args(&self) -> &[CType] {
        &self.args
    }

    /// True when the declared return was replaced by `void *`.
    pub fn is_unchecked(&self) -> bool {
        self.ret != self.declared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::ctype::{Aggregate, Field};

    fn union_ty() -> CType {
        CType::Union(Aggregate::new(
            "sai_attribute_value_t",
            vec![Field::new("u32", CType::U32), Field::new("u64", CType::U64)],
        ))
    }

    #[test]
    fn test_union_return_becomes_pointer() {
        let sig = CallbackSignature::declare(union_ty(), vec![CType::VoidPtr]);
        assert_eq!(sig.ret(), &CType::VoidPtr);
        assert!(sig.is_unchecked());
        assert_eq!(sig.declared_ret(), &union_ty());
    }

    #[test]
    fn test_int32_return_is_kept() {
        let sig = CallbackSignature::declare(CType::I32, Vec::new());
        assert_eq!(sig.ret(), &CType::I32);
        assert!(!sig.is_unchecked());
    }

    #[test]
    fn test_policy_cases() {
        assert_eq!(unchecked_return(&CType::CharPtr), CType::CharPtr);
        assert_eq!(unchecked_return(&CType::Double), CType::Double);
        assert_eq!(unchecked_return(&CType::VoidPtr), CType::VoidPtr);
        assert_eq!(unchecked_return(&CType::Void), CType::VoidPtr);
        assert_eq!(
            unchecked_return(&CType::pointer_to(CType::U32)),
            CType::VoidPtr
        );
        assert_eq!(
            unchecked_return(&CType::array_of(CType::U8, 6)),
            CType::VoidPtr
        );
    }
}
