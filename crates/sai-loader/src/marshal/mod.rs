//! Value marshalling across the native boundary.

pub mod bytes;
pub mod callback;
pub mod ctype;
pub mod variadic;

pub use bytes::{ByteString, MutableByteString};
pub use callback::{unchecked_return, CallbackSignature};
pub use ctype::{Aggregate, CType, CValue, Field, Layout, GENERIC_POINTER_CODE};
pub use variadic::{NativeCallee, VariadicCall, VariadicCallee, VariadicFunction};
