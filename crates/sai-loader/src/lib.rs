//! Native SAI (Switch Abstraction Interface) library loading.
//!
//! This crate finds a vendor SAI shared library by logical name, binds its
//! exported symbols, and marshals values across the C boundary without
//! interpreting them.
//!
//! # Architecture
//!
//! - [`env`]: Environment snapshot consulted for search directories
//! - [`platform`]: Per-OS name formats and directory discovery
//! - [`resolver`]: System dynamic-linker resolvers
//! - [`locator`]: Candidate path generation and loading
//! - [`lookup`]: Symbol tables keyed by calling convention
//! - [`marshal`]: C types, byte strings, variadic calls, callback policy
//! - [`profile`]: Switch profile services for `sai_api_initialize`
//! - [`sai`]: The bound SAI entry points
//! - [`error`]: Error types and status handling
//!
//! # Example
//!
//! ```no_run
//! use sai_loader::{LibraryLocator, SaiLibrary, SERVICE_METHOD_TABLE};
//!
//! fn start() -> sai_loader::SaiResult<()> {
//!     let locator = LibraryLocator::from_process();
//!     let sai = unsafe { SaiLibrary::load(&locator, "sai")? };
//!     sai.initialize(&SERVICE_METHOD_TABLE)?;
//!     Ok(())
//! }
//! ```

pub mod env;
pub mod error;
pub mod locator;
pub mod lookup;
pub mod marshal;
pub mod platform;
pub mod profile;
pub mod resolver;
pub mod sai;

// Re-export commonly used types
pub use env::Environment;
pub use error::{
    LoadError, LoadResult, LookupError, LookupResult, MarshalError, MarshalResult, ProfileError,
    ProfileResult, SaiError, SaiResult, SaiStatus,
};
pub use locator::{Candidates, LibraryLocator, SearchConfig};
pub use lookup::{CallingConvention, Lookup, Symbol};
pub use marshal::{ByteString, CType, CValue, MutableByteString};
pub use platform::Platform;
pub use profile::{ProfileMap, SERVICE_METHOD_TABLE};
pub use resolver::SystemResolver;
pub use sai::{ApiVersion, SaiApi, SaiLibrary, SaiLogLevel, VendorInfo};
