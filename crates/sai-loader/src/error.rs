//! Error types for library loading, symbol binding and value marshalling.
//!
//! Each concern gets its own error enum so callers can match on the failure
//! they care about. SAI status codes returned by bound entry points are
//! converted into [`SaiError`] through [`SaiStatus::into_result`].

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a logical library name into an opened library.
///
/// Individual candidate failures are never surfaced; only exhaustion of the
/// whole candidate list is reported.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// Every candidate path failed to open.
    #[error("Could not load library '{name}'")]
    NotFound { name: String },
}

impl LoadError {
    /// Creates a not found error for the given logical name.
    pub fn not_found(name: impl Into<String>) -> Self {
        LoadError::NotFound { name: name.into() }
    }

    /// Returns the logical library name the error refers to.
    pub fn name(&self) -> &str {
        match self {
            LoadError::NotFound { name } => name,
        }
    }
}

/// Result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Failure to resolve a symbol from an opened library.
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    /// The calling convention is not registered for this library.
    #[error("Calling convention '{convention}' is not available for {library}")]
    UnknownConvention { convention: String, library: String },

    /// The symbol is not exported by the library.
    #[error("Symbol '{name}' not found in {library}: {message}")]
    MissingSymbol {
        name: String,
        library: String,
        message: String,
    },

    /// The symbol name cannot be passed to the native loader.
    #[error("Invalid symbol name '{name}'")]
    InvalidName { name: String },
}

/// Result type for symbol lookups.
pub type LookupResult<T> = Result<T, LookupError>;

/// Failure while converting values for a native call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    /// A fixed argument could not be converted to its declared type.
    #[error("Argument {index}: expected {expected}, got {found}")]
    ArgumentType {
        index: usize,
        expected: String,
        found: String,
    },

    /// An integer argument does not fit its declared type.
    #[error("Argument {index}: value {value} out of range for {expected}")]
    OutOfRange {
        index: usize,
        expected: String,
        value: String,
    },

    /// Fewer arguments than declared fixed parameters.
    #[error("Expected at least {expected} arguments, got {found}")]
    ArgumentCount { expected: usize, found: usize },

    /// The call shape cannot be issued natively.
    #[error("Unsupported call signature: {reason}")]
    UnsupportedSignature { reason: String },

    /// Byte string contains a NUL where a C string is required.
    #[error("Interior NUL byte at position {position}")]
    InteriorNul { position: usize },

    /// Index outside of the buffer.
    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

impl MarshalError {
    /// Creates an unsupported signature error.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        MarshalError::UnsupportedSignature {
            reason: reason.into(),
        }
    }
}

/// Result type for marshalling operations.
pub type MarshalResult<T> = Result<T, MarshalError>;

/// Failure while reading or publishing a switch profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The profile file could not be read.
    #[error("Failed to open profile map file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A key or value cannot be represented as a C string.
    #[error("Profile entry '{key}' contains a NUL byte")]
    InteriorNul { key: String },
}

/// Result type for profile operations.
pub type ProfileResult<T> = Result<T, ProfileError>;

/// SAI status codes matching `sai_status_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaiStatus {
    Success,
    Failure,
    NotSupported,
    NoMemory,
    InsufficientResources,
    InvalidParameter,
    ItemAlreadyExists,
    ItemNotFound,
    BufferOverflow,
    InvalidPortNumber,
    InvalidPortMember,
    InvalidVlanId,
    Uninitialized,
    TableFull,
    MandatoryAttributeMissing,
    NotImplemented,
    AddrNotFound,
    ObjectInUse,
    InvalidObjectType,
    InvalidObjectId,
    InvalidNvStorage,
    NvStorageFull,
    SwUpgradeVersionMismatch,
    NotExecuted,
    /// Any other code, including the attribute-indexed ranges.
    Other(i32),
}

impl SaiStatus {
    /// Creates a SaiStatus from a raw `sai_status_t` value.
    pub fn from_raw(status: i32) -> Self {
        match status {
            0 => SaiStatus::Success,
            -1 => SaiStatus::Failure,
            -2 => SaiStatus::NotSupported,
            -3 => SaiStatus::NoMemory,
            -4 => SaiStatus::InsufficientResources,
            -5 => SaiStatus::InvalidParameter,
            -6 => SaiStatus::ItemAlreadyExists,
            -7 => SaiStatus::ItemNotFound,
            -8 => SaiStatus::BufferOverflow,
            -9 => SaiStatus::InvalidPortNumber,
            -10 => SaiStatus::InvalidPortMember,
            -11 => SaiStatus::InvalidVlanId,
            -12 => SaiStatus::Uninitialized,
            -13 => SaiStatus::TableFull,
            -14 => SaiStatus::MandatoryAttributeMissing,
            -15 => SaiStatus::NotImplemented,
            -16 => SaiStatus::AddrNotFound,
            -17 => SaiStatus::ObjectInUse,
            -18 => SaiStatus::InvalidObjectType,
            -19 => SaiStatus::InvalidObjectId,
            -20 => SaiStatus::InvalidNvStorage,
            -21 => SaiStatus::NvStorageFull,
            -22 => SaiStatus::SwUpgradeVersionMismatch,
            -23 => SaiStatus::NotExecuted,
            other => SaiStatus::Other(other),
        }
    }

    /// Returns the raw `sai_status_t` value.
    pub fn as_raw(&self) -> i32 {
        match self {
            SaiStatus::Success => 0,
            SaiStatus::Failure => -1,
            SaiStatus::NotSupported => -2,
            SaiStatus::NoMemory => -3,
            SaiStatus::InsufficientResources => -4,
            SaiStatus::InvalidParameter => -5,
            SaiStatus::ItemAlreadyExists => -6,
            SaiStatus::ItemNotFound => -7,
            SaiStatus::BufferOverflow => -8,
            SaiStatus::InvalidPortNumber => -9,
            SaiStatus::InvalidPortMember => -10,
            SaiStatus::InvalidVlanId => -11,
            SaiStatus::Uninitialized => -12,
            SaiStatus::TableFull => -13,
            SaiStatus::MandatoryAttributeMissing => -14,
            SaiStatus::NotImplemented => -15,
            SaiStatus::AddrNotFound => -16,
            SaiStatus::ObjectInUse => -17,
            SaiStatus::InvalidObjectType => -18,
            SaiStatus::InvalidObjectId => -19,
            SaiStatus::InvalidNvStorage => -20,
            SaiStatus::NvStorageFull => -21,
            SaiStatus::SwUpgradeVersionMismatch => -22,
            SaiStatus::NotExecuted => -23,
            SaiStatus::Other(raw) => *raw,
        }
    }

    /// Returns true if the status indicates success.
    pub fn is_success(&self) -> bool {
        *self == SaiStatus::Success
    }

    /// Converts to a Result, tagging failures with the operation name.
    pub fn into_result(self, operation: &str) -> SaiResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(SaiError::Status {
                operation: operation.to_string(),
                status: self,
            })
        }
    }
}

impl fmt::Display for SaiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaiStatus::Success => "SAI_STATUS_SUCCESS",
            SaiStatus::Failure => "SAI_STATUS_FAILURE",
            SaiStatus::NotSupported => "SAI_STATUS_NOT_SUPPORTED",
            SaiStatus::NoMemory => "SAI_STATUS_NO_MEMORY",
            SaiStatus::InsufficientResources => "SAI_STATUS_INSUFFICIENT_RESOURCES",
            SaiStatus::InvalidParameter => "SAI_STATUS_INVALID_PARAMETER",
            SaiStatus::ItemAlreadyExists => "SAI_STATUS_ITEM_ALREADY_EXISTS",
            SaiStatus::ItemNotFound => "SAI_STATUS_ITEM_NOT_FOUND",
            SaiStatus::BufferOverflow => "SAI_STATUS_BUFFER_OVERFLOW",
            SaiStatus::InvalidPortNumber => "SAI_STATUS_INVALID_PORT_NUMBER",
            SaiStatus::InvalidPortMember => "SAI_STATUS_INVALID_PORT_MEMBER",
            SaiStatus::InvalidVlanId => "SAI_STATUS_INVALID_VLAN_ID",
            SaiStatus::Uninitialized => "SAI_STATUS_UNINITIALIZED",
            SaiStatus::TableFull => "SAI_STATUS_TABLE_FULL",
            SaiStatus::MandatoryAttributeMissing => "SAI_STATUS_MANDATORY_ATTRIBUTE_MISSING",
            SaiStatus::NotImplemented => "SAI_STATUS_NOT_IMPLEMENTED",
            SaiStatus::AddrNotFound => "SAI_STATUS_ADDR_NOT_FOUND",
            SaiStatus::ObjectInUse => "SAI_STATUS_OBJECT_IN_USE",
            SaiStatus::InvalidObjectType => "SAI_STATUS_INVALID_OBJECT_TYPE",
            SaiStatus::InvalidObjectId => "SAI_STATUS_INVALID_OBJECT_ID",
            SaiStatus::InvalidNvStorage => "SAI_STATUS_INVALID_NV_STORAGE",
            SaiStatus::NvStorageFull => "SAI_STATUS_NV_STORAGE_FULL",
            SaiStatus::SwUpgradeVersionMismatch => "SAI_STATUS_SW_UPGRADE_VERSION_MISMATCH",
            SaiStatus::NotExecuted => "SAI_STATUS_NOT_EXECUTED",
            SaiStatus::Other(raw) => return write!(f, "SAI_STATUS({})", raw),
        };
        write!(f, "{}", s)
    }
}

/// Error type for calls into a bound SAI library.
#[derive(Debug, Clone, Error)]
pub enum SaiError {
    /// A SAI entry point returned an error status.
    #[error("{operation} failed: {status}")]
    Status { operation: String, status: SaiStatus },

    /// The library could not be located.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// A required entry point is missing.
    #[error(transparent)]
    Symbol(#[from] LookupError),

    /// An entry point returned a null table pointer.
    #[error("{operation} returned a null pointer")]
    NullPointer { operation: String },
}

impl SaiError {
    /// Returns the underlying SAI status if this is a Status error.
    pub fn status(&self) -> Option<SaiStatus> {
        match self {
            SaiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for SAI operations.
pub type SaiResult<T> = Result<T, SaiError>;
