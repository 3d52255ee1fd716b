//! Bound SAI entry points.
//!
//! [`SaiLibrary`] wraps a [`Lookup`] on a vendor SAI library and exposes the
//! process-level entry points from `sai.h`: initialization, API table query,
//! log level control and version query. Per-object API tables are returned
//! as opaque pointers.

use std::ffi::{c_char, c_int, c_void};
use std::fmt;
use std::ptr::{self, NonNull};

use log::{debug, info};

use crate::error::{SaiError, SaiResult, SaiStatus};
use crate::locator::LibraryLocator;
use crate::lookup::Lookup;
use crate::marshal::ByteString;
use crate::profile::ServiceMethodTable;

/// `sai_status_t`
pub type RawStatus = i32;

/// `sai_api_version_t`
pub type RawApiVersion = u64;

type ApiInitializeFn = unsafe extern "C" fn(u64, *const ServiceMethodTable) -> RawStatus;
type ApiUninitializeFn = unsafe extern "C" fn() -> RawStatus;
type ApiQueryFn = unsafe extern "C" fn(c_int, *mut *mut c_void) -> RawStatus;
type LogSetFn = unsafe extern "C" fn(c_int, c_int) -> RawStatus;
type QueryApiVersionFn = unsafe extern "C" fn(*mut RawApiVersion) -> RawStatus;
type BrcmVersionGetFn = unsafe extern "C" fn(*mut BrcmSaiVersion) -> *mut BrcmSaiVersion;
type IfcsGetVersionFn = unsafe extern "C" fn(*mut c_int, *mut c_int, *mut c_int);

pub const SAI_API_INITIALIZE: &str = "sai_api_initialize";
pub const SAI_API_UNINITIALIZE: &str = "sai_api_uninitialize";
pub const SAI_API_QUERY: &str = "sai_api_query";
pub const SAI_LOG_SET: &str = "sai_log_set";
pub const SAI_QUERY_API_VERSION: &str = "sai_query_api_version";
pub const BRCM_SAI_VERSION_GET: &str = "brcm_sai_version_get";
pub const IFCS_GET_VERSION: &str = "ifcs_get_version";

/// Decoded `sai_api_version_t` (`major * 10000 + minor * 100 + revision`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u64,
    pub minor: u64,
    pub revision: u64,
}

impl ApiVersion {
    pub fn from_raw(raw: RawApiVersion) -> Self {
        Self {
            major: raw / 10000,
            minor: raw % 10000 / 100,
            revision: raw % 100,
        }
    }

    pub fn as_raw(&self) -> RawApiVersion {
        self.major * 10000 + self.minor * 100 + self.revision
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

/// `sai_api_t`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SaiApi {
    Unspecified = 0,
    Switch = 1,
    Port = 2,
    Fdb = 3,
    Vlan = 4,
    VirtualRouter = 5,
    Route = 6,
    NextHop = 7,
    NextHopGroup = 8,
    RouterInterface = 9,
    Neighbor = 10,
    Acl = 11,
    Hostif = 12,
    Mirror = 13,
    Samplepacket = 14,
    Stp = 15,
    Lag = 16,
    Policer = 17,
    Wred = 18,
    QosMap = 19,
    Queue = 20,
    Scheduler = 21,
    SchedulerGroup = 22,
    Buffer = 23,
    Hash = 24,
    Udf = 25,
    Tunnel = 26,
    L2mc = 27,
    Ipmc = 28,
    RpfGroup = 29,
    L2mcGroup = 30,
    IpmcGroup = 31,
    McastFdb = 32,
    Bridge = 33,
    Tam = 34,
    Srv6 = 35,
    Mpls = 36,
    Dtel = 37,
    Bfd = 38,
    IsolationGroup = 39,
    Nat = 40,
    Counter = 41,
    DebugCounter = 42,
    Macsec = 43,
    SystemPort = 44,
}

impl SaiApi {
    /// APIs whose log level is set after initialization.
    pub const LOGGED: [SaiApi; 21] = [
        SaiApi::Acl,
        SaiApi::Bridge,
        SaiApi::Buffer,
        SaiApi::DebugCounter,
        SaiApi::Fdb,
        SaiApi::Hostif,
        SaiApi::Lag,
        SaiApi::Mirror,
        SaiApi::Neighbor,
        SaiApi::NextHop,
        SaiApi::NextHopGroup,
        SaiApi::Policer,
        SaiApi::Port,
        SaiApi::QosMap,
        SaiApi::Route,
        SaiApi::RouterInterface,
        SaiApi::Switch,
        SaiApi::Tunnel,
        SaiApi::VirtualRouter,
        SaiApi::Vlan,
        SaiApi::Wred,
    ];

    pub fn as_raw(self) -> c_int {
        self as c_int
    }
}

/// `sai_log_level_t`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SaiLogLevel {
    Debug = 0,
    Info = 1,
    Notice = 2,
    Warn = 3,
    Error = 4,
    Critical = 5,
}

impl From<log::Level> for SaiLogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace | log::Level::Debug => SaiLogLevel::Debug,
            log::Level::Info => SaiLogLevel::Info,
            log::Level::Warn => SaiLogLevel::Warn,
            log::Level::Error => SaiLogLevel::Error,
        }
    }
}

/// `brcm_sai_version_t`
#[repr(C)]
#[derive(Debug)]
pub struct BrcmSaiVersion {
    pub sai_api_version: *const c_char,
    pub bcm_sai_version: *const c_char,
    pub build_release: *const c_char,
    /// Populated only after switch creation.
    pub cancun_version: *const c_char,
    pub npl_version: *const c_char,
}

impl Default for BrcmSaiVersion {
    fn default() -> Self {
        Self {
            sai_api_version: ptr::null(),
            bcm_sai_version: ptr::null(),
            build_release: ptr::null(),
            cancun_version: ptr::null(),
            npl_version: ptr::null(),
        }
    }
}

/// Vendor-specific version information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorInfo {
    Broadcom {
        sai_api_version: ByteString,
        bcm_sai_version: ByteString,
        build_release: ByteString,
    },
    Innovium {
        major: i32,
        minor: i32,
        revision: i32,
    },
}

impl fmt::Display for VendorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VendorInfo::Broadcom {
                sai_api_version,
                bcm_sai_version,
                build_release,
            } => write!(
                f,
                "Broadcom SAI (SAI API version: {}, BRCM SAI version: {}, build release: {})",
                sai_api_version, bcm_sai_version, build_release
            ),
            VendorInfo::Innovium {
                major,
                minor,
                revision,
            } => write!(f, "Innovium SAI (IFCS version: {}.{}.{})", major, minor, revision),
        }
    }
}

/// The process-level entry points of a vendor SAI library.
pub struct SaiLibrary {
    lookup: Lookup,
    initialize: ApiInitializeFn,
    uninitialize: ApiUninitializeFn,
    query: ApiQueryFn,
    log_set: LogSetFn,
    query_api_version: Option<QueryApiVersionFn>,
}

impl fmt::Debug for SaiLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaiLibrary")
            .field("lookup", &self.lookup)
            .field("has_api_version", &self.query_api_version.is_some())
            .finish()
    }
}

impl SaiLibrary {
    /// Locates `name` and binds its entry points.
    ///
    /// # Safety
    ///
    /// The library found must be a SAI implementation whose exports match
    /// the `sai.h` signatures.
    pub unsafe fn load(locator: &LibraryLocator, name: &str) -> SaiResult<Self> {
        let lookup = locator.load(name)?;
        Self::bind(lookup)
    }

    /// Binds the entry points of an opened library.
    ///
    /// # Safety
    ///
    /// See [`SaiLibrary::load`].
    pub unsafe fn bind(lookup: Lookup) -> SaiResult<Self> {
        let initialize = lookup.symbol(SAI_API_INITIALIZE)?.cast::<ApiInitializeFn>();
        let uninitialize = lookup.symbol(SAI_API_UNINITIALIZE)?.cast::<ApiUninitializeFn>();
        let query = lookup.symbol(SAI_API_QUERY)?.cast::<ApiQueryFn>();
        let log_set = lookup.symbol(SAI_LOG_SET)?.cast::<LogSetFn>();
        let query_api_version = lookup
            .symbol(SAI_QUERY_API_VERSION)
            .ok()
            .map(|symbol| symbol.cast::<QueryApiVersionFn>());
        debug!("Bound SAI entry points from {}", lookup.path().display());
        Ok(Self {
            lookup,
            initialize,
            uninitialize,
            query,
            log_set,
            query_api_version,
        })
    }

    pub fn lookup(&self) -> &Lookup {
        &self.lookup
    }

    /// `sai_query_api_version`; `None` when the library does not export it.
    pub fn api_version(&self) -> Option<SaiResult<ApiVersion>> {
        let query = self.query_api_version?;
        let mut raw: RawApiVersion = 0;
        // SAFETY: bound with the sai.h signature; `raw` is a valid out pointer.
        let status = unsafe { query(&mut raw) };
        Some(
            SaiStatus::from_raw(status)
                .into_result(SAI_QUERY_API_VERSION)
                .map(|()| ApiVersion::from_raw(raw)),
        )
    }

    /// `sai_api_initialize` with the given service table.
    pub fn initialize(&self, services: &'static ServiceMethodTable) -> SaiResult<()> {
        // SAFETY: `services` lives for the process, as the library may keep it.
        let status = unsafe { (self.initialize)(0, services) };
        SaiStatus::from_raw(status).into_result(SAI_API_INITIALIZE)?;
        info!("SAI initialized");
        Ok(())
    }

    pub fn uninitialize(&self) -> SaiResult<()> {
        // SAFETY: bound with the sai.h signature.
        let status = unsafe { (self.uninitialize)() };
        SaiStatus::from_raw(status).into_result(SAI_API_UNINITIALIZE)
    }

    /// `sai_api_query`: the method table of `api`, as an opaque pointer.
    pub fn api_query(&self, api: SaiApi) -> SaiResult<NonNull<c_void>> {
        let mut table: *mut c_void = ptr::null_mut();
        // SAFETY: bound with the sai.h signature; `table` is a valid out pointer.
        let status = unsafe { (self.query)(api.as_raw(), &mut table) };
        SaiStatus::from_raw(status).into_result(SAI_API_QUERY)?;
        NonNull::new(table).ok_or_else(|| SaiError::NullPointer {
            operation: format!("{}({:?})", SAI_API_QUERY, api),
        })
    }

    pub fn log_set(&self, api: SaiApi, level: SaiLogLevel) -> SaiResult<()> {
        // SAFETY: bound with the sai.h signature.
        let status = unsafe { (self.log_set)(api.as_raw(), level as c_int) };
        SaiStatus::from_raw(status).into_result(SAI_LOG_SET)
    }

    /// Detects vendor extensions exported next to the standard entry points.
    pub fn vendor_info(&self) -> Vec<VendorInfo> {
        let mut found = Vec::new();

        if let Ok(symbol) = self.lookup.symbol(BRCM_SAI_VERSION_GET) {
            let mut version = BrcmSaiVersion::default();
            // SAFETY: Broadcom declares this export with the struct above and
            // fills it with static strings or leaves fields null.
            unsafe {
                let get = symbol.cast::<BrcmVersionGetFn>();
                get(&mut version);
                found.push(VendorInfo::Broadcom {
                    sai_api_version: ByteString::from_ptr(version.sai_api_version),
                    bcm_sai_version: ByteString::from_ptr(version.bcm_sai_version),
                    build_release: ByteString::from_ptr(version.build_release),
                });
            }
        }

        if let Ok(symbol) = self.lookup.symbol(IFCS_GET_VERSION) {
            let (mut major, mut minor, mut revision) = (0, 0, 0);
            // SAFETY: three int out pointers, as exported by the Innovium SDK.
            unsafe {
                let get = symbol.cast::<IfcsGetVersionFn>();
                get(&mut major, &mut minor, &mut revision);
            }
            found.push(VendorInfo::Innovium {
                major,
                minor,
                revision,
            });
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LookupError;
    use crate::platform::Platform;

    #[test]
    fn test_api_version_decode() {
        let version = ApiVersion::from_raw(10901);
        assert_eq!(
            version,
            ApiVersion {
                major: 1,
                minor: 9,
                revision: 1
            }
        );
        assert_eq!(version.to_string(), "1.9.1");
        assert_eq!(version.as_raw(), 10901);
    }

    #[test]
    fn test_api_ids() {
        assert_eq!(SaiApi::Switch.as_raw(), 1);
        assert_eq!(SaiApi::Wred.as_raw(), 18);
        assert_eq!(SaiApi::SystemPort.as_raw(), 44);
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(SaiLogLevel::from(log::Level::Trace), SaiLogLevel::Debug);
        assert_eq!(SaiLogLevel::from(log::Level::Warn), SaiLogLevel::Warn);
        assert_eq!(SaiLogLevel::Notice as i32, 2);
    }

    #[test]
    fn test_brcm_version_layout() {
        assert_eq!(
            std::mem::size_of::<BrcmSaiVersion>(),
            5 * std::mem::size_of::<*const c_char>()
        );
    }

    #[test]
    fn test_vendor_info_display() {
        let info = VendorInfo::Innovium {
            major: 1,
            minor: 2,
            revision: 3,
        };
        assert_eq!(info.to_string(), "Innovium SAI (IFCS version: 1.2.3)");
    }

    #[cfg(unix)]
    #[test]
    fn test_bind_without_entry_points_fails() {
        let lookup = Lookup::current_process(Platform::Posix).unwrap();
        let err = unsafe { SaiLibrary::bind(lookup) }.unwrap_err();
        assert!(matches!(
            err,
            SaiError::Symbol(LookupError::MissingSymbol { ref name, .. }) if name == SAI_API_INITIALIZE
        ));
    }
}
