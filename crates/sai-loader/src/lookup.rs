//! Symbol binding for an opened native library.
//!
//! A [`Lookup`] owns one native handle per calling convention registered by
//! the platform (only `cdecl` on POSIX and Darwin, `cdecl` and `stdcall` on
//! Windows). Resolved symbols are memoized per (convention, name).

use std::ffi::{c_void, CString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::str::FromStr;

use dashmap::DashMap;
use libloading::Library;
use log::debug;

use crate::error::{LookupError, LookupResult};
use crate::platform::{OpenMode, Platform};

/// ABI contract a native function expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallingConvention {
    Cdecl,
    Stdcall,
}

impl CallingConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallingConvention::Cdecl => "cdecl",
            CallingConvention::Stdcall => "stdcall",
        }
    }
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CallingConvention {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cdecl" => Ok(CallingConvention::Cdecl),
            "stdcall" => Ok(CallingConvention::Stdcall),
            _ => Err(LookupError::UnknownConvention {
                convention: s.to_string(),
                library: "<any>".to_string(),
            }),
        }
    }
}

/// Address of an exported symbol.
///
/// The address stays valid for as long as the [`Lookup`] that produced it
/// is alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    name: String,
    address: NonNull<c_void>,
    convention: CallingConvention,
}

// SAFETY: the address points into a mapped image and is never dereferenced
// by this type.
unsafe impl Send for Symbol {}
unsafe impl Sync for Symbol {}

impl Symbol {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> *mut c_void {
        self.address.as_ptr()
    }

    pub fn convention(&self) -> CallingConvention {
        self.convention
    }

    /// Reinterprets the address as a function pointer type.
    ///
    /// # Safety
    ///
    /// `F` must be a function pointer type whose signature and calling
    /// convention match the native definition of the symbol.
    pub unsafe fn cast<F: Copy>(&self) -> F {
        debug_assert_eq!(
            std::mem::size_of::<F>(),
            std::mem::size_of::<*mut c_void>()
        );
        std::mem::transmute_copy(&self.address.as_ptr())
    }
}

/// An opened library with per-convention symbol tables.
pub struct Lookup {
    path: PathBuf,
    handles: Vec<(CallingConvention, Library)>,
    symbols: DashMap<(CallingConvention, String), Symbol>,
}

impl fmt::Debug for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lookup")
            .field("path", &self.path)
            .field("conventions", &self.conventions())
            .field("cached_symbols", &self.symbols.len())
            .finish()
    }
}

impl Lookup {
    /// Opens `path` once per calling convention registered by `platform`.
    pub fn open(path: &Path, platform: Platform) -> Result<Self, libloading::Error> {
        let mut handles = Vec::with_capacity(platform.conventions().len());
        for &convention in platform.conventions() {
            handles.push((convention, open_handle(path, platform.open_mode())?));
        }
        Ok(Self::from_handles(path.to_path_buf(), handles))
    }

    /// Binds the symbols already loaded into the running process.
    pub fn current_process(platform: Platform) -> Result<Self, libloading::Error> {
        let mut handles = Vec::with_capacity(platform.conventions().len());
        for &convention in platform.conventions() {
            handles.push((convention, this_process()?));
        }
        Ok(Self::from_handles(PathBuf::from("<process>"), handles))
    }

    fn from_handles(path: PathBuf, handles: Vec<(CallingConvention, Library)>) -> Self {
        Self {
            path,
            handles,
            symbols: DashMap::new(),
        }
    }

    /// Path the library was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn conventions(&self) -> Vec<CallingConvention> {
        self.handles.iter().map(|(c, _)| *c).collect()
    }

    fn handle(&self, convention: CallingConvention) -> Option<&Library> {
        self.handles
            .iter()
            .find(|(c, _)| *c == convention)
            .map(|(_, lib)| lib)
    }

    /// Resolves `name` under `convention`.
    pub fn get(&self, name: &str, convention: CallingConvention) -> LookupResult<Symbol> {
        let handle = self
            .handle(convention)
            .ok_or_else(|| LookupError::UnknownConvention {
                convention: convention.to_string(),
                library: self.path.display().to_string(),
            })?;

        let key = (convention, name.to_string());
        if let Some(symbol) = self.symbols.get(&key) {
            return Ok(symbol.clone());
        }

        let symbol = self.resolve(handle, name, convention)?;
        self.symbols.insert(key, symbol.clone());
        Ok(symbol)
    }

    /// Resolves `name` with a convention given by name.
    pub fn get_named(&self, name: &str, convention: &str) -> LookupResult<Symbol> {
        let convention = convention
            .parse::<CallingConvention>()
            .map_err(|_| LookupError::UnknownConvention {
                convention: convention.to_string(),
                library: self.path.display().to_string(),
            })?;
        self.get(name, convention)
    }

    /// Resolves `name` with the default `cdecl` convention.
    pub fn symbol(&self, name: &str) -> LookupResult<Symbol> {
        self.get(name, CallingConvention::Cdecl)
    }

    /// Reports whether `name` resolves under `convention`. Never fails.
    pub fn has(&self, name: &str, convention: CallingConvention) -> bool {
        self.get(name, convention).is_ok()
    }

    /// Like [`Lookup::has`] with a convention given by name.
    pub fn has_named(&self, name: &str, convention: &str) -> bool {
        self.get_named(name, convention).is_ok()
    }

    fn resolve(
        &self,
        handle: &Library,
        name: &str,
        convention: CallingConvention,
    ) -> LookupResult<Symbol> {
        let c_name = CString::new(name).map_err(|_| LookupError::InvalidName {
            name: name.to_string(),
        })?;

        // SAFETY: the symbol is read as an untyped address and not called here.
        let raw = unsafe { handle.get::<*mut c_void>(c_name.as_bytes_with_nul()) }
            .map(|sym| *sym)
            .map_err(|e| self.missing(name, e.to_string()))?;

        let address = NonNull::new(raw).ok_or_else(|| self.missing(name, "null address".into()))?;
        debug!("Resolved {} ({}) in {}", name, convention, self.path.display());
        Ok(Symbol {
            name: name.to_string(),
            address,
            convention,
        })
    }

    fn missing(&self, name: &str, message: String) -> LookupError {
        LookupError::MissingSymbol {
            name: name.to_string(),
            library: self.path.display().to_string(),
            message,
        }
    }
}

#[cfg(unix)]
fn open_handle(path: &Path, mode: OpenMode) -> Result<Library, libloading::Error> {
    use libloading::os::unix;

    let flags = match mode {
        OpenMode::Local => unix::RTLD_NOW | unix::RTLD_LOCAL,
        OpenMode::Global => unix::RTLD_NOW | unix::RTLD_GLOBAL,
    };
    // SAFETY: opening runs the library's initializers; callers accept that
    // by asking for the library.
    let library = unsafe { unix::Library::open(Some(path), flags) }?;
    Ok(library.into())
}

#[cfg(windows)]
fn open_handle(path: &Path, _mode: OpenMode) -> Result<Library, libloading::Error> {
    // SAFETY: see the unix variant.
    unsafe { Library::new(path) }
}

#[cfg(unix)]
fn this_process() -> Result<Library, libloading::Error> {
    Ok(libloading::os::unix::Library::this().into())
}

#[cfg(windows)]
fn this_process() -> Result<Library, libloading::Error> {
    libloading::os::windows::Library::this().map(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convention_parse() {
        assert_eq!(
            "cdecl".parse::<CallingConvention>().unwrap(),
            CallingConvention::Cdecl
        );
        assert_eq!(
            "STDCALL".parse::<CallingConvention>().unwrap(),
            CallingConvention::Stdcall
        );
        assert!("fastcall".parse::<CallingConvention>().is_err());
    }

    #[test]
    fn test_open_missing_file_fails() {
        let result = Lookup::open(Path::new("/nonexistent/libsai.so"), Platform::detect());
        assert!(result.is_err());
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        fn lookup() -> Lookup {
            Lookup::current_process(Platform::Posix).unwrap()
        }

        #[test]
        fn test_get_known_symbol() {
            let lookup = lookup();
            let symbol = lookup.get("strlen", CallingConvention::Cdecl).unwrap();
            assert_eq!(symbol.name(), "strlen");
            assert_eq!(symbol.convention(), CallingConvention::Cdecl);
            assert!(!symbol.address().is_null());
        }

        #[test]
        fn test_symbol_is_memoized() {
            let lookup = lookup();
            let first = lookup.symbol("strlen").unwrap();
            let second = lookup.symbol("strlen").unwrap();
            assert_eq!(first, second);
        }

        #[test]
        fn test_cast_and_call() {
            let lookup = lookup();
            let symbol = lookup.symbol("strlen").unwrap();
            let strlen: unsafe extern "C" fn(*const std::ffi::c_char) -> usize =
                unsafe { symbol.cast() };
            let text = CString::new("switch").unwrap();
            assert_eq!(unsafe { strlen(text.as_ptr()) }, 6);
        }

        #[test]
        fn test_unregistered_convention_is_lookup_error() {
            let lookup = lookup();
            let err = lookup
                .get("strlen", CallingConvention::Stdcall)
                .unwrap_err();
            assert!(matches!(err, LookupError::UnknownConvention { .. }));
        }

        #[test]
        fn test_missing_symbol() {
            let lookup = lookup();
            let err = lookup
                .symbol("sai_definitely_not_exported_here")
                .unwrap_err();
            assert!(matches!(err, LookupError::MissingSymbol { .. }));
        }

        #[test]
        fn test_has_never_fails() {
            let lookup = lookup();
            assert!(lookup.has("strlen", CallingConvention::Cdecl));
            assert!(!lookup.has("strlen", CallingConvention::Stdcall));
            assert!(!lookup.has("no_such_symbol_xyz", CallingConvention::Cdecl));
            assert!(!lookup.has("bad\0name", CallingConvention::Cdecl));
            assert!(!lookup.has("", CallingConvention::Cdecl));
            assert!(lookup.has_named("strlen", "cdecl"));
            assert!(!lookup.has_named("strlen", "pascal"));
            assert!(!lookup.has_named("strlen", ""));
        }
    }
}
