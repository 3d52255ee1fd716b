//! Per-platform library naming and directory discovery.
//!
//! Exactly one [`Platform`] is selected per process via [`Platform::detect`].
//! Each variant carries its own file name templates, calling conventions,
//! open mode and discovery routine:
//!
//! | Variant | Templates | Conventions | Discovery |
//! |---------|-----------|-------------|-----------|
//! | `Posix` | `lib%s.so`, `%s.so`, `%s` | cdecl | `ld.so.conf` + scan cache |
//! | `Darwin` | dylib/so/bundle, prefixed and bare | cdecl | dyld paths, bundle |
//! | `Windows` | `%s.dll`, `lib%s.dll`, `%slib.dll`, `%s` | cdecl, stdcall | none |

pub mod darwin;
pub mod posix;
pub mod windows;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::env::Environment;
use crate::lookup::CallingConvention;

pub use posix::{DirectoryCache, LibraryIndex, PosixSources, SearchDirectories};

/// A file name template such as `lib%s.so`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameFormat {
    prefix: &'static str,
    suffix: &'static str,
}

impl NameFormat {
    pub const fn new(prefix: &'static str, suffix: &'static str) -> Self {
        Self { prefix, suffix }
    }

    /// Substitutes the logical name into the template.
    pub fn apply(&self, libname: &str) -> String {
        format!("{}{}{}", self.prefix, libname, self.suffix)
    }
}

impl fmt::Display for NameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%s{}", self.prefix, self.suffix)
    }
}

/// How the native loader should open a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Resolve now, keep symbols private to the handle.
    Local,
    /// Resolve now, make symbols visible to later loads.
    Global,
}

/// Platform variant driving name formats and discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Posix,
    Darwin,
    Windows,
}

/// Inputs available to the platform discovery tier.
#[derive(Debug, Clone, Copy)]
pub struct Discovery<'a> {
    pub env: &'a Environment,
    pub cache: &'a DirectoryCache,
    pub executable: Option<&'a Path>,
}

impl Platform {
    /// Selects the variant for the running process.
    pub fn detect() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Maps an OS identifier to a variant. Unknown identifiers map to Posix.
    pub fn from_os(os: &str) -> Self {
        match os {
            "macos" | "ios" | "darwin" => Platform::Darwin,
            "windows" | "win32" | "cygwin" | "msys" => Platform::Windows,
            _ => Platform::Posix,
        }
    }

    pub fn name_formats(&self) -> &'static [NameFormat] {
        match self {
            Platform::Posix => &posix::NAME_FORMATS,
            Platform::Darwin => &darwin::NAME_FORMATS,
            Platform::Windows => &windows::NAME_FORMATS,
        }
    }

    /// Applies every name format to `libname`, in preference order.
    pub fn file_names(&self, libname: &str) -> Vec<String> {
        self.name_formats()
            .iter()
            .map(|format| format.apply(libname))
            .collect()
    }

    pub fn conventions(&self) -> &'static [CallingConvention] {
        match self {
            Platform::Posix | Platform::Darwin => &[CallingConvention::Cdecl],
            Platform::Windows => &[CallingConvention::Cdecl, CallingConvention::Stdcall],
        }
    }

    pub fn open_mode(&self) -> OpenMode {
        match self {
            Platform::Darwin => OpenMode::Global,
            Platform::Posix | Platform::Windows => OpenMode::Local,
        }
    }

    /// Separator used in path-list environment variables.
    pub fn path_separator(&self) -> char {
        match self {
            Platform::Windows => ';',
            Platform::Posix | Platform::Darwin => ':',
        }
    }

    /// Platform-specific candidates for `libname`.
    pub fn discover(&self, libname: &str, ctx: &Discovery<'_>) -> Vec<PathBuf> {
        match self {
            Platform::Posix => {
                // Bare-name hits first, then every formatted file name.
                let mut found = ctx.cache.lookup(libname);
                for file_name in self.file_names(libname) {
                    for path in ctx.cache.index().lookup(&file_name) {
                        if !found.contains(path) {
                            found.push(path.clone());
                        }
                    }
                }
                found
            }
            Platform::Darwin => darwin::candidates(libname, ctx.env, ctx.executable),
            Platform::Windows => Vec::new(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::Posix => "posix",
            Platform::Darwin => "darwin",
            Platform::Windows => "windows",
        };
        write!(f, "{}", s)
    }
}
