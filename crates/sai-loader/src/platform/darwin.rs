//! Darwin discovery: dyld search paths and application bundles.

use std::path::{Path, PathBuf};

use super::NameFormat;
use crate::env::{self, Environment};

pub const NAME_FORMATS: [NameFormat; 7] = [
    NameFormat::new("lib", ".dylib"),
    NameFormat::new("lib", ".so"),
    NameFormat::new("lib", ".bundle"),
    NameFormat::new("", ".dylib"),
    NameFormat::new("", ".so"),
    NameFormat::new("", ".bundle"),
    NameFormat::new("", ""),
];

/// Used when `DYLD_FALLBACK_LIBRARY_PATH` is unset.
pub const DEFAULT_FALLBACK_DIRS: [&str; 2] = ["/usr/local/lib", "/usr/lib"];

/// Fallback directories: the environment list, or `~/lib` plus the defaults.
pub fn fallback_dirs(env: &Environment) -> Vec<PathBuf> {
    let configured = env.paths(env::DYLD_FALLBACK_LIBRARY_PATH, ':');
    if !configured.is_empty() {
        return configured;
    }
    let mut dirs = Vec::new();
    if let Some(home) = env.get(env::HOME) {
        dirs.push(Path::new(home).join("lib"));
    }
    dirs.extend(DEFAULT_FALLBACK_DIRS.iter().map(PathBuf::from));
    dirs
}

/// `Frameworks` directory of the enclosing `.app` bundle, if any.
pub fn bundle_frameworks(env: &Environment, executable: Option<&Path>) -> Option<PathBuf> {
    let executable = executable?;
    let bundle = executable.ancestors().find(|dir| {
        dir.extension()
            .map(|ext| ext.eq_ignore_ascii_case("app"))
            .unwrap_or(false)
    })?;
    match env.get(env::RESOURCEPATH) {
        Some(resources) => Some(Path::new(resources).join("..").join("Frameworks")),
        None => Some(bundle.join("Contents").join("Frameworks")),
    }
}

/// Ordered search directories for `libname`.
pub fn search_dirs(libname: &str, env: &Environment, executable: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if libname.contains('/') {
        dirs.extend(env.paths(env::DYLD_LIBRARY_PATH, ':'));
    } else {
        dirs.extend(env.paths(env::LD_LIBRARY_PATH, ':'));
        dirs.extend(env.paths(env::DYLD_LIBRARY_PATH, ':'));
        dirs.extend(env.paths(env::LD_RUN_PATH, ':'));
    }
    dirs.extend(bundle_frameworks(env, executable));
    dirs.extend(fallback_dirs(env));
    dirs
}

/// Every search directory combined with every name format.
///
/// Names containing `/` are used verbatim instead of being formatted.
pub fn candidates(libname: &str, env: &Environment, executable: Option<&Path>) -> Vec<PathBuf> {
    let names: Vec<String> = if libname.contains('/') {
        vec![libname.to_string()]
    } else {
        NAME_FORMATS.iter().map(|f| f.apply(libname)).collect()
    };
    search_dirs(libname, env, executable)
        .iter()
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .collect()
}
