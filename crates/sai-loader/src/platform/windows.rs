//! Windows naming. Discovery relies on the common tiers and `PATH`.

use std::path::PathBuf;

use super::NameFormat;
use crate::env::{self, Environment};

pub const NAME_FORMATS: [NameFormat; 4] = [
    NameFormat::new("", ".dll"),
    NameFormat::new("lib", ".dll"),
    NameFormat::new("", "lib.dll"),
    NameFormat::new("", ""),
];

/// Directories searched by the system resolver.
pub fn path_dirs(env: &Environment) -> Vec<PathBuf> {
    env.paths(env::PATH, ';')
}
