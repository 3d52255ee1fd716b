//! System dynamic-linker resolvers.
//!
//! The locator asks a [`SystemResolver`] for each formatted file name; a
//! resolver answers with a full path or nothing. Resolvers never fail.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use log::debug;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;

use crate::env::Environment;
use crate::platform::{darwin, windows, Platform};

/// Path of the `ldconfig` binary.
pub const LDCONFIG_CMD: &str = "/sbin/ldconfig";

static LDCONFIG_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s+(?P<soname>\S+)\s+\((?P<abi>[^)]*)\)\s+=>\s+(?P<path>\S+)\s*$")
        .expect("Invalid regex pattern")
});

/// Answers "where does the system linker find this name".
pub trait SystemResolver: fmt::Debug + Send + Sync {
    fn find(&self, name: &str) -> Option<PathBuf>;
}

/// Resolver that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl SystemResolver for NullResolver {
    fn find(&self, _name: &str) -> Option<PathBuf> {
        None
    }
}

/// One line of `ldconfig -p`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdconfigEntry {
    pub soname: String,
    pub abi: String,
    pub path: PathBuf,
}

/// Resolver backed by the dynamic linker cache listing.
#[derive(Debug)]
pub struct LdconfigResolver {
    command: PathBuf,
    abi_tag: Option<String>,
    entries: OnceCell<Vec<LdconfigEntry>>,
}

impl LdconfigResolver {
    pub fn new() -> Self {
        Self::with_command(LDCONFIG_CMD)
    }

    pub fn with_command(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            abi_tag: host_abi_tag().map(str::to_string),
            entries: OnceCell::new(),
        }
    }

    /// Builds a resolver from captured `ldconfig -p` output.
    pub fn from_output(output: &str, abi_tag: Option<&str>) -> Self {
        Self {
            command: PathBuf::from(LDCONFIG_CMD),
            abi_tag: abi_tag.map(str::to_string),
            entries: OnceCell::with_value(parse_ldconfig(output)),
        }
    }

    fn entries(&self) -> &[LdconfigEntry] {
        self.entries.get_or_init(|| {
            match Command::new(&self.command)
                .arg("-p")
                .env("LC_ALL", "C")
                .output()
            {
                Ok(output) if output.status.success() => {
                    parse_ldconfig(&String::from_utf8_lossy(&output.stdout))
                }
                Ok(output) => {
                    debug!("{} -p exited with {}", self.command.display(), output.status);
                    Vec::new()
                }
                Err(e) => {
                    debug!("Cannot run {}: {}", self.command.display(), e);
                    Vec::new()
                }
            }
        })
    }

    fn abi_matches(&self, abi: &str) -> bool {
        match &self.abi_tag {
            Some(tag) => abi.contains(tag.as_str()),
            None => true,
        }
    }
}

impl Default for LdconfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemResolver for LdconfigResolver {
    fn find(&self, name: &str) -> Option<PathBuf> {
        let prefix = format!("lib{}.", name);
        self.entries()
            .iter()
            .filter(|entry| self.abi_matches(&entry.abi))
            .find(|entry| entry.soname == name || entry.soname.starts_with(&prefix))
            .map(|entry| entry.path.clone())
    }
}

/// Parses `ldconfig -p` output, ignoring the header and malformed lines.
pub fn parse_ldconfig(output: &str) -> Vec<LdconfigEntry> {
    output
        .lines()
        .filter_map(|line| LDCONFIG_LINE_RE.captures(line))
        .map(|caps| LdconfigEntry {
            soname: caps["soname"].to_string(),
            abi: caps["abi"].to_string(),
            path: PathBuf::from(&caps["path"]),
        })
        .collect()
}

fn host_abi_tag() -> Option<&'static str> {
    match std::env::consts::ARCH {
        "x86_64" => Some("x86-64"),
        "aarch64" => Some("AArch64"),
        _ => None,
    }
}

/// Resolver that searches an ordered directory list.
#[derive(Debug, Clone, Default)]
pub struct DirectoryResolver {
    dirs: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl DirectoryResolver {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            extensions: Vec::new(),
        }
    }

    /// Also tries `name` with each extension appended.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extensions.push(extension.into());
        self
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

impl SystemResolver for DirectoryResolver {
    fn find(&self, name: &str) -> Option<PathBuf> {
        let mut names = vec![name.to_string()];
        names.extend(self.extensions.iter().map(|ext| format!("{}{}", name, ext)));
        self.dirs
            .iter()
            .flat_map(|dir| names.iter().map(move |n| dir.join(n)))
            .find(|path| path.is_file())
    }
}

/// The resolver matching a platform.
pub fn default_resolver(platform: Platform, env: &Environment) -> Arc<dyn SystemResolver> {
    match platform {
        Platform::Posix => Arc::new(LdconfigResolver::new()),
        Platform::Darwin => {
            let mut dirs = env.paths(crate::env::DYLD_LIBRARY_PATH, ':');
            dirs.extend(darwin::fallback_dirs(env));
            Arc::new(DirectoryResolver::new(dirs))
        }
        Platform::Windows => {
            Arc::new(DirectoryResolver::new(windows::path_dirs(env)).with_extension(".dll"))
        }
    }
}
