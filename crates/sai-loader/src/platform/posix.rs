//! POSIX discovery: `ld.so.conf` parsing and the shared-object scan cache.
//!
//! Directories are gathered from the library path environment variables,
//! the dynamic linker configuration tree and the architecture defaults.
//! Every directory is then scanned once for `*.s[ol]*` files, indexed both
//! by file name and by bare library name (`libfoo.so.1` is reachable as
//! `libfoo.so.1` and as `foo`).

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use glob::{glob, Pattern};
use log::{debug, warn};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;

use super::NameFormat;
use crate::env::{self, Environment};

pub const NAME_FORMATS: [NameFormat; 3] = [
    NameFormat::new("lib", ".so"),
    NameFormat::new("", ".so"),
    NameFormat::new("", ""),
];

/// Root of the dynamic linker configuration tree.
pub const LD_SO_CONF: &str = "/etc/ld.so.conf";

/// Environment variables contributing search directories, in order.
pub const SEARCH_PATH_VARS: [&str; 4] = [
    env::LD_LIBRARY_PATH,
    env::SHLIB_PATH,
    env::LIBPATH,
    env::LIBRARY_PATH,
];

static INCLUDE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^include\s+(?P<pattern>.+)$").expect("Invalid regex pattern"));

static LIBRARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^lib(?P<name>.*)\.s[ol]").expect("Invalid regex pattern"));

/// Ordered set of existing directories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchDirectories {
    dirs: Vec<PathBuf>,
}

impl SearchDirectories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a directory unless it is missing or already present.
    pub fn add(&mut self, dir: impl AsRef<Path>) {
        let dir = trim_trailing_separator(dir.as_ref());
        if !dir.exists() {
            return;
        }
        if !self.dirs.contains(&dir) {
            self.dirs.push(dir);
        }
    }

    pub fn extend<I, P>(&mut self, dirs: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for dir in dirs {
            self.add(dir);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.dirs.iter().map(PathBuf::as_path)
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.dirs.iter().any(|d| d == dir)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn into_vec(self) -> Vec<PathBuf> {
        self.dirs
    }
}

fn trim_trailing_separator(dir: &Path) -> PathBuf {
    let raw = dir.to_string_lossy();
    if raw.len() <= 1 {
        return dir.to_path_buf();
    }
    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() {
        PathBuf::from("/")
    } else {
        PathBuf::from(trimmed)
    }
}

/// Parses a dynamic linker configuration file into `dirs`.
///
/// Unreadable files and failed glob expansions are skipped. A file already
/// visited during this parse is not read again, which stops include cycles.
pub fn read_ld_so_conf(conf: &Path, dirs: &mut SearchDirectories) {
    let mut visited = HashSet::new();
    read_conf_file(conf, dirs, &mut visited);
}

fn read_conf_file(conf: &Path, dirs: &mut SearchDirectories, visited: &mut HashSet<PathBuf>) {
    let key = fs::canonicalize(conf).unwrap_or_else(|_| conf.to_path_buf());
    if !visited.insert(key) {
        warn!("Skipping already visited ld.so.conf include {}", conf.display());
        return;
    }

    let contents = match fs::read_to_string(conf) {
        Ok(contents) => contents,
        Err(e) => {
            debug!("Cannot read {}: {}", conf.display(), e);
            return;
        }
    };

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match INCLUDE_RE.captures(line) {
            Some(caps) => {
                for included in expand_include(&caps["pattern"]) {
                    read_conf_file(&included, dirs, visited);
                }
            }
            None => dirs.add(line),
        }
    }
}

/// Expands an `include` glob. Relative patterns are anchored at `/`.
fn expand_include(pattern: &str) -> Vec<PathBuf> {
    let pattern = pattern.trim();
    let anchored = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        format!("/{}", pattern)
    };
    match glob(&anchored) {
        Ok(paths) => paths.filter_map(Result::ok).collect(),
        Err(e) => {
            debug!("Invalid include pattern '{}': {}", anchored, e);
            Vec::new()
        }
    }
}

/// Architecture default directories for the running build.
pub fn architecture_dirs() -> Vec<PathBuf> {
    architecture_dirs_for(
        std::env::consts::OS,
        std::env::consts::ARCH,
        cfg!(target_pointer_width = "64"),
    )
}

/// Architecture default directories for an explicit target description.
pub fn architecture_dirs_for(os: &str, arch: &str, is_64bit: bool) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if is_64bit {
        dirs.push(PathBuf::from("/lib64"));
        dirs.push(PathBuf::from("/usr/lib64"));
    }
    dirs.push(PathBuf::from("/lib"));
    dirs.push(PathBuf::from("/usr/lib"));

    if os == "linux" {
        match multiarch_triplet(arch) {
            Some(triplet) => {
                dirs.push(Path::new("/lib").join(triplet));
                dirs.push(Path::new("/usr/lib").join(triplet));
            }
            None => {
                if let Ok(paths) = glob("/lib/*linux-gnu") {
                    dirs.extend(paths.filter_map(Result::ok));
                }
            }
        }
    }
    dirs
}

fn multiarch_triplet(arch: &str) -> Option<&'static str> {
    match arch {
        "x86_64" => Some("x86_64-linux-gnu"),
        "x86" => Some("i386-linux-gnu"),
        "aarch64" => Some("aarch64-linux-gnu"),
        "arm" => Some("arm-linux-gnueabihf"),
        "powerpc64" => Some("powerpc64le-linux-gnu"),
        "s390x" => Some("s390x-linux-gnu"),
        "riscv64" => Some("riscv64-linux-gnu"),
        _ => None,
    }
}

/// Where the POSIX resolver looks for directories.
#[derive(Debug, Clone)]
pub struct PosixSources {
    pub env: Environment,
    pub ld_so_conf: PathBuf,
    pub system_dirs: Vec<PathBuf>,
}

impl PosixSources {
    /// Sources of the running system.
    pub fn system(env: Environment) -> Self {
        Self {
            env,
            ld_so_conf: PathBuf::from(LD_SO_CONF),
            system_dirs: architecture_dirs(),
        }
    }

    /// Collects the ordered directory set.
    pub fn discover(&self) -> SearchDirectories {
        let mut dirs = SearchDirectories::new();
        for name in SEARCH_PATH_VARS {
            dirs.extend(self.env.paths(name, ':'));
        }
        read_ld_so_conf(&self.ld_so_conf, &mut dirs);
        dirs.extend(&self.system_dirs);
        dirs
    }
}

/// Shared objects found in the search directories.
#[derive(Debug, Clone, Default)]
pub struct LibraryIndex {
    directories: Vec<PathBuf>,
    entries: HashMap<String, Vec<PathBuf>>,
}

impl LibraryIndex {
    /// Scans each directory once for shared objects.
    pub fn build(dirs: &SearchDirectories) -> Self {
        let mut index = LibraryIndex::default();
        for dir in dirs.iter() {
            index.directories.push(dir.to_path_buf());
            let pattern = format!("{}/*.s[ol]*", Pattern::escape(&dir.to_string_lossy()));
            let paths = match glob(&pattern) {
                Ok(paths) => paths,
                Err(e) => {
                    debug!("Skipping {}: {}", dir.display(), e);
                    continue;
                }
            };
            for path in paths.filter_map(Result::ok) {
                let Some(file) = path.file_name().and_then(|f| f.to_str()) else {
                    continue;
                };
                let file = file.to_string();
                if let Some(caps) = LIBRARY_RE.captures(&file) {
                    index.insert(caps["name"].to_string(), &path);
                }
                index.insert(file, &path);
            }
        }
        index
    }

    fn insert(&mut self, key: String, path: &Path) {
        let paths = self.entries.entry(key).or_default();
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_path_buf());
        }
    }

    /// Paths indexed under a file name or bare library name.
    pub fn lookup(&self, key: &str) -> &[PathBuf] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lazily built [`LibraryIndex`].
///
/// The index is built on first use and never rebuilt; concurrent first use
/// builds it exactly once.
#[derive(Debug)]
pub struct DirectoryCache {
    sources: PosixSources,
    index: OnceCell<LibraryIndex>,
}

impl DirectoryCache {
    pub fn new(sources: PosixSources) -> Self {
        Self {
            sources,
            index: OnceCell::new(),
        }
    }

    pub fn sources(&self) -> &PosixSources {
        &self.sources
    }

    pub fn index(&self) -> &LibraryIndex {
        self.index.get_or_init(|| {
            let dirs = self.sources.discover();
            debug!("Scanning {} library directories", dirs.len());
            LibraryIndex::build(&dirs)
        })
    }

    pub fn is_built(&self) -> bool {
        self.index.get().is_some()
    }

    pub fn lookup(&self, libname: &str) -> Vec<PathBuf> {
        self.index().lookup(libname).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        fs::write(path, contents).unwrap();
    }

    fn isolated_sources(env: Environment, conf: PathBuf) -> PosixSources {
        PosixSources {
            env,
            ld_so_conf: conf,
            system_dirs: Vec::new(),
        }
    }

    #[test]
    fn test_include_directive_expands_glob() {
        let root = TempDir::new().unwrap();
        let conf_d = root.path().join("ld.so.conf.d");
        let lib_a = root.path().join("vendor-a");
        let lib_b = root.path().join("vendor-b");
        fs::create_dir_all(&conf_d).unwrap();
        fs::create_dir_all(&lib_a).unwrap();
        fs::create_dir_all(&lib_b).unwrap();

        write(&conf_d.join("a.conf"), &format!("{}\n", lib_a.display()));
        write(&conf_d.join("b.conf"), &format!("{}\n", lib_b.display()));
        let conf = root.path().join("ld.so.conf");
        write(&conf, &format!("include {}/*.conf\n", conf_d.display()));

        let dirs = isolated_sources(Environment::empty(), conf).discover();
        assert_eq!(dirs.into_vec(), vec![lib_a, lib_b]);
    }

    #[test]
    fn test_include_without_matches_adds_nothing() {
        let root = TempDir::new().unwrap();
        let conf = root.path().join("ld.so.conf");
        write(
            &conf,
            &format!("include {}/missing.d/*.conf\n\n", root.path().display()),
        );

        let mut dirs = SearchDirectories::new();
        read_ld_so_conf(&conf, &mut dirs);
        assert!(dirs.is_empty());
    }

    #[test]
    fn test_unreadable_conf_is_ignored() {
        let mut dirs = SearchDirectories::new();
        read_ld_so_conf(Path::new("/nonexistent/ld.so.conf"), &mut dirs);
        assert!(dirs.is_empty());
    }

    #[test]
    fn test_include_cycle_terminates() {
        let root = TempDir::new().unwrap();
        let lib = root.path().join("lib");
        fs::create_dir_all(&lib).unwrap();
        let a = root.path().join("a.conf");
        let b = root.path().join("b.conf");
        write(&a, &format!("{}\ninclude {}\n", lib.display(), b.display()));
        write(&b, &format!("include {}\n", a.display()));

        let mut dirs = SearchDirectories::new();
        read_ld_so_conf(&a, &mut dirs);
        assert_eq!(dirs.into_vec(), vec![lib]);
    }

    #[test]
    fn test_comments_and_missing_dirs_skipped() {
        let root = TempDir::new().unwrap();
        let lib = root.path().join("lib");
        fs::create_dir_all(&lib).unwrap();
        let conf = root.path().join("ld.so.conf");
        write(
            &conf,
            &format!("# comment\n   \n/does/not/exist\n{}/\n", lib.display()),
        );

        let mut dirs = SearchDirectories::new();
        read_ld_so_conf(&conf, &mut dirs);
        assert_eq!(dirs.into_vec(), vec![lib]);
    }

    #[test]
    fn test_env_dirs_come_first_and_deduplicate() {
        let root = TempDir::new().unwrap();
        let first = root.path().join("first");
        let second = root.path().join("second");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();

        let conf = root.path().join("ld.so.conf");
        write(&conf, &format!("{}\n{}\n", second.display(), first.display()));
        let env = Environment::empty()
            .with(env::LD_LIBRARY_PATH, first.display().to_string())
            .with(env::LIBRARY_PATH, format!("{}/", first.display()));

        let dirs = isolated_sources(env, conf).discover();
        assert_eq!(dirs.into_vec(), vec![first, second]);
    }

    #[test]
    fn test_architecture_dirs_64bit_linux() {
        let dirs = architecture_dirs_for("linux", "x86_64", true);
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/lib64"),
                PathBuf::from("/usr/lib64"),
                PathBuf::from("/lib"),
                PathBuf::from("/usr/lib"),
                PathBuf::from("/lib/x86_64-linux-gnu"),
                PathBuf::from("/usr/lib/x86_64-linux-gnu"),
            ]
        );
    }

    #[test]
    fn test_architecture_dirs_32bit_non_linux() {
        let dirs = architecture_dirs_for("freebsd", "x86", false);
        assert_eq!(dirs, vec![PathBuf::from("/lib"), PathBuf::from("/usr/lib")]);
    }

    #[test]
    fn test_index_by_file_and_bare_name() {
        let root = TempDir::new().unwrap();
        let lib = root.path().join("lib");
        fs::create_dir_all(&lib).unwrap();
        for name in ["libsai.so", "libsai.so.1", "saimeta.so", "README"] {
            write(&lib.join(name), "");
        }

        let mut dirs = SearchDirectories::new();
        dirs.add(&lib);
        let index = LibraryIndex::build(&dirs);

        assert_eq!(
            index.lookup("sai"),
            &[lib.join("libsai.so"), lib.join("libsai.so.1")]
        );
        assert_eq!(index.lookup("libsai.so.1"), &[lib.join("libsai.so.1")]);
        assert_eq!(index.lookup("saimeta.so"), &[lib.join("saimeta.so")]);
        assert!(index.lookup("saimeta").is_empty());
        assert!(index.lookup("README").is_empty());
    }

    #[test]
    fn test_cache_builds_once() {
        let root = TempDir::new().unwrap();
        let lib = root.path().join("lib");
        fs::create_dir_all(&lib).unwrap();
        write(&lib.join("libfoo.so"), "");

        let env = Environment::empty().with(env::LD_LIBRARY_PATH, lib.display().to_string());
        let cache = DirectoryCache::new(isolated_sources(env, root.path().join("none.conf")));
        assert!(!cache.is_built());
        assert_eq!(cache.lookup("foo"), vec![lib.join("libfoo.so")]);
        assert!(cache.is_built());

        // Later installs are not observed.
        write(&lib.join("libbar.so"), "");
        assert!(cache.lookup("bar").is_empty());
    }
}
