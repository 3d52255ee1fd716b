//! Library locator.
//!
//! Turns a logical library name into an opened [`Lookup`] by trying candidate
//! paths in priority order:
//!
//! 1. explicit search directories, each combined with every name format
//! 2. the binding directory (next to the running executable)
//! 3. the system resolver's answer for every formatted name
//! 4. platform discovery (`ld.so.conf` scan, dyld paths)
//! 5. the working directory
//!
//! An absolute name is its own single candidate. Per-candidate failures are
//! logged and absorbed; only exhaustion is reported.

use std::fmt;
use std::iter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};

use crate::env::Environment;
use crate::error::{LoadError, LoadResult};
use crate::lookup::Lookup;
use crate::platform::{DirectoryCache, Discovery, Platform, PosixSources};
use crate::resolver::{default_resolver, NullResolver, SystemResolver};

/// Everything the locator consults.
///
/// Nothing here is read from process globals after construction, so tests
/// can build isolated instances with [`SearchConfig::isolated`].
pub struct SearchConfig {
    platform: Platform,
    env: Environment,
    explicit_dirs: Vec<PathBuf>,
    binding_dir: Option<PathBuf>,
    executable: Option<PathBuf>,
    working_dir: PathBuf,
    resolver: Arc<dyn SystemResolver>,
    env_resolver: bool,
    cache: DirectoryCache,
}

impl fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchConfig")
            .field("platform", &self.platform)
            .field("explicit_dirs", &self.explicit_dirs)
            .field("binding_dir", &self.binding_dir)
            .field("working_dir", &self.working_dir)
            .field("resolver", &self.resolver)
            .field("cache_built", &self.cache.is_built())
            .finish()
    }
}

impl SearchConfig {
    /// Configuration of the running process.
    pub fn from_process() -> Self {
        let platform = Platform::detect();
        let env = Environment::capture();
        let executable = std::env::current_exe().ok();
        let binding_dir = executable
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf);
        let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            platform,
            resolver: default_resolver(platform, &env),
            env_resolver: true,
            cache: DirectoryCache::new(PosixSources::system(env.clone())),
            env,
            explicit_dirs: Vec::new(),
            binding_dir,
            executable,
            working_dir,
        }
    }

    /// A configuration that touches nothing outside what is set on it:
    /// empty environment, no binding directory, no system resolver, no
    /// `ld.so.conf` and no architecture directories.
    pub fn isolated(platform: Platform) -> Self {
        let env = Environment::empty();
        Self {
            platform,
            cache: DirectoryCache::new(isolated_sources(env.clone())),
            env,
            explicit_dirs: Vec::new(),
            binding_dir: None,
            executable: None,
            working_dir: PathBuf::from("."),
            resolver: Arc::new(NullResolver),
            env_resolver: false,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn explicit_dirs(&self) -> &[PathBuf] {
        &self.explicit_dirs
    }

    pub fn binding_dir(&self) -> Option<&Path> {
        self.binding_dir.as_deref()
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn cache(&self) -> &DirectoryCache {
        &self.cache
    }

    /// Replaces the environment snapshot. Resets the unbuilt directory cache
    /// and rebuilds the platform resolver unless a custom one was set.
    pub fn with_env(mut self, env: Environment) -> Self {
        let sources = PosixSources {
            env: env.clone(),
            ..self.cache.sources().clone()
        };
        if self.env_resolver {
            self.resolver = default_resolver(self.platform, &env);
        }
        self.env = env;
        self.cache = DirectoryCache::new(sources);
        self
    }

    /// Registers an explicit search directory, made absolute against the
    /// working directory.
    pub fn with_search_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.add_search_dir(dir);
        self
    }

    pub fn add_search_dir(&mut self, dir: impl AsRef<Path>) {
        let dir = self.working_dir.join(dir.as_ref());
        if !self.explicit_dirs.contains(&dir) {
            self.explicit_dirs.push(dir);
        }
    }

    pub fn add_search_dirs<I, P>(&mut self, dirs: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for dir in dirs {
            self.add_search_dir(dir);
        }
    }

    pub fn with_binding_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.binding_dir = dir;
        self
    }

    pub fn with_executable(mut self, executable: Option<PathBuf>) -> Self {
        self.executable = executable;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn SystemResolver>) -> Self {
        self.resolver = resolver;
        self.env_resolver = false;
        self
    }

    /// Uses the platform's own resolver, derived from the environment.
    pub fn with_platform_resolver(mut self) -> Self {
        self.resolver = default_resolver(self.platform, &self.env);
        self.env_resolver = true;
        self
    }

    pub fn with_ld_so_conf(mut self, conf: impl Into<PathBuf>) -> Self {
        let sources = PosixSources {
            ld_so_conf: conf.into(),
            ..self.cache.sources().clone()
        };
        self.cache = DirectoryCache::new(sources);
        self
    }

    pub fn with_system_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        let sources = PosixSources {
            system_dirs: dirs,
            ..self.cache.sources().clone()
        };
        self.cache = DirectoryCache::new(sources);
        self
    }
}

fn isolated_sources(env: Environment) -> PosixSources {
    PosixSources {
        env,
        ld_so_conf: PathBuf::from("/nonexistent/ld.so.conf"),
        system_dirs: Vec::new(),
    }
}

/// Lazily produced candidate paths.
pub struct Candidates<'a> {
    inner: Box<dyn Iterator<Item = PathBuf> + 'a>,
}

impl Iterator for Candidates<'_> {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        self.inner.next()
    }
}

fn in_dir<'a>(dir: &'a Path, names: &'a [String]) -> impl Iterator<Item = PathBuf> + 'a {
    names.iter().map(move |name| dir.join(name))
}

/// Finds and opens native libraries according to a [`SearchConfig`].
#[derive(Debug)]
pub struct LibraryLocator {
    config: SearchConfig,
}

impl LibraryLocator {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn from_process() -> Self {
        Self::new(SearchConfig::from_process())
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Candidate paths for `name`, in the order they are tried.
    pub fn candidates<'a>(&'a self, name: &'a str) -> Candidates<'a> {
        let path = Path::new(name);
        if path.is_absolute() {
            return Candidates {
                inner: Box::new(iter::once(path.to_path_buf())),
            };
        }

        let config = &self.config;
        let names: Arc<[String]> = config.platform.file_names(name).into();

        let explicit = {
            let names = Arc::clone(&names);
            config
                .explicit_dirs
                .iter()
                .flat_map(move |dir| in_dir(dir, &names).collect::<Vec<_>>())
        };
        let binding = {
            let names = Arc::clone(&names);
            config
                .binding_dir
                .iter()
                .flat_map(move |dir| in_dir(dir, &names).collect::<Vec<_>>())
        };
        let system = {
            let names = Arc::clone(&names);
            (0..names.len()).filter_map(move |i| config.resolver.find(&names[i]))
        };
        // Deferred so the directory cache is only built when reached.
        let discovered = iter::once(()).flat_map(move |()| {
            let ctx = Discovery {
                env: &config.env,
                cache: &config.cache,
                executable: config.executable.as_deref(),
            };
            config.platform.discover(name, &ctx)
        });
        let working = {
            let names = Arc::clone(&names);
            iter::once(()).flat_map(move |()| in_dir(&config.working_dir, &names).collect::<Vec<_>>())
        };

        Candidates {
            inner: Box::new(
                explicit
                    .chain(binding)
                    .chain(system)
                    .chain(discovered)
                    .chain(working),
            ),
        }
    }

    /// Opens the first candidate that loads.
    pub fn load(&self, name: &str) -> LoadResult<Lookup> {
        let platform = self.config.platform;
        self.load_with(name, |path| Lookup::open(path, platform))
    }

    /// Like [`LibraryLocator::load`] with a custom open step.
    pub fn load_with<T, E, F>(&self, name: &str, mut open: F) -> LoadResult<T>
    where
        F: FnMut(&Path) -> Result<T, E>,
        E: fmt::Display,
    {
        for candidate in self.candidates(name) {
            match open(&candidate) {
                Ok(loaded) => {
                    info!("Loaded library '{}' from {}", name, candidate.display());
                    return Ok(loaded);
                }
                Err(e) => debug!("Candidate {} rejected: {}", candidate.display(), e),
            }
        }
        Err(LoadError::not_found(name))
    }
}
