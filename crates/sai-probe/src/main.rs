//! saiprobe entry point.
//!
//! Loads a switch profile, locates and binds the vendor SAI library, reports
//! its version, and runs one initialize/uninitialize cycle.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use sai_loader::profile::{self, ProfileMap};
use sai_loader::{LibraryLocator, SaiApi, SaiLibrary, SaiLogLevel, SearchConfig, SERVICE_METHOD_TABLE};

/// SAI library probe
#[derive(Parser, Debug)]
#[command(name = "saiprobe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Profile map file (key=value lines)
    #[arg(short = 'p', long)]
    profile: Option<PathBuf>,

    /// Logical name of the SAI library
    #[arg(short = 'n', long, default_value = "sai")]
    library: String,

    /// Extra directory searched before the system paths (repeatable)
    #[arg(short = 'L', long = "search-dir")]
    search_dirs: Vec<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Stop after binding; do not call sai_api_initialize
    #[arg(long)]
    no_init: bool,
}

fn load_profile(path: Option<&PathBuf>) -> Result<()> {
    let map = match path {
        Some(path) => {
            info!("Profile map file: {}", path.display());
            ProfileMap::load(path)?
        }
        None => ProfileMap::new(),
    };
    profile::install(&map).context("Failed to publish profile")?;
    Ok(())
}

fn probe(args: &Args) -> Result<()> {
    load_profile(args.profile.as_ref())?;

    let mut config = SearchConfig::from_process();
    config.add_search_dirs(&args.search_dirs);
    let locator = LibraryLocator::new(config);

    // SAFETY: the located library is expected to be a SAI implementation.
    let sai = unsafe { SaiLibrary::load(&locator, &args.library) }
        .with_context(|| format!("Failed to bind SAI library '{}'", args.library))?;
    info!("SAI library: {}", sai.lookup().path().display());

    match sai.api_version() {
        Some(Ok(version)) => info!("Loaded SAI version {}", version),
        Some(Err(e)) => warn!("{}", e),
        None => info!("sai_query_api_version not exported"),
    }
    for vendor in sai.vendor_info() {
        info!("{} detected", vendor);
    }

    if args.no_init {
        return Ok(());
    }

    sai.initialize(&SERVICE_METHOD_TABLE)?;
    let switch_api = sai.api_query(SaiApi::Switch)?;
    info!("Switch API table at {:p}", switch_api);
    for api in SaiApi::LOGGED {
        if let Err(e) = sai.log_set(api, SaiLogLevel::Notice) {
            warn!("{}", e);
        }
    }
    sai.uninitialize()?;
    info!("SAI uninitialized");
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    match probe(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["saiprobe"]);
        assert_eq!(args.library, "sai");
        assert_eq!(args.log_level, "info");
        assert!(args.search_dirs.is_empty());
        assert!(!args.no_init);
    }

    #[test]
    fn test_args_repeatable_search_dir() {
        let args = Args::parse_from([
            "saiprobe", "-p", "/etc/sai.profile", "-L", "/opt/a", "--search-dir", "/opt/b",
            "-n", "saivs", "--no-init",
        ]);
        assert_eq!(args.profile, Some(PathBuf::from("/etc/sai.profile")));
        assert_eq!(
            args.search_dirs,
            vec![PathBuf::from("/opt/a"), PathBuf::from("/opt/b")]
        );
        assert_eq!(args.library, "saivs");
        assert!(args.no_init);
    }

    #[test]
    fn test_missing_library_fails() {
        let args = Args::parse_from(["saiprobe", "-n", "sai_probe_no_such_library", "--no-init"]);
        let err = probe(&args).unwrap_err();
        assert!(format!("{:#}", err).contains("Could not load library 'sai_probe_no_such_library'"));
    }
}
