//! Prerequisite detection and installation.
//!
//! The agent needs the open-iscsi initiator and multipath-tools on the
//! host. Missing tools are installed through `apt-get`.

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::exec::{CommandFailure, CommandRunner, check_command_result};

/// A binary the agent shells out to and the package that ships it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prerequisite {
    pub binary: &'static str,
    pub package: &'static str,
}

pub const PREREQUISITES: &[Prerequisite] = &[
    Prerequisite {
        binary: "iscsiadm",
        package: "open-iscsi",
    },
    Prerequisite {
        binary: "multipath",
        package: "multipath-tools",
    },
];

#[derive(Error, Debug)]
pub enum PrereqError {
    #[error("still missing after install: {0}")]
    StillMissing(String),

    #[error(transparent)]
    CommandFailed(#[from] CommandFailure),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PrereqError>;

/// Binary lookup on `PATH`.
pub fn on_path(binary: &str) -> bool {
    which::which(binary).is_ok()
}

/// Prerequisites whose binary `lookup` cannot find.
pub fn missing(lookup: &dyn Fn(&str) -> bool) -> Vec<&'static Prerequisite> {
    PREREQUISITES
        .iter()
        .filter(|p| !lookup(p.binary))
        .collect()
}

/// Install every missing prerequisite and return the packages installed.
#[instrument(skip_all)]
pub fn ensure_installed(
    runner: &dyn CommandRunner,
    lookup: &dyn Fn(&str) -> bool,
) -> Result<Vec<&'static str>> {
    let absent = missing(lookup);
    if absent.is_empty() {
        info!("All prerequisites present");
        return Ok(Vec::new());
    }

    let packages: Vec<&'static str> = absent.iter().map(|p| p.package).collect();
    info!(?packages, "Installing missing prerequisites");

    let output = runner.run("apt-get", &["update", "-q"])?;
    check_command_result(&output, "apt-get update")?;

    let mut args = vec!["install", "-y", "-q"];
    args.extend(packages.iter().copied());
    let output = runner.run("apt-get", &args)?;
    check_command_result(&output, "apt-get install")?;

    if runner.is_dry_run() {
        return Ok(packages);
    }

    let still: Vec<&str> = missing(lookup).iter().map(|p| p.binary).collect();
    if !still.is_empty() {
        warn!(?still, "Prerequisites missing after install");
        return Err(PrereqError::StillMissing(still.join(", ")));
    }

    info!("Installed {}", packages.join(", "));
    Ok(packages)
}
