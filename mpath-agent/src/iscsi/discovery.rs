//! Target discovery and WWID lookup.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, instrument};

use super::error::Result;
use super::types::{Iqn, Portal, StorageEntry};
use crate::exec::{CommandRunner, check_command_result};
use crate::multipath::Wwid;

/// udev helper that prints a device's WWID
pub const SCSI_ID: &str = "/lib/udev/scsi_id";

/// `iscsiadm -m discovery` lines: `10.0.0.5:3260,1 iqn.2005-10.org.freenas.ctl:pve`
static SENDTARGETS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\S+,\d+\s+(iqn\.\S+)\s*$").expect("valid sendtargets regex"));

/// Ask the portal which targets it offers, deduplicated in output order.
#[instrument(skip(runner))]
pub fn discover_targets(runner: &dyn CommandRunner, portal: &Portal) -> Result<Vec<Iqn>> {
    let portal = portal.to_string();
    let output = runner.run(
        "iscsiadm",
        &["-m", "discovery", "-t", "sendtargets", "-p", &portal],
    )?;
    check_command_result(&output, &format!("iscsiadm discovery on {}", portal))?;

    let mut targets: Vec<Iqn> = Vec::new();
    for line in output.stdout.lines() {
        let Some(caps) = SENDTARGETS_LINE.captures(line) else {
            continue;
        };
        match Iqn::parse(&caps[1]) {
            Ok(iqn) if !targets.contains(&iqn) => targets.push(iqn),
            Ok(_) => {}
            Err(e) => debug!(line, error = %e, "Ignoring discovery line"),
        }
    }

    info!(%portal, "Discovered {} target(s)", targets.len());
    Ok(targets)
}

/// The udev by-path node for a LUN reached through `portal`.
pub fn by_path_device(portal: &Portal, entry: &StorageEntry) -> PathBuf {
    PathBuf::from(format!(
        "/dev/disk/by-path/ip-{}-iscsi-{}-lun-{}",
        portal.with_default_port(),
        entry.target,
        entry.lun
    ))
}

/// Look up the WWID of `device` with `scsi_id`.
///
/// Returns `None` when the device node is absent or `scsi_id` reports
/// nothing usable; the caller then asks the operator.
pub fn resolve_wwid(runner: &dyn CommandRunner, device: &Path) -> Result<Option<Wwid>> {
    if !runner.is_dry_run() && !device.exists() {
        debug!(device = %device.display(), "Device node not present");
        return Ok(None);
    }

    let device = device.to_string_lossy();
    let output = runner.run(SCSI_ID, &["-g", "-u", "-d", &device])?;
    if !output.success {
        debug!(%device, stderr = %output.stderr.trim(), "scsi_id failed");
        return Ok(None);
    }

    let wwid = output
        .stdout
        .lines()
        .next()
        .and_then(|line| Wwid::parse(line).ok());
    debug!(%device, ?wwid, "Resolved WWID");
    Ok(wwid)
}
