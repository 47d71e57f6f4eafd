//! Timestamped backups of the multipath configuration.
//!
//! A backup is taken before every mutation and verified by SHA-256 so a
//! truncated copy is never mistaken for a good one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Timestamp format used in backup file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

const BACKUP_SUFFIX: &str = ".bak";

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("backup {0} does not match the original")]
    DigestMismatch(String),

    #[error("invalid config path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;

fn file_digest(path: &Path) -> Result<String> {
    let data = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| BackupError::InvalidPath(path.display().to_string()))
}

/// Copy `path` to `<backup_dir>/<name>.<timestamp>.bak`.
///
/// Returns `None` when `path` does not exist. A second backup within the
/// same second gets a `-N` suffix instead of overwriting the first.
#[instrument(skip(now))]
pub fn backup_config<Tz: TimeZone>(
    path: &Path,
    backup_dir: &Path,
    now: DateTime<Tz>,
) -> Result<Option<PathBuf>>
where
    Tz::Offset: std::fmt::Display,
{
    if !path.exists() {
        debug!(path = %path.display(), "Nothing to back up");
        return Ok(None);
    }

    let name = file_name(path)?;
    let stamp = now.format(TIMESTAMP_FORMAT).to_string();
    fs::create_dir_all(backup_dir)?;

    let mut target = backup_dir.join(format!("{}.{}{}", name, stamp, BACKUP_SUFFIX));
    let mut n = 1;
    while target.exists() {
        target = backup_dir.join(format!("{}.{}-{}{}", name, stamp, n, BACKUP_SUFFIX));
        n += 1;
    }

    fs::copy(path, &target)?;

    if file_digest(path)? != file_digest(&target)? {
        return Err(BackupError::DigestMismatch(target.display().to_string()));
    }

    info!(backup = %target.display(), "Backed up configuration");
    Ok(Some(target))
}

/// Sort key for a backup file name: timestamp, then collision counter.
fn backup_key(stem: &str) -> Option<(String, u32)> {
    match stem.split_at_checked(15) {
        Some((stamp, "")) => Some((stamp.to_string(), 0)),
        Some((stamp, rest)) => {
            let n = rest.strip_prefix('-')?.parse().ok()?;
            Some((stamp.to_string(), n))
        }
        None => None,
    }
}

/// Backups of `path` found in `backup_dir`, oldest first.
pub fn list_backups(path: &Path, backup_dir: &Path) -> Result<Vec<PathBuf>> {
    let prefix = format!("{}.", file_name(path)?);

    let entries = match fs::read_dir(backup_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut backups = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let key = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(BACKUP_SUFFIX))
            .and_then(backup_key);
        if let Some(key) = key {
            backups.push((key, entry.path()));
        }
    }

    backups.sort();
    Ok(backups.into_iter().map(|(_, path)| path).collect())
}
