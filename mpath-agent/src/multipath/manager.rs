//! multipath.conf file I/O.
//!
//! Every mutation is read-edit-write: the current file is read as lines,
//! edited by the block editor, backed up, then replaced atomically.

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::Local;
use tempfile::NamedTempFile;
use tracing::{info, instrument, warn};

use super::config::{MultipathConf, MultipathEntry, Wwid};
use super::editor::{self, ConfiguredBlock};
use super::error::{MultipathError, Result};
use super::validator::check_balanced_braces;
use crate::backup::backup_config;

/// Result of a mutating operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditOutcome {
    /// Backup taken before the write, if the file existed
    pub backup: Option<PathBuf>,
    /// Blocks added or removed
    pub changed: usize,
}

/// Manager for the multipath configuration file.
pub struct MultipathConfigManager {
    config_path: PathBuf,
    backup_dir: PathBuf,
    dry_run: bool,
}

impl MultipathConfigManager {
    /// Backups go next to the config file unless `with_backup_dir` is used.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        let config_path = config_path.into();
        let backup_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        Self {
            config_path,
            backup_dir,
            dry_run: false,
        }
    }

    pub fn with_backup_dir(mut self, backup_dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = backup_dir.into();
        self
    }

    /// Print the resulting file instead of backing up and writing it.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Read the config as lines. A missing file reads as empty.
    pub fn read_lines(&self) -> Result<Vec<String>> {
        if !self.config_path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.config_path)?;
        Ok(content.lines().map(str::to_string).collect())
    }

    /// Line terminator of the current file; LF for a new file.
    fn line_ending(&self) -> Result<&'static str> {
        if !self.config_path.exists() {
            return Ok("\n");
        }
        let content = fs::read_to_string(&self.config_path)?;
        match content.find('\n') {
            Some(i) if content[..i].ends_with('\r') => Ok("\r\n"),
            _ => Ok("\n"),
        }
    }

    /// Validate, back up, and atomically replace the config file.
    ///
    /// Lines are joined with the existing file's terminator, so a CRLF
    /// file stays CRLF.
    pub fn write_lines(&self, lines: &[String]) -> Result<EditOutcome> {
        check_balanced_braces(lines)?;

        let eol = self.line_ending()?;
        let mut content = lines.join(eol);
        content.push_str(eol);

        if self.dry_run {
            info!(path = %self.config_path.display(), "[dry-run] not writing config");
            println!("--- {} (dry-run) ---", self.config_path.display());
            print!("{}", content);
            println!("--- end ---");
            return Ok(EditOutcome::default());
        }

        let backup = backup_config(&self.config_path, &self.backup_dir, Local::now())?;

        // Write atomically via a unique temp file in the same directory.
        let config_dir = self
            .config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        let permissions = match fs::metadata(&self.config_path) {
            Ok(meta) => meta.permissions(),
            Err(_) => fs::Permissions::from_mode(0o644),
        };

        let mut temp_file = NamedTempFile::new_in(config_dir)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.as_file().set_permissions(permissions)?;
        temp_file
            .persist(&self.config_path)
            .map_err(|e| MultipathError::Io(e.error))?;

        info!(path = %self.config_path.display(), "multipath config written");
        Ok(EditOutcome { backup, changed: 0 })
    }

    /// Replace the whole file with a generated config.
    #[instrument(skip(self, conf))]
    pub fn write_generated(&self, conf: &MultipathConf) -> Result<EditOutcome> {
        let lines: Vec<String> = conf.render().lines().map(str::to_string).collect();
        let outcome = self.write_lines(&lines)?;
        Ok(EditOutcome {
            changed: conf.multipaths.len(),
            ..outcome
        })
    }

    /// Insert a block per entry before the file's final closing brace.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub fn add_entries(&self, entries: &[MultipathEntry]) -> Result<EditOutcome> {
        if entries.is_empty() {
            return Ok(EditOutcome::default());
        }

        let lines = self.read_lines()?;
        let existing = editor::list_blocks(&lines);
        for entry in entries {
            if existing.iter().any(|b| b.wwid == entry.wwid.as_str()) {
                warn!(wwid = %entry.wwid, "WWID already has a multipath block; adding another");
            }
            if existing
                .iter()
                .any(|b| b.alias.as_deref() == Some(entry.alias.as_str()))
            {
                warn!(alias = %entry.alias, "Alias is already in use");
            }
        }

        let edited = editor::add_blocks(&lines, entries);
        let outcome = self.write_lines(&edited)?;

        info!("Added {} multipath block(s)", entries.len());
        Ok(EditOutcome {
            changed: entries.len(),
            ..outcome
        })
    }

    /// Remove every block mentioning `wwid`. Nothing is written when no
    /// block matches.
    #[instrument(skip(self))]
    pub fn remove_wwid(&self, wwid: &Wwid) -> Result<EditOutcome> {
        let lines = self.read_lines()?;
        let (edited, removed) = editor::remove_blocks(&lines, wwid);

        if removed == 0 {
            info!(wwid = %wwid, "No multipath block matches; config left unchanged");
            return Ok(EditOutcome::default());
        }

        let outcome = self.write_lines(&edited)?;
        info!(wwid = %wwid, "Removed {} multipath block(s)", removed);
        Ok(EditOutcome {
            changed: removed,
            ..outcome
        })
    }

    /// Blocks currently configured.
    pub fn list_entries(&self) -> Result<Vec<ConfiguredBlock>> {
        Ok(editor::list_blocks(&self.read_lines()?))
    }
}
