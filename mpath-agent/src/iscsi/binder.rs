use tracing::{debug, info, instrument, warn};

use super::error::{IscsiError, Result};
use super::types::{Portal, StorageEntry};
use crate::exec::{CommandRunner, check_command_result};

/// Registers iSCSI LUNs with the storage manager (`pvesm`).
pub struct StorageBinder {
    /// Content types advertised for the storage
    content: String,
}

impl Default for StorageBinder {
    fn default() -> Self {
        Self::new("none")
    }
}

impl StorageBinder {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Add one iSCSI storage definition for `entry`.
    #[instrument(skip(self, runner), fields(storage = %entry.storage_id, lun = entry.lun))]
    pub fn bind(&self, runner: &dyn CommandRunner, portal: &Portal, entry: &StorageEntry) -> Result<()> {
        let portal = portal.to_string();
        debug!(%portal, target = %entry.target, "Adding iSCSI storage");

        let output = runner.run(
            "pvesm",
            &[
                "add",
                "iscsi",
                entry.storage_id.as_str(),
                "--portal",
                &portal,
                "--target",
                entry.target.as_str(),
                "--content",
                &self.content,
            ],
        )?;

        if !output.success && output.stderr.contains("already defined") {
            warn!("Storage is already defined");
            return Err(IscsiError::StorageExists(entry.storage_id.to_string()));
        }
        check_command_result(&output, &format!("pvesm add iscsi {}", entry.storage_id))?;

        info!(target = %entry.target, "Bound storage {}", entry.storage_id);
        Ok(())
    }
}
