//! Non-interactive input for the install and add flows.
//!
//! A plan is a JSON document listing the portal, the storage entries to
//! bind and the WWID/alias pairs to configure. Values are validated while
//! deserializing, so a loaded plan only holds well-formed identifiers.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::iscsi::{Portal, StorageEntry};
use crate::multipath::MultipathEntry;

/// Operator answers supplied up front.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal: Option<Portal>,
    #[serde(default)]
    pub storages: Vec<StorageEntry>,
    #[serde(default)]
    pub multipaths: Vec<MultipathEntry>,
}

/// Error type for plan loading.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid plan: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load a plan from a JSON file.
pub async fn load_plan(path: impl AsRef<Path>) -> Result<Plan, PlanError> {
    let content = tokio::fs::read_to_string(path.as_ref()).await?;
    Ok(serde_json::from_str(&content)?)
}
