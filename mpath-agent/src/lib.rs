//! iSCSI storage registration and multipath alias management
//!
//! This library registers iSCSI LUNs with the host's storage manager and
//! maintains the device-mapper multipath configuration that gives those
//! LUNs stable names.
//!
//! The library is split into several modules:
//! - `multipath`: multipath.conf types, block editor, file manager, service control
//! - `iscsi`: portal/target identifiers, storage binding, discovery
//! - `prereq`: detection and installation of required packages
//! - `backup`: timestamped config backups
//! - `prompt`: operator dialogs
//! - `plan`: non-interactive JSON input
//! - `workflow`: the install/add/remove/status flows
//! - `exec`: command execution seam

pub mod backup;
pub mod exec;
pub mod iscsi;
pub mod multipath;
pub mod plan;
pub mod prereq;
pub mod prompt;
pub mod workflow;

pub use exec::{CommandOutput, CommandRunner, DryRunRunner, SystemRunner};
pub use multipath::{MultipathConfigManager, MultipathError, MultipathService};
pub use workflow::{Workflow, WorkflowError};
