pub mod config;
pub mod editor;
pub mod error;
pub mod manager;
pub mod service;
pub mod validator;

pub use config::{Alias, MultipathConf, MultipathEntry, ToConf, Wwid};
pub use editor::ConfiguredBlock;
pub use error::{MultipathError, Result};
pub use manager::{EditOutcome, MultipathConfigManager};
pub use service::{MultipathService, ServiceStatus};
pub use validator::{ValidationError, check_balanced_braces, validate_multipaths_section};
