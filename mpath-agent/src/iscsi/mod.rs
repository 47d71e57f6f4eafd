pub mod binder;
pub mod discovery;
pub mod error;
pub mod types;

pub use binder::StorageBinder;
pub use discovery::{by_path_device, discover_targets, resolve_wwid};
pub use error::{IscsiError, Result};
pub use types::{Iqn, Portal, StorageEntry, StorageId};
