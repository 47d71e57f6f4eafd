//! Type-safe wrappers for iSCSI identifiers.
//!
//! This module provides newtypes for portals, IQNs, and storage ids,
//! validated once at the edge so every shell-out receives safe arguments.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{IscsiError, Result};

/// Default iSCSI port
pub const DEFAULT_PORT: u16 = 3260;

/// Validate an identifier against an allowlist to prevent command injection.
fn validate_identifier(value: &str, field_name: &str, extra: &[char], max_len: usize) -> Result<()> {
    if value.is_empty() {
        return Err(IscsiError::InvalidName(format!("{} cannot be empty", field_name)));
    }

    if value.len() > max_len {
        return Err(IscsiError::InvalidName(format!(
            "{} '{}' exceeds maximum length of {} characters",
            field_name, value, max_len
        )));
    }

    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || extra.contains(c)))
    {
        return Err(IscsiError::InvalidName(format!(
            "{} '{}' contains invalid character '{}'",
            field_name, value, c
        )));
    }

    Ok(())
}

// ============================================================================
// Portal
// ============================================================================

/// iSCSI portal: `host`, `host:port`, `[v6]` or `[v6]:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Portal {
    host: String,
    port: Option<u16>,
}

impl Portal {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IscsiError::InvalidPortal("portal cannot be empty".into()));
        }

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| IscsiError::InvalidPortal(format!("'{}' has no closing ']'", s)))?;
            match after {
                "" => (host, None),
                _ => {
                    let port = after.strip_prefix(':').ok_or_else(|| {
                        IscsiError::InvalidPortal(format!("'{}' has garbage after ']'", s))
                    })?;
                    (host, Some(port))
                }
            }
        } else if s.matches(':').count() == 1 {
            let (host, port) = s.split_once(':').unwrap_or((s, ""));
            (host, Some(port))
        } else {
            (s, None)
        };

        if host.is_empty()
            || !host
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '_'))
        {
            return Err(IscsiError::InvalidPortal(format!("invalid host in '{}'", s)));
        }

        let port = match port {
            Some(p) => match p.parse::<u16>() {
                Ok(port) if port > 0 => Some(port),
                _ => {
                    return Err(IscsiError::InvalidPortal(format!(
                        "invalid port '{}' in '{}'",
                        p, s
                    )));
                }
            },
            None => None,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    fn is_ipv6(&self) -> bool {
        self.host.contains(':')
    }

    /// Always `host:port`, as used in `/dev/disk/by-path` names.
    pub fn with_default_port(&self) -> String {
        if self.is_ipv6() {
            format!("[{}]:{}", self.host, self.port())
        } else {
            format!("{}:{}", self.host, self.port())
        }
    }
}

impl Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.port, self.is_ipv6()) {
            (Some(port), true) => write!(f, "[{}]:{}", self.host, port),
            (Some(port), false) => write!(f, "{}:{}", self.host, port),
            (None, _) => write!(f, "{}", self.host),
        }
    }
}

impl FromStr for Portal {
    type Err = IscsiError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Portal {
    type Error = IscsiError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Portal> for String {
    fn from(portal: Portal) -> Self {
        portal.to_string()
    }
}

// ============================================================================
// IQN (iSCSI Qualified Name)
// ============================================================================

/// iSCSI Qualified Name (IQN).
///
/// Format: `iqn.YYYY-MM.reverse.domain:identifier`
/// Example: `iqn.2005-10.org.freenas.ctl:pve-lun0`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Iqn(String);

impl Iqn {
    /// Parse an existing IQN string.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        validate_identifier(s, "IQN", &['.', '-', ':', '_'], 223)?;
        if !s.starts_with("iqn.") {
            return Err(IscsiError::InvalidName(format!(
                "IQN '{}' must start with 'iqn.'",
                s
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// The part after the last colon, if any.
    pub fn identifier(&self) -> Option<&str> {
        self.0.rsplit_once(':').map(|(_, id)| id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Iqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Iqn {
    type Err = IscsiError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Iqn {
    type Error = IscsiError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Iqn> for String {
    fn from(iqn: Iqn) -> Self {
        iqn.0
    }
}

// ============================================================================
// StorageId
// ============================================================================

/// Storage identifier in the host's storage manager.
///
/// Must start with a letter; letters, digits, `-`, `_` and `.` after that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageId(String);

impl StorageId {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        validate_identifier(s, "storage id", &['-', '_', '.'], 64)?;
        if !s.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(IscsiError::InvalidName(format!(
                "storage id '{}' must start with a letter",
                s
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StorageId {
    type Err = IscsiError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StorageId {
    type Error = IscsiError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<StorageId> for String {
    fn from(id: StorageId) -> Self {
        id.0
    }
}

// ============================================================================
// StorageEntry
// ============================================================================

/// One iSCSI LUN to register with the storage manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub storage_id: StorageId,
    pub target: Iqn,
    #[serde(default)]
    pub lun: u32,
}

impl StorageEntry {
    pub fn new(storage_id: StorageId, target: Iqn, lun: u32) -> Self {
        Self {
            storage_id,
            target,
            lun,
        }
    }
}
