//! multipath.conf types.
//!
//! This module provides validated identifiers for multipath blocks and a
//! `ToConf` trait for rendering configuration sections in the
//! device-mapper multipath syntax.

use std::fmt::{self, Display, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{MultipathError, Result};

// ============================================================================
// ToConf trait for serialization
// ============================================================================

/// Trait for types that can be rendered as multipath.conf text.
pub trait ToConf {
    /// Render with the given indentation level.
    fn to_conf(&self, indent: usize) -> String;
}

/// Helper to create indentation string
pub(crate) fn indent(level: usize) -> String {
    "    ".repeat(level)
}

fn conf_quote(s: &str) -> String {
    format!("\"{}\"", s)
}

/// Check that `value` is non-empty, bounded, and built only from ASCII
/// alphanumerics plus `extra`.
fn validate_token(value: &str, max_len: usize, extra: &[char]) -> std::result::Result<(), String> {
    if value.is_empty() {
        return Err("cannot be empty".to_string());
    }
    if value.len() > max_len {
        return Err(format!(
            "'{}' exceeds maximum length of {} characters",
            value, max_len
        ));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || extra.contains(c)))
    {
        return Err(format!("'{}' contains forbidden character '{}'", value, c));
    }
    Ok(())
}

// ============================================================================
// WWID
// ============================================================================

/// World Wide Identifier of a LUN, as reported by `scsi_id`.
///
/// Example: `36001405f2a3c4e5b6d7e8f9a0b1c2d3e`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Wwid(String);

impl Wwid {
    const MAX_LEN: usize = 128;

    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        validate_token(s, Self::MAX_LEN, &['-', '_', '.', ':'])
            .map_err(MultipathError::InvalidWwid)?;
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Wwid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Wwid {
    type Err = MultipathError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Wwid {
    type Error = MultipathError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Wwid> for String {
    fn from(wwid: Wwid) -> Self {
        wwid.0
    }
}

impl AsRef<str> for Wwid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Alias
// ============================================================================

/// Stable device-mapper name for a multipathed LUN (`/dev/mapper/<alias>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Alias(String);

impl Alias {
    const MAX_LEN: usize = 64;

    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        validate_token(s, Self::MAX_LEN, &['-', '_', '.']).map_err(MultipathError::InvalidAlias)?;
        if s.starts_with('-') {
            return Err(MultipathError::InvalidAlias(format!(
                "'{}' must not start with '-'",
                s
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Alias {
    type Err = MultipathError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Alias {
    type Error = MultipathError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Alias> for String {
    fn from(alias: Alias) -> Self {
        alias.0
    }
}

// ============================================================================
// multipath block
// ============================================================================

/// One `multipath { wwid ...; alias ...; }` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipathEntry {
    pub wwid: Wwid,
    pub alias: Alias,
}

impl MultipathEntry {
    pub fn new(wwid: Wwid, alias: Alias) -> Self {
        Self { wwid, alias }
    }
}

impl ToConf for MultipathEntry {
    fn to_conf(&self, level: usize) -> String {
        let mut s = String::new();
        let ind = indent(level);
        let inner = indent(level + 1);
        let _ = writeln!(s, "{}multipath {{", ind);
        let _ = writeln!(s, "{}wwid {}", inner, conf_quote(self.wwid.as_str()));
        let _ = writeln!(s, "{}alias {}", inner, conf_quote(self.alias.as_str()));
        let _ = writeln!(s, "{}}}", ind);
        s
    }
}

// ============================================================================
// Sections of a generated file
// ============================================================================

/// The `defaults` section.
#[derive(Debug, Clone)]
pub struct Defaults {
    pub user_friendly_names: bool,
    pub find_multipaths: bool,
    pub polling_interval: u32,
    pub path_selector: String,
    pub path_grouping_policy: String,
    pub failback: String,
    pub no_path_retry: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            user_friendly_names: true,
            find_multipaths: false,
            polling_interval: 5,
            path_selector: "round-robin 0".to_string(),
            path_grouping_policy: "multibus".to_string(),
            failback: "immediate".to_string(),
            no_path_retry: "queue".to_string(),
        }
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

impl ToConf for Defaults {
    fn to_conf(&self, level: usize) -> String {
        let mut s = String::new();
        let ind = indent(level);
        let _ = writeln!(s, "{}user_friendly_names {}", ind, yes_no(self.user_friendly_names));
        let _ = writeln!(s, "{}find_multipaths {}", ind, yes_no(self.find_multipaths));
        let _ = writeln!(s, "{}polling_interval {}", ind, self.polling_interval);
        let _ = writeln!(s, "{}path_selector {}", ind, conf_quote(&self.path_selector));
        let _ = writeln!(s, "{}path_grouping_policy {}", ind, self.path_grouping_policy);
        let _ = writeln!(s, "{}failback {}", ind, self.failback);
        let _ = writeln!(s, "{}no_path_retry {}", ind, self.no_path_retry);
        s
    }
}

/// The `blacklist` section: local devices that must never be multipathed.
#[derive(Debug, Clone)]
pub struct Blacklist {
    pub devnodes: Vec<String>,
}

impl Default for Blacklist {
    fn default() -> Self {
        Self {
            devnodes: vec![
                "^(ram|raw|loop|fd|md|dm-|sr|scd|st|zd)[0-9]*".to_string(),
                "^hd[a-z]".to_string(),
                "^cciss!c[0-9]d[0-9]*".to_string(),
            ],
        }
    }
}

impl ToConf for Blacklist {
    fn to_conf(&self, level: usize) -> String {
        let mut s = String::new();
        let ind = indent(level);
        for devnode in &self.devnodes {
            let _ = writeln!(s, "{}devnode {}", ind, conf_quote(devnode));
        }
        s
    }
}

/// A `device` stanza inside the `devices` section.
#[derive(Debug, Clone)]
pub struct Device {
    pub vendor: String,
    pub product: String,
    pub path_checker: String,
    pub hardware_handler: Option<String>,
}

impl Default for Device {
    fn default() -> Self {
        Self {
            vendor: ".*".to_string(),
            product: ".*".to_string(),
            path_checker: "tur".to_string(),
            hardware_handler: None,
        }
    }
}

impl ToConf for Device {
    fn to_conf(&self, level: usize) -> String {
        let mut s = String::new();
        let ind = indent(level);
        let inner = indent(level + 1);
        let _ = writeln!(s, "{}device {{", ind);
        let _ = writeln!(s, "{}vendor {}", inner, conf_quote(&self.vendor));
        let _ = writeln!(s, "{}product {}", inner, conf_quote(&self.product));
        let _ = writeln!(s, "{}path_checker {}", inner, self.path_checker);
        if let Some(ref handler) = self.hardware_handler {
            let _ = writeln!(s, "{}hardware_handler {}", inner, conf_quote(handler));
        }
        let _ = writeln!(s, "{}}}", ind);
        s
    }
}

// ============================================================================
// Top-level file
// ============================================================================

/// Header written at the top of a generated file.
pub const GENERATED_HEADER: &str =
    "# Generated by pve-mpath. Manage aliases with `pve-mpath add` and `pve-mpath remove`.";

/// A complete multipath.conf, as written by the install flow.
///
/// The `multipaths` section is always rendered last so that later
/// insertions before the file's final closing brace land inside it.
#[derive(Debug, Clone, Default)]
pub struct MultipathConf {
    pub defaults: Defaults,
    pub blacklist: Blacklist,
    pub devices: Vec<Device>,
    pub multipaths: Vec<MultipathEntry>,
}

impl MultipathConf {
    /// A config with the stock sections and the given aliases.
    pub fn new(multipaths: Vec<MultipathEntry>) -> Self {
        Self {
            devices: vec![Device::default()],
            multipaths,
            ..Default::default()
        }
    }

    pub fn render(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "{}", GENERATED_HEADER);
        let _ = writeln!(s, "defaults {{");
        s.push_str(&self.defaults.to_conf(1));
        let _ = writeln!(s, "}}\n");

        let _ = writeln!(s, "blacklist {{");
        s.push_str(&self.blacklist.to_conf(1));
        let _ = writeln!(s, "}}\n");

        let _ = writeln!(s, "devices {{");
        for device in &self.devices {
            s.push_str(&device.to_conf(1));
        }
        let _ = writeln!(s, "}}\n");

        let _ = writeln!(s, "multipaths {{");
        for entry in &self.multipaths {
            s.push_str(&entry.to_conf(1));
        }
        let _ = writeln!(s, "}}");
        s
    }
}
