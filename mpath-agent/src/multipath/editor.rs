//! Line-oriented editing of `multipath { ... }` blocks.
//!
//! The editor never re-renders the file: lines outside the blocks it
//! inserts or drops are passed through verbatim and in order, so the
//! `defaults`, `blacklist` and `devices` sections and any operator
//! comments survive every edit.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use super::config::{MultipathEntry, ToConf, Wwid};

static WWID_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*wwid\s+"?([^"\s]+)"?"#).expect("valid wwid regex"));
static ALIAS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*alias\s+"?([^"\s]+)"?"#).expect("valid alias regex"));

/// A `multipath` block found in an existing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredBlock {
    pub wwid: String,
    pub alias: Option<String>,
    /// Zero-based line index of the `multipath {` line
    pub line: usize,
}

/// Net brace depth change of one line.
///
/// Braces inside double quotes and anything after an unquoted `#` are
/// ignored.
pub(crate) fn brace_delta(line: &str) -> i32 {
    let mut delta = 0;
    let mut in_quote = false;
    for c in line.chars() {
        match c {
            '"' => in_quote = !in_quote,
            '#' if !in_quote => break,
            '{' if !in_quote => delta += 1,
            '}' if !in_quote => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// True for `multipath {` (but not `multipaths {`).
fn is_block_start(line: &str) -> bool {
    line.trim_start()
        .strip_prefix("multipath")
        .is_some_and(|rest| rest.trim_start().starts_with('{'))
}

/// Index of the line that closes the block opened at `start`.
fn block_end(lines: &[String], start: usize) -> Option<usize> {
    let mut depth = 0;
    for (offset, line) in lines[start..].iter().enumerate() {
        depth += brace_delta(line);
        if depth <= 0 {
            return Some(start + offset);
        }
    }
    None
}

/// Index of the final closing brace of the file.
fn final_closing_brace(lines: &[String]) -> Option<usize> {
    lines
        .iter()
        .rposition(|line| line.trim_start().starts_with('}'))
}

/// Walk back from the closing brace at `close` to the line that opened it.
fn opening_line(lines: &[String], close: usize) -> Option<usize> {
    let mut depth = 0;
    for j in (0..=close).rev() {
        depth += brace_delta(&lines[j]);
        if depth >= 0 && j != close {
            return Some(j);
        }
    }
    None
}

fn render_lines(entries: &[MultipathEntry], level: usize) -> Vec<String> {
    entries
        .iter()
        .flat_map(|entry| {
            entry
                .to_conf(level)
                .lines()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Insert one block per entry immediately before the file's final
/// closing brace, in input order.
///
/// Entries are not de-duplicated. A file with no closing brace at all
/// gets a new `multipaths` section appended instead.
pub fn add_blocks(lines: &[String], entries: &[MultipathEntry]) -> Vec<String> {
    if entries.is_empty() {
        return lines.to_vec();
    }

    let Some(close) = final_closing_brace(lines) else {
        debug!("No closing brace found, appending a multipaths section");
        let mut out = lines.to_vec();
        if out.last().is_some_and(|l| !l.trim().is_empty()) {
            out.push(String::new());
        }
        out.push("multipaths {".to_string());
        out.extend(render_lines(entries, 1));
        out.push("}".to_string());
        return out;
    };

    let opener = opening_line(lines, close).map(|j| lines[j].trim_start());
    if !opener.is_some_and(|l| l.starts_with("multipaths")) {
        warn!(
            line = close + 1,
            "Final closing brace does not close a multipaths section; inserting there anyway"
        );
    }

    let mut out = Vec::with_capacity(lines.len() + entries.len() * 4);
    out.extend_from_slice(&lines[..close]);
    out.extend(render_lines(entries, 1));
    out.extend_from_slice(&lines[close..]);
    out
}

/// Drop every `multipath` block whose text contains `wwid`.
///
/// Returns the edited lines and the number of blocks removed. A WWID
/// with no matching block leaves the lines unchanged. The match is on
/// substrings, so a short WWID such as `3600a098` also drops a
/// `3600a0980aaa` block; callers should check the count.
pub fn remove_blocks(lines: &[String], wwid: &Wwid) -> (Vec<String>, usize) {
    let needle = wwid.as_str();
    let mut out = Vec::with_capacity(lines.len());
    let mut removed = 0;
    let mut i = 0;

    while i < lines.len() {
        if is_block_start(&lines[i]) {
            let Some(end) = block_end(lines, i) else {
                warn!(line = i + 1, "Unterminated multipath block left untouched");
                out.extend_from_slice(&lines[i..]);
                break;
            };

            let block = &lines[i..=end];
            if block.iter().any(|line| line.contains(needle)) {
                debug!(wwid = %needle, start = i + 1, end = end + 1, "Removing multipath block");
                removed += 1;
            } else {
                out.extend_from_slice(block);
            }
            i = end + 1;
            continue;
        }

        out.push(lines[i].clone());
        i += 1;
    }

    (out, removed)
}

/// Every `multipath` block that declares a wwid, in file order.
pub fn list_blocks(lines: &[String]) -> Vec<ConfiguredBlock> {
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if !is_block_start(&lines[i]) {
            i += 1;
            continue;
        }
        let end = block_end(lines, i).unwrap_or(lines.len() - 1);

        // A single-line block carries both keys on the opening line.
        let mut wwid = None;
        let mut alias = None;
        for line in &lines[i..=end] {
            for part in line.split(['{', '}', ';']) {
                if let Some(caps) = WWID_LINE.captures(part) {
                    wwid.get_or_insert_with(|| caps[1].to_string());
                }
                if let Some(caps) = ALIAS_LINE.captures(part) {
                    alias.get_or_insert_with(|| caps[1].to_string());
                }
            }
        }

        match wwid {
            Some(wwid) => blocks.push(ConfiguredBlock {
                wwid,
                alias,
                line: i,
            }),
            None => debug!(line = i + 1, "Skipping multipath block without wwid"),
        }
        i = end + 1;
    }

    blocks
}
