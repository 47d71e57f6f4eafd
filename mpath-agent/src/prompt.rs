//! Interactive operator dialogs.
//!
//! [`Prompter`] is the UI seam: the binary drives it from the terminal,
//! tests drive it from scripted input. The `collect_*` helpers build
//! validated values on top of it and re-ask until the input parses.

use std::fmt::Display;
use std::io::{self, BufRead, Write};

use thiserror::Error;
use tracing::debug;

use crate::iscsi::{Iqn, Portal, StorageEntry, StorageId};
use crate::multipath::{Alias, MultipathEntry, Wwid};

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("input aborted")]
    Aborted,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PromptError>;

/// Menu-and-dialog interface to the operator.
pub trait Prompter {
    /// Show `items` and return the index chosen.
    fn menu(&mut self, title: &str, items: &[&str]) -> Result<usize>;

    /// Ask for a line of text. Empty input selects `default` when given.
    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String>;

    /// Yes/no question.
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool>;

    /// Show informational text.
    fn message(&mut self, text: &str) -> Result<()>;
}

/// Line-based prompter over any reader/writer pair.
pub struct TerminalPrompter<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(PromptError::Aborted);
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> Prompter for TerminalPrompter<R, W> {
    fn menu(&mut self, title: &str, items: &[&str]) -> Result<usize> {
        loop {
            writeln!(self.writer, "\n{}", title)?;
            for (idx, item) in items.iter().enumerate() {
                writeln!(self.writer, "  {}) {}", idx + 1, item)?;
            }
            write!(self.writer, "Choice [1-{}]: ", items.len())?;
            self.writer.flush()?;

            let answer = self.read_line()?;
            match answer.parse::<usize>() {
                Ok(n) if (1..=items.len()).contains(&n) => return Ok(n - 1),
                _ => writeln!(self.writer, "Please enter a number between 1 and {}.", items.len())?,
            }
        }
    }

    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String> {
        loop {
            match default {
                Some(d) => write!(self.writer, "{} [{}]: ", prompt, d)?,
                None => write!(self.writer, "{}: ", prompt)?,
            }
            self.writer.flush()?;

            let answer = self.read_line()?;
            match (answer.is_empty(), default) {
                (false, _) => return Ok(answer),
                (true, Some(d)) => return Ok(d.to_string()),
                (true, None) => writeln!(self.writer, "A value is required.")?,
            }
        }
    }

    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        let hint = if default { "Y/n" } else { "y/N" };
        loop {
            write!(self.writer, "{} [{}]: ", question, hint)?;
            self.writer.flush()?;

            match self.read_line()?.to_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => writeln!(self.writer, "Please answer y or n.")?,
            }
        }
    }

    fn message(&mut self, text: &str) -> Result<()> {
        writeln!(self.writer, "{}", text)?;
        self.writer.flush()?;
        Ok(())
    }
}

// ============================================================================
// Collectors
// ============================================================================

/// Ask until `parse` accepts the answer.
fn ask_valid<T, E: Display>(
    prompter: &mut dyn Prompter,
    prompt: &str,
    default: Option<&str>,
    parse: impl Fn(&str) -> std::result::Result<T, E>,
) -> Result<T> {
    loop {
        let answer = prompter.input(prompt, default)?;
        match parse(&answer) {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(error = %e, "Rejected input");
                prompter.message(&format!("Invalid value: {}", e))?;
            }
        }
    }
}

/// Upper bound for the number of entries collected in one dialog.
pub const MAX_ENTRIES: usize = 256;

fn ask_count(prompter: &mut dyn Prompter, prompt: &str) -> Result<usize> {
    ask_valid(prompter, prompt, Some("1"), |s| match s.parse::<usize>() {
        Ok(n) if (1..=MAX_ENTRIES).contains(&n) => Ok(n),
        _ => Err(format!("'{}' is not a number between 1 and {}", s, MAX_ENTRIES)),
    })
}

/// iSCSI portal address.
pub fn collect_portal(prompter: &mut dyn Prompter) -> Result<Portal> {
    ask_valid(prompter, "iSCSI portal address (host[:port])", None, Portal::parse)
}

/// Storage entries to bind, offering `discovered` targets when known.
pub fn collect_storage_entries(
    prompter: &mut dyn Prompter,
    discovered: &[Iqn],
) -> Result<Vec<StorageEntry>> {
    let count = ask_count(prompter, "How many iSCSI storage entries")?;
    let mut entries = Vec::new();

    for n in 1..=count {
        prompter.message(&format!("-- Storage entry {} of {} --", n, count))?;

        let storage_id = ask_valid(prompter, "Storage id", None, StorageId::parse)?;

        let target = if discovered.is_empty() {
            ask_valid(prompter, "Target IQN", None, Iqn::parse)?
        } else {
            let mut items: Vec<&str> = discovered.iter().map(Iqn::as_str).collect();
            items.push("Enter manually");
            let choice = prompter.menu("Select target", &items)?;
            match discovered.get(choice) {
                Some(iqn) => iqn.clone(),
                None => ask_valid(prompter, "Target IQN", None, Iqn::parse)?,
            }
        };

        let lun = ask_valid(prompter, "LUN", Some("0"), |s| s.parse::<u32>())?;

        entries.push(StorageEntry::new(storage_id, target, lun));
    }

    Ok(entries)
}

/// Pre-filled values for one WWID/alias dialog.
#[derive(Debug, Clone, Default)]
pub struct EntrySuggestion {
    pub wwid: Option<Wwid>,
    pub alias: Option<String>,
}

/// WWID/alias pairs. With suggestions, one dialog per suggestion with
/// its values as defaults; without, the operator chooses how many.
pub fn collect_multipath_entries(
    prompter: &mut dyn Prompter,
    suggestions: &[EntrySuggestion],
) -> Result<Vec<MultipathEntry>> {
    let total = if suggestions.is_empty() {
        ask_count(prompter, "How many multipath aliases")?
    } else {
        suggestions.len()
    };

    let mut entries = Vec::new();
    for n in 0..total {
        let suggestion = suggestions.get(n);
        prompter.message(&format!("-- Multipath alias {} of {} --", n + 1, total))?;
        let wwid = ask_valid(
            prompter,
            "WWID",
            suggestion.and_then(|s| s.wwid.as_ref()).map(Wwid::as_str),
            Wwid::parse,
        )?;
        let alias = ask_valid(
            prompter,
            "Alias",
            suggestion.and_then(|s| s.alias.as_deref()),
            Alias::parse,
        )?;
        entries.push(MultipathEntry::new(wwid, alias));
    }

    Ok(entries)
}

/// A single WWID, e.g. for removal.
pub fn collect_wwid(prompter: &mut dyn Prompter, prompt: &str) -> Result<Wwid> {
    ask_valid(prompter, prompt, None, Wwid::parse)
}
