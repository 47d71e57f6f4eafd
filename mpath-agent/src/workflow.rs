//! Operator flows: install, add, remove, status, list.
//!
//! Each flow is a straight sequence of steps. The first failing step
//! aborts the flow with its error; nothing is rolled back, but every
//! config mutation is preceded by a backup.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::backup::{self, BackupError};
use crate::exec::CommandRunner;
use crate::iscsi::{self, IscsiError, Portal, StorageBinder};
use crate::multipath::{
    ConfiguredBlock, EditOutcome, MultipathConf, MultipathConfigManager, MultipathError,
    MultipathService, ServiceStatus, Wwid, validate_multipaths_section,
};
use crate::plan::Plan;
use crate::prereq::{self, PrereqError};
use crate::prompt::{self, EntrySuggestion, PromptError, Prompter};

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Multipath(#[from] MultipathError),

    #[error(transparent)]
    Iscsi(#[from] IscsiError),

    #[error("prerequisites: {0}")]
    Prereq(#[from] PrereqError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error("{0} cancelled by operator")]
    Cancelled(String),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Main menu entries, in display order.
pub const MENU_ITEMS: &[&str] = &[
    "Install: bind iSCSI storage and generate multipath.conf",
    "Add multipath aliases",
    "Remove a multipath alias",
    "Show multipath status",
    "List configured aliases",
    "List config backups",
    "Quit",
];

/// Summary of a completed install flow.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub portal: Portal,
    /// Packages installed as prerequisites
    pub installed: Vec<&'static str>,
    /// Storages newly added to the storage manager
    pub bound: usize,
    /// Aliases written to the generated config
    pub aliases: usize,
    pub backup: Option<PathBuf>,
}

/// Drives the operator flows against the host.
pub struct Workflow<'a, P: Prompter> {
    runner: &'a dyn CommandRunner,
    prompter: P,
    manager: MultipathConfigManager,
    service: MultipathService,
    binder: StorageBinder,
    plan: Plan,
    assume_yes: bool,
    lookup: Box<dyn Fn(&str) -> bool + 'a>,
}

impl<'a, P: Prompter> Workflow<'a, P> {
    pub fn new(runner: &'a dyn CommandRunner, prompter: P, manager: MultipathConfigManager) -> Self {
        Self {
            runner,
            prompter,
            manager,
            service: MultipathService::default(),
            binder: StorageBinder::default(),
            plan: Plan::default(),
            assume_yes: false,
            lookup: Box::new(prereq::on_path),
        }
    }

    pub fn with_service(mut self, service: MultipathService) -> Self {
        self.service = service;
        self
    }

    pub fn with_binder(mut self, binder: StorageBinder) -> Self {
        self.binder = binder;
        self
    }

    /// Answers taken from the plan are not prompted for.
    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.plan = plan;
        self
    }

    /// Skip confirmation before replacing an existing config.
    pub fn with_assume_yes(mut self, assume_yes: bool) -> Self {
        self.assume_yes = assume_yes;
        self
    }

    /// Override how prerequisite binaries are looked up.
    pub fn with_lookup(mut self, lookup: impl Fn(&str) -> bool + 'a) -> Self {
        self.lookup = Box::new(lookup);
        self
    }

    pub fn prompter(&self) -> &P {
        &self.prompter
    }

    pub fn into_prompter(self) -> P {
        self.prompter
    }

    /// Show the main menu until the operator quits.
    ///
    /// A failed or cancelled flow is reported and the menu shown again.
    /// Losing the terminal ends the session.
    pub async fn run_menu(&mut self) -> Result<()> {
        loop {
            let result = match self.prompter.menu("pve-mpath: iSCSI multipath setup", MENU_ITEMS)? {
                0 => self.install().await.map(drop),
                1 => self.add().await.map(drop),
                2 => self.remove(None).map(drop),
                3 => self.status().map(drop),
                4 => self.list().map(drop),
                5 => self.backups().map(drop),
                _ => return Ok(()),
            };

            match result {
                Ok(()) => {}
                Err(WorkflowError::Prompt(PromptError::Aborted)) => {
                    return Err(PromptError::Aborted.into());
                }
                Err(WorkflowError::Cancelled(flow)) => {
                    info!(%flow, "Flow cancelled");
                    self.prompter.message(&format!("{} cancelled.", flow))?;
                }
                Err(e) => {
                    error!(error = %e, "Flow failed");
                    self.prompter.message(&format!("Error: {}", e))?;
                }
            }
        }
    }

    /// Full setup: prerequisites, storage binding, generated config.
    #[instrument(skip(self))]
    pub async fn install(&mut self) -> Result<InstallReport> {
        // Ask before touching the host at all.
        if self.manager.config_path().exists() && !self.assume_yes {
            let question = format!(
                "Replace {} with a generated config (a backup is kept)?",
                self.manager.config_path().display()
            );
            if !self.prompter.confirm(&question, false)? {
                return Err(WorkflowError::Cancelled("install".to_string()));
            }
        }

        let installed = prereq::ensure_installed(self.runner, &*self.lookup)?;
        if !installed.is_empty() {
            self.prompter
                .message(&format!("Installed: {}", installed.join(", ")))?;
        }

        let portal = match self.plan.portal.clone() {
            Some(portal) => portal,
            None => prompt::collect_portal(&mut self.prompter)?,
        };

        let storages = if self.plan.storages.is_empty() {
            let discovered = match iscsi::discover_targets(self.runner, &portal) {
                Ok(targets) => targets,
                Err(e) => {
                    warn!(error = %e, "Target discovery failed; targets must be entered manually");
                    Vec::new()
                }
            };
            prompt::collect_storage_entries(&mut self.prompter, &discovered)?
        } else {
            self.plan.storages.clone()
        };

        let mut bound = 0;
        for entry in &storages {
            match self.binder.bind(self.runner, &portal, entry) {
                Ok(()) => bound += 1,
                Err(IscsiError::StorageExists(id)) => {
                    self.prompter
                        .message(&format!("Storage '{}' already exists, skipping", id))?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let entries = if self.plan.multipaths.is_empty() {
            let mut suggestions = Vec::with_capacity(storages.len());
            for entry in &storages {
                let device = iscsi::by_path_device(&portal, entry);
                suggestions.push(EntrySuggestion {
                    wwid: iscsi::resolve_wwid(self.runner, &device)?,
                    alias: Some(entry.storage_id.to_string()),
                });
            }
            prompt::collect_multipath_entries(&mut self.prompter, &suggestions)?
        } else {
            self.plan.multipaths.clone()
        };

        let outcome = self
            .manager
            .write_generated(&MultipathConf::new(entries))?;
        self.report_backup(&outcome)?;
        self.apply()?;

        info!(%portal, bound, aliases = outcome.changed, "Install complete");
        Ok(InstallReport {
            portal,
            installed,
            bound,
            aliases: outcome.changed,
            backup: outcome.backup,
        })
    }

    /// Insert WWID/alias blocks into an existing config.
    #[instrument(skip(self))]
    pub async fn add(&mut self) -> Result<usize> {
        validate_multipaths_section(self.manager.config_path())
            .await
            .map_err(MultipathError::from)?;

        let entries = if self.plan.multipaths.is_empty() {
            prompt::collect_multipath_entries(&mut self.prompter, &[])?
        } else {
            self.plan.multipaths.clone()
        };

        let outcome = self.manager.add_entries(&entries)?;
        self.report_backup(&outcome)?;
        self.prompter
            .message(&format!("Added {} multipath alias(es).", outcome.changed))?;
        self.apply()?;
        Ok(outcome.changed)
    }

    /// Drop every block mentioning `wwid`, prompting for it when absent.
    #[instrument(skip(self))]
    pub fn remove(&mut self, wwid: Option<Wwid>) -> Result<usize> {
        let wwid = match wwid {
            Some(wwid) => wwid,
            None => prompt::collect_wwid(&mut self.prompter, "WWID to remove")?,
        };

        let outcome = self.manager.remove_wwid(&wwid)?;
        if outcome.changed > 1 {
            warn!(%wwid, removed = outcome.changed, "WWID matched more than one multipath block");
        }
        if outcome.changed == 0 {
            self.prompter.message(&format!(
                "No multipath block references WWID {}; nothing changed.",
                wwid
            ))?;
            return Ok(0);
        }

        self.report_backup(&outcome)?;
        self.prompter.message(&format!(
            "Removed {} multipath block(s) for WWID {}.",
            outcome.changed, wwid
        ))?;
        self.apply()?;
        Ok(outcome.changed)
    }

    /// Display service status and multipath topology.
    pub fn status(&mut self) -> Result<ServiceStatus> {
        let status = self.service.status(self.runner)?;
        self.prompter.message(&status.to_string())?;
        Ok(status)
    }

    /// Display the configured WWID/alias pairs.
    pub fn list(&mut self) -> Result<Vec<ConfiguredBlock>> {
        let blocks = self.manager.list_entries()?;
        if blocks.is_empty() {
            self.prompter.message(&format!(
                "No multipath aliases configured in {}.",
                self.manager.config_path().display()
            ))?;
        } else {
            let mut text = format!("{:<40} ALIAS", "WWID");
            for block in &blocks {
                text.push_str(&format!(
                    "\n{:<40} {}",
                    block.wwid,
                    block.alias.as_deref().unwrap_or("-")
                ));
            }
            self.prompter.message(&text)?;
        }
        Ok(blocks)
    }

    /// Display backups of the config, oldest first.
    pub fn backups(&mut self) -> Result<Vec<PathBuf>> {
        let backups = backup::list_backups(self.manager.config_path(), self.manager.backup_dir())?;
        if backups.is_empty() {
            self.prompter.message("No backups found.")?;
        } else {
            let text: Vec<String> = backups.iter().map(|p| p.display().to_string()).collect();
            self.prompter.message(&text.join("\n"))?;
        }
        Ok(backups)
    }

    fn report_backup(&mut self, outcome: &EditOutcome) -> Result<()> {
        if let Some(ref path) = outcome.backup {
            self.prompter
                .message(&format!("Previous config saved to {}", path.display()))?;
        }
        Ok(())
    }

    /// Restart the daemon, reload maps and show the result.
    fn apply(&mut self) -> Result<ServiceStatus> {
        self.service.restart(self.runner)?;
        if let Err(e) = self.service.reload_maps(self.runner) {
            warn!(error = %e, "Map reload failed after restart");
        }
        self.status()
    }
}
