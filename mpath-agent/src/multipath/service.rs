//! multipathd service control and status display.

use std::fmt::{self, Display};

use tracing::{debug, info, instrument, warn};

use super::error::Result;
use crate::exec::{CommandRunner, check_command_result};

/// Default systemd unit for the multipath daemon.
pub const DEFAULT_SERVICE: &str = "multipathd";

/// Snapshot of the daemon and the current multipath topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub unit: String,
    /// `systemctl status` exited zero
    pub active: bool,
    /// Output of `systemctl status`
    pub unit_status: String,
    /// Output of `multipath -ll`
    pub topology: String,
}

impl Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.active { "active" } else { "NOT active" };
        writeln!(f, "== {} ({}) ==", self.unit, state)?;
        writeln!(f, "{}", self.unit_status.trim_end())?;
        writeln!(f, "== multipath -ll ==")?;
        if self.topology.trim().is_empty() {
            writeln!(f, "(no multipath devices)")
        } else {
            writeln!(f, "{}", self.topology.trim_end())
        }
    }
}

/// Controls the multipath daemon through systemd.
pub struct MultipathService {
    unit: String,
}

impl Default for MultipathService {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE)
    }
}

impl MultipathService {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Restart the daemon so it rereads its configuration.
    #[instrument(skip(self, runner), fields(unit = %self.unit))]
    pub fn restart(&self, runner: &dyn CommandRunner) -> Result<()> {
        debug!("Restarting multipath service");

        let output = runner.run("systemctl", &["restart", &self.unit])?;
        if let Err(e) = check_command_result(&output, &format!("systemctl restart {}", self.unit)) {
            warn!(error = %e, "Service restart failed");
            return Err(e.into());
        }

        info!("Restarted {}", self.unit);
        Ok(())
    }

    /// Ask multipathd to reload its device maps.
    pub fn reload_maps(&self, runner: &dyn CommandRunner) -> Result<()> {
        let output = runner.run("multipath", &["-r"])?;
        check_command_result(&output, "multipath -r")?;
        debug!("Reloaded multipath maps");
        Ok(())
    }

    /// Collect unit status and topology for display.
    ///
    /// An inactive unit is reported in the status, not as an error.
    pub fn status(&self, runner: &dyn CommandRunner) -> Result<ServiceStatus> {
        let unit = runner.run("systemctl", &["status", &self.unit, "--no-pager"])?;
        if !unit.success {
            warn!(unit = %self.unit, code = ?unit.code, "Service is not active");
        }

        let topology = runner.run("multipath", &["-ll"])?;
        check_command_result(&topology, "multipath -ll")?;

        let unit_status = if unit.stdout.trim().is_empty() {
            unit.stderr
        } else {
            unit.stdout
        };

        Ok(ServiceStatus {
            unit: self.unit.clone(),
            active: unit.success,
            unit_status,
            topology: topology.stdout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::exec::testing::ScriptedRunner;
    use crate::multipath::MultipathError;

    #[test]
    fn test_restart_invokes_systemctl() {
        let runner = ScriptedRunner::new();
        MultipathService::default().restart(&runner).unwrap();
        assert_eq!(runner.calls(), vec!["systemctl restart multipathd"]);
    }

    #[test]
    fn test_restart_failure_is_error() {
        let runner = ScriptedRunner::new();
        runner.respond("systemctl restart", CommandOutput::failed(5, "Unit not found."));
        let err = MultipathService::new("multipath-tools").restart(&runner).unwrap_err();
        assert!(matches!(err, MultipathError::CommandFailed(_)));
        assert!(err.to_string().contains("Unit not found."));
    }

    #[test]
    fn test_status_inactive_unit_is_reported() {
        let runner = ScriptedRunner::new();
        runner.respond(
            "systemctl status",
            CommandOutput {
                success: false,
                code: Some(3),
                stdout: "multipathd.service - inactive (dead)\n".to_string(),
                stderr: String::new(),
            },
        );
        runner.respond("multipath -ll", CommandOutput::ok(""));

        let status = MultipathService::default().status(&runner).unwrap();
        assert!(!status.active);
        assert!(status.unit_status.contains("inactive"));

        let shown = status.to_string();
        assert!(shown.contains("NOT active"));
        assert!(shown.contains("(no multipath devices)"));
        assert_eq!(
            runner.calls(),
            vec!["systemctl status multipathd --no-pager", "multipath -ll"]
        );
    }

    #[test]
    fn test_status_shows_topology() {
        let runner = ScriptedRunner::new();
        runner.respond(
            "multipath -ll",
            CommandOutput::ok("lun0 (3600a098) dm-2 NETAPP,LUN\nsize=10G\n"),
        );
        let status = MultipathService::default().status(&runner).unwrap();
        assert!(status.active);
        assert!(status.to_string().contains("lun0 (3600a098) dm-2"));
    }
}
