//! Integration tests for pve-mpath
//!
//! These tests drive the operator flows end to end against a temporary
//! config file, with a recording command runner standing in for
//! `pvesm`, `iscsiadm`, `apt-get`, `systemctl` and `multipath`, and a
//! terminal prompter fed from a scripted input buffer.

use std::cell::{Cell, RefCell};
use std::fs;
use std::io::{self, Cursor};
use std::path::PathBuf;

use tempfile::TempDir;

use pve_mpath::exec::{CommandOutput, CommandRunner};
use pve_mpath::iscsi::{Iqn, Portal, StorageEntry, StorageId};
use pve_mpath::multipath::{Alias, MultipathConfigManager, MultipathEntry, Wwid};
use pve_mpath::plan::Plan;
use pve_mpath::prereq::PREREQUISITES;
use pve_mpath::prompt::TerminalPrompter;
use pve_mpath::workflow::{Workflow, WorkflowError};

type ScriptedPrompter = TerminalPrompter<Cursor<Vec<u8>>, Vec<u8>>;

/// Records commands; responds to prefixes from a fixed table.
#[derive(Default)]
struct RecordingRunner {
    calls: RefCell<Vec<String>>,
    responses: Vec<(&'static str, CommandOutput)>,
}

impl RecordingRunner {
    fn new() -> Self {
        Self::default()
    }

    fn with_response(mut self, prefix: &'static str, output: CommandOutput) -> Self {
        self.responses.push((prefix, output));
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn ran(&self, prefix: &str) -> bool {
        self.calls.borrow().iter().any(|c| c.starts_with(prefix))
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        let line = format!("{} {}", program, args.join(" "));
        self.calls.borrow_mut().push(line.clone());
        Ok(self
            .responses
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}

fn prompter(input: &str) -> ScriptedPrompter {
    TerminalPrompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
}

fn screen(prompter: ScriptedPrompter) -> String {
    String::from_utf8(prompter.into_writer()).unwrap()
}

fn entry(wwid: &str, alias: &str) -> MultipathEntry {
    MultipathEntry::new(Wwid::parse(wwid).unwrap(), Alias::parse(alias).unwrap())
}

struct Fixture {
    dir: TempDir,
    config: PathBuf,
}

impl Fixture {
    fn new(content: Option<&str>) -> Self {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("multipath.conf");
        if let Some(content) = content {
            fs::write(&config, content).unwrap();
        }
        Self { dir, config }
    }

    fn manager(&self) -> MultipathConfigManager {
        MultipathConfigManager::new(&self.config).with_backup_dir(self.dir.path().join("backups"))
    }

    fn content(&self) -> String {
        fs::read_to_string(&self.config).unwrap()
    }

    fn backups(&self) -> usize {
        match fs::read_dir(self.dir.path().join("backups")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

const EXISTING: &str = r#"# site defaults, do not touch
defaults {
    user_friendly_names yes
    find_multipaths no
}

blacklist {
    devnode "^sd[a]$"
}

devices {
    device {
        vendor "TrueNAS"
        product "iSCSI Disk"
        path_checker tur
    }
}

multipaths {
    multipath {
        wwid "36589cfc000000a1b2c3d4e5f60718293"
        alias "san-vm"
    }
}
"#;

// ============================================================================
// Add flow
// ============================================================================

#[tokio::test]
async fn test_add_flow_inserts_backs_up_and_restarts() {
    let fx = Fixture::new(Some(EXISTING));
    let runner = RecordingRunner::new();
    let input = "2\n36589cfc000000aaaa\nsan-a\n36589cfc000000bbbb\nsan-b\n";

    let mut workflow = Workflow::new(&runner, prompter(input), fx.manager());
    let added = workflow.add().await.unwrap();
    assert_eq!(added, 2);

    let content = fx.content();
    // untouched prefix, new blocks before the final brace, in order
    let prefix_end = EXISTING.rfind("}\n").unwrap();
    assert!(content.starts_with(&EXISTING[..prefix_end]));
    assert!(content.ends_with(
        "    multipath {\n        wwid \"36589cfc000000aaaa\"\n        alias \"san-a\"\n    }\n\
         \x20   multipath {\n        wwid \"36589cfc000000bbbb\"\n        alias \"san-b\"\n    }\n}\n"
    ));

    assert_eq!(fx.backups(), 1);
    assert_eq!(
        runner.calls(),
        vec![
            "systemctl restart multipathd",
            "multipath -r",
            "systemctl status multipathd --no-pager",
            "multipath -ll",
        ]
    );

    let out = screen(workflow.into_prompter());
    assert!(out.contains("Previous config saved to"));
    assert!(out.contains("Added 2 multipath alias(es)."));
}

#[tokio::test]
async fn test_add_flow_requires_multipaths_section() {
    let fx = Fixture::new(Some("defaults {\n    user_friendly_names yes\n}\n"));
    let runner = RecordingRunner::new();

    let mut workflow = Workflow::new(&runner, prompter(""), fx.manager());
    let err = workflow.add().await.unwrap_err();
    assert!(err.to_string().contains("no multipaths section"));
    assert!(runner.calls().is_empty());
    assert_eq!(fx.backups(), 0);
}

#[tokio::test]
async fn test_add_flow_from_plan_does_not_prompt() {
    let fx = Fixture::new(Some(EXISTING));
    let runner = RecordingRunner::new();
    let plan = Plan {
        multipaths: vec![entry("36589cfc000000cccc", "san-c")],
        ..Default::default()
    };

    let mut workflow = Workflow::new(&runner, prompter(""), fx.manager()).with_plan(plan);
    assert_eq!(workflow.add().await.unwrap(), 1);
    assert!(fx.content().contains("alias \"san-c\""));
}

#[tokio::test]
async fn test_restart_failure_aborts_after_write() {
    let fx = Fixture::new(Some(EXISTING));
    let runner = RecordingRunner::new().with_response(
        "systemctl restart",
        CommandOutput::failed(5, "Failed to restart multipathd.service: Unit not found."),
    );
    let plan = Plan {
        multipaths: vec![entry("36589cfc000000cccc", "san-c")],
        ..Default::default()
    };

    let mut workflow = Workflow::new(&runner, prompter(""), fx.manager()).with_plan(plan);
    let err = workflow.add().await.unwrap_err();
    assert!(matches!(err, WorkflowError::Multipath(_)));
    assert!(err.to_string().contains("Unit not found"));

    // no rollback: the edit and its backup stay in place
    assert!(fx.content().contains("san-c"));
    assert_eq!(fx.backups(), 1);
    assert!(!runner.ran("multipath -ll"));
}

// ============================================================================
// Remove flow
// ============================================================================

#[test]
fn test_remove_flow_drops_block() {
    let fx = Fixture::new(Some(EXISTING));
    let runner = RecordingRunner::new();

    let mut workflow = Workflow::new(&runner, prompter("36589cfc000000a1b2c3d4e5f60718293\n"), fx.manager());
    assert_eq!(workflow.remove(None).unwrap(), 1);

    let content = fx.content();
    assert!(!content.contains("san-vm"));
    assert!(content.contains("multipaths {\n}\n"));
    assert!(content.contains("vendor \"TrueNAS\""));
    assert!(runner.ran("systemctl restart multipathd"));
    assert_eq!(fx.backups(), 1);
}

#[test]
fn test_remove_unknown_wwid_is_noop() {
    let fx = Fixture::new(Some(EXISTING));
    let runner = RecordingRunner::new();

    let mut workflow = Workflow::new(&runner, prompter(""), fx.manager());
    let wwid = Wwid::parse("36589cfc0000dead").unwrap();
    assert_eq!(workflow.remove(Some(wwid.clone())).unwrap(), 0);
    assert_eq!(workflow.remove(Some(wwid)).unwrap(), 0);

    assert_eq!(fx.content(), EXISTING);
    assert_eq!(fx.backups(), 0);
    assert!(runner.calls().is_empty());
    assert!(screen(workflow.into_prompter()).contains("nothing changed"));
}

#[tokio::test]
async fn test_add_then_remove_round_trip() {
    let fx = Fixture::new(Some(EXISTING));
    let runner = RecordingRunner::new();
    let plan = Plan {
        multipaths: vec![entry("36589cfc000000eeee", "san-e")],
        ..Default::default()
    };

    let mut workflow = Workflow::new(&runner, prompter(""), fx.manager()).with_plan(plan);
    workflow.add().await.unwrap();
    workflow
        .remove(Some(Wwid::parse("36589cfc000000eeee").unwrap()))
        .unwrap();

    assert_eq!(fx.content(), EXISTING);
    assert_eq!(fx.backups(), 2);
}

// ============================================================================
// Install flow
// ============================================================================

#[tokio::test]
async fn test_install_flow_interactive() {
    let fx = Fixture::new(None);
    let runner = RecordingRunner::new().with_response(
        "iscsiadm -m discovery",
        CommandOutput::ok("10.0.0.5:3260,1 iqn.2005-10.org.freenas.ctl:pve\n"),
    );
    // portal, count, storage id, target menu choice, LUN, WWID, alias (default)
    let input = "10.0.0.5\n1\nsan-pve\n1\n0\n36589cfc000000ffff\n\n";

    let mut workflow =
        Workflow::new(&runner, prompter(input), fx.manager()).with_lookup(|_| true);
    let report = workflow.install().await.unwrap();

    assert_eq!(report.bound, 1);
    assert_eq!(report.aliases, 1);
    assert!(report.installed.is_empty());
    assert!(report.backup.is_none());

    let content = fx.content();
    assert!(content.starts_with("# Generated by pve-mpath."));
    assert!(content.contains("defaults {"));
    assert!(content.contains("blacklist {"));
    assert!(content.contains("devices {"));
    assert!(content.ends_with(
        "multipaths {\n    multipath {\n        wwid \"36589cfc000000ffff\"\n        alias \"san-pve\"\n    }\n}\n"
    ));

    let calls = runner.calls();
    assert_eq!(calls[0], "iscsiadm -m discovery -t sendtargets -p 10.0.0.5");
    assert_eq!(
        calls[1],
        "pvesm add iscsi san-pve --portal 10.0.0.5 --target iqn.2005-10.org.freenas.ctl:pve --content none"
    );
    assert!(runner.ran("systemctl restart multipathd"));
    assert!(!runner.ran("apt-get"));
}

#[tokio::test]
async fn test_install_flow_from_plan_installs_prerequisites() {
    let fx = Fixture::new(Some(EXISTING));
    let runner = RecordingRunner::new()
        .with_response("pvesm add iscsi san-b", CommandOutput::failed(255, "storage ID 'san-b' already defined"));
    let plan = Plan {
        portal: Some(Portal::parse("10.0.0.5:3260").unwrap()),
        storages: vec![
            StorageEntry::new(
                StorageId::parse("san-a").unwrap(),
                Iqn::parse("iqn.2005-10.org.freenas.ctl:a").unwrap(),
                0,
            ),
            StorageEntry::new(
                StorageId::parse("san-b").unwrap(),
                Iqn::parse("iqn.2005-10.org.freenas.ctl:b").unwrap(),
                1,
            ),
        ],
        multipaths: vec![entry("36589cfc00000000aa", "san-a"), entry("36589cfc00000000bb", "san-b")],
    };

    // multipath is missing on the first scan and present on the re-check
    let lookups = Cell::new(0);
    let mut workflow = Workflow::new(&runner, prompter(""), fx.manager())
        .with_plan(plan)
        .with_assume_yes(true)
        .with_lookup(|bin| {
            lookups.set(lookups.get() + 1);
            bin == "iscsiadm" || lookups.get() > PREREQUISITES.len()
        });
    let report = workflow.install().await.unwrap();

    assert_eq!(report.installed, vec!["multipath-tools"]);
    assert_eq!(report.bound, 1);
    assert_eq!(report.aliases, 2);
    assert!(report.backup.is_some());
    assert_eq!(fx.backups(), 1);

    assert!(runner.ran("apt-get install -y -q multipath-tools"));
    assert!(!runner.ran("iscsiadm"));
    assert!(!fx.content().contains("san-vm"));
    assert!(screen(workflow.into_prompter()).contains("Storage 'san-b' already exists, skipping"));
}

#[tokio::test]
async fn test_install_declined_keeps_existing_config() {
    let fx = Fixture::new(Some(EXISTING));
    let runner = RecordingRunner::new();
    let plan = Plan {
        portal: Some(Portal::parse("10.0.0.5").unwrap()),
        storages: vec![StorageEntry::new(
            StorageId::parse("san-a").unwrap(),
            Iqn::parse("iqn.2005-10.org.freenas.ctl:a").unwrap(),
            0,
        )],
        multipaths: vec![entry("36589cfc00000000aa", "san-a")],
    };

    let mut workflow = Workflow::new(&runner, prompter("n\n"), fx.manager())
        .with_plan(plan)
        .with_lookup(|_| true);
    let err = workflow.install().await.unwrap_err();

    assert!(matches!(err, WorkflowError::Cancelled(_)));
    assert_eq!(fx.content(), EXISTING);
    assert!(runner.calls().is_empty());
    assert!(!runner.ran("pvesm"));
}

// ============================================================================
// Menu, status, list
// ============================================================================

#[tokio::test]
async fn test_menu_list_then_quit() {
    let fx = Fixture::new(Some(EXISTING));
    let runner = RecordingRunner::new();

    let mut workflow = Workflow::new(&runner, prompter("5\n7\n"), fx.manager());
    workflow.run_menu().await.unwrap();

    let out = screen(workflow.into_prompter());
    assert!(out.contains("1) Install"));
    assert!(out.contains("36589cfc000000a1b2c3d4e5f60718293"));
    assert!(out.contains("san-vm"));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_menu_survives_declined_install() {
    let fx = Fixture::new(Some(EXISTING));
    let runner = RecordingRunner::new();

    // install, decline the replacement, then quit
    let mut workflow = Workflow::new(&runner, prompter("1\nn\n7\n"), fx.manager())
        .with_lookup(|_| true);
    workflow.run_menu().await.unwrap();

    assert_eq!(fx.content(), EXISTING);
    assert!(runner.calls().is_empty());
    let out = screen(workflow.into_prompter());
    assert!(out.contains("install cancelled."));
    assert_eq!(out.matches("7) Quit").count(), 2);
}

#[tokio::test]
async fn test_menu_reports_failed_flow_and_continues() {
    let fx = Fixture::new(Some("defaults {\n}\n"));
    let runner = RecordingRunner::new();

    // add fails on the missing multipaths section; backups still listed
    let mut workflow = Workflow::new(&runner, prompter("2\n6\n7\n"), fx.manager());
    workflow.run_menu().await.unwrap();

    let out = screen(workflow.into_prompter());
    assert!(out.contains("Error: no multipaths section found"));
    assert!(out.contains("6) List config backups"));
    assert!(out.contains("No backups found."));
}

#[tokio::test]
async fn test_menu_ends_when_input_closes() {
    let fx = Fixture::new(Some(EXISTING));
    let runner = RecordingRunner::new();

    let mut workflow = Workflow::new(&runner, prompter("3\n"), fx.manager());
    let err = workflow.run_menu().await.unwrap_err();
    assert!(matches!(err, WorkflowError::Prompt(_)));
}

#[test]
fn test_status_shows_topology() {
    let fx = Fixture::new(Some(EXISTING));
    let runner = RecordingRunner::new().with_response(
        "multipath -ll",
        CommandOutput::ok("san-vm (36589cfc000000a1b2c3d4e5f60718293) dm-3 TrueNAS,iSCSI Disk\n"),
    );

    let mut workflow = Workflow::new(&runner, prompter(""), fx.manager());
    let status = workflow.status().unwrap();
    assert!(status.active);

    let out = screen(workflow.into_prompter());
    assert!(out.contains("== multipathd (active) =="));
    assert!(out.contains("san-vm (36589cfc000000a1b2c3d4e5f60718293) dm-3"));
}

#[test]
fn test_backups_listed_after_edits() {
    let fx = Fixture::new(Some(EXISTING));
    let runner = RecordingRunner::new();

    let mut workflow = Workflow::new(&runner, prompter(""), fx.manager());
    assert!(workflow.backups().unwrap().is_empty());

    workflow
        .remove(Some(Wwid::parse("36589cfc000000a1b2c3d4e5f60718293").unwrap()))
        .unwrap();
    let backups = workflow.backups().unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(fs::read_to_string(&backups[0]).unwrap(), EXISTING);
}
