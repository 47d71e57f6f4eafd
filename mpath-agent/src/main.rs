use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use pve_mpath::exec::{CommandRunner, DryRunRunner, SystemRunner};
use pve_mpath::multipath::{MultipathConfigManager, MultipathService, Wwid};
use pve_mpath::plan::load_plan;
use pve_mpath::prompt::TerminalPrompter;
use pve_mpath::workflow::Workflow;

#[derive(Parser, Debug)]
#[command(name = "pve-mpath")]
#[command(about = "Register iSCSI storage with pvesm and manage multipath aliases")]
struct Args {
    /// Path to the multipath configuration file
    #[arg(long, env = "MULTIPATH_CONFIG", default_value = "/etc/multipath.conf")]
    config: PathBuf,

    /// Directory for config backups (defaults to the config file's directory)
    #[arg(long, env = "MULTIPATH_BACKUP_DIR")]
    backup_dir: Option<PathBuf>,

    /// systemd unit of the multipath daemon
    #[arg(long, env = "MULTIPATH_SERVICE", default_value = "multipathd")]
    service: String,

    /// Content types for storages added with pvesm
    #[arg(long, default_value = "none")]
    content: String,

    /// JSON plan with answers for the install and add flows
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Replace an existing config without asking
    #[arg(long, short = 'y')]
    yes: bool,

    /// Print commands and the resulting config instead of applying them
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive main menu (default)
    Menu,
    /// Install prerequisites, bind storages, generate the config
    Install,
    /// Add WWID/alias blocks to the existing config
    Add,
    /// Remove the blocks referencing a WWID
    Remove {
        /// WWID to remove (prompted for when omitted)
        #[arg(long)]
        wwid: Option<Wwid>,
    },
    /// Show multipathd status and topology
    Status,
    /// List configured WWID/alias pairs
    List,
    /// List config backups, oldest first
    Backups,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing with configured log level
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Config path: {}", args.config.display());
    info!("Service: {}", args.service);
    if args.dry_run {
        info!("Dry-run mode: no commands will be executed and no files written");
    }

    let plan = match args.plan {
        Some(ref path) => {
            info!("Loading plan from {}", path.display());
            load_plan(path)
                .await
                .map_err(|e| format!("Failed to load plan {}: {}", path.display(), e))?
        }
        None => Default::default(),
    };

    let runner: &dyn CommandRunner = if args.dry_run {
        &DryRunRunner
    } else {
        &SystemRunner
    };

    let mut manager = MultipathConfigManager::new(&args.config).with_dry_run(args.dry_run);
    if let Some(dir) = args.backup_dir {
        manager = manager.with_backup_dir(dir);
    }

    let prompter = TerminalPrompter::new(std::io::stdin().lock(), std::io::stdout());
    let mut workflow = Workflow::new(runner, prompter, manager)
        .with_service(MultipathService::new(args.service))
        .with_binder(pve_mpath::iscsi::StorageBinder::new(args.content))
        .with_plan(plan)
        .with_assume_yes(args.yes);

    match args.command.unwrap_or(Command::Menu) {
        Command::Menu => workflow.run_menu().await?,
        Command::Install => {
            let report = workflow.install().await?;
            info!(
                "Bound {} storage(s) on {}, wrote {} alias(es)",
                report.bound, report.portal, report.aliases
            );
        }
        Command::Add => {
            workflow.add().await?;
        }
        Command::Remove { wwid } => {
            workflow.remove(wwid)?;
        }
        Command::Status => {
            workflow.status()?;
        }
        Command::List => {
            workflow.list()?;
        }
        Command::Backups => {
            workflow.backups()?;
        }
    }

    Ok(())
}
