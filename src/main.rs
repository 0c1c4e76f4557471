mod install;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use install::config::InstallConfig;
use install::execution::CommandExecutor;
use install::execution::paths::DRY_RUN_FLAG;
use install::prompt::TerminalDecider;
use install::system::LinuxHost;
use install::workflow::{CheckpointRunner, Outcome};

/// Install Arch Linux next to an existing system on the same disk
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Describe every change instead of making it
    #[arg(long)]
    dry_run: bool,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,

    /// Target disk, overrides the configuration file
    #[arg(short, long)]
    device: Option<String>,

    /// Configuration file (defaults to /etc/dualstrap/config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<InstallConfig> {
    let mut config = InstallConfig::load(cli.config.as_deref())?;
    if let Some(device) = &cli.device {
        config.device = device.clone();
    }
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Nothing is touched before the configuration is known to be valid.
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            return ExitCode::from(2);
        }
    };

    let forced = Path::new(DRY_RUN_FLAG).exists();
    let dry_run = cli.dry_run || forced;

    match install::logging::init(cli.verbose, &config.log_dir) {
        Ok(Some(path)) => log::info!("Run log: {}", path.display()),
        Ok(None) => {}
        Err(e) => eprintln!("{} {:#}", "Warning:".yellow().bold(), e),
    }
    if forced && !cli.dry_run {
        log::info!("{} exists, running in simulation mode", DRY_RUN_FLAG);
    }

    let executor = CommandExecutor::new(dry_run);
    let report = CheckpointRunner::new(&config, &executor, &LinuxHost, &TerminalDecider).run();

    match report.outcome {
        Outcome::Completed => {
            println!();
            println!("{}", "Installation finished".green().bold());
            ExitCode::SUCCESS
        }
        Outcome::Aborted => ExitCode::FAILURE,
    }
}
