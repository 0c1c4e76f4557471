use anyhow::{Context, Result};
use std::cell::RefCell;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

pub mod base;
pub mod fstab;
pub mod paths;
pub mod swap;
pub mod verify;

/// Runs externally observable (destructive) actions.
///
/// In dry-run mode every action is replaced by a logged description. Read-only
/// probes do not go through the executor.
pub trait Executor {
    fn is_dry_run(&self) -> bool;

    fn run(&self, command: &mut Command) -> Result<()>;

    fn run_with_input(&self, command: &mut Command, input: &str) -> Result<()>;

    /// Returns `None` in dry-run mode.
    fn run_with_output(&self, command: &mut Command) -> Result<Option<Output>>;

    fn write_file(&self, path: &Path, contents: &str) -> Result<()>;

    fn append_file(&self, path: &Path, contents: &str) -> Result<()>;

    /// The last action attempted, for failure reports.
    fn last_operation(&self) -> Option<String>;
}

pub fn describe(command: &Command) -> String {
    let program = command.get_program().to_string_lossy();
    let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy()).collect();
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

pub struct CommandExecutor {
    dry_run: bool,
    last: RefCell<Option<String>>,
}

impl CommandExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            last: RefCell::new(None),
        }
    }

    fn track(&self, operation: String) {
        log::debug!("exec: {}", operation);
        *self.last.borrow_mut() = Some(operation);
    }

    fn print_dry_run(&self, command: &Command, input: Option<&str>) {
        let cmd_str = describe(command);

        if let Some(input_str) = input {
            if input_str.contains('\n') {
                log::info!("[DRY RUN] --- BEGIN COMMAND ---");
                log::info!("> {}", cmd_str);
                for line in input_str.trim().lines() {
                    log::info!("{}", line);
                }
                log::info!("[DRY RUN] --- END COMMAND ---");
            } else {
                log::info!("[DRY RUN] echo '{}' | {}", input_str, cmd_str);
            }
        } else {
            log::info!("[DRY RUN] {}", cmd_str);
        }
    }
}

impl Executor for CommandExecutor {
    fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn run(&self, command: &mut Command) -> Result<()> {
        self.track(describe(command));
        if self.dry_run {
            self.print_dry_run(command, None);
            return Ok(());
        }

        let status = command
            .status()
            .with_context(|| format!("Failed to spawn {}", describe(command)))?;
        if !status.success() {
            anyhow::bail!("Command failed ({}): {}", status, describe(command));
        }
        Ok(())
    }

    fn run_with_input(&self, command: &mut Command, input: &str) -> Result<()> {
        self.track(describe(command));
        if self.dry_run {
            self.print_dry_run(command, Some(input));
            return Ok(());
        }

        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped());

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn {}", describe(command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            anyhow::bail!("Command failed ({}): {}", output.status, describe(command));
        }
        Ok(())
    }

    fn run_with_output(&self, command: &mut Command) -> Result<Option<Output>> {
        self.track(describe(command));
        if self.dry_run {
            self.print_dry_run(command, None);
            return Ok(None);
        }

        command.stdout(Stdio::piped());
        let output = command
            .output()
            .with_context(|| format!("Failed to spawn {}", describe(command)))?;
        if !output.status.success() {
            anyhow::bail!("Command failed ({}): {}", output.status, describe(command));
        }
        Ok(Some(output))
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.track(format!("write {}", path.display()));
        if self.dry_run {
            log::info!(
                "[DRY RUN] write {} ({} bytes)",
                path.display(),
                contents.len()
            );
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    fn append_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.track(format!("append {}", path.display()));
        if self.dry_run {
            log::info!("[DRY RUN] append to {}: {}", path.display(), contents.trim());
            return Ok(());
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }

    fn last_operation(&self) -> Option<String> {
        self.last.borrow().clone()
    }
}
