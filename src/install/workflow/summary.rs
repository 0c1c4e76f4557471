//! Console output for checkpoints and the failure report

use colored::Colorize;
use std::path::PathBuf;

use super::phase::{Checkpoint, CheckpointStatus, Phase};

pub fn header(phase: Phase) -> String {
    format!("[{}/{}] {}", phase.index(), Phase::total(), phase.label())
}

pub fn announce(phase: Phase) {
    println!();
    println!("{}", header(phase).bold().bright_cyan());
    log::debug!("Starting phase {}", header(phase));
}

pub fn print_checkpoint(checkpoint: &Checkpoint) {
    let status = match checkpoint.status {
        CheckpointStatus::Ok => "✓ ok".green().bold(),
        CheckpointStatus::Skipped => "- skipped".yellow().bold(),
        CheckpointStatus::Failed => "✗ failed".red().bold(),
        CheckpointStatus::Pending => "pending".dimmed(),
    };
    println!(
        "  {} [{}/{}] {}",
        status,
        checkpoint.index(),
        checkpoint.total(),
        checkpoint.label()
    );
    for item in &checkpoint.items {
        println!("    {} {}", "•".dimmed(), item);
    }
}

/// What went wrong, for the user and the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub phase: Phase,
    pub kind: String,
    pub condition: String,
    pub last_operation: Option<String>,
    pub backup_path: Option<PathBuf>,
    pub restore_attempted: bool,
    pub restore_succeeded: bool,
    pub unmount_failures: Vec<String>,
}

impl FailureReport {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Phase: {}", header(self.phase)),
            format!("Condition: {}: {}", self.kind, self.condition),
            format!(
                "Last operation: {}",
                self.last_operation.as_deref().unwrap_or("none")
            ),
            match &self.backup_path {
                Some(path) => format!("Partition table backup: {}", path.display()),
                None => "Partition table backup: not captured".to_string(),
            },
            format!(
                "Automatic restore: {}",
                match (self.restore_attempted, self.restore_succeeded) {
                    (false, _) => "not attempted",
                    (true, true) => "attempted, succeeded",
                    (true, false) => "attempted, failed",
                }
            ),
        ];
        for failure in &self.unmount_failures {
            lines.push(format!("Still mounted: {}", failure));
        }
        lines
    }

    pub fn print(&self) {
        println!();
        println!("{}", "Installation aborted".red().bold());
        for line in self.lines() {
            log::error!("{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_format() {
        assert_eq!(header(Phase::Inspect), "[1/15] inspect");
        assert_eq!(header(Phase::OptionalSwapfile), "[12/15] optional-swapfile");
    }

    #[test]
    fn test_failure_report_lines() {
        let report = FailureReport {
            phase: Phase::Format,
            kind: "ExecutionError".to_string(),
            condition: "Format root failed".to_string(),
            last_operation: Some("mkfs.ext4 -F /dev/sda3".to_string()),
            backup_path: Some(PathBuf::from("/var/lib/dualstrap/sda.sfdisk")),
            restore_attempted: true,
            restore_succeeded: false,
            unmount_failures: Vec::new(),
        };
        let lines = report.lines();
        assert_eq!(lines[0], "Phase: [7/15] format");
        assert_eq!(lines[2], "Last operation: mkfs.ext4 -F /dev/sda3");
        assert_eq!(
            lines[3],
            "Partition table backup: /var/lib/dualstrap/sda.sfdisk"
        );
        assert_eq!(lines[4], "Automatic restore: attempted, failed");
    }
}
