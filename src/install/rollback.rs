use chrono::Local;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::disk::mount::{MountManager, UnmountReport};
use super::error::{InstallError, InstallResult};
use super::execution::Executor;
use super::prompt::Decider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackState {
    pub backup_path: PathBuf,
    pub captured: bool,
    pub restored: bool,
}

#[derive(Debug, Default)]
pub struct RollbackReport {
    pub unmount: UnmountReport,
    pub restore_attempted: bool,
    pub restore_succeeded: bool,
}

/// Owns the partition-table backup and the one-shot restore.
pub struct RollbackController {
    disk: String,
    state: RollbackState,
    backup: Option<String>,
    table_modified: bool,
    restore_attempted: bool,
}

pub fn backup_path_for(backup_dir: &Path, disk: &str) -> PathBuf {
    let name = disk.trim_start_matches("/dev/").replace('/', "_");
    backup_dir.join(format!(
        "{}-{}.sfdisk",
        name,
        Local::now().format("%Y%m%d-%H%M%S")
    ))
}

impl RollbackController {
    pub fn new(disk: &str, backup_path: PathBuf) -> Self {
        Self {
            disk: disk.to_string(),
            state: RollbackState {
                backup_path,
                captured: false,
                restored: false,
            },
            backup: None,
            table_modified: false,
            restore_attempted: false,
        }
    }

    pub fn state(&self) -> &RollbackState {
        &self.state
    }

    /// Dump the current partition table. Must run before the first write to the disk.
    pub fn capture(&mut self, executor: &dyn Executor) -> InstallResult<()> {
        let output = executor
            .run_with_output(Command::new("sfdisk").arg("--dump").arg(&self.disk))
            .map_err(|e| InstallError::execution("Back up partition table", e))?;

        let Some(output) = output else {
            log::info!(
                "[DRY RUN] partition table of {} would be saved to {}",
                self.disk,
                self.state.backup_path.display()
            );
            return Ok(());
        };

        let dump = String::from_utf8_lossy(&output.stdout).into_owned();
        if dump.trim().is_empty() {
            return Err(InstallError::execution(
                "Back up partition table",
                anyhow::anyhow!("sfdisk --dump {} produced no output", self.disk),
            ));
        }

        executor
            .write_file(&self.state.backup_path, &dump)
            .map_err(|e| InstallError::execution("Save partition table backup", e))?;

        log::info!(
            "Saved partition table of {} to {}",
            self.disk,
            self.state.backup_path.display()
        );
        self.backup = Some(dump);
        self.state.captured = true;
        Ok(())
    }

    /// Called right before the first partition-table write is issued.
    pub fn mark_table_modified(&mut self) {
        self.table_modified = true;
    }

    /// Release mounts, then offer a restore of the partition table.
    ///
    /// Safe to call from any number of failure paths: the restore is offered and
    /// attempted at most once per run.
    pub fn unwind(
        &mut self,
        mounts: &mut MountManager<'_>,
        executor: &dyn Executor,
        decider: &dyn Decider,
    ) -> RollbackReport {
        let mut report = RollbackReport {
            unmount: mounts.unmount_all(),
            ..Default::default()
        };

        if self.restore_attempted || self.state.restored {
            report.restore_attempted = self.restore_attempted;
            report.restore_succeeded = self.state.restored;
            return report;
        }
        if executor.is_dry_run() {
            log::info!("[DRY RUN] no partition table restore in simulation");
            return report;
        }
        let Some(backup) = self.backup.clone().filter(|_| self.state.captured) else {
            log::info!("No partition table backup was captured, nothing to restore");
            return report;
        };
        if !self.table_modified {
            log::info!("Partition table of {} was not modified", self.disk);
            return report;
        }
        if !report.unmount.failed.is_empty() {
            log::error!(
                "Not restoring the partition table while {} is still mounted. \
                 Unmount it, then restore manually with: sfdisk {} < {}",
                report
                    .unmount
                    .failed
                    .iter()
                    .map(|(target, _)| target.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                self.disk,
                self.state.backup_path.display()
            );
            return report;
        }

        let prompt = format!(
            "Restore the partition table of {} from {}?",
            self.disk,
            self.state.backup_path.display()
        );
        match decider.confirm(&prompt) {
            Ok(true) => {}
            Ok(false) => {
                log::warn!(
                    "Partition table left as is; backup kept at {}",
                    self.state.backup_path.display()
                );
                return report;
            }
            Err(e) => {
                log::warn!("Could not ask for a restore: {:#}", e);
                return report;
            }
        }

        self.restore_attempted = true;
        report.restore_attempted = true;

        let result = executor
            .run_with_input(Command::new("sfdisk").arg(&self.disk), &backup)
            .and_then(|()| executor.run(Command::new("partprobe").arg(&self.disk)));

        match result {
            Ok(()) => {
                log::info!("Restored partition table of {}", self.disk);
                self.state.restored = true;
                report.restore_succeeded = true;
            }
            Err(e) => log::error!(
                "Restoring the partition table failed: {:#}. Restore manually with: sfdisk {} < {}",
                e,
                self.disk,
                self.state.backup_path.display()
            ),
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::testing::{FakeHost, RecordingExecutor, ScriptedDecider};

    const DUMP: &str = "label: gpt\ndevice: /dev/sda\n/dev/sda1 : start=2048, size=1048576\n";

    fn controller() -> RollbackController {
        RollbackController::new("/dev/sda", PathBuf::from("/var/lib/dualstrap/sda.sfdisk"))
    }

    #[test]
    fn test_backup_path_is_named_after_disk() {
        let path = backup_path_for(Path::new("/var/lib/dualstrap"), "/dev/nvme0n1");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("nvme0n1-"));
        assert!(name.ends_with(".sfdisk"));
    }

    #[test]
    fn test_capture_saves_dump() {
        let executor = RecordingExecutor::new().with_output("sfdisk --dump", DUMP);
        let mut rollback = controller();
        rollback.capture(&executor).unwrap();

        assert!(rollback.state().captured);
        assert_eq!(
            executor.written_to(Path::new("/var/lib/dualstrap/sda.sfdisk")).as_deref(),
            Some(DUMP)
        );
    }

    #[test]
    fn test_dry_run_capture_is_logged_only() {
        let executor = RecordingExecutor::dry_run();
        let mut rollback = controller();
        rollback.capture(&executor).unwrap();
        assert!(!rollback.state().captured);
        assert!(executor.written().is_empty());
    }

    #[test]
    fn test_no_offer_when_table_untouched() {
        let host = FakeHost::new();
        let executor = RecordingExecutor::new().with_output("sfdisk --dump", DUMP);
        let decider = ScriptedDecider::always_yes();
        let mut rollback = controller();
        rollback.capture(&executor).unwrap();

        let mut mounts = MountManager::new(&executor, &host);
        let report = rollback.unwind(&mut mounts, &executor, &decider);
        assert!(!report.restore_attempted);
        assert!(decider.prompts().is_empty());
    }

    #[test]
    fn test_restore_happens_at_most_once() {
        let host = FakeHost::new();
        let executor = RecordingExecutor::new().with_output("sfdisk --dump", DUMP);
        let decider = ScriptedDecider::always_yes();
        let mut rollback = controller();
        rollback.capture(&executor).unwrap();
        rollback.mark_table_modified();

        let mut mounts = MountManager::new(&executor, &host);
        let first = rollback.unwind(&mut mounts, &executor, &decider);
        assert!(first.restore_attempted && first.restore_succeeded);
        assert!(rollback.state().restored);

        let second = rollback.unwind(&mut mounts, &executor, &decider);
        assert!(second.restore_succeeded);
        assert_eq!(decider.prompts().len(), 1);
        assert_eq!(executor.commands_starting_with("sfdisk /dev/sda").len(), 1);
        assert_eq!(executor.commands_starting_with("partprobe").len(), 1);
    }

    #[test]
    fn test_failed_restore_is_not_retried() {
        let host = FakeHost::new();
        let executor = RecordingExecutor::new()
            .with_output("sfdisk --dump", DUMP)
            .fail_times("sfdisk /dev/sda", 1);
        let decider = ScriptedDecider::always_yes();
        let mut rollback = controller();
        rollback.capture(&executor).unwrap();
        rollback.mark_table_modified();

        let mut mounts = MountManager::new(&executor, &host);
        let first = rollback.unwind(&mut mounts, &executor, &decider);
        assert!(first.restore_attempted);
        assert!(!first.restore_succeeded);

        let second = rollback.unwind(&mut mounts, &executor, &decider);
        assert!(second.restore_attempted);
        assert_eq!(decider.prompts().len(), 1);
    }

    #[test]
    fn test_declined_restore_keeps_table() {
        let host = FakeHost::new();
        let executor = RecordingExecutor::new().with_output("sfdisk --dump", DUMP);
        let decider = ScriptedDecider::new(&[false]);
        let mut rollback = controller();
        rollback.capture(&executor).unwrap();
        rollback.mark_table_modified();

        let mut mounts = MountManager::new(&executor, &host);
        let report = rollback.unwind(&mut mounts, &executor, &decider);
        assert!(!report.restore_attempted);
        assert!(executor.commands_starting_with("sfdisk /dev/sda").is_empty());
    }

    #[test]
    fn test_no_restore_while_a_partition_is_still_mounted() {
        let host = FakeHost::new().with_mount_point("/mnt/home");
        let executor =
            RecordingExecutor::failing_on("umount /mnt/home").with_output("sfdisk --dump", DUMP);
        let decider = ScriptedDecider::always_yes();
        let mut rollback = controller();
        rollback.capture(&executor).unwrap();
        rollback.mark_table_modified();

        let mut mounts = MountManager::new(&executor, &host);
        mounts.mount("/dev/sda5", Path::new("/mnt"), "defaults").unwrap();
        mounts
            .mount("/dev/sda6", Path::new("/mnt/home"), "defaults")
            .unwrap();

        let report = rollback.unwind(&mut mounts, &executor, &decider);
        assert_eq!(report.unmount.failed.len(), 1);
        assert!(!report.restore_attempted);
        assert!(decider.prompts().is_empty());
        assert!(executor.commands_starting_with("sfdisk /dev/sda").is_empty());
    }

    #[test]
    fn test_never_restores_in_dry_run() {
        let host = FakeHost::new();
        let executor = RecordingExecutor::dry_run();
        let decider = ScriptedDecider::always_yes();
        let mut rollback = controller();
        rollback.capture(&executor).unwrap();
        rollback.mark_table_modified();

        let mut mounts = MountManager::new(&executor, &host);
        let report = rollback.unwind(&mut mounts, &executor, &decider);
        assert!(!report.restore_attempted);
        assert!(decider.prompts().is_empty());
    }
}
