use std::path::{Path, PathBuf};
use std::process::Command;

use crate::install::error::{InstallError, InstallResult};
use crate::install::execution::Executor;
use crate::install::system::HostSystem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    pub target: PathBuf,
    pub source: String,
    pub options: String,
    pub sequence: usize,
}

#[derive(Debug, Default)]
pub struct UnmountReport {
    pub unmounted: Vec<PathBuf>,
    /// Targets that were no longer mount points
    pub tolerated: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Tracks every mount of the run so they can be released in reverse order.
///
/// Whatever is still recorded when the manager is dropped gets unmounted, so
/// early returns and panics do not leave the target tree mounted.
pub struct MountManager<'a> {
    executor: &'a dyn Executor,
    host: &'a dyn HostSystem,
    records: Vec<MountRecord>,
    next_sequence: usize,
}

impl<'a> MountManager<'a> {
    pub fn new(executor: &'a dyn Executor, host: &'a dyn HostSystem) -> Self {
        Self {
            executor,
            host,
            records: Vec::new(),
            next_sequence: 0,
        }
    }

    pub fn records(&self) -> &[MountRecord] {
        &self.records
    }

    pub fn find(&self, target: &Path) -> Option<&MountRecord> {
        self.records.iter().find(|r| r.target == target)
    }

    /// Mount `source` on `target`; the record is only added when the mount succeeded.
    pub fn mount(&mut self, source: &str, target: &Path, options: &str) -> anyhow::Result<()> {
        if let Some(existing) = self.find(target) {
            anyhow::bail!(
                "{} already holds {} in this run",
                target.display(),
                existing.source
            );
        }

        self.executor.run(
            Command::new("mount")
                .arg("--mkdir")
                .args(["-o", options])
                .arg(source)
                .arg(target),
        )?;

        log::info!("Mounted {} on {} ({})", source, target.display(), options);
        self.records.push(MountRecord {
            target: target.to_path_buf(),
            source: source.to_string(),
            options: options.to_string(),
            sequence: self.next_sequence,
        });
        self.next_sequence += 1;
        Ok(())
    }

    /// Mount the shared boot partition, read-only first and read-write as fallback.
    ///
    /// Returns the options the partition ended up mounted with.
    pub fn mount_boot(&mut self, source: &str, target: &Path) -> InstallResult<String> {
        match self.mount(source, target, "ro") {
            Ok(()) => return Ok("ro".to_string()),
            Err(e) => log::warn!(
                "Read-only mount of {} failed ({:#}), retrying read-write",
                source,
                e
            ),
        }

        self.mount(source, target, "rw")
            .map(|()| "rw".to_string())
            .map_err(|e| {
                InstallError::execution(
                    format!("Mount boot partition {} (read-only and read-write)", source),
                    e,
                )
            })
    }

    /// Switch a tracked read-only mount to read-write.
    pub fn remount_rw(&mut self, target: &Path) -> anyhow::Result<()> {
        let Some(index) = self.records.iter().position(|r| r.target == target) else {
            anyhow::bail!("{} is not a tracked mount", target.display());
        };

        self.executor.run(
            Command::new("mount")
                .args(["-o", "remount,rw"])
                .arg(target),
        )?;
        self.records[index].options = "rw".to_string();
        Ok(())
    }

    /// Unmount everything in exact reverse mount order. Never fails as a whole.
    pub fn unmount_all(&mut self) -> UnmountReport {
        let mut report = UnmountReport::default();

        while let Some(record) = self.records.pop() {
            log::debug!("Unmounting {} (mount #{})", record.target.display(), record.sequence);
            match self
                .executor
                .run(Command::new("umount").arg(&record.target))
            {
                Ok(()) => {
                    log::info!("Unmounted {}", record.target.display());
                    report.unmounted.push(record.target);
                }
                Err(_) if !self.host.is_mount_point(&record.target) => {
                    log::debug!("{} was not mounted anymore", record.target.display());
                    report.tolerated.push(record.target);
                }
                Err(e) => {
                    log::warn!("Failed to unmount {}: {:#}", record.target.display(), e);
                    report.failed.push((record.target, format!("{:#}", e)));
                }
            }
        }

        report
    }
}

impl Drop for MountManager<'_> {
    fn drop(&mut self) {
        if !self.records.is_empty() {
            log::warn!("Releasing {} leftover mount(s)", self.records.len());
            self.unmount_all();
        }
    }
}
