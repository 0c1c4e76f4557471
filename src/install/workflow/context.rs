use std::path::{Path, PathBuf};

use super::phase::{Checkpoint, Phase};
use crate::install::config::InstallConfig;
use crate::install::disk::mount::MountManager;
use crate::install::disk::types::{
    BlockDevice, DiskRegion, PartitionHandle, PartitionNumbers, PartitionPlan, Role,
};
use crate::install::error::{InstallError, InstallResult};
use crate::install::execution::Executor;
use crate::install::execution::paths::{BOOT_MOUNT, HOME_MOUNT};
use crate::install::prompt::Decider;
use crate::install::rollback::{RollbackController, backup_path_for};
use crate::install::system::{HostSystem, PartitionTable};

/// Everything a run accumulates, owned by the runner.
pub struct RunContext<'a> {
    pub config: &'a InstallConfig,
    pub executor: &'a dyn Executor,
    pub host: &'a dyn HostSystem,
    pub decider: &'a dyn Decider,
    pub mounts: MountManager<'a>,
    pub rollback: RollbackController,
    pub checkpoints: Vec<Checkpoint>,

    pub table: Option<PartitionTable>,
    pub region: Option<DiskRegion>,
    pub plan: Option<PartitionPlan>,
    pub numbers: Option<PartitionNumbers>,
    /// Devices as predicted by the creation step
    pub created: Vec<BlockDevice>,
    pub handles: Vec<PartitionHandle>,
    pub root_partuuid: Option<String>,
    /// Rendered fstab waiting for the base system to be in place
    pub fstab: Option<String>,
}

fn missing(what: &str) -> InstallError {
    InstallError::execution(
        "Run installer",
        anyhow::anyhow!("{} is not available at this point", what),
    )
}

impl<'a> RunContext<'a> {
    pub fn new(
        config: &'a InstallConfig,
        executor: &'a dyn Executor,
        host: &'a dyn HostSystem,
        decider: &'a dyn Decider,
    ) -> Self {
        Self {
            config,
            executor,
            host,
            decider,
            mounts: MountManager::new(executor, host),
            rollback: RollbackController::new(
                &config.device,
                backup_path_for(&config.backup_dir, &config.device),
            ),
            checkpoints: Phase::ALL.iter().map(|p| Checkpoint::pending(*p)).collect(),
            table: None,
            region: None,
            plan: None,
            numbers: None,
            created: Vec::new(),
            handles: Vec::new(),
            root_partuuid: None,
            fstab: None,
        }
    }

    pub fn dry_run(&self) -> bool {
        self.executor.is_dry_run()
    }

    pub fn mount_root(&self) -> &Path {
        &self.config.mount_root
    }

    pub fn checkpoint_mut(&mut self, phase: Phase) -> &mut Checkpoint {
        let index = phase.index() - 1;
        &mut self.checkpoints[index]
    }

    pub fn table(&self) -> InstallResult<&PartitionTable> {
        self.table.as_ref().ok_or_else(|| missing("partition table"))
    }

    pub fn region(&self) -> InstallResult<DiskRegion> {
        self.region.ok_or_else(|| missing("free region"))
    }

    pub fn plan(&self) -> InstallResult<PartitionPlan> {
        self.plan.ok_or_else(|| missing("partition plan"))
    }

    pub fn numbers(&self) -> InstallResult<PartitionNumbers> {
        self.numbers.ok_or_else(|| missing("partition numbers"))
    }

    pub fn handle(&self, role: Role) -> Option<&PartitionHandle> {
        self.handles.iter().find(|h| h.role == role)
    }

    pub fn require_handle(&self, role: Role) -> InstallResult<&PartitionHandle> {
        self.handle(role)
            .ok_or_else(|| InstallError::Detection(format!("no {} partition identified", role)))
    }

    pub fn target_for(&self, role: Role) -> PathBuf {
        match role {
            Role::Home => self.mount_root().join(HOME_MOUNT),
            Role::Boot => self.mount_root().join(BOOT_MOUNT),
            Role::Root | Role::Preserved => self.mount_root().to_path_buf(),
        }
    }
}
