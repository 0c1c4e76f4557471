//! The checkpointed install run.
//!
//! Phases run strictly in order. Every phase announces itself, does its work
//! (possibly behind a confirmation gate) and reports itemized results. The first
//! failure ends the run: mounts are released and, when the partition table was
//! changed, a restore from the backup is offered.

pub mod context;
pub mod phase;
pub mod summary;

use std::collections::HashSet;
use std::process::Command;
use std::time::Duration;

use context::RunContext;
use phase::{Checkpoint, CheckpointStatus, Phase};
use summary::FailureReport;

use super::chroot::{self, ScriptVars};
use super::config::InstallConfig;
use super::disk::detect::{detect_new_partitions, resolve_boot};
use super::disk::partition::{create_partitions, resolve_numbers};
use super::disk::plan::plan_partitions;
use super::disk::scan::select_largest;
use super::disk::types::{BlockDevice, PartitionHandle, PartitionPlan, Role, format_mib};
use super::error::{InstallError, InstallResult};
use super::execution::paths::{self, in_target};
use super::execution::{Executor, base, fstab, swap, verify};
use super::prompt::Decider;
use super::system::HostSystem;

/// Host tools the run shells out to
pub const REQUIRED_TOOLS: &[&str] = &[
    "sfdisk",
    "partprobe",
    "udevadm",
    "blkid",
    "lsblk",
    "mkfs.ext4",
    "mount",
    "umount",
    "mountpoint",
    "mkswap",
    "pacstrap",
    "arch-chroot",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Aborted,
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: Outcome,
    pub checkpoints: Vec<Checkpoint>,
    pub plan: Option<PartitionPlan>,
    pub failure: Option<FailureReport>,
}

enum PhaseResult {
    Done(Vec<String>),
    Skipped(String),
}

pub struct CheckpointRunner<'a> {
    ctx: RunContext<'a>,
}

impl<'a> CheckpointRunner<'a> {
    pub fn new(
        config: &'a InstallConfig,
        executor: &'a dyn Executor,
        host: &'a dyn HostSystem,
        decider: &'a dyn Decider,
    ) -> Self {
        Self {
            ctx: RunContext::new(config, executor, host, decider),
        }
    }

    pub fn run(mut self) -> RunReport {
        if self.ctx.dry_run() {
            log::info!(
                "[DRY RUN] simulating installation on {}, nothing will be changed",
                self.ctx.config.device
            );
        }

        for phase in Phase::ALL {
            summary::announce(phase);
            match self.run_phase(phase) {
                Ok(PhaseResult::Done(items)) => self.finish(phase, CheckpointStatus::Ok, items),
                Ok(PhaseResult::Skipped(reason)) => {
                    self.finish(phase, CheckpointStatus::Skipped, vec![reason])
                }
                Err(e) => {
                    self.finish(phase, CheckpointStatus::Failed, vec![e.to_string()]);
                    let failure = self.fail(phase, &e);
                    return RunReport {
                        outcome: Outcome::Aborted,
                        checkpoints: std::mem::take(&mut self.ctx.checkpoints),
                        plan: self.ctx.plan,
                        failure: Some(failure),
                    };
                }
            }
        }

        RunReport {
            outcome: Outcome::Completed,
            checkpoints: std::mem::take(&mut self.ctx.checkpoints),
            plan: self.ctx.plan,
            failure: None,
        }
    }

    fn finish(&mut self, phase: Phase, status: CheckpointStatus, items: Vec<String>) {
        let checkpoint = self.ctx.checkpoint_mut(phase);
        checkpoint.status = status;
        checkpoint.items = items;
        summary::print_checkpoint(checkpoint);
    }

    fn fail(&mut self, phase: Phase, error: &InstallError) -> FailureReport {
        log::error!("{} failed: {}", summary::header(phase), error);
        let last_operation = self.ctx.executor.last_operation();

        let ctx = &mut self.ctx;
        let rollback = ctx
            .rollback
            .unwind(&mut ctx.mounts, ctx.executor, ctx.decider);

        let state = ctx.rollback.state();
        let report = FailureReport {
            phase,
            kind: error.kind().to_string(),
            condition: error.to_string(),
            last_operation,
            backup_path: state.captured.then(|| state.backup_path.clone()),
            restore_attempted: rollback.restore_attempted,
            restore_succeeded: rollback.restore_succeeded,
            unmount_failures: rollback
                .unmount
                .failed
                .iter()
                .map(|(target, e)| format!("{} ({})", target.display(), e))
                .collect(),
        };
        report.print();
        report
    }

    fn ask(&self, prompt: &str) -> InstallResult<bool> {
        self.ctx
            .decider
            .confirm(prompt)
            .map_err(|e| InstallError::execution("Read confirmation", e))
    }

    /// Confirmation before a phase acts. "no" skips an optional phase and
    /// aborts the run otherwise.
    fn gate(&self, phase: Phase, prompt: &str) -> InstallResult<bool> {
        if self.ask(prompt)? {
            Ok(true)
        } else if phase.is_optional() {
            log::info!("{} declined", phase.label());
            Ok(false)
        } else {
            Err(InstallError::Declined {
                phase: phase.label().to_string(),
            })
        }
    }

    fn run_phase(&mut self, phase: Phase) -> InstallResult<PhaseResult> {
        match phase {
            Phase::Inspect => self.inspect(),
            Phase::ScanFreeSpace => self.scan_free_space(),
            Phase::Plan => self.plan(),
            Phase::ValidateNumberingConflicts => self.validate_numbering(phase),
            Phase::CreatePartitions => self.create(phase),
            Phase::DetectPartitions => self.detect(),
            Phase::Format => self.format(phase),
            Phase::Mount => self.mount(),
            Phase::GenerateFstab => self.generate_fstab(),
            Phase::InstallBaseSystem => self.install_base(),
            Phase::RunChrootConfig => self.configure(),
            Phase::OptionalSwapfile => self.swapfile(),
            Phase::Verify => self.verify(),
            Phase::Unmount => self.unmount(),
            Phase::Summary => self.summary(),
        }
    }

    fn inspect(&mut self) -> InstallResult<PhaseResult> {
        let ctx = &self.ctx;
        let mut problems = Vec::new();

        let missing: Vec<&str> = REQUIRED_TOOLS
            .iter()
            .copied()
            .filter(|tool| !ctx.host.has_tool(tool))
            .collect();
        if !missing.is_empty() {
            problems.push(format!("missing tools: {}", missing.join(", ")));
        }
        let uefi = ctx.host.is_uefi();
        if !uefi {
            problems.push("system is not booted in UEFI mode".to_string());
        }
        if !ctx.host.is_block_device(&ctx.config.device) {
            problems.push(format!("{} is not a block device", ctx.config.device));
        }

        if !problems.is_empty() && !ctx.dry_run() {
            return Err(InstallError::Environment(problems.join("; ")));
        }

        let mut items = vec![
            format!("target disk: {}", ctx.config.device),
            format!("firmware: {}", if uefi { "UEFI" } else { "BIOS" }),
            format!("mode: {}", if ctx.dry_run() { "simulation" } else { "install" }),
        ];
        for problem in problems {
            log::warn!("[DRY RUN] continuing despite: {}", problem);
            items.push(format!("warning: {}", problem));
        }
        Ok(PhaseResult::Done(items))
    }

    fn scan_free_space(&mut self) -> InstallResult<PhaseResult> {
        let device = &self.ctx.config.device;
        let table = self.ctx.host.partition_table(device).map_err(|e| {
            InstallError::execution(format!("Read partition table of {}", device), e)
        })?;

        let mut items = vec![format!(
            "{} table, {}-byte sectors, {} partition(s)",
            table.label,
            table.sector_size,
            table.partitions.len()
        )];
        items.extend(table.free.iter().map(|r| format!("free: {}", r)));
        let region = select_largest(&table.free, self.ctx.config.min_free_mib)?;
        log::info!("Largest free region: {}", region);
        items.push(format!("selected: {}", region));

        self.ctx.region = Some(region);
        self.ctx.table = Some(table);
        Ok(PhaseResult::Done(items))
    }

    fn plan(&mut self) -> InstallResult<PhaseResult> {
        let config = self.ctx.config;
        let plan = plan_partitions(
            self.ctx.region()?,
            config.root_size_mib,
            config.alloc_size_mib,
            config.home_min_mib,
        )?;

        let mut items = vec![
            format!("allocation: {}", plan.alloc),
            format!("root: {}", plan.root),
        ];
        match plan.home {
            Some(home) => items.push(format!("home: {}", home)),
            None => {
                if plan.root.size_mib() != config.root_size_mib {
                    log::warn!(
                        "Root is {} instead of the requested {}",
                        format_mib(plan.root.size_mib()),
                        format_mib(config.root_size_mib)
                    );
                }
                items.push("home: none, root also serves as home".to_string());
            }
        }

        self.ctx.plan = Some(plan);
        Ok(PhaseResult::Done(items))
    }

    fn validate_numbering(&mut self, phase: Phase) -> InstallResult<PhaseResult> {
        let config = self.ctx.config;
        let plan = self.ctx.plan()?;
        let used = self.ctx.table()?.used_numbers();

        let resolution = resolve_numbers(
            config.numbering,
            &used,
            config.root_partition_number,
            config.home_partition_number,
            plan.home.is_some(),
        )?;

        let mut items = vec![
            format!(
                "in use: {}",
                used.iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            format!("policy: {}", config.numbering),
            format!("root: #{}", resolution.numbers.root),
        ];
        if let Some(home) = resolution.numbers.home {
            items.push(format!("home: #{}", home));
        }

        if !resolution.substitutions.is_empty() {
            let described: Vec<String> = resolution
                .substitutions
                .iter()
                .map(|s| format!("{} #{} -> #{}", s.role, s.requested, s.assigned))
                .collect();
            log::warn!(
                "Configured partition numbers are taken: {}",
                described.join(", ")
            );
            self.gate(
                phase,
                &format!("Use substituted partition numbers ({})?", described.join(", ")),
            )?;
            items.extend(described.into_iter().map(|d| format!("substituted: {}", d)));
        }

        self.ctx.numbers = Some(resolution.numbers);
        Ok(PhaseResult::Done(items))
    }

    fn create(&mut self, phase: Phase) -> InstallResult<PhaseResult> {
        let plan = self.ctx.plan()?;
        let numbers = self.ctx.numbers()?;
        let sector_size = self.ctx.table()?.sector_size;
        let device = self.ctx.config.device.clone();

        let layout = match plan.home {
            Some(home) => format!("root {} and home {}", plan.root, home),
            None => format!("root {}", plan.root),
        };
        self.gate(
            phase,
            &format!(
                "Create {} on {}? The partition table is saved to {} first.",
                layout,
                device,
                self.ctx.rollback.state().backup_path.display()
            ),
        )?;

        self.ctx.rollback.capture(self.ctx.executor)?;
        self.ctx.rollback.mark_table_modified();
        let created = create_partitions(self.ctx.executor, &device, sector_size, &plan, numbers)?;

        let mut items = Vec::new();
        let state = self.ctx.rollback.state();
        if state.captured {
            items.push(format!("backup: {}", state.backup_path.display()));
        }
        items.extend(
            created
                .iter()
                .map(|d| format!("created: {} ({})", d.path, format_mib(d.size_mib))),
        );

        self.ctx.created = created;
        Ok(PhaseResult::Done(items))
    }

    fn detect(&mut self) -> InstallResult<PhaseResult> {
        let ctx = &self.ctx;
        let plan = ctx.plan()?;
        let before = ctx.table()?;

        let (candidates, preserved): (Vec<BlockDevice>, Vec<BlockDevice>) = if ctx.dry_run() {
            log::info!("[DRY RUN] matching against the predicted devices");
            (ctx.created.clone(), before.partitions.clone())
        } else {
            let after = ctx.host.partition_table(&ctx.config.device).map_err(|e| {
                InstallError::execution("Re-read partition table after creation", e)
            })?;
            let known: HashSet<&str> = before.partitions.iter().map(|p| p.path.as_str()).collect();
            after
                .partitions
                .into_iter()
                .partition(|d| !known.contains(d.path.as_str()))
        };

        if let Some(gone) = before
            .partitions
            .iter()
            .find(|p| !preserved.iter().any(|d| d.path == p.path))
        {
            return Err(InstallError::Detection(format!(
                "existing partition {} is no longer present",
                gone.path
            )));
        }

        let mut handles =
            detect_new_partitions(&plan, &candidates, &preserved, ctx.config.match_tolerance_mib)?;
        let exclude: Vec<String> = handles.iter().map(|h| h.device.clone()).collect();
        let boot = resolve_boot(
            ctx.host,
            ctx.config.boot_partition.as_deref(),
            &preserved,
            &exclude,
        )?;
        match ctx.host.filesystem_type(&boot.device) {
            Ok(Some(fs)) if fs != "vfat" => {
                log::warn!("Boot partition {} is {}, expected vfat", boot.device, fs)
            }
            Ok(_) => {}
            Err(e) => log::debug!("Could not probe {}: {:#}", boot.device, e),
        }

        let mut items: Vec<String> = handles
            .iter()
            .chain(std::iter::once(&boot))
            .map(|h| format!("{}: {}", h.role, h.device))
            .collect();

        handles.extend(
            preserved
                .iter()
                .filter(|d| d.path != boot.device)
                .map(|d| PartitionHandle::from_device(d, Role::Preserved)),
        );
        items.push(format!(
            "preserved: {} partition(s)",
            handles.iter().filter(|h| h.role == Role::Preserved).count()
        ));
        handles.push(boot);

        self.ctx.handles = handles;
        Ok(PhaseResult::Done(items))
    }

    fn format(&mut self, phase: Phase) -> InstallResult<PhaseResult> {
        let targets: Vec<PartitionHandle> = [Role::Root, Role::Home]
            .iter()
            .filter_map(|role| self.ctx.handle(*role).cloned())
            .collect();

        let listed: Vec<String> = targets
            .iter()
            .map(|h| format!("{} ({})", h.device, h.role))
            .collect();
        self.gate(
            phase,
            &format!(
                "Format {} as ext4? Everything on them is erased.",
                listed.join(", ")
            ),
        )?;

        let mut items = Vec::new();
        for handle in &targets {
            self.ctx
                .executor
                .run(Command::new("mkfs.ext4").arg("-F").arg(&handle.device))
                .map_err(|e| {
                    InstallError::execution(
                        format!("Format {} partition {}", handle.role, handle.device),
                        e,
                    )
                })?;
            items.push(format!("ext4: {}", handle.device));
        }
        Ok(PhaseResult::Done(items))
    }

    fn mount(&mut self) -> InstallResult<PhaseResult> {
        let root = self.ctx.require_handle(Role::Root)?.device.clone();
        let home = self.ctx.handle(Role::Home).map(|h| h.device.clone());
        let boot = self.ctx.require_handle(Role::Boot)?.device.clone();

        let target = self.ctx.target_for(Role::Root);
        self.ctx
            .mounts
            .mount(&root, &target, "defaults")
            .map_err(|e| InstallError::execution(format!("Mount root partition {}", root), e))?;

        if let Some(home) = home {
            let target = self.ctx.target_for(Role::Home);
            self.ctx
                .mounts
                .mount(&home, &target, "defaults")
                .map_err(|e| {
                    InstallError::execution(format!("Mount home partition {}", home), e)
                })?;
        }

        let boot_target = self.ctx.target_for(Role::Boot);
        let options = self.ctx.mounts.mount_boot(&boot, &boot_target)?;
        if options == "ro" {
            if !self.ctx.dry_run() {
                let loader = boot_target.join(paths::FOREIGN_BOOTLOADER);
                if self.ctx.host.path_exists(&loader) {
                    log::info!("{} is readable", loader.display());
                } else {
                    log::warn!("{} not found on {}", paths::FOREIGN_BOOTLOADER, boot);
                }
            }
            self.ctx.mounts.remount_rw(&boot_target).map_err(|e| {
                InstallError::execution("Remount boot partition read-write", e)
            })?;
        }

        let items = self
            .ctx
            .mounts
            .records()
            .iter()
            .map(|r| format!("{} on {} ({})", r.source, r.target.display(), r.options))
            .collect();
        Ok(PhaseResult::Done(items))
    }

    fn generate_fstab(&mut self) -> InstallResult<PhaseResult> {
        let entries = fstab::entries_for(
            self.ctx.host,
            self.ctx.mount_root(),
            self.ctx.mounts.records(),
        );
        let items = entries.iter().map(|e| e.line()).collect();

        // pacman owns /etc/fstab; it is written once the base system is in place.
        self.ctx.fstab = Some(fstab::render(&entries));
        Ok(PhaseResult::Done(items))
    }

    fn install_base(&mut self) -> InstallResult<PhaseResult> {
        let config = self.ctx.config;
        let packages = config.base_packages();

        let attempts = base::populate_base(
            self.ctx.executor,
            self.ctx.mount_root(),
            &packages,
            config.base_attempts,
            Duration::from_secs(config.base_backoff_secs),
        )?;

        let content = self.ctx.fstab.clone().ok_or_else(|| {
            InstallError::execution("Write fstab", anyhow::anyhow!("fstab was not generated"))
        })?;
        let path = fstab::write_fstab(self.ctx.executor, self.ctx.mount_root(), &content)?;

        Ok(PhaseResult::Done(vec![
            format!("packages: {}", packages.join(" ")),
            format!("pacstrap attempts: {}/{}", attempts, config.base_attempts),
            format!("fstab: {}", path.display()),
        ]))
    }

    fn configure(&mut self) -> InstallResult<PhaseResult> {
        let config = self.ctx.config;
        let root = self.ctx.require_handle(Role::Root)?.device.clone();
        let boot = self.ctx.require_handle(Role::Boot)?.device.clone();
        let dry_run = self.ctx.dry_run();

        let partuuid = match self.ctx.host.partuuid(&root) {
            Ok(Some(partuuid)) => partuuid,
            Ok(None) | Err(_) if dry_run => {
                log::info!("[DRY RUN] PARTUUID of {} is not known yet", root);
                format!("<partuuid of {}>", root)
            }
            Ok(None) => {
                return Err(InstallError::Detection(format!(
                    "{} has no PARTUUID",
                    root
                )));
            }
            Err(e) => {
                return Err(InstallError::execution(
                    format!("Read PARTUUID of {}", root),
                    e,
                ));
            }
        };

        let vars = ScriptVars {
            root_partuuid: partuuid.clone(),
            boot_device: boot,
            username: config.username.clone(),
            hostname: config.hostname.clone(),
            locale: config.locale.clone(),
            timezone: config.timezone.clone(),
            keymap: config.keymap.clone(),
            kernel_options: config.kernel_options.clone(),
            secure_boot: config.secure_boot,
        };
        let script = chroot::build_script(&vars)?;
        chroot::run_chroot_config(self.ctx.executor, self.ctx.mount_root(), &script)?;

        self.ctx.root_partuuid = Some(partuuid.clone());
        Ok(PhaseResult::Done(vec![
            format!("script: {}", paths::CHROOT_SCRIPT),
            format!("loader entry: root=PARTUUID={}", partuuid),
            format!(
                "Secure Boot: {}",
                if config.secure_boot { "keys enrolled" } else { "not requested" }
            ),
        ]))
    }

    fn swapfile(&mut self) -> InstallResult<PhaseResult> {
        let size = self.ctx.config.swapfile_mib;
        if size == 0 {
            return Ok(PhaseResult::Skipped(
                "disabled (swapfile_mib = 0)".to_string(),
            ));
        }
        if !self.gate(
            Phase::OptionalSwapfile,
            &format!("Create a {} swapfile?", format_mib(size)),
        )? {
            return Ok(PhaseResult::Skipped("declined".to_string()));
        }

        let path = swap::create_swapfile(self.ctx.executor, self.ctx.mount_root(), size)?;
        Ok(PhaseResult::Done(vec![format!(
            "{} ({})",
            in_target(self.ctx.mount_root(), &path).display(),
            format_mib(size)
        )]))
    }

    fn verify(&mut self) -> InstallResult<PhaseResult> {
        let checks = verify::verify_installation(
            self.ctx.host,
            self.ctx.dry_run(),
            self.ctx.mount_root(),
            self.ctx.mounts.records(),
            self.ctx.root_partuuid.as_deref(),
        )?;
        Ok(PhaseResult::Done(checks))
    }

    fn unmount(&mut self) -> InstallResult<PhaseResult> {
        let report = self.ctx.mounts.unmount_all();

        let mut items: Vec<String> = report
            .unmounted
            .iter()
            .map(|t| format!("unmounted {}", t.display()))
            .collect();
        items.extend(
            report
                .tolerated
                .iter()
                .map(|t| format!("{} was not mounted", t.display())),
        );
        for (target, error) in &report.failed {
            log::warn!("{} is still mounted: {}", target.display(), error);
            items.push(format!("still mounted: {} ({})", target.display(), error));
        }
        Ok(PhaseResult::Done(items))
    }

    fn summary(&mut self) -> InstallResult<PhaseResult> {
        let ctx = &self.ctx;
        let mut items = vec![format!(
            "{} on {}",
            if ctx.dry_run() {
                "Simulated installation"
            } else {
                "Installed"
            },
            ctx.config.device
        )];
        items.extend(
            ctx.handles
                .iter()
                .filter(|h| h.role != Role::Preserved)
                .map(|h| format!("{}: {}", h.role, h.device)),
        );
        let state = ctx.rollback.state();
        if state.captured {
            items.push(format!("partition table backup: {}", state.backup_path.display()));
        }
        if !ctx.dry_run() {
            items.push("reboot and pick \"Arch Linux\" in the boot menu".to_string());
        }
        Ok(PhaseResult::Done(items))
    }
}
