use anyhow::{Context, Result};
use std::path::Path;

use super::paths::{self, chroot_path, in_target};
use crate::install::bootentry::LoaderEntry;
use crate::install::disk::mount::MountRecord;
use crate::install::error::{InstallError, InstallResult};
use crate::install::system::HostSystem;

fn check_fstab(host: &dyn HostSystem, mount_root: &Path, records: &[MountRecord]) -> Result<()> {
    let path = chroot_path(mount_root, "/etc/fstab");
    let content = host.read_file(&path)?;

    let listed: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.split_whitespace().nth(1))
        .collect();

    for record in records {
        let mount_point = in_target(mount_root, &record.target);
        let mount_point = mount_point.to_string_lossy();
        if !listed.contains(&mount_point.as_ref()) {
            anyhow::bail!("{} does not list {}", path.display(), mount_point);
        }
    }
    Ok(())
}

fn check_loader_entry(
    host: &dyn HostSystem,
    mount_root: &Path,
    root_partuuid: &str,
) -> Result<LoaderEntry> {
    let esp = mount_root.join(paths::BOOT_MOUNT);
    let path = esp.join(paths::LOADER_ENTRY);
    let entry = LoaderEntry::parse(
        &host
            .read_file(&path)
            .context("Loader entry for the new system is missing")?,
    );

    let expected = format!("root=PARTUUID={}", root_partuuid);
    let options = entry.options.as_deref().unwrap_or_default();
    if !options.split_whitespace().any(|o| o == expected) {
        anyhow::bail!(
            "{} does not boot {} (options: '{}')",
            path.display(),
            expected,
            options
        );
    }

    let Some(kernel) = &entry.linux else {
        anyhow::bail!("{} has no linux line", path.display());
    };
    let kernel_path = esp.join(kernel.trim_start_matches('/'));
    if !host.path_exists(&kernel_path) {
        anyhow::bail!("Kernel image {} does not exist", kernel_path.display());
    }

    Ok(entry)
}

/// Check the installed system before unmounting. Returns the checks performed.
pub fn verify_installation(
    host: &dyn HostSystem,
    dry_run: bool,
    mount_root: &Path,
    records: &[MountRecord],
    root_partuuid: Option<&str>,
) -> InstallResult<Vec<String>> {
    let mut checks = vec![
        format!(
            "fstab lists {} mount point(s)",
            records.len()
        ),
        "loader entry boots the new root by PARTUUID".to_string(),
        "kernel image referenced by the loader entry exists".to_string(),
    ];

    if dry_run {
        for check in &checks {
            log::info!("[DRY RUN] would verify: {}", check);
        }
        return Ok(checks);
    }

    let partuuid = root_partuuid.ok_or_else(|| {
        InstallError::Detection("root partition has no PARTUUID".to_string())
    })?;

    check_fstab(host, mount_root, records)
        .map_err(|e| InstallError::execution("Verify fstab", e))?;
    let entry = check_loader_entry(host, mount_root, partuuid)
        .map_err(|e| InstallError::execution("Verify loader entry", e))?;
    log::debug!("Verified loader entry '{}'", entry.title);

    checks.iter_mut().for_each(|c| c.insert_str(0, "ok: "));
    Ok(checks)
}
