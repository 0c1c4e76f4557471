//! Mapping enumerated devices to roles.
//!
//! The matcher is pure; gathering candidates and probing boot partitions go
//! through [`HostSystem`] so both can be faked.

use super::types::{BlockDevice, PartitionHandle, PartitionPlan, Role};
use crate::install::error::{InstallError, InstallResult};
use crate::install::execution::paths::FOREIGN_BOOTLOADER;
use crate::install::system::HostSystem;

/// Assign devices to roles by start offset.
///
/// Every `(role, device)` pair within `tolerance_mib` is a candidate. Pairs are
/// taken closest first (ties: role order, then device order), and neither a role
/// nor a device is claimed twice. Returns `(role, index into candidates)`.
pub fn match_roles(
    candidates: &[BlockDevice],
    expected: &[(Role, u64)],
    tolerance_mib: u64,
) -> Vec<(Role, usize)> {
    let mut pairs: Vec<(u64, usize, usize)> = Vec::new();
    for (role_idx, (_, expected_start)) in expected.iter().enumerate() {
        for (dev_idx, device) in candidates.iter().enumerate() {
            let distance = device.start_mib.abs_diff(*expected_start);
            if distance <= tolerance_mib {
                pairs.push((distance, role_idx, dev_idx));
            }
        }
    }
    pairs.sort();

    let mut role_taken = vec![false; expected.len()];
    let mut device_taken = vec![false; candidates.len()];
    let mut matches = Vec::new();

    for (_, role_idx, dev_idx) in pairs {
        if role_taken[role_idx] || device_taken[dev_idx] {
            continue;
        }
        role_taken[role_idx] = true;
        device_taken[dev_idx] = true;
        matches.push((expected[role_idx].0, dev_idx));
    }

    matches
}

fn expected_starts(plan: &PartitionPlan) -> Vec<(Role, u64)> {
    let mut expected = vec![(Role::Root, plan.root.start_mib)];
    if let Some(home) = plan.home {
        expected.push((Role::Home, home.start_mib));
    }
    expected
}

/// Find the root (and home) partitions among the devices created in this run.
///
/// `preserved` are the partitions that existed before; one of them sitting where a
/// new partition was planned means the layout is not what we wrote, so detection
/// fails instead of guessing.
pub fn detect_new_partitions(
    plan: &PartitionPlan,
    created: &[BlockDevice],
    preserved: &[BlockDevice],
    tolerance_mib: u64,
) -> InstallResult<Vec<PartitionHandle>> {
    let expected = expected_starts(plan);

    for (role, start) in &expected {
        if let Some(existing) = preserved
            .iter()
            .find(|d| d.start_mib.abs_diff(*start) <= tolerance_mib)
        {
            return Err(InstallError::Detection(format!(
                "ambiguous {} match: preserved partition {} starts at {} MiB, planned start is {} MiB",
                role, existing.path, existing.start_mib, start
            )));
        }
    }

    let matches = match_roles(created, &expected, tolerance_mib);
    let mut handles = Vec::new();

    for (role, start) in &expected {
        let Some((_, idx)) = matches.iter().find(|(r, _)| r == role) else {
            return Err(InstallError::Detection(format!(
                "no new partition starts within {} MiB of the planned {} start ({} MiB)",
                tolerance_mib, role, start
            )));
        };
        let device = &created[*idx];
        log::info!(
            "Identified {}: {} (start {} MiB, {} MiB)",
            role,
            device.path,
            device.start_mib,
            device.size_mib
        );
        handles.push(PartitionHandle::from_device(device, *role));
    }

    Ok(handles)
}

/// Locate the shared boot partition.
///
/// `partitions` are the preserved partitions of the target disk. The configured
/// device wins when it is one of them. Otherwise every vfat partition (except
/// `exclude`) is probed for the preserved OS's bootloader and the first hit is
/// used. Other filesystems are never mounted. A boot partition is never created.
pub fn resolve_boot(
    host: &dyn HostSystem,
    known: Option<&str>,
    partitions: &[BlockDevice],
    exclude: &[String],
) -> InstallResult<PartitionHandle> {
    if let Some(known) = known {
        match partitions.iter().find(|p| p.path == known) {
            Some(device) if host.is_block_device(known) => {
                log::info!("Using configured boot partition {}", known);
                return Ok(PartitionHandle::from_device(device, Role::Boot));
            }
            Some(_) => log::warn!(
                "Configured boot partition {} is not a block device, probing partitions",
                known
            ),
            None => log::warn!(
                "Configured boot partition {} is not a partition of the target disk, probing partitions",
                known
            ),
        }
    }

    for device in partitions.iter().filter(|d| !exclude.contains(&d.path)) {
        match host.filesystem_type(&device.path) {
            Ok(Some(fs)) if fs == "vfat" => {}
            Ok(fs) => {
                log::debug!(
                    "Not probing {} ({})",
                    device.path,
                    fs.as_deref().unwrap_or("no filesystem")
                );
                continue;
            }
            Err(e) => {
                log::warn!("Could not read the filesystem of {}: {:#}", device.path, e);
                continue;
            }
        }
        match host.has_foreign_bootloader(&device.path) {
            Ok(true) => {
                log::info!(
                    "Found {} on {}, using it as boot partition",
                    FOREIGN_BOOTLOADER,
                    device.path
                );
                return Ok(PartitionHandle::from_device(device, Role::Boot));
            }
            Ok(false) => {}
            Err(e) => log::warn!("Could not probe {}: {:#}", device.path, e),
        }
    }

    Err(InstallError::Detection(format!(
        "no partition contains {}; a boot partition is never created, \
         set boot_partition in the configuration",
        FOREIGN_BOOTLOADER
    )))
}
