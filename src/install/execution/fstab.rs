use std::path::{Path, PathBuf};

use super::Executor;
use super::paths::{self, chroot_path, in_target};
use crate::install::disk::mount::MountRecord;
use crate::install::error::{InstallError, InstallResult};
use crate::install::system::HostSystem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    pub spec: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
    pub options: String,
    pub pass: u8,
}

impl FstabEntry {
    pub fn line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t0 {}",
            self.spec,
            self.mount_point.display(),
            self.fs_type,
            self.options,
            self.pass
        )
    }
}

pub fn swapfile_line() -> String {
    format!("/{}\tnone\tswap\tdefaults\t0 0\n", paths::SWAPFILE)
}

pub fn render(entries: &[FstabEntry]) -> String {
    let mut out = String::from("# Static information about the filesystems, generated by dualstrap\n");
    for entry in entries {
        out.push_str(&entry.line());
        out.push('\n');
    }
    out
}

/// One entry per tracked mount, in mount order.
pub fn entries_for(
    host: &dyn HostSystem,
    mount_root: &Path,
    records: &[MountRecord],
) -> Vec<FstabEntry> {
    let boot_target = mount_root.join(paths::BOOT_MOUNT);

    records
        .iter()
        .map(|record| {
            let spec = match host.uuid(&record.source) {
                Ok(Some(uuid)) => format!("UUID={}", uuid),
                _ => {
                    log::warn!(
                        "No UUID for {}, using the device path in fstab",
                        record.source
                    );
                    record.source.clone()
                }
            };
            let mount_point = in_target(mount_root, &record.target);

            if record.target == boot_target {
                FstabEntry {
                    spec,
                    mount_point,
                    fs_type: "vfat".to_string(),
                    options: "rw,umask=0077".to_string(),
                    pass: 2,
                }
            } else {
                let pass = if record.target == mount_root { 1 } else { 2 };
                FstabEntry {
                    spec,
                    mount_point,
                    fs_type: "ext4".to_string(),
                    options: "rw,relatime".to_string(),
                    pass,
                }
            }
        })
        .collect()
}

/// Write a rendered table to `<mount_root>/etc/fstab`, replacing the packaged default.
pub fn write_fstab(
    executor: &dyn Executor,
    mount_root: &Path,
    content: &str,
) -> InstallResult<PathBuf> {
    let path = chroot_path(mount_root, "/etc/fstab");

    log::info!("Writing {}", path.display());
    executor
        .write_file(&path, content)
        .map_err(|e| InstallError::execution("Write fstab", e))?;

    Ok(path)
}
