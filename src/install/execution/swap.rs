use std::path::{Path, PathBuf};
use std::process::Command;

use super::Executor;
use super::fstab::swapfile_line;
use super::paths::{self, chroot_path};
use crate::install::error::{InstallError, InstallResult};

/// Create a swapfile in the new root and register it in fstab.
pub fn create_swapfile(
    executor: &dyn Executor,
    mount_root: &Path,
    size_mib: u64,
) -> InstallResult<PathBuf> {
    let path = chroot_path(mount_root, paths::SWAPFILE);

    executor
        .run(
            Command::new("mkswap")
                .arg("--file")
                .arg("--size")
                .arg(format!("{}MiB", size_mib))
                .arg(&path),
        )
        .map_err(|e| InstallError::execution("Create swapfile", e))?;

    executor
        .append_file(&chroot_path(mount_root, "/etc/fstab"), &swapfile_line())
        .map_err(|e| InstallError::execution("Add swapfile to fstab", e))?;

    Ok(path)
}
