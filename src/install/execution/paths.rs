use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "/etc/dualstrap/config.toml";
pub const DRY_RUN_FLAG: &str = "/etc/dualstrap/dryrun";
pub const MOUNT_ROOT: &str = "/mnt";
pub const BACKUP_DIR: &str = "/var/lib/dualstrap";
pub const LOG_DIR: &str = "/var/log/dualstrap";

/// Location of the generated configuration script, relative to the new root.
pub const CHROOT_SCRIPT: &str = "/root/dualstrap-chroot.sh";
/// Bootloader of the preserved OS, relative to the boot partition root.
pub const FOREIGN_BOOTLOADER: &str = "EFI/Microsoft/Boot/bootmgfw.efi";
/// Loader entry of the new OS, relative to the boot partition root.
pub const LOADER_ENTRY: &str = "loader/entries/arch.conf";
pub const FOREIGN_LOADER_ENTRY: &str = "loader/entries/windows.conf";

pub const HOME_MOUNT: &str = "home";
pub const BOOT_MOUNT: &str = "boot";
pub const SWAPFILE: &str = "swapfile";

/// Resolve an absolute path of the new system under the mount root.
pub fn chroot_path(mount_root: &Path, path: &str) -> PathBuf {
    mount_root.join(path.trim_start_matches('/'))
}

/// Mount point as seen from inside the new system.
pub fn in_target(mount_root: &Path, target: &Path) -> PathBuf {
    match target.strip_prefix(mount_root) {
        Ok(rel) if rel.as_os_str().is_empty() => PathBuf::from("/"),
        Ok(rel) => Path::new("/").join(rel),
        Err(_) => target.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chroot_path() {
        assert_eq!(
            chroot_path(Path::new("/mnt"), "/etc/fstab"),
            PathBuf::from("/mnt/etc/fstab")
        );
        assert_eq!(
            chroot_path(Path::new("/mnt"), CHROOT_SCRIPT),
            PathBuf::from("/mnt/root/dualstrap-chroot.sh")
        );
    }

    #[test]
    fn test_in_target() {
        let root = Path::new("/mnt");
        assert_eq!(in_target(root, Path::new("/mnt")), PathBuf::from("/"));
        assert_eq!(
            in_target(root, Path::new("/mnt/boot")),
            PathBuf::from("/boot")
        );
        assert_eq!(
            in_target(root, Path::new("/elsewhere")),
            PathBuf::from("/elsewhere")
        );
    }
}
