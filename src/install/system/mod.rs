//! Read-only probes of the host.
//!
//! Nothing here mutates the disk, which is why these calls are not routed through
//! the dry-run aware executor. The foreign bootloader probe mounts candidates
//! read-only and always unmounts them again.

use anyhow::{Context, Result};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::process::Command;

mod sfdisk;

pub use sfdisk::{PartitionTable, parse_partition_table};

use super::execution::paths::FOREIGN_BOOTLOADER;

pub trait HostSystem {
    /// Free regions and partitions of `disk`
    fn partition_table(&self, disk: &str) -> Result<PartitionTable>;

    fn is_block_device(&self, path: &str) -> bool;

    fn is_uefi(&self) -> bool;

    fn has_tool(&self, name: &str) -> bool;

    fn is_mount_point(&self, path: &Path) -> bool;

    fn filesystem_type(&self, device: &str) -> Result<Option<String>>;

    fn uuid(&self, device: &str) -> Result<Option<String>>;

    fn partuuid(&self, device: &str) -> Result<Option<String>>;

    /// Whether `device` holds the preserved OS's bootloader
    fn has_foreign_bootloader(&self, device: &str) -> Result<bool>;

    fn path_exists(&self, path: &Path) -> bool;

    fn read_file(&self, path: &Path) -> Result<String>;
}

pub struct LinuxHost;

impl LinuxHost {
    fn blkid_value(&self, tag: &str, device: &str) -> Result<Option<String>> {
        let output = Command::new("blkid")
            .args(["-o", "value", "-s", tag, device])
            .output()
            .context("Failed to run blkid")?;

        // blkid exits with 2 when the tag is absent
        if !output.status.success() {
            return Ok(None);
        }

        let value = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .to_string();
        Ok((!value.is_empty()).then_some(value))
    }

    fn disk_size_bytes(&self, disk: &str) -> Option<u64> {
        let output = Command::new("lsblk")
            .args(["-b", "-d", "-n", "-o", "SIZE", disk])
            .output()
            .ok()?;
        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }
}

impl HostSystem for LinuxHost {
    fn partition_table(&self, disk: &str) -> Result<PartitionTable> {
        let output = Command::new("sfdisk")
            .args(["-J", disk])
            .output()
            .context("Failed to run sfdisk -J")?;

        if !output.status.success() {
            anyhow::bail!(
                "sfdisk could not read the partition table of {}: {}",
                disk,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let json = String::from_utf8_lossy(&output.stdout);
        parse_partition_table(disk, &json, self.disk_size_bytes(disk))
    }

    fn is_block_device(&self, path: &str) -> bool {
        std::fs::metadata(path)
            .map(|m| m.file_type().is_block_device())
            .unwrap_or(false)
    }

    fn is_uefi(&self) -> bool {
        Path::new("/sys/firmware/efi").exists()
    }

    fn has_tool(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }

    fn is_mount_point(&self, path: &Path) -> bool {
        Command::new("mountpoint")
            .arg("-q")
            .arg(path)
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn filesystem_type(&self, device: &str) -> Result<Option<String>> {
        self.blkid_value("TYPE", device)
    }

    fn uuid(&self, device: &str) -> Result<Option<String>> {
        self.blkid_value("UUID", device)
    }

    fn partuuid(&self, device: &str) -> Result<Option<String>> {
        self.blkid_value("PARTUUID", device)
    }

    fn has_foreign_bootloader(&self, device: &str) -> Result<bool> {
        let Some(probe) = ProbeMount::mount_read_only(device)? else {
            log::debug!("{} is not mountable, skipping", device);
            return Ok(false);
        };
        let found = probe.path().join(FOREIGN_BOOTLOADER).is_file();
        log::debug!(
            "{}: {} {}",
            device,
            FOREIGN_BOOTLOADER,
            if found { "found" } else { "not found" }
        );
        Ok(found)
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

/// Temporary read-only mount, unmounted when dropped
struct ProbeMount {
    dir: tempfile::TempDir,
}

impl ProbeMount {
    fn mount_read_only(device: &str) -> Result<Option<Self>> {
        let dir = tempfile::Builder::new()
            .prefix("dualstrap-probe-")
            .tempdir()
            .context("Failed to create probe mount point")?;

        let status = Command::new("mount")
            .args(["-o", "ro", device])
            .arg(dir.path())
            .status()
            .context("Failed to run mount")?;

        Ok(status.success().then_some(Self { dir }))
    }

    fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}

impl Drop for ProbeMount {
    fn drop(&mut self) {
        let result = Command::new("umount").arg(self.dir.path()).status();
        if !matches!(result, Ok(status) if status.success()) {
            log::warn!("Failed to unmount probe mount {}", self.dir.path().display());
        }
    }
}
