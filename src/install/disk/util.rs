use anyhow::{Context, Result};

use super::types::MIB;

/// Device path of partition `part_num` on `disk` (nvme0n1 -> nvme0n1p1, sda -> sda1)
pub fn get_part_path(disk: &str, part_num: u32) -> String {
    if disk.chars().last().is_some_and(|c| c.is_ascii_digit()) {
        format!("{}p{}", disk, part_num)
    } else {
        format!("{}{}", disk, part_num)
    }
}

pub fn parse_partition_number(disk_path: &str, partition_path: &str) -> Result<u32> {
    let disk_name = disk_path.strip_prefix("/dev/").unwrap_or(disk_path);
    let part_name = partition_path
        .strip_prefix("/dev/")
        .unwrap_or(partition_path);

    if !part_name.starts_with(disk_name) {
        anyhow::bail!(
            "Partition {} does not belong to disk {}",
            partition_path,
            disk_path
        );
    }

    let suffix = &part_name[disk_name.len()..];
    let suffix = suffix.strip_prefix('p').unwrap_or(suffix);
    suffix
        .parse::<u32>()
        .context("Failed to parse partition number")
}

pub fn mib_to_sectors(mib: u64, sector_size: u64) -> u64 {
    mib * MIB / sector_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_part_path() {
        assert_eq!(get_part_path("/dev/sda", 3), "/dev/sda3");
        assert_eq!(get_part_path("/dev/nvme0n1", 5), "/dev/nvme0n1p5");
        assert_eq!(get_part_path("/dev/mmcblk0", 2), "/dev/mmcblk0p2");
    }

    #[test]
    fn test_parse_partition_number() {
        assert_eq!(parse_partition_number("/dev/sda", "/dev/sda12").unwrap(), 12);
        assert_eq!(
            parse_partition_number("/dev/nvme0n1", "/dev/nvme0n1p3").unwrap(),
            3
        );
        assert!(parse_partition_number("/dev/sda", "/dev/sdb1").is_err());
        assert!(parse_partition_number("/dev/sda", "/dev/sda").is_err());
    }

    #[test]
    fn test_mib_to_sectors() {
        assert_eq!(mib_to_sectors(1, 512), 2048);
        assert_eq!(mib_to_sectors(1, 4096), 256);
    }
}
