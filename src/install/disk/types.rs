//! Core data structures for dual boot partitioning

use serde::{Deserialize, Serialize};

pub const MIB: u64 = 1024 * 1024;

/// Format a MiB count as a human-readable size
pub fn format_mib(mib: u64) -> String {
    const GIB: u64 = 1024;
    const TIB: u64 = GIB * 1024;

    if mib >= TIB {
        format!("{:.1} TiB", mib as f64 / TIB as f64)
    } else if mib >= GIB {
        format!("{:.1} GiB", mib as f64 / GIB as f64)
    } else {
        format!("{} MiB", mib)
    }
}

/// Contiguous span of the disk in MiB, `end` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiskRegion {
    pub start_mib: u64,
    pub end_mib: u64,
}

impl DiskRegion {
    /// Returns `None` unless `end > start`.
    pub fn new(start_mib: u64, end_mib: u64) -> Option<Self> {
        (end_mib > start_mib).then_some(Self { start_mib, end_mib })
    }

    pub fn size_mib(&self) -> u64 {
        self.end_mib - self.start_mib
    }
}

impl std::fmt::Display for DiskRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{} MiB ({})",
            self.start_mib,
            self.end_mib,
            format_mib(self.size_mib())
        )
    }
}

/// Root/home layout inside the allocated part of a free region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPlan {
    pub alloc: DiskRegion,
    pub root: DiskRegion,
    /// `None` when root also serves as home
    pub home: Option<DiskRegion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Boot,
    Root,
    Home,
    /// Belongs to the existing OS; only ever checked for existence
    Preserved,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Boot => write!(f, "boot"),
            Role::Root => write!(f, "root"),
            Role::Home => write!(f, "home"),
            Role::Preserved => write!(f, "preserved"),
        }
    }
}

/// A partition as enumerated on the disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDevice {
    pub path: String,
    pub number: Option<u32>,
    pub start_mib: u64,
    pub size_mib: u64,
}

/// A partition with the role it plays in this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionHandle {
    pub device: String,
    pub role: Role,
    pub start_mib: u64,
    pub size_mib: u64,
}

impl PartitionHandle {
    pub fn from_device(device: &BlockDevice, role: Role) -> Self {
        Self {
            device: device.path.clone(),
            role,
            start_mib: device.start_mib,
            size_mib: device.size_mib,
        }
    }
}

/// Partition numbers the creation step uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionNumbers {
    pub root: u32,
    pub home: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_requires_positive_size() {
        assert!(DiskRegion::new(10, 10).is_none());
        assert!(DiskRegion::new(10, 5).is_none());
        assert_eq!(DiskRegion::new(200, 1000).unwrap().size_mib(), 800);
    }

    #[test]
    fn test_format_mib() {
        assert_eq!(format_mib(512), "512 MiB");
        assert_eq!(format_mib(32 * 1024), "32.0 GiB");
        assert_eq!(format_mib(2 * 1024 * 1024), "2.0 TiB");
    }
}
