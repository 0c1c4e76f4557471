//! sfdisk JSON parsing for free space and partition enumeration

use crate::install::disk::types::{BlockDevice, DiskRegion, MIB};
use crate::install::disk::util::parse_partition_number;
use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SfdiskOutput {
    pub partitiontable: SfdiskPartitionTable,
}

#[derive(Debug, Deserialize)]
pub struct SfdiskPartitionTable {
    pub label: Option<String>,
    pub firstlba: Option<u64>,
    pub lastlba: Option<u64>,
    pub size: Option<u64>,
    pub sectorsize: u64,
    pub partitions: Option<Vec<SfdiskPartition>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SfdiskPartition {
    pub node: Option<String>,
    pub start: u64,
    pub size: u64,
}

/// What the target disk looks like right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
    pub label: String,
    pub sector_size: u64,
    pub free: Vec<DiskRegion>,
    pub partitions: Vec<BlockDevice>,
}

impl PartitionTable {
    pub fn used_numbers(&self) -> Vec<u32> {
        self.partitions.iter().filter_map(|p| p.number).collect()
    }
}

/// Gaps smaller than this are alignment leftovers, not free space.
const MIN_GAP_BYTES: u64 = MIB;

fn sectors_to_region(start: u64, sectors: u64, sector_size: u64) -> Option<DiskRegion> {
    // Round inwards so a region never overlaps a neighbouring partition.
    let start_bytes = start * sector_size;
    let end_bytes = (start + sectors) * sector_size;
    DiskRegion::new(start_bytes.div_ceil(MIB), end_bytes / MIB)
}

pub fn parse_partition_table(
    disk: &str,
    json: &str,
    disk_size_bytes: Option<u64>,
) -> anyhow::Result<PartitionTable> {
    let output: SfdiskOutput =
        serde_json::from_str(json).context("Failed to parse sfdisk JSON output")?;

    let pt = output.partitiontable;
    let sector_size = pt.sectorsize;
    if sector_size == 0 {
        anyhow::bail!("sfdisk reported a sector size of 0 for {}", disk);
    }

    let disk_size_sectors = disk_size_bytes.map(|b| b / sector_size);
    let mut raw = pt.partitions.unwrap_or_default();

    let first_lba = pt
        .firstlba
        .or_else(|| raw.iter().map(|p| p.start).min())
        .unwrap_or(0);

    let last_lba = pt
        .lastlba
        .or_else(|| pt.size.map(|s| s.saturating_sub(1)))
        .or_else(|| disk_size_sectors.map(|s| s.saturating_sub(1)))
        .or_else(|| {
            raw.iter()
                .map(|p| p.start.saturating_add(p.size).saturating_sub(1))
                .max()
        })
        .map(|l| l.max(first_lba))
        .unwrap_or(first_lba);

    raw.sort_by_key(|p| p.start);

    let min_gap_sectors = MIN_GAP_BYTES / sector_size;
    let mut free = Vec::new();
    let mut current_sector = first_lba;

    for partition in &raw {
        if partition.start > current_sector {
            let gap_sectors = partition.start - current_sector;
            if gap_sectors > min_gap_sectors
                && let Some(region) = sectors_to_region(current_sector, gap_sectors, sector_size)
            {
                free.push(region);
            }
        }
        current_sector = current_sector.max(partition.start + partition.size);
    }

    // lastlba is inclusive
    if current_sector <= last_lba {
        let gap_sectors = (last_lba - current_sector) + 1;
        if gap_sectors > min_gap_sectors
            && let Some(region) = sectors_to_region(current_sector, gap_sectors, sector_size)
        {
            free.push(region);
        }
    }

    let partitions = raw
        .iter()
        .filter_map(|p| {
            let path = p.node.clone()?;
            Some(BlockDevice {
                number: parse_partition_number(disk, &path).ok(),
                path,
                start_mib: p.start * sector_size / MIB,
                size_mib: p.size * sector_size / MIB,
            })
        })
        .collect();

    Ok(PartitionTable {
        label: pt.label.unwrap_or_else(|| "unknown".to_string()),
        sector_size,
        free,
        partitions,
    })
}
