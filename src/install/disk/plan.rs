use super::types::{DiskRegion, PartitionPlan};
use crate::install::error::{InstallError, InstallResult};

/// Gap left between the region start and the root partition.
pub const ALIGNMENT_SLACK_MIB: u64 = 1;

/// Compute the root/home layout inside `region`.
///
/// Root starts after the alignment slack and spans `root_size_mib`. The rest of the
/// allocation becomes home when it is at least `home_min_mib`; otherwise no home is
/// planned and root extends to the end of the allocation.
pub fn plan_partitions(
    region: DiskRegion,
    root_size_mib: u64,
    alloc_size_mib: Option<u64>,
    home_min_mib: u64,
) -> InstallResult<PartitionPlan> {
    let alloc_end = alloc_size_mib
        .map(|size| region.start_mib.saturating_add(size).min(region.end_mib))
        .unwrap_or(region.end_mib);

    let alloc = DiskRegion::new(region.start_mib, alloc_end).ok_or(
        InstallError::InsufficientSpace {
            largest_mib: 0,
            required_mib: ALIGNMENT_SLACK_MIB + 1,
        },
    )?;

    let root_start = alloc.start_mib + ALIGNMENT_SLACK_MIB;
    if root_start >= alloc.end_mib {
        return Err(InstallError::InsufficientSpace {
            largest_mib: alloc.size_mib(),
            required_mib: ALIGNMENT_SLACK_MIB + 1,
        });
    }

    let requested_root_end = root_start.saturating_add(root_size_mib);
    let remainder = alloc.end_mib.saturating_sub(requested_root_end);

    let (root, home) = if remainder >= home_min_mib.max(1) {
        (
            DiskRegion {
                start_mib: root_start,
                end_mib: requested_root_end,
            },
            Some(DiskRegion {
                start_mib: requested_root_end,
                end_mib: alloc.end_mib,
            }),
        )
    } else {
        (
            DiskRegion {
                start_mib: root_start,
                end_mib: alloc.end_mib,
            },
            None,
        )
    };

    Ok(PartitionPlan { alloc, root, home })
}
