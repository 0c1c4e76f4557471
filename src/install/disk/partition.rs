use std::collections::BTreeSet;
use std::process::Command;

use super::types::{BlockDevice, DiskRegion, PartitionNumbers, PartitionPlan, Role};
use super::util::{get_part_path, mib_to_sectors};
use crate::install::config::NumberingPolicy;
use crate::install::error::{InstallError, InstallResult};
use crate::install::execution::Executor;

/// GPT "Linux filesystem data"
pub const LINUX_FS_TYPE: &str = "0FC63DAF-8483-4772-8E79-3D69D8477DE4";
/// Highest entry of a default-sized GPT
pub const MAX_GPT_ENTRIES: u32 = 128;

/// A configured partition number that had to be replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Substitution {
    pub role: Role,
    pub requested: u32,
    pub assigned: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberResolution {
    pub numbers: PartitionNumbers,
    pub substitutions: Vec<Substitution>,
}

fn lowest_free(taken: &BTreeSet<u32>) -> InstallResult<u32> {
    (1..=MAX_GPT_ENTRIES)
        .find(|n| !taken.contains(n))
        .ok_or_else(|| InstallError::Config("no free partition table entry left".to_string()))
}

fn resolve_one(
    role: Role,
    requested: Option<u32>,
    policy: NumberingPolicy,
    taken: &mut BTreeSet<u32>,
    substitutions: &mut Vec<Substitution>,
) -> InstallResult<u32> {
    let number = match requested {
        Some(n) if (1..=MAX_GPT_ENTRIES).contains(&n) && !taken.contains(&n) => n,
        Some(n) => match policy {
            NumberingPolicy::Strict => {
                return Err(InstallError::Config(format!(
                    "partition number {} for {} is already in use or out of range; \
                     existing partitions are never overwritten",
                    n, role
                )));
            }
            NumberingPolicy::NextAvailable => {
                let assigned = lowest_free(taken)?;
                substitutions.push(Substitution {
                    role,
                    requested: n,
                    assigned,
                });
                assigned
            }
        },
        None => lowest_free(taken)?,
    };
    taken.insert(number);
    Ok(number)
}

/// Decide which partition numbers root (and home, when planned) are created with.
pub fn resolve_numbers(
    policy: NumberingPolicy,
    used: &[u32],
    requested_root: Option<u32>,
    requested_home: Option<u32>,
    wants_home: bool,
) -> InstallResult<NumberResolution> {
    let mut taken: BTreeSet<u32> = used.iter().copied().collect();
    let mut substitutions = Vec::new();

    let root = resolve_one(Role::Root, requested_root, policy, &mut taken, &mut substitutions)?;
    let home = if wants_home {
        Some(resolve_one(
            Role::Home,
            requested_home,
            policy,
            &mut taken,
            &mut substitutions,
        )?)
    } else {
        None
    };

    Ok(NumberResolution {
        numbers: PartitionNumbers { root, home },
        substitutions,
    })
}

pub fn sfdisk_line(region: DiskRegion, sector_size: u64) -> String {
    format!(
        "start={}, size={}, type={}\n",
        mib_to_sectors(region.start_mib, sector_size),
        mib_to_sectors(region.size_mib(), sector_size),
        LINUX_FS_TYPE
    )
}

fn create_one(
    executor: &dyn Executor,
    disk: &str,
    number: u32,
    region: DiskRegion,
    sector_size: u64,
    role: Role,
) -> InstallResult<BlockDevice> {
    log::info!(
        "Creating {} partition #{} at {}",
        role,
        number,
        region
    );
    executor
        .run_with_input(
            Command::new("sfdisk")
                .arg("--no-reread")
                .arg("-N")
                .arg(number.to_string())
                .arg(disk),
            &sfdisk_line(region, sector_size),
        )
        .map_err(|e| InstallError::execution(format!("Create {} partition", role), e))?;

    Ok(BlockDevice {
        path: get_part_path(disk, number),
        number: Some(number),
        start_mib: region.start_mib,
        size_mib: region.size_mib(),
    })
}

/// Create root, then home if planned. Returns the devices as they are expected to appear.
///
/// Any failure aborts; nothing is retried once the table has been touched.
pub fn create_partitions(
    executor: &dyn Executor,
    disk: &str,
    sector_size: u64,
    plan: &PartitionPlan,
    numbers: PartitionNumbers,
) -> InstallResult<Vec<BlockDevice>> {
    let mut created = vec![create_one(
        executor,
        disk,
        numbers.root,
        plan.root,
        sector_size,
        Role::Root,
    )?];

    if let Some(home) = plan.home {
        let number = numbers.home.ok_or_else(|| {
            InstallError::Config("home partition planned without a partition number".to_string())
        })?;
        created.push(create_one(
            executor,
            disk,
            number,
            home,
            sector_size,
            Role::Home,
        )?);
    }

    executor
        .run(Command::new("partprobe").arg(disk))
        .map_err(|e| InstallError::execution("Re-read partition table", e))?;
    executor
        .run(Command::new("udevadm").arg("settle"))
        .map_err(|e| InstallError::execution("Wait for device nodes", e))?;

    Ok(created)
}
