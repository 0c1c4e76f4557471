use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Check tools, firmware and the target disk
    Inspect,
    /// Pick the largest free region
    ScanFreeSpace,
    /// Lay out root (and home) inside the region
    Plan,
    /// Resolve partition numbers against the existing table
    ValidateNumberingConflicts,
    /// Back up the table and create root/home
    CreatePartitions,
    /// Map the new devices and the boot partition to roles
    DetectPartitions,
    Format,
    Mount,
    GenerateFstab,
    /// pacstrap, with retries
    InstallBaseSystem,
    /// Locale, account, bootloader, Secure Boot
    RunChrootConfig,
    OptionalSwapfile,
    Verify,
    Unmount,
    Summary,
}

impl Phase {
    pub const ALL: [Phase; 15] = [
        Phase::Inspect,
        Phase::ScanFreeSpace,
        Phase::Plan,
        Phase::ValidateNumberingConflicts,
        Phase::CreatePartitions,
        Phase::DetectPartitions,
        Phase::Format,
        Phase::Mount,
        Phase::GenerateFstab,
        Phase::InstallBaseSystem,
        Phase::RunChrootConfig,
        Phase::OptionalSwapfile,
        Phase::Verify,
        Phase::Unmount,
        Phase::Summary,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Inspect => "inspect",
            Phase::ScanFreeSpace => "scan-free-space",
            Phase::Plan => "plan",
            Phase::ValidateNumberingConflicts => "validate-numbering-conflicts",
            Phase::CreatePartitions => "create-partitions",
            Phase::DetectPartitions => "detect-partitions",
            Phase::Format => "format",
            Phase::Mount => "mount",
            Phase::GenerateFstab => "generate-fstab",
            Phase::InstallBaseSystem => "install-base-system",
            Phase::RunChrootConfig => "run-chroot-config",
            Phase::OptionalSwapfile => "optional-swapfile",
            Phase::Verify => "verify",
            Phase::Unmount => "unmount",
            Phase::Summary => "summary",
        }
    }

    /// 1-based position
    pub fn index(&self) -> usize {
        Self::ALL
            .iter()
            .position(|p| p == self)
            .map(|i| i + 1)
            .unwrap_or_default()
    }

    pub fn total() -> usize {
        Self::ALL.len()
    }

    /// A declined optional phase is skipped instead of aborting the run.
    pub fn is_optional(&self) -> bool {
        matches!(self, Phase::OptionalSwapfile)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointStatus {
    Pending,
    Ok,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub phase: Phase,
    pub status: CheckpointStatus,
    /// Itemized results shown after the phase
    pub items: Vec<String>,
}

impl Checkpoint {
    pub fn pending(phase: Phase) -> Self {
        Self {
            phase,
            status: CheckpointStatus::Pending,
            items: Vec::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.phase.index()
    }

    pub fn total(&self) -> usize {
        Phase::total()
    }

    pub fn label(&self) -> &'static str {
        self.phase.label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_are_numbered_in_order() {
        assert_eq!(Phase::total(), 15);
        assert_eq!(Phase::Inspect.index(), 1);
        assert_eq!(Phase::ValidateNumberingConflicts.index(), 4);
        assert_eq!(Phase::Summary.index(), 15);
        for (i, phase) in Phase::ALL.iter().enumerate() {
            assert_eq!(phase.index(), i + 1);
        }
    }

    #[test]
    fn test_only_swapfile_is_optional() {
        let optional: Vec<_> = Phase::ALL.iter().filter(|p| p.is_optional()).collect();
        assert_eq!(optional, vec![&Phase::OptionalSwapfile]);
    }

    #[test]
    fn test_labels_match_serde_names() {
        for phase in Phase::ALL {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{}\"", phase.label()));
        }
    }
}
