//! Installer configuration
//!
//! Every field has a default, so an empty (or missing) TOML file yields a usable
//! configuration. CLI flags override the file.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::{InstallError, InstallResult};
use super::execution::paths;

/// How root/home partition numbers are chosen when the configured numbers are taken.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NumberingPolicy {
    /// Substitute the lowest unused numbers (after confirmation).
    #[default]
    NextAvailable,
    /// Refuse to continue when a configured number is already in use.
    Strict,
}

impl std::fmt::Display for NumberingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumberingPolicy::NextAvailable => write!(f, "next-available"),
            NumberingPolicy::Strict => write!(f, "strict"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstallConfig {
    /// Target disk holding the existing OS
    pub device: String,
    /// Known shared boot partition; probed for when absent or missing
    pub boot_partition: Option<String>,
    pub root_size_mib: u64,
    /// Total space to allocate for the new OS; the whole region when unset
    pub alloc_size_mib: Option<u64>,
    /// Smallest free region that is considered usable
    pub min_free_mib: u64,
    /// Smallest remainder worth a separate home partition
    pub home_min_mib: u64,
    pub match_tolerance_mib: u64,
    pub numbering: NumberingPolicy,
    pub root_partition_number: Option<u32>,
    pub home_partition_number: Option<u32>,
    pub username: String,
    pub hostname: String,
    pub locale: String,
    pub timezone: String,
    pub keymap: String,
    pub packages: Vec<String>,
    pub kernel_options: String,
    pub secure_boot: bool,
    /// Swapfile size, 0 disables the swapfile checkpoint
    pub swapfile_mib: u64,
    pub mount_root: PathBuf,
    pub backup_dir: PathBuf,
    pub log_dir: PathBuf,
    pub base_attempts: u32,
    pub base_backoff_secs: u64,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            device: "/dev/nvme0n1".to_string(),
            boot_partition: None,
            root_size_mib: 100 * 1024,
            alloc_size_mib: None,
            min_free_mib: 32 * 1024,
            home_min_mib: 32,
            match_tolerance_mib: 5,
            numbering: NumberingPolicy::default(),
            root_partition_number: None,
            home_partition_number: None,
            username: "user".to_string(),
            hostname: "archlinux".to_string(),
            locale: "en_US.UTF-8".to_string(),
            timezone: "UTC".to_string(),
            keymap: "us".to_string(),
            packages: ["base", "linux", "linux-firmware", "sudo"]
                .into_iter()
                .map(String::from)
                .collect(),
            kernel_options: "rw quiet".to_string(),
            secure_boot: false,
            swapfile_mib: 4096,
            mount_root: PathBuf::from(paths::MOUNT_ROOT),
            backup_dir: PathBuf::from(paths::BACKUP_DIR),
            log_dir: PathBuf::from(paths::LOG_DIR),
            base_attempts: 2,
            base_backoff_secs: 5,
        }
    }
}

impl InstallConfig {
    /// Load from `path`, or from the default location when it exists, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(paths::CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse configuration {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Packages handed to the base-system population step.
    pub fn base_packages(&self) -> Vec<String> {
        let mut packages = self.packages.clone();
        if self.secure_boot && !packages.iter().any(|p| p == "sbctl") {
            packages.push("sbctl".to_string());
        }
        packages
    }

    /// Reject values that would make the run unsafe before anything is touched.
    pub fn validate(&self) -> InstallResult<()> {
        let pattern = |re: &str| {
            Regex::new(re).map_err(|e| InstallError::Config(format!("Invalid pattern: {}", e)))
        };
        let device_re = pattern(r"^/dev/[A-Za-z0-9._/-]+$")?;
        let user_re = pattern(r"^[a-z_][a-z0-9_-]{0,31}$")?;
        let host_re = pattern(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$")?;
        let locale_re = pattern(r"^[A-Za-z0-9_.@-]+$")?;
        let timezone_re = pattern(r"^[A-Za-z0-9_+-]+(/[A-Za-z0-9_+-]+)*$")?;
        let keymap_re = pattern(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)*$")?;

        if !device_re.is_match(&self.device) || self.device.contains("..") {
            return Err(InstallError::Config(format!(
                "invalid device path '{}'",
                self.device
            )));
        }
        if let Some(boot) = &self.boot_partition
            && (!device_re.is_match(boot) || boot.contains(".."))
        {
            return Err(InstallError::Config(format!(
                "invalid boot partition path '{}'",
                boot
            )));
        }
        if !user_re.is_match(&self.username) || self.username == "root" {
            return Err(InstallError::Config(format!(
                "invalid account name '{}' (expected [a-z_][a-z0-9_-]*, at most 32 characters)",
                self.username
            )));
        }
        if !host_re.is_match(&self.hostname) {
            return Err(InstallError::Config(format!(
                "invalid hostname '{}'",
                self.hostname
            )));
        }
        // These end up in paths and files inside the new root.
        if !locale_re.is_match(&self.locale) || self.locale.contains("..") {
            return Err(InstallError::Config(format!(
                "invalid locale '{}'",
                self.locale
            )));
        }
        if !timezone_re.is_match(&self.timezone) {
            return Err(InstallError::Config(format!(
                "invalid timezone '{}'",
                self.timezone
            )));
        }
        if !keymap_re.is_match(&self.keymap) {
            return Err(InstallError::Config(format!(
                "invalid keymap '{}'",
                self.keymap
            )));
        }
        if self.root_size_mib == 0 {
            return Err(InstallError::Config(
                "root_size_mib must be greater than zero".to_string(),
            ));
        }
        if self.alloc_size_mib == Some(0) {
            return Err(InstallError::Config(
                "alloc_size_mib must be greater than zero".to_string(),
            ));
        }
        if let (Some(root), Some(home)) = (self.root_partition_number, self.home_partition_number)
            && root == home
        {
            return Err(InstallError::Config(format!(
                "root and home cannot share partition number {}",
                root
            )));
        }
        if self.base_attempts == 0 {
            return Err(InstallError::Config(
                "base_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = InstallConfig::from_toml("").unwrap();
        assert_eq!(config, InstallConfig::default());
        assert_eq!(config.min_free_mib, 32768);
        assert_eq!(config.numbering, NumberingPolicy::NextAvailable);
        assert_eq!(config.boot_partition, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = InstallConfig::from_toml(
            r#"
device = "/dev/sda"
username = "alice"
numbering = "strict"
root_partition_number = 5
secure_boot = true
"#,
        )
        .unwrap();
        assert_eq!(config.device, "/dev/sda");
        assert_eq!(config.username, "alice");
        assert_eq!(config.numbering, NumberingPolicy::Strict);
        assert_eq!(config.root_partition_number, Some(5));
        assert!(config.base_packages().contains(&"sbctl".to_string()));
    }

    #[test]
    fn test_validate_rejects_bad_account_name() {
        for name in ["Alice", "1user", "root", "a b", "x;rm -rf /"] {
            let config = InstallConfig {
                username: name.to_string(),
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(InstallError::Config(_))),
                "{} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_validate_rejects_bad_device_path() {
        for device in ["sda", "/dev/../etc/passwd", "/dev/sda; reboot", ""] {
            let config = InstallConfig {
                device: device.to_string(),
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(InstallError::Config(_))));
        }
    }

    #[test]
    fn test_validate_rejects_unsafe_locale_settings() {
        let bad = [
            InstallConfig {
                locale: r"x \)/\1/;1e touch /tmp/owned #".to_string(),
                ..Default::default()
            },
            InstallConfig {
                locale: "en_US.UTF-8 UTF-8".to_string(),
                ..Default::default()
            },
            InstallConfig {
                timezone: "../../../etc/shadow".to_string(),
                ..Default::default()
            },
            InstallConfig {
                timezone: "/etc/shadow".to_string(),
                ..Default::default()
            },
            InstallConfig {
                keymap: "us$(reboot)".to_string(),
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(InstallError::Config(_))),
                "{:?} / {:?} / {:?} should be rejected",
                config.locale,
                config.timezone,
                config.keymap
            );
        }
    }

    #[test]
    fn test_validate_accepts_common_locale_settings() {
        for (locale, timezone, keymap) in [
            ("de_DE.UTF-8", "Europe/Berlin", "de-latin1"),
            ("sr_RS@latin", "America/Argentina/Buenos_Aires", "us"),
            ("C.UTF-8", "Etc/GMT+5", "mac-us.kmap"),
        ] {
            let config = InstallConfig {
                locale: locale.to_string(),
                timezone: timezone.to_string(),
                keymap: keymap.to_string(),
                ..Default::default()
            };
            assert!(config.validate().is_ok(), "{} should be accepted", locale);
        }
    }

    #[test]
    fn test_validate_rejects_shared_partition_numbers() {
        let config = InstallConfig {
            root_partition_number: Some(5),
            home_partition_number: Some(5),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(InstallError::Config(_))));
    }
}
