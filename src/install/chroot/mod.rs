//! Configuration script executed inside the new root.
//!
//! The template is fixed; run-specific values are only ever injected through
//! [`ScriptVars`], rendered as quoted `readonly` declarations ahead of the body.

use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

use crate::install::bootentry::LoaderEntry;
use crate::install::error::{InstallError, InstallResult};
use crate::install::execution::Executor;
use crate::install::execution::paths::{self, chroot_path};

const TEMPLATE: &str = include_str!("template.sh");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptVars {
    pub root_partuuid: String,
    pub boot_device: String,
    pub username: String,
    pub hostname: String,
    pub locale: String,
    pub timezone: String,
    pub keymap: String,
    pub kernel_options: String,
    pub secure_boot: bool,
}

impl ScriptVars {
    fn declarations(&self) -> Vec<(&'static str, String)> {
        let arch = LoaderEntry::linux("Arch Linux", &self.root_partuuid, &self.kernel_options);
        let foreign = LoaderEntry::chainload("Windows Boot Manager", paths::FOREIGN_BOOTLOADER);

        vec![
            ("ROOT_PARTUUID", self.root_partuuid.clone()),
            ("BOOT_DEVICE", self.boot_device.clone()),
            ("USERNAME", self.username.clone()),
            ("HOST_NAME", self.hostname.clone()),
            ("LOCALE", self.locale.clone()),
            ("TIMEZONE", self.timezone.clone()),
            ("KEYMAP", self.keymap.clone()),
            ("KERNEL_OPTIONS", self.kernel_options.clone()),
            ("SECURE_BOOT", if self.secure_boot { "1" } else { "0" }.to_string()),
            ("LOADER_ENTRY", paths::LOADER_ENTRY.to_string()),
            ("FOREIGN_LOADER_ENTRY", paths::FOREIGN_LOADER_ENTRY.to_string()),
            ("FOREIGN_BOOTLOADER", paths::FOREIGN_BOOTLOADER.to_string()),
            ("ARCH_ENTRY", arch.to_string()),
            ("FOREIGN_ENTRY", foreign.to_string()),
        ]
    }
}

/// Every `${NAME}` the body expands
pub fn referenced_names(body: &str) -> InstallResult<BTreeSet<String>> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| InstallError::Config(format!("Invalid variable pattern: {}", e)))?;
    Ok(re
        .captures_iter(body)
        .map(|c| c[1].to_string())
        .collect())
}

/// Assemble declarations and body, refusing bodies that use undeclared names.
pub fn render(vars: &ScriptVars, body: &str) -> InstallResult<String> {
    let declarations = vars.declarations();
    let declared: BTreeSet<&str> = declarations.iter().map(|(name, _)| *name).collect();

    let missing: Vec<String> = referenced_names(body)?
        .into_iter()
        .filter(|name| !declared.contains(name.as_str()))
        .collect();
    if !missing.is_empty() {
        return Err(InstallError::Config(format!(
            "configuration script uses undeclared variable(s): {}",
            missing.join(", ")
        )));
    }

    let mut script = String::from("#!/usr/bin/env bash\n# Generated by dualstrap\n\n");
    for (name, value) in &declarations {
        script.push_str(&format!("readonly {}={}\n", name, shell_words::quote(value)));
    }
    script.push('\n');
    script.push_str(body);
    Ok(script)
}

pub fn build_script(vars: &ScriptVars) -> InstallResult<String> {
    render(vars, TEMPLATE)
}

/// Write the script into the new root and run it there.
pub fn run_chroot_config(
    executor: &dyn Executor,
    mount_root: &Path,
    script: &str,
) -> InstallResult<()> {
    let host_path = chroot_path(mount_root, paths::CHROOT_SCRIPT);

    executor
        .write_file(&host_path, script)
        .map_err(|e| InstallError::execution("Write configuration script", e))?;

    log::info!("Running {} inside {}", paths::CHROOT_SCRIPT, mount_root.display());
    executor
        .run(
            Command::new("arch-chroot")
                .arg(mount_root)
                .arg("bash")
                .arg(paths::CHROOT_SCRIPT),
        )
        .map_err(|e| InstallError::execution("Configure the new system", e))
}
