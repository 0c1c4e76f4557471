//! systemd-boot loader entries (`loader/entries/*.conf`)

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoaderEntry {
    pub title: String,
    pub linux: Option<String>,
    pub efi: Option<String>,
    pub initrd: Vec<String>,
    pub options: Option<String>,
}

impl LoaderEntry {
    /// Entry booting the newly installed kernel from the shared ESP
    pub fn linux(title: &str, root_partuuid: &str, kernel_options: &str) -> Self {
        let mut options = format!("root=PARTUUID={}", root_partuuid);
        if !kernel_options.trim().is_empty() {
            options.push(' ');
            options.push_str(kernel_options.trim());
        }
        Self {
            title: title.to_string(),
            linux: Some("/vmlinuz-linux".to_string()),
            efi: None,
            initrd: vec!["/initramfs-linux.img".to_string()],
            options: Some(options),
        }
    }

    /// Entry chainloading the preserved OS's bootloader
    pub fn chainload(title: &str, efi_path: &str) -> Self {
        Self {
            title: title.to_string(),
            efi: Some(format!("/{}", efi_path.trim_start_matches('/'))),
            ..Default::default()
        }
    }

    pub fn parse(content: &str) -> Self {
        let mut entry = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((k, v)) => (k, v.trim().to_string()),
                None => (line, String::new()),
            };
            match key {
                "title" => entry.title = value,
                "linux" => entry.linux = Some(value),
                "efi" => entry.efi = Some(value),
                "initrd" => entry.initrd.push(value),
                // Repeated options lines are concatenated by systemd-boot
                "options" => {
                    entry.options = Some(match entry.options.take() {
                        Some(existing) => format!("{} {}", existing, value),
                        None => value,
                    })
                }
                _ => {}
            }
        }
        entry
    }
}

impl fmt::Display for LoaderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "title {}", self.title)?;
        if let Some(linux) = &self.linux {
            writeln!(f, "linux {}", linux)?;
        }
        if let Some(efi) = &self.efi {
            writeln!(f, "efi {}", efi)?;
        }
        for initrd in &self.initrd {
            writeln!(f, "initrd {}", initrd)?;
        }
        if let Some(options) = &self.options {
            writeln!(f, "options {}", options)?;
        }
        Ok(())
    }
}
