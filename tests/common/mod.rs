use anyhow::Result;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Scratch directory holding configuration files for one test
pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: tempfile::tempdir()?,
        })
    }

    /// Write a configuration file whose log directory stays inside the scratch dir.
    pub fn write_config(&self, body: &str) -> Result<PathBuf> {
        let path = self.temp_dir.path().join("config.toml");
        let log_dir = self.temp_dir.path().join("logs");
        std::fs::write(
            &path,
            format!("log_dir = {:?}\n{}", log_dir.display().to_string(), body),
        )?;
        Ok(path)
    }
}

pub fn run_dualstrap(args: &[&str]) -> Result<CommandOutput> {
    let output = Command::new(env!("CARGO_BIN_EXE_dualstrap"))
        .args(args)
        .output()?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}
