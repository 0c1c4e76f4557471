//! Fakes for the executor, host probes and prompts.

use anyhow::Result;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output};

use super::execution::{Executor, describe};
use super::prompt::Decider;
use super::system::{HostSystem, PartitionTable};

/// Records every action. Actions matching a failure prefix fail, optionally only
/// a limited number of times.
pub struct RecordingExecutor {
    dry_run: bool,
    commands: RefCell<Vec<String>>,
    performed: RefCell<usize>,
    failures: RefCell<Vec<(String, u32)>>,
    outputs: Vec<(String, String)>,
    written: RefCell<Vec<(PathBuf, String)>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self {
            dry_run: false,
            commands: RefCell::new(Vec::new()),
            performed: RefCell::new(0),
            failures: RefCell::new(Vec::new()),
            outputs: Vec::new(),
            written: RefCell::new(Vec::new()),
        }
    }

    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::new()
        }
    }

    pub fn failing_on(prefix: &str) -> Self {
        Self::new().fail_times(prefix, u32::MAX)
    }

    pub fn fail_times(self, prefix: &str, times: u32) -> Self {
        self.failures.borrow_mut().push((prefix.to_string(), times));
        self
    }

    pub fn with_output(mut self, prefix: &str, stdout: &str) -> Self {
        self.outputs.push((prefix.to_string(), stdout.to_string()));
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    pub fn commands_starting_with(&self, prefix: &str) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Actions that would have changed the system (always 0 in dry-run)
    pub fn performed(&self) -> usize {
        *self.performed.borrow()
    }

    pub fn written(&self) -> Vec<(PathBuf, String)> {
        self.written.borrow().clone()
    }

    pub fn written_to(&self, path: &Path) -> Option<String> {
        let written = self.written.borrow();
        let parts: Vec<&str> = written
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, c)| c.as_str())
            .collect();
        (!parts.is_empty()).then(|| parts.concat())
    }

    fn record(&self, operation: String) -> Result<()> {
        self.commands.borrow_mut().push(operation.clone());
        if self.dry_run {
            return Ok(());
        }
        let mut failures = self.failures.borrow_mut();
        if let Some((_, remaining)) = failures
            .iter_mut()
            .find(|(prefix, remaining)| *remaining > 0 && operation.starts_with(prefix.as_str()))
        {
            if *remaining != u32::MAX {
                *remaining -= 1;
            }
            anyhow::bail!("Command failed (exit status: 1): {}", operation);
        }
        *self.performed.borrow_mut() += 1;
        Ok(())
    }
}

impl Executor for RecordingExecutor {
    fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn run(&self, command: &mut Command) -> Result<()> {
        self.record(describe(command))
    }

    fn run_with_input(&self, command: &mut Command, _input: &str) -> Result<()> {
        self.record(describe(command))
    }

    fn run_with_output(&self, command: &mut Command) -> Result<Option<Output>> {
        let operation = describe(command);
        self.record(operation.clone())?;
        if self.dry_run {
            return Ok(None);
        }
        let stdout = self
            .outputs
            .iter()
            .find(|(prefix, _)| operation.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();
        Ok(Some(Output {
            status: ExitStatus::from_raw(0),
            stdout: stdout.into_bytes(),
            stderr: Vec::new(),
        }))
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.record(format!("write {}", path.display()))?;
        if !self.dry_run {
            self.written
                .borrow_mut()
                .retain(|(p, _)| p != path);
            self.written
                .borrow_mut()
                .push((path.to_path_buf(), contents.to_string()));
        }
        Ok(())
    }

    fn append_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.record(format!("append {}", path.display()))?;
        if !self.dry_run {
            self.written
                .borrow_mut()
                .push((path.to_path_buf(), contents.to_string()));
        }
        Ok(())
    }

    fn last_operation(&self) -> Option<String> {
        self.commands.borrow().last().cloned()
    }
}

/// Host with a scripted view of the disk.
///
/// `partition_table` returns the queued tables in order and keeps returning the
/// last one, which lets a test present a different table after creation.
pub struct FakeHost {
    tables: RefCell<VecDeque<PartitionTable>>,
    block_devices: HashSet<String>,
    bootloaders: HashSet<String>,
    mount_points: HashSet<PathBuf>,
    missing_tools: HashSet<String>,
    uefi: bool,
    uuids: HashMap<String, String>,
    filesystems: HashMap<String, Option<String>>,
    files: HashMap<PathBuf, String>,
    probed: RefCell<Vec<String>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            tables: RefCell::new(VecDeque::new()),
            block_devices: HashSet::new(),
            bootloaders: HashSet::new(),
            mount_points: HashSet::new(),
            missing_tools: HashSet::new(),
            uefi: true,
            uuids: HashMap::new(),
            filesystems: HashMap::new(),
            files: HashMap::new(),
            probed: RefCell::new(Vec::new()),
        }
    }

    pub fn with_table(self, table: PartitionTable) -> Self {
        self.tables.borrow_mut().push_back(table);
        self
    }

    pub fn with_block_device(mut self, path: &str) -> Self {
        self.block_devices.insert(path.to_string());
        self
    }

    pub fn with_foreign_bootloader(mut self, device: &str) -> Self {
        self.bootloaders.insert(device.to_string());
        self
    }

    pub fn with_mount_point(mut self, path: &str) -> Self {
        self.mount_points.insert(PathBuf::from(path));
        self
    }

    pub fn without_tool(mut self, name: &str) -> Self {
        self.missing_tools.insert(name.to_string());
        self
    }

    pub fn bios(mut self) -> Self {
        self.uefi = false;
        self
    }

    pub fn with_uuid(mut self, device: &str, uuid: &str) -> Self {
        self.uuids.insert(device.to_string(), uuid.to_string());
        self
    }

    /// Devices without an explicit filesystem report vfat.
    pub fn with_filesystem(mut self, device: &str, fs: &str) -> Self {
        self.filesystems
            .insert(device.to_string(), Some(fs.to_string()));
        self
    }

    pub fn with_no_filesystem(mut self, device: &str) -> Self {
        self.filesystems.insert(device.to_string(), None);
        self
    }

    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.insert(PathBuf::from(path), content.to_string());
        self
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.borrow().clone()
    }
}

impl HostSystem for FakeHost {
    fn partition_table(&self, disk: &str) -> Result<PartitionTable> {
        let mut tables = self.tables.borrow_mut();
        if tables.len() > 1 {
            return tables
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("no table for {}", disk));
        }
        tables
            .front()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no partition table for {}", disk))
    }

    fn is_block_device(&self, path: &str) -> bool {
        self.block_devices.contains(path)
    }

    fn is_uefi(&self) -> bool {
        self.uefi
    }

    fn has_tool(&self, name: &str) -> bool {
        !self.missing_tools.contains(name)
    }

    fn is_mount_point(&self, path: &Path) -> bool {
        self.mount_points.contains(path)
    }

    fn filesystem_type(&self, device: &str) -> Result<Option<String>> {
        Ok(self
            .filesystems
            .get(device)
            .cloned()
            .unwrap_or_else(|| Some("vfat".to_string())))
    }

    fn uuid(&self, device: &str) -> Result<Option<String>> {
        Ok(self.uuids.get(device).cloned())
    }

    fn partuuid(&self, device: &str) -> Result<Option<String>> {
        Ok(self.uuids.get(device).map(|u| format!("part-{}", u)))
    }

    fn has_foreign_bootloader(&self, device: &str) -> Result<bool> {
        self.probed.borrow_mut().push(device.to_string());
        Ok(self.bootloaders.contains(device))
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{} does not exist", path.display()))
    }
}

/// Answers prompts from a queue; an exhausted queue answers "no".
pub struct ScriptedDecider {
    answers: RefCell<VecDeque<bool>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedDecider {
    pub fn new(answers: &[bool]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().copied().collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn always_yes() -> Self {
        Self::new(&[true; 32])
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Decider for ScriptedDecider {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        self.prompts.borrow_mut().push(prompt.to_string());
        Ok(self.answers.borrow_mut().pop_front().unwrap_or(false))
    }
}
