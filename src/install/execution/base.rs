use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

use super::Executor;
use crate::install::error::{InstallError, InstallResult};

/// Populate the new root with `pacstrap`, retrying transient failures.
///
/// Returns the number of attempts it took.
pub fn populate_base(
    executor: &dyn Executor,
    mount_root: &Path,
    packages: &[String],
    attempts: u32,
    backoff: Duration,
) -> InstallResult<u32> {
    let mut attempt = 0;

    loop {
        attempt += 1;
        if attempt > 1 {
            log::info!("Retry attempt {}/{} for pacstrap", attempt, attempts);
        } else {
            log::info!("Installing packages: {}", packages.join(" "));
        }

        let mut cmd = Command::new("pacstrap");
        cmd.arg("-K").arg(mount_root).args(packages);

        match executor.run(&mut cmd) {
            Ok(()) => return Ok(attempt),
            Err(e) if attempt >= attempts => {
                return Err(InstallError::Retryable {
                    operation: "Base system installation".to_string(),
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => {
                log::warn!("Pacstrap failed: {:#}", e);
                log::warn!("Ensure you are connected to the internet.");
                log::info!("Retrying in {} seconds...", backoff.as_secs());
                thread::sleep(backoff);
            }
        }
    }
}
