//! Dual-boot installation of Arch Linux next to an existing system.

pub mod bootentry;
pub mod chroot;
pub mod config;
pub mod disk;
pub mod error;
pub mod execution;
pub mod logging;
pub mod prompt;
pub mod rollback;
pub mod system;
pub mod workflow;

#[cfg(test)]
mod testing;
