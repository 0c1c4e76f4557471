//! Free space, layout, creation and identification of partitions.

pub mod detect;
pub mod mount;
pub mod partition;
pub mod plan;
pub mod scan;
pub mod types;
pub mod util;
