use thiserror::Error;

/// Typed failures returned by the installer components.
///
/// Components never decide fatality themselves; the workflow runner maps every
/// variant to an aborted run and triggers cleanup.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Environment check failed: {0}")]
    Environment(String),

    #[error(
        "Not enough contiguous free space: largest region is {largest_mib} MiB, at least {required_mib} MiB required"
    )]
    InsufficientSpace { largest_mib: u64, required_mib: u64 },

    #[error("Partition detection failed: {0}")]
    Detection(String),

    #[error("{operation} failed: {source:#}")]
    Execution {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{operation} failed after {attempts} attempts: {source:#}")]
    Retryable {
        operation: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Declined at checkpoint '{phase}'")]
    Declined { phase: String },
}

impl InstallError {
    pub fn execution(operation: impl Into<String>, source: anyhow::Error) -> Self {
        InstallError::Execution {
            operation: operation.into(),
            source,
        }
    }

    /// Short name of the error class, used in the failure report.
    pub fn kind(&self) -> &'static str {
        match self {
            InstallError::Config(_) => "ConfigError",
            InstallError::Environment(_) => "EnvironmentError",
            InstallError::InsufficientSpace { .. } => "InsufficientSpace",
            InstallError::Detection(_) => "DetectionError",
            InstallError::Execution { .. } => "ExecutionError",
            InstallError::Retryable { .. } => "RetryableError",
            InstallError::Declined { .. } => "Declined",
        }
    }
}

pub type InstallResult<T> = std::result::Result<T, InstallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_message_includes_operation_and_cause() {
        let err = InstallError::execution(
            "Create root partition",
            anyhow::anyhow!("Command failed: sfdisk"),
        );
        assert_eq!(err.kind(), "ExecutionError");
        assert_eq!(
            err.to_string(),
            "Create root partition failed: Command failed: sfdisk"
        );
    }

    #[test]
    fn test_insufficient_space_message() {
        let err = InstallError::InsufficientSpace {
            largest_mib: 800,
            required_mib: 32768,
        };
        assert!(err.to_string().contains("800 MiB"));
        assert!(err.to_string().contains("32768 MiB"));
    }
}
