//! Core error types for pcmd

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for pcmd
#[derive(Error, Debug)]
pub enum PcmdError {
    /// Lock error
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Supervisor error
    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Lock-related errors
///
/// Contention is not represented here: another holder is reported as
/// [`crate::lock::LockOutcome::Contended`].
#[derive(Error, Debug)]
pub enum LockError {
    /// The lock file could not be opened or created
    #[error("Failed to open lock file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// flock(2) failed for a reason other than contention
    #[error("Failed to lock {path:?}: {source}")]
    Flock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The lock file could not be inspected after locking
    #[error("Failed to inspect lock file {path:?}: {source}")]
    Inspect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Removing the lock file on release failed
    #[error("Failed to remove lock file {path:?}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Subprocess supervision errors
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// No program was given
    #[error("No command given to supervise")]
    EmptyCommand,

    /// The stderr log file could not be created
    #[error("Failed to create log file {path:?}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The child process could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A piped stdio handle was not available after spawn
    #[error("Child {0} pipe was not captured")]
    MissingPipe(&'static str),

    /// Waiting on the child failed
    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Locking was requested without a complete identity
    #[error(
        "If using --lock or --wait-for-master, you must also provide -r and -h \
         (and -p if different than 22). pcmd uses this information to generate \
         a unique path to a lock file."
    )]
    IncompleteIdentity,

    /// The working directory could not be prepared
    #[error("Failed to create working directory {path:?}: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_identity_message_mentions_flags() {
        let msg = ConfigError::IncompleteIdentity.to_string();
        assert!(msg.contains("-r"));
        assert!(msg.contains("-h"));
        assert!(msg.contains("lock file"));
    }

    #[test]
    fn test_lock_error_converts_to_top_level() {
        let err: PcmdError = LockError::Open {
            path: PathBuf::from("/nope/pcmd.lock"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
        .into();
        assert!(err.to_string().starts_with("Lock error: Failed to open lock file"));
    }

    #[test]
    fn test_work_dir_error_converts_to_top_level() {
        let err: PcmdError = ConfigError::WorkDir {
            path: PathBuf::from("/nope/.pcmd"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        }
        .into();
        assert!(matches!(err, PcmdError::Config(ConfigError::WorkDir { .. })));
    }
}
