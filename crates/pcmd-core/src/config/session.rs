//! Validated per-run configuration

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, SupervisorError};
use crate::readiness::PollSettings;
use crate::types::{Identity, SessionPaths};

/// Version information injected by the binary at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    /// Release version
    pub version: &'static str,
    /// Build identifier (commit, CI run, ...)
    pub build: &'static str,
}

impl BuildInfo {
    /// Create build info
    pub const fn new(version: &'static str, build: &'static str) -> Self {
        Self { version, build }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.version, self.build)
    }
}

/// The command pcmd wraps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCommand {
    /// Program to run, resolved through `PATH`
    pub program: String,
    /// Arguments after the program name
    pub args: Vec<String>,
}

impl ChildCommand {
    /// Create a command
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<Vec<String>> for ChildCommand {
    type Error = SupervisorError;

    fn try_from(argv: Vec<String>) -> Result<Self, Self::Error> {
        let mut argv = argv.into_iter();
        let program = argv.next().ok_or(SupervisorError::EmptyCommand)?;
        Ok(Self {
            program,
            args: argv.collect(),
        })
    }
}

impl fmt::Display for ChildCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// How a run treats the identity lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    /// No lock; supervise directly
    Unlocked,
    /// Lock, or fail fast when another instance holds it
    LockOrExit,
    /// Lock, or wait for the holder's ControlMaster and connect through it
    LockOrWaitForMaster,
}

/// Everything one pcmd run needs, already validated
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Root for the `.pcmd` files directory
    pub work_dir: PathBuf,
    /// Cleanup allowance after proxying ends
    pub grace_period: Duration,
    /// Only one instance per identity
    pub lock: bool,
    /// Wait for the ControlMaster instead of failing on contention. Implies `lock`.
    pub wait_for_master: bool,
    /// Remote endpoint
    pub identity: Identity,
    /// Wrapped command
    pub command: ChildCommand,
    /// ControlMaster polling parameters
    pub poll: PollSettings,
}

impl SessionConfig {
    /// Whether this run contends for the identity lock
    pub fn locking(&self) -> bool {
        self.lock || self.wait_for_master
    }

    /// Entry mode selected by the flags
    pub fn mode(&self) -> EntryMode {
        if self.wait_for_master {
            EntryMode::LockOrWaitForMaster
        } else if self.lock {
            EntryMode::LockOrExit
        } else {
            EntryMode::Unlocked
        }
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.locking() {
            self.identity.require_complete()?;
        }
        if self.command.program.is_empty() {
            return Err(ConfigError::Invalid("empty command".to_string()));
        }
        Ok(())
    }

    /// File locations for this run; `timestamp` only matters when not locking
    pub fn paths(&self, timestamp: &str) -> SessionPaths {
        if self.locking() {
            SessionPaths::locking(&self.work_dir, &self.identity)
        } else {
            SessionPaths::unlocked(
                &self.work_dir,
                &self.identity,
                &self.command.program,
                timestamp,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(lock: bool, wait_for_master: bool, identity: Identity) -> SessionConfig {
        SessionConfig {
            work_dir: PathBuf::from("/work"),
            grace_period: Duration::from_secs(2),
            lock,
            wait_for_master,
            identity,
            command: ChildCommand::new("nc", ["h1", "22"]),
            poll: PollSettings::default(),
        }
    }

    #[test]
    fn test_build_info_display() {
        let info = BuildInfo::new("1.2.3", "abc123");
        assert_eq!(info.to_string(), "1.2.3 (abc123)");
    }

    #[test]
    fn test_child_command_from_argv() {
        let cmd = ChildCommand::try_from(vec!["nc".to_string(), "h1".to_string()]).unwrap();
        assert_eq!(cmd.program, "nc");
        assert_eq!(cmd.args, vec!["h1".to_string()]);
        assert_eq!(cmd.to_string(), "nc h1");

        let empty = ChildCommand::try_from(Vec::new());
        assert!(matches!(empty, Err(SupervisorError::EmptyCommand)));
    }

    #[test]
    fn test_mode_selection() {
        let id = Identity::new("bob", "h1", 22);
        assert_eq!(config(false, false, id.clone()).mode(), EntryMode::Unlocked);
        assert_eq!(config(true, false, id.clone()).mode(), EntryMode::LockOrExit);
        assert_eq!(
            config(false, true, id.clone()).mode(),
            EntryMode::LockOrWaitForMaster
        );
        assert!(config(false, true, id).locking());
    }

    #[test]
    fn test_validate_requires_identity_when_locking() {
        assert!(config(false, false, Identity::default()).validate().is_ok());
        assert!(matches!(
            config(true, false, Identity::new("bob", "", 22)).validate(),
            Err(ConfigError::IncompleteIdentity)
        ));
        assert!(matches!(
            config(false, true, Identity::new("", "h1", 22)).validate(),
            Err(ConfigError::IncompleteIdentity)
        ));
        assert!(config(true, false, Identity::new("bob", "h1", 22)).validate().is_ok());
    }

    #[test]
    fn test_paths_depend_on_locking() {
        let id = Identity::new("bob", "h1", 22);
        let locked = config(true, false, id.clone()).paths("ts");
        assert_eq!(locked.log, PathBuf::from("/work/.pcmd/pcmd.bob.h1.log"));

        let unlocked = config(false, false, id).paths("ts");
        assert_eq!(unlocked.log, PathBuf::from("/work/.pcmd/pcmd.bob.h1.nc.ts.log"));
    }
}
