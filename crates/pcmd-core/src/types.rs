//! Core domain types

use std::fmt;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::ConfigError;

/// Default SSH port; omitted from derived file names
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Directory (under the working directory) holding lock and log files
pub const FILES_DIR: &str = ".pcmd";

/// Prefix of every derived file name
const FILE_PREFIX: &str = "pcmd";

/// Characters escaped inside a name component. `.` is the component
/// separator, so escaping it (and `%` itself) keeps distinct identities
/// from mapping onto the same file.
const COMPONENT_ESCAPES: &AsciiSet = &CONTROLS.add(b'%').add(b'.').add(b'/');

/// The remote endpoint a proxy session is for.
///
/// Maps onto the `%r`, `%h` and `%p` tokens of an ssh `ProxyCommand`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Remote user
    pub user: String,
    /// Remote host
    pub host: String,
    /// Remote port
    pub port: u16,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            user: String::new(),
            host: String::new(),
            port: DEFAULT_SSH_PORT,
        }
    }
}

impl Identity {
    /// Create a new identity
    pub fn new(user: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            port,
        }
    }

    /// Whether every field needed for a lock path is present
    pub fn is_complete(&self) -> bool {
        !self.user.is_empty() && !self.host.is_empty() && self.port != 0
    }

    /// Fail with [`ConfigError::IncompleteIdentity`] unless complete
    pub fn require_complete(&self) -> Result<(), ConfigError> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(ConfigError::IncompleteIdentity)
        }
    }

    /// `user@host`, as passed to ssh
    pub fn user_at_host(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Stable file name stem, e.g. `pcmd.bob.h1` or `pcmd.bob.h1.2222`.
    ///
    /// Empty fields are left out, as are port 22 and port 0.
    pub fn base_name(&self) -> String {
        let mut name = String::from(FILE_PREFIX);

        for field in [self.user.as_str(), self.host.as_str()] {
            if !field.is_empty() {
                name.push('.');
                name.extend(utf8_percent_encode(field, COMPONENT_ESCAPES));
            }
        }

        if self.port != DEFAULT_SSH_PORT && self.port != 0 {
            name.push('.');
            name.push_str(&self.port.to_string());
        }

        name
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// On-disk locations used by one pcmd run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    /// `<workdir>/.pcmd`
    pub files_dir: PathBuf,
    /// Lock file for the identity
    pub lock: PathBuf,
    /// Log file receiving the child's stderr
    pub log: PathBuf,
}

impl SessionPaths {
    /// Paths for a locking run. The log name is shared by every run of the
    /// identity, so a waiting instance can follow the holder's log.
    pub fn locking(work_dir: &Path, identity: &Identity) -> Self {
        let files_dir = files_dir(work_dir);
        let base = identity.base_name();
        Self {
            lock: files_dir.join(format!("{base}.lock")),
            log: files_dir.join(format!("{base}.log")),
            files_dir,
        }
    }

    /// Paths for a run without locking. The log name embeds the command's
    /// base name and a timestamp so unrelated concurrent runs do not collide.
    pub fn unlocked(work_dir: &Path, identity: &Identity, program: &str, timestamp: &str) -> Self {
        let files_dir = files_dir(work_dir);
        let base = identity.base_name();
        let command = Path::new(program)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_string());
        Self {
            lock: files_dir.join(format!("{base}.lock")),
            log: files_dir.join(format!("{base}.{command}.{timestamp}.log")),
            files_dir,
        }
    }

    /// Create the files directory (and the working directory) if missing
    pub fn ensure_files_dir(&self) -> Result<(), ConfigError> {
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&self.files_dir)
            .map_err(|source| ConfigError::WorkDir {
                path: self.files_dir.clone(),
                source,
            })
    }
}

fn files_dir(work_dir: &Path) -> PathBuf {
    work_dir.join(FILES_DIR)
}
