//! pcmd-core: Process supervision and graceful shutdown for pcmd
//!
//! This crate provides the pieces the `pcmd` binary is assembled from:
//! a single-assignment stop signal fed by OS signals, an exclusive
//! `flock(2)` lock manager, a bounded readiness poller, and the
//! subprocess supervisor that pipes a child's stdio and tears it down
//! within a grace period.

#[cfg(not(unix))]
compile_error!("pcmd-core relies on process groups and flock(2) and only supports Unix");

pub mod cancel;
pub mod config;
pub mod error;
pub mod lock;
pub mod readiness;
pub mod supervisor;
pub mod time;
pub mod types;

pub use cancel::{spawn_dispatcher, spawn_signal_dispatcher, StopReason, StopSignal};
pub use config::{BuildInfo, ChildCommand, EntryMode, SessionConfig, Settings};
pub use error::PcmdError;
pub use lock::{acquire_or_report, lock_session, LockGuard, LockOutcome};
pub use readiness::{wait_until_ready, CommandProbe, PollSettings, ReadinessProbe};
pub use supervisor::{
    CleanupTrigger, Direction, SessionReport, SessionState, StreamOutcome, Supervisor, Termination,
};
pub use types::{Identity, SessionPaths};
