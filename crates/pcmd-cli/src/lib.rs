//! pcmd: SSH ProxyCommand wrapper
//!
//! Provides the `pcmd` binary's entry modes, the log follower and the
//! nested ControlMaster connection.

pub mod app;
pub mod nested;
pub mod output;
pub mod tail;
