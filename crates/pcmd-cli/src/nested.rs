//! Connecting through an existing SSH ControlMaster

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use pcmd_core::{Identity, StopSignal};
use tokio::process::{Child, Command};

/// Arguments for `ssh -W localhost:<port> -p <port> <user>@<host>`
pub fn forward_args(identity: &Identity) -> Vec<String> {
    vec![
        "-W".to_string(),
        format!("localhost:{}", identity.port),
        "-p".to_string(),
        identity.port.to_string(),
        identity.user_at_host(),
    ]
}

/// Run the nested ssh with this process's stdio and wait for it.
///
/// A stop gives it `grace` to exit before it is killed. Returns the
/// nested ssh's exit status when known.
pub async fn connect(
    identity: &Identity,
    grace: Duration,
    stop: &StopSignal,
) -> Result<Option<ExitStatus>> {
    let child = Command::new("ssh")
        .args(forward_args(identity))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .context("Failed to start nested ssh connection")?;

    tracing::info!(%identity, "Connecting through ControlMaster");
    wait_or_stop(child, grace, stop).await
}

/// Wait for `child`, or after a stop give it `grace` and then kill it.
pub async fn wait_or_stop(
    mut child: Child,
    grace: Duration,
    stop: &StopSignal,
) -> Result<Option<ExitStatus>> {
    tokio::select! {
        biased;
        status = child.wait() => {
            return Ok(Some(status.context("Failed to wait for nested ssh")?));
        }
        _ = stop.cancelled() => {}
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => Ok(Some(status.context("Failed to wait for nested ssh")?)),
        Err(_) => {
            tracing::warn!("Nested ssh still running after grace period, killing it");
            if let Err(e) = child.kill().await {
                tracing::debug!("Failed to kill nested ssh: {}", e);
            }
            Ok(None)
        }
    }
}
