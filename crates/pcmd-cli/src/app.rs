//! Entry modes of a pcmd run

use anyhow::{bail, Context, Result};
use pcmd_core::config::EntryMode;
use pcmd_core::time::log_timestamp;
use pcmd_core::{
    lock_session, wait_until_ready, CommandProbe, LockGuard, LockOutcome, SessionConfig,
    SessionPaths, StopSignal, Supervisor, Termination,
};
use tokio_util::sync::CancellationToken;

use crate::nested;
use crate::output::{contention_message, print_notice, print_warning};
use crate::tail::LogTail;

/// Shown on stderr while another instance's ControlMaster comes up
pub const WAITING_MESSAGE: &str = "Waiting for SSH ControlMaster...";

/// Shown on stderr when the ControlMaster never became ready
pub const NOT_DETECTED_MESSAGE: &str = "ControlMaster not detected";

/// Run one session according to the configured entry mode.
///
/// `config` must already be validated.
pub async fn run(config: &SessionConfig, stop: &StopSignal) -> Result<()> {
    let paths = config.paths(&log_timestamp());

    match config.mode() {
        EntryMode::Unlocked => {
            paths
                .ensure_files_dir()
                .context("Failed to prepare working directory")?;
            supervise(config, &paths, stop).await
        }
        EntryMode::LockOrExit => match lock(&paths)? {
            LockOutcome::Acquired(guard) => supervise_locked(config, &paths, stop, guard).await,
            LockOutcome::Contended => bail!(contention_message(&paths.lock)),
        },
        EntryMode::LockOrWaitForMaster => match lock(&paths)? {
            LockOutcome::Acquired(guard) => supervise_locked(config, &paths, stop, guard).await,
            LockOutcome::Contended => wait_for_master(config, &paths, stop).await,
        },
    }
}

fn lock(paths: &SessionPaths) -> Result<LockOutcome> {
    lock_session(paths).with_context(|| format!("Failed to lock {:?}", paths.lock))
}

async fn supervise_locked(
    config: &SessionConfig,
    paths: &SessionPaths,
    stop: &StopSignal,
    guard: LockGuard,
) -> Result<()> {
    let result = supervise(config, paths, stop).await;
    if let Err(e) = guard.release() {
        tracing::warn!("{}", e);
    }
    result
}

/// Run the wrapped command with this process's stdin/stdout, mirroring
/// its stderr log until cleanup starts.
async fn supervise(config: &SessionConfig, paths: &SessionPaths, stop: &StopSignal) -> Result<()> {
    let supervisor = Supervisor::spawn(&config.command, &paths.log)
        .with_context(|| format!("Failed to start {}", config.command))?;
    let tail = LogTail::spawn(
        paths.log.clone(),
        supervisor.cleanup_signal(),
        tokio::io::stderr(),
    );

    let report = supervisor
        .run(
            tokio::io::stdin(),
            tokio::io::stdout(),
            config.grace_period,
            stop,
        )
        .await;
    tail.stop().await;
    let report = report?;

    match report.termination {
        Termination::Killed(_) => tracing::warn!(
            "{} did not exit within {}s and was killed",
            config.command.program,
            config.grace_period.as_secs()
        ),
        termination => tracing::info!(?termination, trigger = ?report.trigger, "Session finished"),
    }
    Ok(())
}

/// Another instance holds the lock: follow its log until its
/// ControlMaster answers, then connect through it.
async fn wait_for_master(
    config: &SessionConfig,
    paths: &SessionPaths,
    stop: &StopSignal,
) -> Result<()> {
    print_notice(WAITING_MESSAGE);

    let tail = LogTail::spawn(
        paths.log.clone(),
        CancellationToken::new(),
        tokio::io::stderr(),
    );
    let probe = CommandProbe::ssh_control_master(&config.identity);
    let ready = wait_until_ready(&probe, config.poll, stop).await;
    tail.stop().await;

    if !ready {
        if stop.is_cancelled() {
            bail!("Stopped while waiting for SSH ControlMaster");
        }
        bail!(NOT_DETECTED_MESSAGE);
    }

    let status = nested::connect(&config.identity, config.grace_period, stop).await?;
    match status {
        Some(status) if !status.success() => {
            print_warning(&format!("Nested ssh connection exited with {}", status));
        }
        Some(_) => {}
        None => tracing::warn!("Nested ssh connection was killed after the grace period"),
    }
    Ok(())
}
