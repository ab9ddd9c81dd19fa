//! Bounded readiness polling

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::cancel::StopSignal;
use crate::types::Identity;

/// Default delay between probes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default number of probes before giving up (about 100 seconds)
pub const DEFAULT_POLL_ATTEMPTS: u32 = 400;

/// A yes/no check that some external resource is usable
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Run the check once. Failures to run the check count as not ready.
    async fn probe(&self) -> bool;
}

/// How often and how long to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between consecutive probes
    pub interval: Duration,
    /// Maximum number of probes
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

/// Probe until ready, out of attempts, or stopped.
///
/// Returns `true` as soon as a check succeeds. Never sleeps after the
/// final attempt. A stop during a check or a sleep ends polling with
/// `false`, dropping any check still in flight.
pub async fn wait_until_ready(
    probe: &dyn ReadinessProbe,
    settings: PollSettings,
    stop: &StopSignal,
) -> bool {
    for attempt in 1..=settings.max_attempts {
        if stop.is_cancelled() {
            return false;
        }

        let ready = tokio::select! {
            biased;
            _ = stop.cancelled() => {
                tracing::debug!("Readiness check interrupted on attempt {}", attempt);
                return false;
            }
            ready = probe.probe() => ready,
        };
        if ready {
            tracing::debug!("Ready after {} attempt(s)", attempt);
            return true;
        }

        if attempt == settings.max_attempts {
            break;
        }

        tokio::select! {
            _ = stop.cancelled() => {
                tracing::debug!("Readiness polling stopped after {} attempt(s)", attempt);
                return false;
            }
            _ = tokio::time::sleep(settings.interval) => {}
        }
    }

    tracing::debug!("Not ready after {} attempt(s)", settings.max_attempts);
    false
}

/// Probe that runs a command and treats exit status 0 as ready
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
}

impl CommandProbe {
    /// Create a probe
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

    /// `ssh user@host -O check`: asks whether a ControlMaster is serving the identity
    pub fn ssh_control_master(identity: &Identity) -> Self {
        Self::new("ssh", [identity.user_at_host(), "-O".into(), "check".into()])
    }
}

#[async_trait]
impl ReadinessProbe for CommandProbe {
    async fn probe(&self) -> bool {
        let status = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) => status.success(),
            Err(e) => {
                tracing::debug!("Failed to run probe {}: {}", self.program, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::{spawn_dispatcher, StopReason};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    struct CountingProbe {
        calls: AtomicU32,
        ready_on: Option<u32>,
    }

    impl CountingProbe {
        fn new(ready_on: Option<u32>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                ready_on,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReadinessProbe for CountingProbe {
        async fn probe(&self) -> bool {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.ready_on.map_or(false, |k| n >= k)
        }
    }

    fn fast(max_attempts: u32) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(5),
            max_attempts,
        }
    }

    #[test]
    fn test_default_poll_settings() {
        let settings = PollSettings::default();
        assert_eq!(settings.interval, Duration::from_millis(250));
        assert_eq!(settings.max_attempts, 400);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let probe = CountingProbe::new(None);
        assert!(!wait_until_ready(&probe, fast(4), &StopSignal::never()).await);
        assert_eq!(probe.calls(), 4);
    }

    #[tokio::test]
    async fn test_returns_on_first_success() {
        let probe = CountingProbe::new(Some(3));
        assert!(wait_until_ready(&probe, fast(10), &StopSignal::never()).await);
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_never_probes() {
        let probe = CountingProbe::new(Some(1));
        assert!(!wait_until_ready(&probe, fast(0), &StopSignal::never()).await);
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_sleep_after_last_attempt() {
        let probe = CountingProbe::new(None);
        let settings = PollSettings {
            interval: Duration::from_secs(10),
            max_attempts: 1,
        };
        let started = Instant::now();
        assert!(!wait_until_ready(&probe, settings, &StopSignal::never()).await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_stop_interrupts_sleep() {
        let probe = CountingProbe::new(None);
        let settings = PollSettings {
            interval: Duration::from_secs(30),
            max_attempts: 100,
        };
        let (stop, _handle) = spawn_dispatcher(
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                StopReason::Requested
            },
            |_| {},
        );

        let started = Instant::now();
        assert!(!wait_until_ready(&probe, settings, &stop).await);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(probe.calls(), 1);
    }

    /// A check that never answers, like `ssh -O check` on a stale socket
    struct HungCheck;

    #[async_trait]
    impl ReadinessProbe for HungCheck {
        async fn probe(&self) -> bool {
            std::future::pending::<bool>().await
        }
    }

    fn stop_after(delay: Duration) -> StopSignal {
        let (stop, _handle) = spawn_dispatcher(
            async move {
                tokio::time::sleep(delay).await;
                StopReason::Requested
            },
            |_| {},
        );
        stop
    }

    #[tokio::test]
    async fn test_stop_interrupts_hung_check() {
        let stop = stop_after(Duration::from_millis(50));
        let started = Instant::now();
        let ready = tokio::time::timeout(
            Duration::from_secs(2),
            wait_until_ready(&HungCheck, fast(3), &stop),
        )
        .await
        .expect("polling should end once stopped");
        assert!(!ready);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_stop_interrupts_running_command() {
        let check = CommandProbe::new("sleep", ["30"]);
        let stop = stop_after(Duration::from_millis(50));
        let started = Instant::now();
        assert!(!wait_until_ready(&check, fast(3), &stop).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_command_probe_uses_exit_status() {
        assert!(CommandProbe::new("true", Vec::<String>::new()).probe().await);
        assert!(!CommandProbe::new("false", Vec::<String>::new()).probe().await);
        assert!(
            !CommandProbe::new("/nonexistent/pcmd-probe", Vec::<String>::new())
                .probe()
                .await
        );
    }

    #[test]
    fn test_ssh_control_master_arguments() {
        let probe = CommandProbe::ssh_control_master(&Identity::new("bob", "h1", 22));
        assert_eq!(probe.program, "ssh");
        assert_eq!(probe.args, vec!["bob@h1", "-O", "check"]);
    }
}
