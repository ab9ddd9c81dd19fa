//! Stop signal shared by every blocking operation
//!
//! A single [`CancellationToken`] is owned by a dispatcher task, which is
//! the only place it is ever cancelled. Everything else holds a
//! [`StopSignal`], which can only observe it.

use std::fmt;
use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Why the dispatcher requested a stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT
    Interrupt,
    /// SIGHUP
    HangUp,
    /// Requested programmatically
    Requested,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Interrupt => write!(f, "SIGINT"),
            StopReason::HangUp => write!(f, "SIGHUP"),
            StopReason::Requested => write!(f, "stop request"),
        }
    }
}

/// Read-only view of the stop request
#[derive(Debug, Clone)]
pub struct StopSignal {
    token: CancellationToken,
}

impl StopSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Whether a stop has been requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once a stop has been requested
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// A token cancelled when the stop fires. Cancelling the returned
    /// token does not affect the stop signal.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

/// Spawn the dispatcher: the stop signal fires once `source` resolves.
///
/// The dispatcher performs the only write to the underlying token and
/// hands the reason to `on_stop` before doing so, so the caller can
/// report provenance at the signal boundary.
pub fn spawn_dispatcher<F, C>(source: F, on_stop: C) -> (StopSignal, JoinHandle<StopReason>)
where
    F: Future<Output = StopReason> + Send + 'static,
    C: FnOnce(StopReason) + Send + 'static,
{
    let token = CancellationToken::new();
    let signal = StopSignal {
        token: token.clone(),
    };

    let handle = tokio::spawn(async move {
        let reason = source.await;
        on_stop(reason);
        token.cancel();
        reason
    });

    (signal, handle)
}

/// Spawn a dispatcher fed by SIGINT and SIGHUP.
///
/// Installing the handlers happens before this returns, so a signal
/// delivered right after no longer terminates the process.
pub fn spawn_signal_dispatcher<C>(
    on_stop: C,
) -> std::io::Result<(StopSignal, JoinHandle<StopReason>)>
where
    C: FnOnce(StopReason) + Send + 'static,
{
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;

    let source = async move {
        tokio::select! {
            _ = interrupt.recv() => StopReason::Interrupt,
            _ = hangup.recv() => StopReason::HangUp,
        }
    };

    Ok(spawn_dispatcher(source, on_stop))
}
