//! Subprocess supervision
//!
//! A [`Supervisor`] owns one child process running in its own process
//! group. Its stdin and stdout are piped through two copy tasks and its
//! stderr goes to a log file. The session ends when the child exits on
//! its own, when either copy direction finishes, or when the stop signal
//! fires. In the last two cases both pipes are closed and the child gets
//! a grace period to exit before its process group is sent SIGKILL.

mod duplex;
mod process_group;
mod state;

pub use duplex::StreamOutcome;
pub use state::{CleanupTrigger, Direction, SessionState, Termination};

use std::fs::File;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cancel::StopSignal;
use crate::config::ChildCommand;
use crate::error::SupervisorError;

/// How long a naturally exited child's remaining output may take to drain
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// How long to wait for the kernel to reap a child after SIGKILL
const REAP_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a closed copy task may take to stop before it is aborted
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Summary of a finished session
#[derive(Debug)]
pub struct SessionReport {
    /// What started cleanup; `None` for a natural exit
    pub trigger: Option<CleanupTrigger>,
    /// How the child ended
    pub termination: Termination,
    /// Time spent between cleanup starting and the child ending
    pub cleanup_elapsed: Option<Duration>,
    /// Per-direction copy results
    pub streams: Vec<StreamOutcome>,
    /// Lifecycle state the session ended in
    pub state: SessionState,
}

impl SessionReport {
    /// Copy result for one direction
    pub fn stream(&self, direction: Direction) -> Option<&StreamOutcome> {
        self.streams.iter().find(|s| s.direction == direction)
    }
}

/// A spawned child under supervision
#[derive(Debug)]
pub struct Supervisor {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    pid: Option<u32>,
    program: String,
    cleanup: CancellationToken,
    state: SessionState,
}

impl Supervisor {
    /// Start `command` in a new process group.
    ///
    /// The log file at `log_path` is created (or truncated) and receives
    /// the child's stderr. The environment is inherited unchanged.
    pub fn spawn(command: &ChildCommand, log_path: &Path) -> Result<Self, SupervisorError> {
        if command.program.is_empty() {
            return Err(SupervisorError::EmptyCommand);
        }

        let log = File::create(log_path).map_err(|source| SupervisorError::LogFile {
            path: log_path.to_path_buf(),
            source,
        })?;

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(log))
            .process_group(0)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or(SupervisorError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(SupervisorError::MissingPipe("stdout"))?;
        let pid = child.id();

        tracing::info!(
            pid = ?pid,
            program = %command.program,
            log = ?log_path,
            "Spawned child process"
        );

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: Some(stdout),
            pid,
            program: command.program.clone(),
            cleanup: CancellationToken::new(),
            state: SessionState::Spawned,
        })
    }

    /// Process id of the child (also its process group id)
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// A token cancelled as soon as the session stops proxying, whether
    /// through cleanup or a natural exit.
    pub fn cleanup_signal(&self) -> CancellationToken {
        self.cleanup.child_token()
    }

    /// Proxy `input` to the child's stdin and its stdout to `output` until
    /// the session ends, then wait out the grace period.
    ///
    /// Returns once the child is gone. The only error is a failure to wait
    /// on the child.
    pub async fn run<R, W>(
        mut self,
        input: R,
        output: W,
        grace: Duration,
        stop: &StopSignal,
    ) -> Result<SessionReport, SupervisorError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let stdin = self.stdin.take().ok_or(SupervisorError::MissingPipe("stdin"))?;
        let stdout = self
            .stdout
            .take()
            .ok_or(SupervisorError::MissingPipe("stdout"))?;
        self.state = self.state.start();

        let close_input = CancellationToken::new();
        let close_output = CancellationToken::new();
        let (finished_tx, mut finished_rx) = mpsc::channel(2);

        let input_task = duplex::spawn_copy(
            Direction::Input,
            input,
            stdin,
            close_input.clone(),
            finished_tx.clone(),
        );
        let output_task = duplex::spawn_copy(
            Direction::Output,
            stdout,
            output,
            close_output.clone(),
            finished_tx,
        );

        let trigger = tokio::select! {
            biased;
            status = self.child.wait() => {
                let status = status.map_err(|source| SupervisorError::Wait {
                    program: self.program.clone(),
                    source,
                })?;
                tracing::info!(%status, "Child exited");

                self.cleanup.cancel();
                close_input.cancel();
                let mut streams = Vec::with_capacity(2);
                streams.extend(join_closed(input_task).await);
                // Whatever the child wrote before exiting is still in the pipe.
                let output = match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, output_task).await {
                    Ok(joined) => flatten_join(joined),
                    Err(_) => {
                        tracing::debug!("Output did not drain after child exit");
                        close_output.cancel();
                        None
                    }
                };
                streams.extend(output);

                let termination = Termination::NaturalExit(status);
                self.state = self.state.terminate(termination);
                return Ok(SessionReport {
                    trigger: None,
                    termination,
                    cleanup_elapsed: None,
                    streams,
                    state: self.state,
                });
            }
            Some(direction) = finished_rx.recv() => CleanupTrigger::StreamClosed(direction),
            _ = stop.cancelled() => CleanupTrigger::Stopped,
        };

        self.state = self.state.request_cleanup(trigger);
        tracing::info!(?trigger, grace_secs = grace.as_secs(), "Cleanup requested");

        let started = Instant::now();
        self.cleanup.cancel();
        close_input.cancel();
        close_output.cancel();
        let mut streams = Vec::with_capacity(2);
        streams.extend(join_closed(input_task).await);
        streams.extend(join_closed(output_task).await);

        let termination = self.await_exit(grace).await?;
        let cleanup_elapsed = started.elapsed();
        self.state = self.state.terminate(termination);

        tracing::info!(?termination, ?cleanup_elapsed, "Child terminated");
        Ok(SessionReport {
            trigger: Some(trigger),
            termination,
            cleanup_elapsed: Some(cleanup_elapsed),
            streams,
            state: self.state,
        })
    }

    async fn await_exit(&mut self, grace: Duration) -> Result<Termination, SupervisorError> {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => return Ok(Termination::ExitedDuringGrace(status)),
            Ok(Err(source)) => {
                return Err(SupervisorError::Wait {
                    program: self.program.clone(),
                    source,
                })
            }
            Err(_) => {}
        }

        // The exit may have landed right as the timer fired.
        if let Ok(Some(status)) = self.child.try_wait() {
            return Ok(Termination::ExitedDuringGrace(status));
        }

        tracing::warn!(
            pid = ?self.pid,
            "Child still running after {}s grace period, killing process group",
            grace.as_secs()
        );
        if let Some(pid) = self.pid {
            if let Err(e) = process_group::kill_group(pid) {
                tracing::warn!("Failed to kill process group {}: {}", pid, e);
            }
        }

        let status = match tokio::time::timeout(REAP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                tracing::debug!("Failed to reap killed child: {}", e);
                None
            }
            Err(_) => {
                tracing::debug!("Killed child was not reaped in time");
                None
            }
        };
        Ok(Termination::Killed(status))
    }
}

/// Join a copy task whose `close` token has been cancelled.
async fn join_closed(mut task: JoinHandle<StreamOutcome>) -> Option<StreamOutcome> {
    match tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await {
        Ok(joined) => flatten_join(joined),
        Err(_) => {
            tracing::debug!("Copy task did not stop within {:?}, aborting", CLOSE_TIMEOUT);
            task.abort();
            None
        }
    }
}

fn flatten_join(
    joined: Result<StreamOutcome, tokio::task::JoinError>,
) -> Option<StreamOutcome> {
    match joined {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::warn!("Copy task failed: {}", e);
            None
        }
    }
}
