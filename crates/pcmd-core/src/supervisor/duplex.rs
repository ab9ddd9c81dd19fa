//! Copy tasks between the child's pipes and the outside world

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::state::Direction;

const COPY_BUFFER_SIZE: usize = 4096;

/// How one copy direction ended
#[derive(Debug)]
pub struct StreamOutcome {
    /// Which direction this was
    pub direction: Direction,
    /// Bytes written to the destination
    pub bytes: u64,
    /// Read or write error that ended the copy, if any
    pub error: Option<io::Error>,
    /// Whether the copy was stopped by the supervisor rather than ending itself
    pub closed: bool,
}

/// Copy `reader` into `writer` until end-of-stream, an I/O error, or
/// `close` is cancelled.
///
/// The direction is sent on `finished` only when the copy ended on its
/// own. Both ends are dropped when the task returns.
pub(crate) fn spawn_copy<R, W>(
    direction: Direction,
    mut reader: R,
    mut writer: W,
    close: CancellationToken,
    finished: mpsc::Sender<Direction>,
) -> JoinHandle<StreamOutcome>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut outcome = StreamOutcome {
            direction,
            bytes: 0,
            error: None,
            closed: false,
        };
        let mut buf = [0u8; COPY_BUFFER_SIZE];

        loop {
            let read = tokio::select! {
                biased;
                _ = close.cancelled() => {
                    outcome.closed = true;
                    break;
                }
                read = reader.read(&mut buf) => read,
            };

            let n = match read {
                Ok(0) => {
                    tracing::debug!("{} stream reached EOF", direction);
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!("{} stream read error: {}", direction, e);
                    outcome.error = Some(e);
                    break;
                }
            };

            let written = tokio::select! {
                biased;
                _ = close.cancelled() => {
                    outcome.closed = true;
                    break;
                }
                written = write_chunk(&mut writer, &buf[..n]) => written,
            };

            if let Err(e) = written {
                tracing::debug!("{} stream write error: {}", direction, e);
                outcome.error = Some(e);
                break;
            }
            outcome.bytes += n as u64;
        }

        if !outcome.closed {
            // Propagate EOF downstream before the pipe is dropped. A stalled
            // writer must not outlive `close`.
            tokio::select! {
                biased;
                _ = close.cancelled() => {
                    tracing::debug!("{} stream closed before EOF was propagated", direction);
                }
                _ = async {
                    let _ = writer.shutdown().await;
                    let _ = finished.send(direction).await;
                } => {}
            }
        }

        tracing::debug!(
            direction = %direction,
            bytes = outcome.bytes,
            closed = outcome.closed,
            "Copy task finished"
        );
        outcome
    })
}

async fn write_chunk<W: AsyncWrite + Unpin>(writer: &mut W, chunk: &[u8]) -> io::Result<()> {
    writer.write_all(chunk).await?;
    writer.flush().await
}


/// Writer whose shutdown never completes, like a peer that stopped reading
#[cfg(test)]
pub(crate) struct StalledShutdown;

#[cfg(test)]
impl AsyncWrite for StalledShutdown {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<io::Result<usize>> {
        std::task::Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::task::Poll::Pending
    }
}
