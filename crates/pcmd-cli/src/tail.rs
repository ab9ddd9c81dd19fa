//! Follow a log file onto stderr

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lines of existing content shown when following starts
pub const TAIL_LINES: usize = 10;

/// Delay between checks for appended bytes
const FOLLOW_INTERVAL: Duration = Duration::from_millis(100);

/// A background task mirroring a file's tail to a writer
pub struct LogTail {
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LogTail {
    /// Start following `path`, writing to `out`, until `stop` is cancelled.
    ///
    /// A file that does not exist yet is waited for.
    pub fn spawn<W>(path: PathBuf, stop: CancellationToken, out: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let task_stop = stop.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = follow(&path, &task_stop, out).await {
                tracing::debug!("Stopped following {:?}: {}", path, e);
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop following and wait for the task to finish. Safe to call
    /// after the token has already been cancelled.
    pub async fn stop(mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for LogTail {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn follow<W>(path: &Path, stop: &CancellationToken, mut out: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut file = loop {
        match File::open(path).await {
            Ok(file) => break file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        if !pause(stop).await {
            return Ok(());
        }
    };

    let mut existing = Vec::new();
    file.read_to_end(&mut existing).await?;
    let mut position = existing.len() as u64;
    write_flushed(&mut out, last_lines(&existing, TAIL_LINES)).await?;

    let mut buf = Vec::new();
    while pause(stop).await {
        let len = file.metadata().await?.len();
        if len < position {
            // Truncated by a new writer: start over from the top.
            file.seek(SeekFrom::Start(0)).await?;
            position = 0;
        }

        buf.clear();
        let n = file.read_to_end(&mut buf).await?;
        if n > 0 {
            position += n as u64;
            write_flushed(&mut out, &buf).await?;
        }
    }

    Ok(())
}

/// Sleep one interval; `false` once stopped
async fn pause(stop: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = stop.cancelled() => false,
        _ = tokio::time::sleep(FOLLOW_INTERVAL) => true,
    }
}

async fn write_flushed<W: AsyncWrite + Unpin>(out: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    out.write_all(bytes).await?;
    out.flush().await
}

/// The last `n` lines of `buf`; a trailing newline does not start a new line.
pub fn last_lines(buf: &[u8], n: usize) -> &[u8] {
    if n == 0 {
        return &buf[buf.len()..];
    }

    let body = buf.strip_suffix(b"\n").unwrap_or(buf);
    let start = body
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, b)| **b == b'\n')
        .nth(n - 1)
        .map_or(0, |(i, _)| i + 1);
    &buf[start..]
}
