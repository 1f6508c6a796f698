//! Bounded capture of the tool's output streams.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::warn;

use crate::consts::IO_CAPTURE_GRACE;

/// Bytes read from one stream, plus how many the stream produced in total.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    pub total: usize,
    /// Set when the reader had to be abandoned.
    pub incomplete: bool,
}

impl Captured {
    pub fn truncated(&self) -> bool {
        self.total > self.bytes.len()
    }

    /// Decode as text, with a note when bytes were dropped.
    pub fn into_text(self) -> String {
        let truncated = self.truncated();
        let Captured {
            mut bytes,
            total,
            incomplete,
        } = self;

        // Don't split a multi-byte character at the cut.
        if truncated {
            if let Err(e) = std::str::from_utf8(&bytes) {
                if e.error_len().is_none() {
                    bytes.truncate(e.valid_up_to());
                }
            }
        }

        let mut text = String::from_utf8_lossy(&bytes).into_owned();
        if truncated {
            text.push_str(&format!(
                "\n\n[truncated: showing {}/{} bytes]",
                bytes.len(),
                total
            ));
        }
        if incomplete {
            append_note(&mut text, "[output capture abandoned: stream stayed open]");
        }
        text
    }
}

/// A task draining one output stream into a buffer the runner can read even
/// if the task never finishes.
pub struct StreamReader {
    sink: Arc<Mutex<Captured>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl StreamReader {
    pub fn spawn<R>(reader: R, max_bytes: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let sink = Arc::new(Mutex::new(Captured::default()));
        let task = tokio::spawn(read_bounded(reader, max_bytes, Arc::clone(&sink)));
        Self { sink, task }
    }
}

fn lock(sink: &Mutex<Captured>) -> MutexGuard<'_, Captured> {
    sink.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read `reader` to EOF into `sink`, keeping at most `max_bytes`. The rest is
/// drained so the writer never blocks on a full pipe.
pub async fn read_bounded<R: AsyncRead + Unpin>(
    mut reader: R,
    max_bytes: usize,
    sink: Arc<Mutex<Captured>>,
) -> std::io::Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        let mut captured = lock(&sink);
        let room = max_bytes.saturating_sub(captured.bytes.len());
        captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
        captured.total += n;
    }
}

/// Wait for a reader, giving up after a short grace period. Whatever was read
/// before that is kept.
pub async fn collect(reader: Option<StreamReader>) -> Captured {
    let Some(StreamReader { sink, mut task }) = reader else {
        return Captured::default();
    };

    let abandoned = match timeout(IO_CAPTURE_GRACE, &mut task).await {
        Ok(Ok(Ok(()))) => false,
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "failed to read tool output");
            false
        }
        Ok(Err(e)) => {
            warn!(error = %e, "output reader task failed");
            false
        }
        Err(_) => {
            // Something outside the tool's process group still holds the pipe.
            task.abort();
            true
        }
    };

    let mut captured = std::mem::take(&mut *lock(&sink));
    captured.incomplete = abandoned;
    captured
}

/// Append a line to captured text, starting it on a fresh line.
pub fn append_note(text: &mut String, note: &str) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(note);
}

/// Everything after the marker line, or the whole output if the marker is
/// missing.
pub fn extract_ir(stdout: &str, marker: &str) -> String {
    if marker.is_empty() {
        return stdout.to_string();
    }
    match stdout.find(marker) {
        Some(idx) => {
            let rest = &stdout[idx + marker.len()..];
            let rest = rest
                .strip_prefix("\r\n")
                .or_else(|| rest.strip_prefix('\n'))
                .unwrap_or(rest);
            rest.to_string()
        }
        None => stdout.to_string(),
    }
}
