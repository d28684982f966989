//! Line sources feeding the detection runner

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// A stream of raw device lines
#[async_trait]
pub trait SampleSource: Send {
    /// Next raw line; `Ok(None)` means the device went away
    async fn next_line(&mut self) -> Result<Option<String>>;

    /// Human-readable origin, used in logs
    fn describe(&self) -> &str;
}

/// Newline-delimited text over any async reader (tty, file, stdin)
pub struct LineSource<R> {
    lines: LinesStream<BufReader<R>>,
    label: String,
}

impl<R: AsyncRead + Unpin + Send> LineSource<R> {
    pub fn new(reader: R, label: impl Into<String>) -> Self {
        Self {
            lines: LinesStream::new(BufReader::new(reader).lines()),
            label: label.into(),
        }
    }
}

/// Open a device node or capture file for reading
pub async fn open_device(path: &Path) -> Result<LineSource<tokio::fs::File>> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open device {}", path.display()))?;
    Ok(LineSource::new(file, path.display().to_string()))
}

/// Read lines from the process's standard input
pub fn stdin_source() -> LineSource<tokio::io::Stdin> {
    LineSource::new(tokio::io::stdin(), "stdin")
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> SampleSource for LineSource<R> {
    async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            match self.lines.next().await {
                Some(Ok(line)) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if !line.contains(',') {
                        debug!(source = %self.label, line = %line, "Ignoring non-CSV line");
                        continue;
                    }
                    return Ok(Some(line));
                }
                Some(Err(e)) if e.kind() == ErrorKind::InvalidData => {
                    warn!(source = %self.label, error = %e, "Discarding undecodable line");
                }
                Some(Err(e)) => {
                    return Err(e).with_context(|| format!("Read error on {}", self.label));
                }
                None => return Ok(None),
            }
        }
    }

    fn describe(&self) -> &str {
        &self.label
    }
}
