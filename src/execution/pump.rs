//! Duplex stream pump
//!
//! Drains a child's stdout and stderr at the same time so the child can
//! never block on a full pipe while we wait on the other one. The same pump
//! serves both output modes: lines are either forwarded to a [`LineSink`]
//! as they arrive or buffered and handed back once both streams close.

use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

/// Which of the child's output streams a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Receives streamed output one complete line at a time
///
/// Implementations are shared between concurrently running jobs and must
/// write each line atomically.
pub trait LineSink: Send + Sync {
    /// Called once per line, without the trailing line terminator
    fn write_line(&self, stream: StreamKind, line: &str);
}

/// How a shell invocation's output is handled
#[derive(Clone)]
pub enum OutputMode {
    /// Forward every line to the sink as it arrives
    Stream(Arc<dyn LineSink>),
    /// Buffer both streams and return them
    Capture,
}

impl fmt::Debug for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Stream(_) => f.write_str("Stream"),
            OutputMode::Capture => f.write_str("Capture"),
        }
    }
}

/// What the pump collected; both fields are `None` in stream mode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpOutput {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// Read both streams to the end concurrently
pub async fn pump_duplex<O, E>(stdout: O, stderr: E, mode: &OutputMode) -> io::Result<PumpOutput>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let (out, err) = tokio::join!(
        pump(stdout, StreamKind::Stdout, mode),
        pump(stderr, StreamKind::Stderr, mode),
    );

    Ok(PumpOutput {
        stdout: out?,
        stderr: err?,
    })
}

async fn pump<R>(reader: R, stream: StreamKind, mode: &OutputMode) -> io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    match mode {
        OutputMode::Capture => {
            let mut reader = reader;
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).await?;
            Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
        }
        OutputMode::Stream(sink) => {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf).await? == 0 {
                    break;
                }
                let line = String::from_utf8_lossy(&buf);
                sink.write_line(stream, line.trim_end_matches(['\n', '\r']));
            }
            Ok(None)
        }
    }
}
