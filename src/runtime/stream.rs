//! Line capture for subprocess pipes
//!
//! Each pipe is read by its own task through [`OutputLineCodec`], so a
//! chatty stderr never blocks stdout or the executor's control loop. Lines
//! are numbered per stream and optionally forwarded to an
//! [`ExecutionStream`] as they arrive.

use crate::core::{Execution, OutputLine, StreamKind};
use crate::runtime::process::CancelHandle;
use bytes::{Buf, BytesMut};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, FramedRead};

/// Splits a byte stream into lines on `\n`, `\r\n` or a lone `\r`
///
/// A `\r` at the very end of the buffer is held back until the next chunk
/// shows whether a `\n` follows. Whatever is left when the stream closes is
/// emitted as a final line.
#[derive(Debug, Default)]
pub struct OutputLineCodec {
    next_index: usize,
}

impl OutputLineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for OutputLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        let start = self.next_index.min(src.len());
        let Some(offset) = src[start..].iter().position(|b| *b == b'\n' || *b == b'\r') else {
            self.next_index = src.len();
            return Ok(None);
        };

        let index = start + offset;
        let terminator_len = if src[index] == b'\r' {
            match src.get(index + 1) {
                Some(&b'\n') => 2,
                Some(_) => 1,
                None => {
                    self.next_index = index;
                    return Ok(None);
                }
            }
        } else {
            1
        };

        let line = src.split_to(index);
        src.advance(terminator_len);
        self.next_index = 0;
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }

        let mut rest = buf.split_to(buf.len());
        if rest.last() == Some(&b'\r') {
            rest.truncate(rest.len() - 1);
        }
        self.next_index = 0;
        Ok(Some(String::from_utf8_lossy(&rest).into_owned()))
    }
}

/// Event emitted while an execution runs
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    Line(OutputLine),
    /// Always the last event of a stream
    Finished(Box<Execution>),
}

/// Lines collected by a capture task, readable even if the task is aborted
pub(crate) type LineBuffer = Arc<Mutex<Vec<OutputLine>>>;

/// Read `reader` to the end, numbering lines from 1 and appending them to
/// `buffer`
pub(crate) async fn capture<R>(
    reader: R,
    stream: StreamKind,
    buffer: LineBuffer,
    events: Option<mpsc::UnboundedSender<ExecutionEvent>>,
) where
    R: AsyncRead + Unpin,
{
    let mut framed = FramedRead::new(reader, OutputLineCodec::new());
    let mut sequence = 0u64;

    while let Some(frame) = framed.next().await {
        match frame {
            Ok(text) => {
                sequence += 1;
                let line = OutputLine::new(stream, sequence, text);
                if let Some(events) = &events {
                    // The receiver may be gone; the line is still recorded
                    let _ = events.send(ExecutionEvent::Line(line.clone()));
                }
                buffer.lock().push(line);
            }
            Err(err) => {
                tracing::warn!(%stream, error = %err, "Stopped reading process output");
                break;
            }
        }
    }
}

/// Incremental view of a running execution
///
/// Yields [`ExecutionEvent::Line`] items in per-stream order, followed by
/// exactly one [`ExecutionEvent::Finished`]. Ordering between stdout and
/// stderr lines is not guaranteed.
///
/// Dropping the stream cancels the execution if it is still running.
///
/// # Examples
///
/// ```rust,no_run
/// # use gcloud_sdk_rs::{CommandSpec, Executor, ExecutionEvent, CancelHandle};
/// # use futures::StreamExt;
/// # #[tokio::main]
/// # async fn main() -> gcloud_sdk_rs::Result<()> {
/// let executor = Executor::new("gcloud");
/// let mut stream = executor.stream(CommandSpec::new(["projects", "list"]), CancelHandle::new())?;
///
/// while let Some(event) = stream.next().await {
///     match event {
///         ExecutionEvent::Line(line) => println!("[{}] {}", line.stream, line.text),
///         ExecutionEvent::Finished(execution) => println!("done: {}", execution.state()),
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ExecutionStream {
    receiver: mpsc::UnboundedReceiver<ExecutionEvent>,
    cancel: CancelHandle,
}

impl ExecutionStream {
    pub(crate) fn new(
        receiver: mpsc::UnboundedReceiver<ExecutionEvent>,
        cancel: CancelHandle,
    ) -> Self {
        Self { receiver, cancel }
    }

    /// Handle that cancels the underlying execution
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Skip the remaining line events and wait for the final record
    ///
    /// Returns `None` only if the execution task died without reporting.
    pub async fn finish(mut self) -> Option<Execution> {
        while let Some(event) = self.receiver.recv().await {
            if let ExecutionEvent::Finished(execution) = event {
                return Some(*execution);
            }
        }
        None
    }
}

impl Drop for ExecutionStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Stream for ExecutionStream {
    type Item = ExecutionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
