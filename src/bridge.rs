//! Bounded pipe between the archive producer task and the response consumer.
//!
//! The producer writes through [`PipeWriter`] (an `AsyncWrite`); each write
//! waits for a free slot, so at most `capacity` chunks of up to
//! [`MAX_CHUNK`] bytes are ever in flight. The consumer reads a
//! `Stream` of byte chunks from [`PipeReader`].
//!
//! [`spawn`] runs the producer inside a fault barrier and closes the pipe
//! exactly once: cleanly on success, or with the first error otherwise.
//! A panic in the producer is caught and delivered as
//! [`ArchiveError::UnexpectedFault`].

use std::any::Any;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::{FutureExt, Stream};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::{DropGuard, PollSender};
use tracing::{debug, error, warn};

use crate::context::RequestContext;
use crate::error::{ArchiveError, Result};

/// Largest chunk handed over in one slot.
pub const MAX_CHUNK: usize = 64 * 1024;

/// Default number of in-flight chunks.
pub const DEFAULT_CAPACITY: usize = 4;

enum Frame {
    Data(Bytes),
    Close(Option<ArchiveError>),
}

/// Producer end of the pipe.
pub struct PipeWriter {
    tx: PollSender<Frame>,
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let this = self.get_mut();
        ready!(this.tx.poll_reserve(cx)).map_err(|_| reader_gone())?;

        let n = buf.len().min(MAX_CHUNK);
        this.tx
            .send_item(Frame::Data(Bytes::copy_from_slice(&buf[..n])))
            .map_err(|_| reader_gone())?;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().tx.close();
        Poll::Ready(Ok(()))
    }
}

fn reader_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "archive reader went away")
}

/// Consumer end of the pipe.
///
/// Yields chunks until the producer closes. A close with an error yields
/// that error once, then ends. Dropping the reader cancels the request
/// context so the producer stops at its next boundary.
pub struct PipeReader {
    rx: mpsc::Receiver<Frame>,
    finished: bool,
    _cancel_on_drop: DropGuard,
}

impl PipeReader {
    /// Adapt into an `AsyncRead`.
    pub fn into_async_read(self) -> StreamReader<Self, Bytes> {
        StreamReader::new(self)
    }
}

impl Stream for PipeReader {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match ready!(this.rx.poll_recv(cx)) {
            Some(Frame::Data(bytes)) => Poll::Ready(Some(Ok(bytes))),
            Some(Frame::Close(None)) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Some(Frame::Close(Some(err))) => {
                this.finished = true;
                Poll::Ready(Some(Err(err.into_io())))
            }
            None => {
                this.finished = true;
                let err = ArchiveError::UnexpectedFault(
                    "archive producer exited without closing the stream".to_string(),
                );
                Poll::Ready(Some(Err(err.into_io())))
            }
        }
    }
}

/// Spawn `producer` on the runtime, wired to a new pipe.
///
/// The producer receives the write end; its result decides how the pipe is
/// closed. Returns the read end.
pub fn spawn<F, Fut>(ctx: &RequestContext, capacity: usize, producer: F) -> PipeReader
where
    F: FnOnce(PipeWriter) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let closer = tx.clone();
    let fut = producer(PipeWriter {
        tx: PollSender::new(tx),
    });

    tokio::spawn(async move {
        let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "archive producer panicked");
                Err(ArchiveError::UnexpectedFault(format!("panic: {message}")))
            }
        };

        let close = match outcome {
            Ok(()) => None,
            Err(err) => {
                warn!(error = %err, code = err.code(), "archive stream aborted");
                Some(err)
            }
        };
        if closer.send(Frame::Close(close)).await.is_err() {
            debug!("archive reader dropped before close");
        }
    });

    PipeReader {
        rx,
        finished: false,
        _cancel_on_drop: ctx.token().clone().drop_guard(),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
