use std::sync::Mutex as StdMutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;

use super::{ErrorResponse, OutputRoute, ResponseSink};
use crate::bridge::PipeReader;

/// Sink that copies bodies into a local writer (file, stdout, buffer).
///
/// Error responses are recorded rather than written.
pub struct WriterSink<W> {
    out: Mutex<W>,
    error: StdMutex<Option<ErrorResponse>>,
}

impl<W: AsyncWrite + Send + Unpin> WriterSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            error: StdMutex::new(None),
        }
    }

    /// The error pushed for the request, if any.
    pub fn error(&self) -> Option<ErrorResponse> {
        self.error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Send + Unpin> ResponseSink for WriterSink<W> {
    async fn write_error(&self, route: &OutputRoute, error: &ErrorResponse) -> Result<()> {
        warn!(
            route = %route.route,
            status = error.status_code,
            code = %error.error_code,
            message = %error.error_message,
            "error response"
        );
        *self.error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error.clone());
        Ok(())
    }

    async fn write_body(&self, _route: &OutputRoute, body: PipeReader) -> Result<()> {
        let mut out = self.out.lock().await;
        let mut reader = body.into_async_read();
        tokio::io::copy(&mut reader, &mut *out)
            .await
            .context("streaming archive body")?;
        out.flush().await?;
        Ok(())
    }
}
