use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use futures::StreamExt;
use http_body::Frame;
use tracing::debug;

use super::{ErrorResponse, OutputRoute, ResponseSink};
use crate::bridge::PipeReader;

/// Pushes responses back through S3 `WriteGetObjectResponse`, the delivery
/// path of an Object Lambda access point.
#[derive(Clone)]
pub struct S3ResponseSink {
    client: Client,
}

impl S3ResponseSink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResponseSink for S3ResponseSink {
    async fn write_error(&self, route: &OutputRoute, error: &ErrorResponse) -> Result<()> {
        self.client
            .write_get_object_response()
            .request_route(&route.route)
            .request_token(&route.token)
            .status_code(i32::from(error.status_code))
            .error_code(&error.error_code)
            .error_message(&error.error_message)
            .send()
            .await
            .map_err(|e| anyhow!("S3 write_get_object_response: {}", e.into_service_error()))?;
        Ok(())
    }

    async fn write_body(&self, route: &OutputRoute, body: PipeReader) -> Result<()> {
        debug!(route = %route.route, "streaming response body to S3");

        self.client
            .write_get_object_response()
            .request_route(&route.route)
            .request_token(&route.token)
            .status_code(200)
            .content_type("application/zip")
            .body(archive_byte_stream(body))
            .send()
            .await
            .map_err(|e| anyhow!("S3 write_get_object_response: {}", e.into_service_error()))?;
        Ok(())
    }
}

/// Streaming SDK body over the archive pipe. The length is unknown up
/// front, so the request is sent chunked.
fn archive_byte_stream(body: PipeReader) -> ByteStream {
    ByteStream::from_body_1_x(ArchiveBody(body))
}

struct ArchiveBody(PipeReader);

impl http_body::Body for ArchiveBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.0
            .poll_next_unpin(cx)
            .map(|item| item.map(|chunk| chunk.map(Frame::data)))
    }
}
