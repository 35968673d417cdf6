use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use reqwest::{Body, Client, RequestBuilder};
use tracing::debug;

use super::{ErrorResponse, OutputRoute, ResponseSink};
use crate::bridge::PipeReader;

/// Pushes responses to an HTTP endpoint in the `WriteGetObjectResponse`
/// shape: routing identifiers and forwarded status travel as headers, the
/// archive as a streamed request body.
pub struct HttpResponseSink {
    client: Client,
    endpoint: String,
}

impl HttpResponseSink {
    pub fn new(endpoint: String) -> Result<Self> {
        // No overall timeout: bodies stream for as long as the archive takes
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, endpoint })
    }

    fn request(&self, route: &OutputRoute, status: u16) -> RequestBuilder {
        self.client
            .post(&self.endpoint)
            .header("x-amz-request-route", &route.route)
            .header("x-amz-request-token", &route.token)
            .header("x-amz-fwd-status", status.to_string())
    }
}

#[async_trait]
impl ResponseSink for HttpResponseSink {
    async fn write_error(&self, route: &OutputRoute, error: &ErrorResponse) -> Result<()> {
        let resp = self
            .request(route, error.status_code)
            .header("x-amz-fwd-error-code", &error.error_code)
            .header("x-amz-fwd-error-message", &error.error_message)
            .send()
            .await?;

        if !resp.status().is_success() {
            bail!("Writing error response failed with status: {}", resp.status());
        }
        Ok(())
    }

    async fn write_body(&self, route: &OutputRoute, body: PipeReader) -> Result<()> {
        debug!(endpoint = %self.endpoint, route = %route.route, "streaming response body");

        let resp = self
            .request(route, 200)
            .header("content-type", "application/zip")
            .body(Body::wrap_stream(body))
            .send()
            .await?;

        if !resp.status().is_success() {
            bail!("Writing response failed with status: {}", resp.status());
        }
        Ok(())
    }
}
