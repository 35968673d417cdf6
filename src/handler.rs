//! Request handlers for the two request kinds.
//!
//! Metadata requests list the prefix and answer with headers. Content
//! requests validate up front, then hand the sink a live archive stream
//! produced by a spawned task.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::archive;
use crate::bridge::{self, PipeReader};
use crate::config::Config;
use crate::context::RequestContext;
use crate::listing;
use crate::resolver::{ArchiveRequest, RequestKind};
use crate::sink::{ErrorResponse, OutputRoute, ResponseSink};
use crate::store::ObjectStore;
use crate::types::{GetObjectInput, GetObjectOutput, HeadObjectInput, HeadObjectOutput};

/// Serves archive requests against one shared store.
#[derive(Clone)]
pub struct ArchiveHandler {
    store: Arc<dyn ObjectStore>,
    config: Arc<Config>,
}

impl ArchiveHandler {
    pub fn new(store: Arc<dyn ObjectStore>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fresh context for a request, bounded by the configured timeout.
    pub fn new_context(&self) -> RequestContext {
        match self.config.request_timeout {
            Some(timeout) => RequestContext::with_timeout(timeout),
            None => RequestContext::new(),
        }
    }

    pub async fn handle_head_object(&self, input: &HeadObjectInput) -> HeadObjectOutput {
        let ctx = self.new_context();
        self.head(&input.head_object_context.input_s3_url, &ctx)
            .await
    }

    pub async fn handle_get_object(
        &self,
        input: &GetObjectInput,
        sink: &dyn ResponseSink,
    ) -> Result<GetObjectOutput> {
        let context = &input.get_object_context;
        let route = OutputRoute {
            route: context.output_route.clone(),
            token: context.output_token.clone(),
        };
        let ctx = self.new_context();
        self.get(&context.input_s3_url, &route, sink, &ctx).await
    }

    /// Answer a metadata request for `url`.
    pub async fn head(&self, url: &str, ctx: &RequestContext) -> HeadObjectOutput {
        let request = match ArchiveRequest::resolve(url, RequestKind::Metadata) {
            Ok(request) => request,
            Err(err) => return error_output(&ErrorResponse::from(&err)),
        };
        info!(bucket = %self.config.bucket, prefix = %request.prefix, "metadata request");

        let metadata = match listing::aggregate(self.store.as_ref(), &request.prefix, ctx).await {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(prefix = %request.prefix, error = %err, "listing failed");
                return error_output(&ErrorResponse::from(&err));
            }
        };

        let estimate = self.config.size_policy.estimate(&metadata);
        HeadObjectOutput {
            status_code: 200,
            error_code: String::new(),
            error_message: String::new(),
            headers: Some(BTreeMap::from([
                (
                    "Content-Length".to_string(),
                    estimate.content_length_header(),
                ),
                ("Last-Modified".to_string(), estimate.last_modified_header()),
            ])),
        }
    }

    /// Answer a content request for `url`, delivering through `sink`.
    ///
    /// The returned status only echoes what was pushed; failures after the
    /// body started surface as an error from the sink.
    pub async fn get(
        &self,
        url: &str,
        route: &OutputRoute,
        sink: &dyn ResponseSink,
        ctx: &RequestContext,
    ) -> Result<GetObjectOutput> {
        let request = match ArchiveRequest::resolve(url, RequestKind::Content) {
            Ok(request) => request,
            Err(err) => {
                let response = ErrorResponse::from(&err);
                sink.write_error(route, &response)
                    .await
                    .context("writing response")?;
                return Ok(GetObjectOutput {
                    status_code: response.status_code,
                });
            }
        };
        info!(bucket = %self.config.bucket, prefix = %request.prefix, "content request");

        let body = self.stream_archive(request.prefix, ctx);
        sink.write_body(route, body)
            .await
            .context("writing response")?;

        Ok(GetObjectOutput { status_code: 200 })
    }

    /// Start a producer task writing the archive of `prefix`.
    ///
    /// The returned reader is the consumer end; dropping it cancels `ctx`.
    pub fn stream_archive(&self, prefix: String, ctx: &RequestContext) -> PipeReader {
        let store = Arc::clone(&self.store);
        let method = self.config.compression;
        let producer_ctx = ctx.clone();

        bridge::spawn(ctx, self.config.pipe_capacity, move |writer| async move {
            archive::write_archive(store.as_ref(), &prefix, writer, method, &producer_ctx)
                .await
                .map(|_| ())
        })
    }
}

fn error_output(error: &ErrorResponse) -> HeadObjectOutput {
    HeadObjectOutput {
        status_code: error.status_code,
        error_code: error.error_code.clone(),
        error_message: error.error_message.clone(),
        headers: None,
    }
}
