use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{ListPage, ObjectDescriptor, ObjectReader, ObjectStore};

/// Object store backed by an S3 bucket.
///
/// The SDK client is cheap to clone and safe to share across requests.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a store from the default AWS credential and region chain.
    pub async fn from_env(bucket: String) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        info!(bucket = %bucket, "S3 object store initialized");
        Self::new(Client::new(&sdk_config), bucket)
    }

    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// The SDK client, shared with the S3 response sink.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn map_sdk_error(context: &str, err: impl std::fmt::Display) -> anyhow::Error {
        anyhow!("S3 {context}: {err}")
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_page(&self, prefix: &str, token: Option<&str>) -> Result<ListPage> {
        debug!(bucket = %self.bucket, prefix, token, "list_objects_v2");

        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_continuation_token(token.map(str::to_owned))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error("list_objects_v2", e.into_service_error()))?;

        let mut objects = Vec::with_capacity(resp.contents().len());
        for object in resp.contents() {
            let key = object
                .key()
                .ok_or_else(|| anyhow!("listing entry without a key"))?;
            let last_modified = object
                .last_modified()
                .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
                .unwrap_or_default();
            objects.push(ObjectDescriptor {
                key: key.to_string(),
                size: object.size().unwrap_or(0).max(0) as u64,
                last_modified,
            });
        }

        let next_token = if resp.is_truncated().unwrap_or(false) {
            resp.next_continuation_token().map(str::to_owned)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn open(&self, key: &str) -> Result<ObjectReader> {
        debug!(bucket = %self.bucket, key, "get_object");

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    anyhow!("NoSuchKey: {}", key)
                } else {
                    Self::map_sdk_error("get_object", service_err)
                }
            })?;

        Ok(Box::new(Box::pin(resp.body.into_async_read())))
    }
}
