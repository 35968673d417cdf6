use std::time::Duration;

use crate::bridge::DEFAULT_CAPACITY;
use crate::estimate::SizeEstimationPolicy;
use crate::zip::CompressionMethod;

/// Settings shared read-only by every request.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bucket (or local directory name) the prefixes live in
    pub bucket: String,
    pub size_policy: SizeEstimationPolicy,
    pub compression: CompressionMethod,
    /// In-flight chunks between the archive producer and the response
    pub pipe_capacity: usize,
    pub request_timeout: Option<Duration>,
}

impl Config {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            size_policy: SizeEstimationPolicy::default(),
            compression: CompressionMethod::Stored,
            pipe_capacity: DEFAULT_CAPACITY,
            request_timeout: None,
        }
    }

    pub fn with_real_length(mut self, real_length: bool) -> Self {
        self.size_policy.real_length = real_length;
        self
    }
}
