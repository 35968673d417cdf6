//! Content-Length / Last-Modified reporting for metadata requests.
//!
//! Clients such as the AWS CLI split downloads above their multipart
//! threshold into parallel Range requests, which a streamed archive cannot
//! serve. Reporting a small placeholder length keeps them on a single GET.
//! The real figure is the sum of object sizes and leaves out archive
//! overhead.

use std::time::SystemTime;

use crate::listing::AggregateMetadata;

/// Placeholder Content-Length, below common parallel-download thresholds.
pub const DEFAULT_PLACEHOLDER_LENGTH: u64 = 1024;

/// Chooses between the real aggregate size and a fixed placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeEstimationPolicy {
    pub real_length: bool,
    pub placeholder_length: u64,
}

/// Header values reported for a metadata request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeEstimate {
    pub content_length: u64,
    pub last_modified: SystemTime,
}

impl SizeEstimate {
    pub fn content_length_header(&self) -> String {
        self.content_length.to_string()
    }

    pub fn last_modified_header(&self) -> String {
        httpdate::fmt_http_date(self.last_modified)
    }
}

impl Default for SizeEstimationPolicy {
    fn default() -> Self {
        Self {
            real_length: false,
            placeholder_length: DEFAULT_PLACEHOLDER_LENGTH,
        }
    }
}

impl SizeEstimationPolicy {
    pub fn estimate(&self, metadata: &AggregateMetadata) -> SizeEstimate {
        let content_length = if self.real_length {
            metadata.total_size
        } else {
            self.placeholder_length
        };
        let last_modified = metadata
            .most_recent_modification
            .map(SystemTime::from)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        SizeEstimate {
            content_length,
            last_modified,
        }
    }
}
