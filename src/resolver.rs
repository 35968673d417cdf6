//! Request path to virtual directory prefix.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::{ArchiveError, Result};

/// Suffix a request path must carry to be served.
pub const ARCHIVE_SUFFIX: &str = ".zip";

/// Which of the two request kinds is being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Metadata,
    Content,
}

/// A validated request for the archive of one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    pub prefix: String,
    pub kind: RequestKind,
}

impl ArchiveRequest {
    pub fn resolve(input_url: &str, kind: RequestKind) -> Result<Self> {
        Ok(Self {
            prefix: resolve_prefix(input_url)?,
            kind,
        })
    }
}

/// Turn a request URL (or bare path) into the prefix to list.
///
/// `https://host/orders/2024.zip?sig=...` resolves to `orders/2024`.
pub fn resolve_prefix(input_url: &str) -> Result<String> {
    let raw_path = match Url::parse(input_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => input_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let path: Cow<'_, str> = percent_decode_str(&raw_path).decode_utf8_lossy();
    let key = path.strip_prefix('/').unwrap_or(&*path);

    match key.strip_suffix(ARCHIVE_SUFFIX) {
        Some(prefix) if !prefix.is_empty() => Ok(prefix.to_string()),
        _ => Err(ArchiveError::Validation {
            path: key.to_string(),
        }),
    }
}
