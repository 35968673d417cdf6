use std::convert::Infallible;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::config::Config;
use crate::estimate::{DEFAULT_PLACEHOLDER_LENGTH, SizeEstimationPolicy};
use crate::zip::CompressionMethod;

#[derive(Parser, Debug)]
#[command(name = "prefixzip")]
#[command(version)]
#[command(about = "Serve object store prefixes as ZIP archives streamed on the fly", long_about = None)]
#[command(after_help = "Examples:\n  \
  prefixzip --bucket photos head https://ap.example.com/2024/trip.zip\n  \
  prefixzip --bucket photos get /2024/trip.zip -o trip.zip\n  \
  prefixzip --local-root ./data --bucket photos invoke event.json")]
pub struct Cli {
    /// Bucket holding the prefixes
    #[arg(long, env = "BUCKET")]
    pub bucket: String,

    /// Serve <DIR>/<BUCKET> from the local filesystem instead of S3
    #[arg(long, env = "PREFIXZIP_LOCAL_ROOT", value_name = "DIR")]
    pub local_root: Option<PathBuf>,

    /// Report the real summed object size in metadata responses
    #[arg(long, env = "REAL_LENGTH", action = ArgAction::SetTrue, value_parser = parse_real_length)]
    pub real_length: bool,

    /// Content-Length reported when --real-length is off
    #[arg(long, env = "PLACEHOLDER_LENGTH", default_value_t = DEFAULT_PLACEHOLDER_LENGTH)]
    pub placeholder_length: u64,

    /// Compression method for archive entries
    #[arg(long, env = "ARCHIVE_COMPRESSION", value_enum, default_value_t = Compression::Store)]
    pub compression: Compression,

    /// Abort requests running longer than this many seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Push content responses to this HTTP endpoint instead of S3
    #[arg(long, env = "RESPONSE_ENDPOINT", value_name = "URL")]
    pub endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the metadata response for an archive URL
    Head {
        #[arg(value_name = "URL")]
        url: String,
    },
    /// Stream the archive for a URL
    Get {
        #[arg(value_name = "URL")]
        url: String,

        /// Write the archive to FILE (default: stdout)
        #[arg(short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output route of the request; with S3 and no -o, the archive is
        /// pushed through WriteGetObjectResponse
        #[arg(long, default_value = "")]
        route: String,

        /// Output token of the request
        #[arg(long, default_value = "")]
        token: String,
    },
    /// Handle an Object Lambda style JSON event
    Invoke {
        #[arg(value_name = "EVENT")]
        event: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    Store,
    Deflate,
}

impl From<Compression> for CompressionMethod {
    fn from(c: Compression) -> Self {
        match c {
            Compression::Store => CompressionMethod::Stored,
            Compression::Deflate => CompressionMethod::Deflate,
        }
    }
}

/// Only the exact value `true` turns real lengths on; anything else is off.
fn parse_real_length(value: &str) -> Result<bool, Infallible> {
    Ok(value == "true")
}

impl Cli {
    pub fn config(&self) -> Config {
        Config {
            size_policy: SizeEstimationPolicy {
                real_length: self.real_length,
                placeholder_length: self.placeholder_length,
            },
            compression: self.compression.into(),
            request_timeout: self.timeout.map(Duration::from_secs),
            ..Config::new(self.bucket.clone())
        }
    }
}
