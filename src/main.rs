//! Main entry point for the prefixzip CLI application.
//!
//! This binary answers archive requests from the command line, either
//! directly (`head`, `get`) or by replaying an Object Lambda style event
//! (`invoke`).

use anyhow::{Context, Result, bail};
use aws_sdk_s3::Client;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tracing_subscriber::EnvFilter;

use prefixzip::cli::Command;
use prefixzip::types::InvocationEvent;
use prefixzip::{
    ArchiveHandler, Cli, HttpResponseSink, LocalObjectStore, ObjectStore, OutputRoute,
    ResponseSink, S3ObjectStore, S3ResponseSink, WriterSink,
};

/// Application entry point.
///
/// Sets up logging, picks the object store and dispatches the subcommand.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Both reqwest and the AWS SDK pull in rustls; pin one process-wide provider.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();
    let config = Arc::new(cli.config());

    let (store, s3_client): (Arc<dyn ObjectStore>, Option<Client>) = match &cli.local_root {
        Some(root) => (
            Arc::new(LocalObjectStore::new(&root.join(&config.bucket))?),
            None,
        ),
        None => {
            let s3 = S3ObjectStore::from_env(config.bucket.clone()).await;
            let client = s3.client().clone();
            (Arc::new(s3), Some(client))
        }
    };
    let handler = ArchiveHandler::new(store, config);

    match &cli.command {
        Command::Head { url } => {
            let output = handler.head(url, &handler.new_context()).await;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Get {
            url,
            output,
            route,
            token,
        } => {
            let route = OutputRoute {
                route: route.clone(),
                token: token.clone(),
            };
            // -o only loses to an explicit endpoint; S3 delivery needs a route
            let remote = if cli.endpoint.is_some() || (output.is_none() && !route.route.is_empty())
            {
                remote_sink(&cli, s3_client.as_ref())?
            } else {
                None
            };
            match (remote, output) {
                (Some(sink), _) => {
                    let ctx = handler.new_context();
                    let result = handler.get(url, &route, sink.as_ref(), &ctx).await?;
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                (None, Some(path)) => {
                    let file = tokio::fs::File::create(path)
                        .await
                        .with_context(|| format!("creating {}", path.display()))?;
                    get_to_writer(&handler, url, &route, file).await?;
                }
                (None, None) => get_to_writer(&handler, url, &route, tokio::io::stdout()).await?,
            }
        }
        Command::Invoke { event } => invoke(&handler, &cli, s3_client.as_ref(), event).await?,
    }

    Ok(())
}

/// Where content responses are pushed: the configured endpoint, else S3
/// when serving from S3, else nowhere remote.
fn remote_sink(cli: &Cli, s3_client: Option<&Client>) -> Result<Option<Box<dyn ResponseSink>>> {
    if let Some(endpoint) = &cli.endpoint {
        return Ok(Some(Box::new(HttpResponseSink::new(endpoint.clone())?)));
    }
    Ok(s3_client.map(|client| Box::new(S3ResponseSink::new(client.clone())) as Box<dyn ResponseSink>))
}

/// Stream the archive for `url` into a local writer.
///
/// An error response becomes a failed exit.
async fn get_to_writer<W>(
    handler: &ArchiveHandler,
    url: &str,
    route: &OutputRoute,
    out: W,
) -> Result<()>
where
    W: AsyncWrite + Send + Unpin,
{
    let sink = WriterSink::new(out);
    let ctx = handler.new_context();
    handler.get(url, route, &sink, &ctx).await?;

    if let Some(error) = sink.error() {
        bail!(
            "{} ({}): {}",
            error.error_code,
            error.status_code,
            error.error_message
        );
    }
    Ok(())
}

/// Handle one JSON invocation event read from `path`.
///
/// Content events are answered through `WriteGetObjectResponse` when
/// serving from S3; with a local store and no endpoint the archive goes to
/// stdout.
async fn invoke(
    handler: &ArchiveHandler,
    cli: &Cli,
    s3_client: Option<&Client>,
    path: &Path,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let event: InvocationEvent =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

    match event {
        InvocationEvent::HeadObject(input) => {
            let output = handler.handle_head_object(&input).await;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        InvocationEvent::GetObject(input) => {
            let sink: Box<dyn ResponseSink> = match remote_sink(cli, s3_client)? {
                Some(sink) => sink,
                None => Box::new(WriterSink::new(tokio::io::stdout())),
            };
            let output = handler.handle_get_object(&input, sink.as_ref()).await?;
            eprintln!("{}", serde_json::to_string(&output)?);
        }
    }
    Ok(())
}
