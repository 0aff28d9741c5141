//! Parcel — resumable, deduplicating large-file upload client.

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use parcel::config::{ConfigFile, UploadConfig};
use parcel::controller::UploadController;
use parcel::logging::init_logging;
use parcel::progress::UploadEvent;
use parcel::transport::HttpTransport;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "parcel", version, about = "Resumable, deduplicating large-file uploads")]
struct Cli {
    /// File to upload.
    file: PathBuf,

    /// Base URL of the Parcel server.
    #[arg(long)]
    base_url: Option<String>,

    /// Max in-flight chunk transfers.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Max retries per chunk.
    #[arg(long)]
    retry_count: Option<u32>,

    /// Path to a parcel.toml config file; defaults to the standard fallback chain.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = UploadConfig::default();
    let config_file = match &cli.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::load_with_fallback(),
    };
    config_file.apply_to(&mut config);
    ConfigFile::apply_env(&mut config);

    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(retry_count) = cli.retry_count {
        config.retry_count = retry_count;
    }

    tracing::info!(file = %cli.file.display(), base_url = %config.base_url, "starting upload");

    let transport = Arc::new(HttpTransport::new(config.base_url.clone())?);
    let controller = UploadController::new(config, transport);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let bar = ProgressBar::new(100);
    bar.set_style(ProgressStyle::with_template("{bar:40} {percent}% {msg}").unwrap_or_else(|_| ProgressStyle::default_bar()));

    let events_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                UploadEvent::Progress(p) => {
                    bar.set_position(p.percentage.round() as u64);
                    bar.set_message(format!("{}/{} chunks", p.uploaded_chunks, p.total_chunks));
                }
                UploadEvent::StatusChange(status) => {
                    tracing::debug!(?status, "status change");
                }
                UploadEvent::Complete(url) => {
                    bar.finish_with_message("done");
                    println!("upload complete: {url}");
                }
                UploadEvent::Error(message) => {
                    bar.abandon();
                    eprintln!("upload failed: {message}");
                }
            }
        }
    });

    let result = controller.run(cli.file, tx).await;
    events_task.await.ok();

    match result {
        Ok(url) => {
            tracing::info!(%url, "upload finished");
            Ok(())
        }
        Err(err) => Err(anyhow::anyhow!(err)),
    }
}
