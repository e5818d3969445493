//! stager: upload one archive through the gateway

use anyhow::{bail, Context};
use clap::{value_parser, Arg, Command};
use std::num::{NonZeroU64, NonZeroUsize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stager_client::{
    BackendClient, ByteSource, FileSource, HttpTransmitter, RetryPolicy, UploadConfig,
    UploadCoordinator,
};
use stager_core::{check_file, fit_chunk_size, format_size};

const MIB: u64 = 1024 * 1024;

fn cli() -> Command {
    Command::new("stager")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Upload a large archive as a multipart upload")
        .arg(
            Arg::new("file")
                .value_name("FILE")
                .help("Archive to upload")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("endpoint")
                .long("endpoint")
                .value_name("URL")
                .help("Gateway base URL")
                .env("STAGER_ENDPOINT")
                .default_value("http://127.0.0.1:8080"),
        )
        .arg(
            Arg::new("chunk-size-mb")
                .long("chunk-size-mb")
                .value_name("MB")
                .help("Preferred part size in MiB; grown if the file needs more parts than allowed")
                .env("STAGER_CHUNK_SIZE_MB")
                .default_value("10")
                .value_parser(value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("concurrency")
                .long("concurrency")
                .value_name("N")
                .help("Parts in flight at once")
                .env("STAGER_CONCURRENCY")
                .default_value("4")
                .value_parser(value_parser!(u64).range(1..=64)),
        )
        .arg(
            Arg::new("retries")
                .long("retries")
                .value_name("N")
                .help("Retries per part and per control request")
                .env("STAGER_RETRIES")
                .default_value("2")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("timeout-secs")
                .long("timeout-secs")
                .value_name("SECS")
                .help("Per-request timeout")
                .env("STAGER_TIMEOUT_SECS")
                .default_value("120")
                .value_parser(value_parser!(u64).range(1..)),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = cli().get_matches();
    let path = matches
        .get_one::<PathBuf>("file")
        .context("missing FILE")?;
    let endpoint = matches
        .get_one::<String>("endpoint")
        .context("missing --endpoint")?;
    let chunk_mb = *matches.get_one::<u64>("chunk-size-mb").context("missing --chunk-size-mb")?;
    let concurrency = *matches.get_one::<u64>("concurrency").context("missing --concurrency")?;
    let retries = *matches.get_one::<u32>("retries").context("missing --retries")?;
    let timeout_secs = *matches.get_one::<u64>("timeout-secs").context("missing --timeout-secs")?;

    let source = FileSource::open(path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))?;
    let file_name = match source.file_name() {
        Some(name) => name.to_string(),
        None => bail!("{} has no usable file name", path.display()),
    };
    check_file(&file_name, source.len())?;

    let config = UploadConfig {
        chunk_size: NonZeroU64::new(chunk_mb.saturating_mul(MIB)).context("chunk size must be positive")?,
        concurrency: NonZeroUsize::new(concurrency as usize).context("concurrency must be positive")?,
        part_retry: RetryPolicy::default().with_max_retries(retries),
        control_retry: RetryPolicy::default().with_max_retries(retries),
        request_timeout_secs: timeout_secs,
        ..UploadConfig::default()
    };

    let chunk_size = fit_chunk_size(source.len(), config.chunk_size);
    if chunk_size != config.chunk_size {
        warn!("Part size raised to {} to stay within the part limit", format_size(chunk_size.get()));
    }

    println!("{} ({})", file_name, format_size(source.len()));
    info!("Uploading to {} in parts of {}", endpoint, format_size(chunk_size.get()));

    let authorizer = BackendClient::new(endpoint, config.request_timeout())?;
    let transmitter = HttpTransmitter::new(config.request_timeout())?;
    let coordinator = UploadCoordinator::new(authorizer, transmitter, config);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping upload");
            interrupt.cancel();
        }
    });

    let report = |percent: u8| info!("Uploaded {}%", percent);
    let outcome = coordinator
        .upload(Arc::new(source), &file_name, &report, cancel)
        .await;

    println!("{}", outcome.message());
    if !outcome.is_completed() {
        std::process::exit(1);
    }
    Ok(())
}
