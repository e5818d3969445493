//! stager gateway: begin, presign, complete and abort multipart uploads

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use stager_gateway::{GatewayServer, MemoryProvider, S3Provider, StorageProvider};

fn cli() -> Command {
    Command::new("stager-gateway")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Multipart upload gateway")
        .arg(
            Arg::new("bind")
                .long("bind")
                .value_name("ADDR")
                .help("Bind address")
                .env("STAGER_BIND")
                .default_value("127.0.0.1:8080"),
        )
        .arg(
            Arg::new("provider")
                .long("provider")
                .value_name("KIND")
                .help("Where parts are stored")
                .env("STAGER_PROVIDER")
                .value_parser(["memory", "s3"])
                .default_value("memory"),
        )
        .arg(
            Arg::new("bucket")
                .long("bucket")
                .value_name("NAME")
                .help("S3 bucket (s3 provider)")
                .env("STAGER_BUCKET")
                .required_if_eq("provider", "s3"),
        )
        .arg(
            Arg::new("region")
                .long("region")
                .value_name("REGION")
                .help("S3 region (s3 provider)")
                .env("STAGER_REGION")
                .default_value("us-east-2"),
        )
        .arg(
            Arg::new("public-url")
                .long("public-url")
                .value_name("URL")
                .help("Base URL clients use to reach this gateway (memory provider)")
                .env("STAGER_PUBLIC_URL"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .help("Emit logs as JSON lines")
                .env("STAGER_LOG_JSON")
                .action(ArgAction::SetTrue),
        )
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("log-json"));

    let bind_addr: SocketAddr = matches
        .get_one::<String>("bind")
        .context("missing --bind")?
        .parse()
        .context("invalid bind address")?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("cannot bind {}", bind_addr))?;
    let local_addr = listener.local_addr()?;

    let provider: Arc<dyn StorageProvider> = match matches
        .get_one::<String>("provider")
        .map(String::as_str)
    {
        Some("s3") => {
            let bucket = matches.get_one::<String>("bucket").context("--bucket is required for s3")?;
            let region = matches.get_one::<String>("region").context("missing --region")?;
            Arc::new(S3Provider::from_env(bucket.as_str(), region.as_str()).await)
        }
        _ => {
            let public_url = match matches.get_one::<String>("public-url") {
                Some(url) => Url::parse(url).context("invalid --public-url")?,
                None => Url::parse(&format!("http://{}", local_addr))?,
            };
            warn!("Memory provider: uploads are lost on restart");
            info!("Part URLs point at {}", public_url);
            Arc::new(MemoryProvider::new(public_url))
        }
    };

    let server = GatewayServer::new(provider);
    tokio::select! {
        served = server.serve_listener(listener) => served?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
