use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use seglog_db::proto::log_server::LogServer;
use seglog_db::{CommitLog, Log, SeglogService, metrics};

/// Server configuration parsed from environment variables.
///
/// # Environment Variables
///
/// | Variable                  | Required | Default     | Description                           |
/// |---------------------------|----------|-------------|---------------------------------------|
/// | `SEGLOG_DATA`             | Yes      | --          | Directory holding the segment files   |
/// | `SEGLOG_LISTEN`           | No       | `[::]:8400` | Socket address the gRPC server binds  |
/// | `SEGLOG_MAX_STORE_BYTES`  | No       | `1024`      | Per-segment store file cap            |
/// | `SEGLOG_MAX_INDEX_BYTES`  | No       | `1024`      | Per-segment index file cap            |
/// | `SEGLOG_SYNC_ON_APPEND`   | No       | `false`     | Fsync store data after every append   |
/// | `SEGLOG_METRICS_LISTEN`   | No       | (disabled)  | Address for the `/metrics` endpoint   |
#[derive(Debug, Clone, PartialEq)]
struct Config {
    /// Directory the log keeps its segments in.
    data_dir: PathBuf,
    /// Socket address the gRPC server listens on.
    listen_addr: SocketAddr,
    /// Engine configuration handed to the log.
    log: seglog_db::Config,
    /// Optional address for the Prometheus metrics endpoint.
    metrics_addr: Option<SocketAddr>,
}

/// Default socket address the server listens on when `SEGLOG_LISTEN` is not set.
const DEFAULT_LISTEN_ADDR: &str = "[::]:8400";

/// Read an optional environment variable and parse it, reporting the
/// variable name in the error message on failure.
fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(val) => val
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("{name} is invalid: {e}")),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Parse server configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `Err(String)` if `SEGLOG_DATA` is not set or any optional
    /// variable fails to parse.
    fn from_env() -> Result<Config, String> {
        let data_dir = std::env::var("SEGLOG_DATA")
            .map(PathBuf::from)
            .map_err(|_| "SEGLOG_DATA environment variable is required".to_string())?;

        let listen_addr = parse_env::<SocketAddr>("SEGLOG_LISTEN")?.unwrap_or_else(|| {
            DEFAULT_LISTEN_ADDR
                .parse::<SocketAddr>()
                .expect("default listen address is valid")
        });

        // Zero-valued caps mean "use the engine defaults".
        let log = seglog_db::Config {
            segment: seglog_db::SegmentConfig {
                max_store_bytes: parse_env("SEGLOG_MAX_STORE_BYTES")?.unwrap_or(0),
                max_index_bytes: parse_env("SEGLOG_MAX_INDEX_BYTES")?.unwrap_or(0),
                initial_offset: 0,
            },
            sync_on_append: parse_env("SEGLOG_SYNC_ON_APPEND")?.unwrap_or(false),
        };

        let metrics_addr = parse_env::<SocketAddr>("SEGLOG_METRICS_LISTEN")?;

        Ok(Config {
            data_dir,
            listen_addr,
            log,
            metrics_addr,
        })
    }
}

/// Install the tracing subscriber, filtered by `RUST_LOG` (default `info`).
/// Safe to call more than once; later calls lose to the first subscriber.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(1);
        }
    };

    tracing::info!(data_dir = %config.data_dir.display(), "data directory");
    tracing::info!(listen_addr = %config.listen_addr, "listen address");

    let log = match Log::open(&config.data_dir, config.log) {
        Ok(log) => Arc::new(log),
        Err(e) => {
            tracing::error!(error = %e, "failed to open log");
            std::process::exit(1);
        }
    };
    tracing::info!(
        lowest = log.lowest_offset(),
        highest = log.highest_offset(),
        "log opened"
    );

    if let Some(addr) = config.metrics_addr {
        match metrics::recorder() {
            Some(handle) => match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    let metrics_addr = listener
                        .local_addr()
                        .expect("bound listener should have a local address");
                    tracing::info!(addr = %metrics_addr, "metrics endpoint listening");
                    metrics::serve(handle, listener);
                }
                Err(e) => {
                    tracing::warn!(addr = %addr, error = %e, "failed to bind metrics listener");
                }
            },
            None => tracing::warn!("metrics recorder slot already taken, endpoint disabled"),
        }
    }

    let service = SeglogService::new(Arc::clone(&log) as Arc<dyn CommitLog>);
    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();

    let server = tonic::transport::Server::builder()
        .add_service(health_service)
        .add_service(LogServer::new(service));

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(addr = %config.listen_addr, error = %e, "failed to bind listener");
            std::process::exit(1);
        });

    let addr = listener
        .local_addr()
        .expect("bound listener should have a local address");
    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);

    // Mark the service healthy only once the listener is bound.
    health_reporter
        .set_serving::<LogServer<SeglogService>>()
        .await;
    health_reporter
        .set_service_status("", tonic_health::ServingStatus::Serving)
        .await;

    tracing::info!("server listening on {addr}");

    // SIGINT or SIGTERM ends the serve loop. The store relies on unix
    // positional I/O, so unix signals are the only case to handle.
    let shutdown = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler should register");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    };

    server
        .serve_with_incoming_shutdown(incoming, shutdown)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "server error");
            std::process::exit(1);
        });

    tracing::info!("shutting down");
    if let Err(e) = log.close() {
        tracing::error!(error = %e, "failed to close log cleanly");
        std::process::exit(1);
    }
}
