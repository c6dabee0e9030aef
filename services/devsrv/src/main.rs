//! Device gateway service (`devsrv`)
//!
//! Accepts device connections, forwards queued commands and keeps device
//! records current.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use common::logging::{self, LogConfig};
use common::redis::{RedisClient, RedisPoolConfig};
use common::shutdown::cancel_on_shutdown;
use common::sqlite::SqliteClient;
use errors::{ServiceError, ServiceResult};

use devsrv::config::{Config, DEFAULT_CONFIG_PATH};
use devsrv::listener::DeviceServer;
use devsrv::monitor::StatusMonitor;
use devsrv::queue::RedisCommandQueue;
use devsrv::registry::SessionRegistry;
use devsrv::session::SessionContext;
use devsrv::store::SqliteDeviceStore;

/// Command-line arguments for devsrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "devsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Device gateway for heater/dosage control units",
    long_about = None
)]
struct Args {
    /// Configuration file (YAML)
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH, env = "DEVSRV_CONFIG")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Device listener address; overrides the config file
    #[arg(short = 'b', long)]
    bind: Option<String>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> ServiceResult<()> {
    let args = Args::parse();
    let result = run(args).await;
    if let Err(e) = &result {
        // Config and logging failures happen before any subscriber exists
        logging::report_failure(
            e.error_code(),
            format_args!("devsrv failed: {}", e),
            &mut std::io::stderr(),
        );
    }
    result
}

async fn run(args: Args) -> ServiceResult<()> {
    let mut config = Config::load(&args.config)?;
    if let Some(bind) = args.bind.clone() {
        config.server.bind = bind;
        config.validate()?;
    }

    logging::init_log_root(Some(&config.logging.dir));
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    logging::init_with_config(LogConfig {
        service_name: "devsrv".to_string(),
        log_dir: logging::get_log_root(),
        console_level: logging::parse_level(level),
        enable_json: config.logging.json,
        ansi: !args.no_color,
        enable_frame_log: config.logging.frame_log,
    })
    .map_err(|e| ServiceError::StartupFailed(format!("Failed to initialize logging: {}", e)))?;

    if args.validate {
        info!("Configuration {} is valid", args.config.display());
        return Ok(());
    }

    info!(
        "Starting devsrv v{}: bind {}, database {}, redis {}",
        env!("CARGO_PKG_VERSION"),
        config.server.bind,
        config.database.path,
        config.redis.url
    );

    let sqlite = SqliteClient::new(&config.database.path, config.database.max_connections).await?;
    let store = Arc::new(SqliteDeviceStore::new(sqlite.clone()).await?);

    let mut redis_config = RedisPoolConfig::from_url(&config.redis.url);
    redis_config.max_connections = config.redis.max_connections;
    let redis = RedisClient::with_config(redis_config).await?;
    let queue = Arc::new(RedisCommandQueue::new(redis));
    info!("Redis connected: {}", config.redis.url);

    let shutdown = CancellationToken::new();
    let signal_task = cancel_on_shutdown(shutdown.clone());

    let monitor_task = config.monitor.enabled.then(|| {
        let monitor = StatusMonitor::new(store.clone(), queue.clone(), config.monitor.interval());
        tokio::spawn(monitor.run(shutdown.clone()))
    });

    let server = DeviceServer::bind(&config.server)?;
    let ctx = SessionContext::new(
        store,
        queue,
        SessionRegistry::new(),
        config.session.settings(),
    );
    let served = server.serve(ctx, shutdown.clone()).await;

    shutdown.cancel();
    if let Some(task) = monitor_task {
        if let Err(e) = task.await {
            error!("Status monitor task failed: {}", e);
        }
    }
    signal_task.abort();
    sqlite.close().await;

    info!("devsrv stopped");
    served
}
