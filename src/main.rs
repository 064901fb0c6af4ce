//! einvoice-webui - 电子发票报销登记系统
//!
//! Records electronic invoices scanned from their QR codes, rejects
//! duplicate submissions, and keeps an audit trail of every operation.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use einvoice_webui::{
    config::{self, LogFormat},
    create_router,
    db::{self, UserRepository},
    models::User,
    services::{AuditService, AuthService, GeoipService},
    AppConfig, AppState, DbPool,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("einvoice-webui {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration first so logging knows its format
    let config = AppConfig::load().context("Failed to load configuration")?;

    // The guard must stay alive so file logs are flushed on shutdown
    let _log_guard = init_logging(&config);

    info!("einvoice-webui starting up");

    ensure_data_directory(&config)?;

    info!("Initializing database connection");
    let pool = db::init_pool(&config.database)
        .await
        .context("Failed to initialize database")?;

    ensure_initial_admin(&pool).await?;

    let geoip = Arc::new(
        GeoipService::new(pool.clone(), config.geoip.clone())
            .context("Failed to initialize geolocation client")?,
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        db: pool.clone(),
        geoip: geoip.clone(),
    };

    spawn_retention_sweep(pool, geoip, &config);

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address configuration")?;

    info!("Starting HTTP server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("HTTP server error")?;

    Ok(())
}

/// Create the initial admin account on a fresh database.
///
/// The password comes from EINVOICE_ADMIN_PASSWORD or defaults to a
/// well-known value that must be changed on first login.
async fn ensure_initial_admin(pool: &DbPool) -> Result<()> {
    let repo = UserRepository::new(pool);
    if !repo.list().await?.is_empty() {
        return Ok(());
    }

    let password =
        env::var("EINVOICE_ADMIN_PASSWORD").unwrap_or_else(|_| "admin123".to_string());
    let admin = User::new(
        "admin".to_string(),
        "管理员".to_string(),
        AuthService::hash_password(&password)
            .map_err(|e| anyhow::anyhow!("Failed to hash initial admin password: {}", e))?,
        "admin".to_string(),
    );
    repo.insert(&admin)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create initial admin: {}", e))?;

    warn!("Created initial admin account 'admin'; change its password immediately");
    Ok(())
}

/// Background maintenance: purge expired audit entries and stale
/// geolocation cache rows on a fixed interval.
fn spawn_retention_sweep(pool: DbPool, geoip: Arc<GeoipService>, config: &AppConfig) {
    let retention_days = config.retention.log_retention_days;
    let interval = Duration::from_secs(config.retention.sweep_interval_hours * 3600);

    tokio::spawn(async move {
        let audit = AuditService::new(pool);
        let mut ticker = tokio::time::interval(interval);
        // The immediate first tick doubles as a startup sweep
        loop {
            ticker.tick().await;
            let purged_logs = audit.purge(retention_days).await;
            let purged_cache = geoip.purge_stale().await;
            info!(
                purged_logs = purged_logs,
                purged_cache = purged_cache,
                "Retention sweep completed"
            );
        }
    });
}

/// Initialize the logging/tracing infrastructure
fn init_logging(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use config::LogTarget;
    use tracing_subscriber::{prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let log_config = &config.logging;

    match &log_config.target {
        LogTarget::Console => {
            let subscriber = tracing_subscriber::registry().with(env_filter);
            init_console_logging(subscriber, &log_config.format);
            None
        }
        LogTarget::File => {
            let (writer, guard) = create_file_writer(log_config);
            let subscriber = tracing_subscriber::registry().with(env_filter);
            init_file_logging(subscriber, &log_config.format, writer);
            Some(guard)
        }
        LogTarget::Both => {
            let (writer, guard) = create_file_writer(log_config);
            let subscriber = tracing_subscriber::registry().with(env_filter);
            init_both_logging(subscriber, &log_config.format, writer);
            Some(guard)
        }
    }
}

/// Create a file writer with optional daily rotation
fn create_file_writer(
    log_config: &config::LoggingConfig,
) -> (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
) {
    if let Err(e) = std::fs::create_dir_all(&log_config.log_dir) {
        eprintln!(
            "Warning: Failed to create log directory {:?}: {}",
            log_config.log_dir, e
        );
    }

    let file_appender = if log_config.daily_rotation {
        tracing_appender::rolling::daily(&log_config.log_dir, &log_config.log_prefix)
    } else {
        tracing_appender::rolling::never(&log_config.log_dir, &log_config.log_prefix)
    };

    tracing_appender::non_blocking(file_appender)
}

/// Initialize console-only logging
fn init_console_logging<S>(subscriber: S, format: &LogFormat)
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a> + Send + Sync,
{
    use tracing_subscriber::{fmt, prelude::*};

    match format {
        LogFormat::Json => {
            subscriber
                .with(fmt::layer().json().with_target(true))
                .init();
        }
        LogFormat::Compact => {
            subscriber
                .with(fmt::layer().compact().with_target(false))
                .init();
        }
        LogFormat::Pretty => {
            subscriber
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false),
                )
                .init();
        }
    }
}

/// Initialize file-only logging
fn init_file_logging<S>(
    subscriber: S,
    format: &LogFormat,
    writer: tracing_appender::non_blocking::NonBlocking,
) where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a> + Send + Sync,
{
    use tracing_subscriber::{fmt, prelude::*};

    match format {
        LogFormat::Json => {
            subscriber
                .with(fmt::layer().json().with_target(true).with_writer(writer))
                .init();
        }
        LogFormat::Compact => {
            subscriber
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(writer),
                )
                .init();
        }
        LogFormat::Pretty => {
            subscriber
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .with_writer(writer),
                )
                .init();
        }
    }
}

/// Initialize both console and file logging
fn init_both_logging<S>(
    subscriber: S,
    format: &LogFormat,
    writer: tracing_appender::non_blocking::NonBlocking,
) where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a> + Send + Sync,
{
    use tracing_subscriber::{fmt, prelude::*};

    match format {
        LogFormat::Json => {
            subscriber
                .with(fmt::layer().json().with_target(true))
                .with(fmt::layer().json().with_target(true).with_writer(writer))
                .init();
        }
        LogFormat::Compact => {
            subscriber
                .with(fmt::layer().compact().with_target(false))
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(writer),
                )
                .init();
        }
        LogFormat::Pretty => {
            subscriber
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false),
                )
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .with_writer(writer),
                )
                .init();
        }
    }
}

/// Ensure the data directory exists
fn ensure_data_directory(config: &AppConfig) -> Result<()> {
    if let Some(path) = config.database.url.strip_prefix("sqlite://") {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create data directory")?;
                info!("Created data directory: {:?}", parent);
            }
        }
    }
    Ok(())
}

/// Print help message
fn print_help() {
    println!(
        r#"einvoice-webui {}

USAGE:
    einvoice-webui [OPTIONS]

OPTIONS:
    -h, --help       Print this help message
    -V, --version    Print version information

ENVIRONMENT:
    EINVOICE_CONFIG             Path to configuration file (default: config.yaml)
    EINVOICE_ADMIN_PASSWORD     Password for the initial admin account created
                                on a fresh database

CONFIGURATION:
    The application looks for configuration files in the following order:
    1. Path specified by EINVOICE_CONFIG environment variable
    2. ./config.yaml
    3. /etc/einvoice-webui/config.yaml"#,
        env!("CARGO_PKG_VERSION")
    );
}
