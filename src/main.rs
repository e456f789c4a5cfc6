//! Tretize Portal - shipment tracking and worker portal
//!
//! Serves the public tracking lookup and quote form, and the authenticated
//! worker API for shipments, checkpoints, audit trails and worker accounts.

use std::env;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use tretize_portal::{
    api,
    config::{self, LogFormat, LogTarget},
    db::{self, migrations},
    services::{mailer::build_mailer, AuthService},
    AppConfig, AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    // Check for --help flag
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }

    // Check for --version flag
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("Tretize Portal {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration first (before logging, so we know log format)
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Check for --migrate flag
    if args.iter().any(|arg| arg == "--migrate") {
        return migrate_only(&config).await;
    }

    // The guard must be kept alive for the duration of the program
    // to ensure log messages are flushed to files
    let _log_guard = init_logging(&config);

    info!("Tretize Portal {} starting up", env!("CARGO_PKG_VERSION"));

    ensure_data_directory(&config)?;

    info!("Initializing database connection");
    let db = db::init_pool(&config.database)
        .await
        .context("Failed to initialize database")?;

    if let Some(ref bootstrap) = config.bootstrap {
        let created = AuthService::new(db.clone())
            .bootstrap_admin(&bootstrap.admin_email, &bootstrap.admin_password)
            .await
            .context("Failed to bootstrap the IT account")?;
        if created {
            info!(email = %bootstrap.admin_email, "Bootstrap IT account created");
        }
    }

    let mailer = build_mailer(&config.mail).context("Failed to initialize mailer")?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address configuration")?;
    let tls = config.server.tls.clone();

    let state = AppState::new(config, db, mailer).context("Failed to build application state")?;
    let app = api::build_router(state);

    if let Some(ref tls_config) = tls {
        info!("Starting HTTPS server on https://{}", addr);

        let rustls_config = create_rustls_config(tls_config).await?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("Failed to bind to address")?;

        axum_server::from_tcp_rustls(listener.into_std()?, rustls_config)?
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .context("HTTPS server error")?;
    } else {
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
    }

    Ok(())
}

async fn create_rustls_config(
    tls_config: &config::TlsConfig,
) -> Result<axum_server::tls_rustls::RustlsConfig> {
    use axum_server::tls_rustls::RustlsConfig;
    use rustls::crypto::aws_lc_rs::default_provider;
    use rustls::ServerConfig;

    let cert_file = std::fs::File::open(&tls_config.cert_file)
        .with_context(|| format!("Failed to open certificate {:?}", tls_config.cert_file))?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs: Vec<_> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .context("Failed to parse certificate chain")?;

    let key_file = std::fs::File::open(&tls_config.key_file)
        .with_context(|| format!("Failed to open private key {:?}", tls_config.key_file))?;
    let mut key_reader = BufReader::new(key_file);
    let key = rustls_pemfile::private_key(&mut key_reader)
        .context("Failed to parse private key")?
        .context("No private key found in key file")?;

    let mut server_config = ServerConfig::builder_with_provider(default_provider().into())
        .with_safe_default_protocol_versions()
        .context("Failed to select TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("Failed to build TLS server config")?;
    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(RustlsConfig::from_config(Arc::new(server_config)))
}

fn init_logging(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let log_config = &config.logging;

    let (file_writer, guard) = match log_config.target {
        LogTarget::Console => (None, None),
        LogTarget::File | LogTarget::Both => {
            let (writer, guard) = create_file_writer(log_config);
            (Some(writer), Some(guard))
        }
    };
    let console = !matches!(log_config.target, LogTarget::File);

    // Boxed so each combination of format and target shares one registry type
    type BoxedLayer = Box<dyn tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync>;

    let make_layer = |writer: Option<tracing_appender::non_blocking::NonBlocking>| -> BoxedLayer {
        match (&log_config.format, writer) {
            (LogFormat::Json, Some(w)) => fmt::layer().json().with_writer(w).boxed(),
            (LogFormat::Json, None) => fmt::layer().json().boxed(),
            (LogFormat::Compact, Some(w)) => fmt::layer()
                .compact()
                .with_target(false)
                .with_ansi(false)
                .with_writer(w)
                .boxed(),
            (LogFormat::Compact, None) => fmt::layer().compact().with_target(false).boxed(),
            (LogFormat::Pretty, Some(w)) => fmt::layer().with_ansi(false).with_writer(w).boxed(),
            (LogFormat::Pretty, None) => fmt::layer().boxed(),
        }
    };

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if console {
        layers.push(make_layer(None));
    }
    if let Some(writer) = file_writer {
        layers.push(make_layer(Some(writer)));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    guard
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

/// Ensure the directory holding the SQLite file exists
fn ensure_data_directory(config: &AppConfig) -> Result<()> {
    if let Some(path) = config.database.url.strip_prefix("sqlite://") {
        let path = path.split('?').next().unwrap_or(path);
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create data directory")?;
                info!("Created data directory: {:?}", parent);
            }
        }
    }
    Ok(())
}

/// Run migrations, verify the schema and exit
async fn migrate_only(config: &AppConfig) -> Result<()> {
    println!("Tretize Portal migration tool v{}", env!("CARGO_PKG_VERSION"));
    println!("Database URL: {}", config.database.url);

    ensure_data_directory(config)?;
    let pool = db::init_pool(&config.database)
        .await
        .context("Failed to initialize database")?;

    let missing = migrations::missing_tables(&pool).await?;
    if missing.is_empty() {
        println!("All {} required tables present.", migrations::REQUIRED_TABLES.len());
        Ok(())
    } else {
        warn!("Missing tables after migration: {:?}", missing);
        anyhow::bail!("missing tables after migration: {}", missing.join(", "))
    }
}

/// Print help message
fn print_help() {
    println!(
        r#"Tretize Portal {}

USAGE:
    tretize-portal [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    --migrate               Run database migrations, verify the schema and exit

ENVIRONMENT:
    TRETIZE_CONFIG      Path to configuration file (default: config.yaml)
    JWT_SECRET, PORT, DATABASE_URL, SMTP_* and friends override the file

CONFIGURATION:
    The application looks for configuration files in the following order:
    1. Path specified by TRETIZE_CONFIG environment variable
    2. ./config.yaml
    3. ./config/config.yaml
    4. /etc/tretize-portal/config.yaml
    5. <user config dir>/tretize-portal/config.yaml"#,
        env!("CARGO_PKG_VERSION")
    );
}
