//! Configuration management
//!
//! YAML configuration with support for:
//! - Environment variable overrides (including a `.env` file)
//! - Multiple configuration file locations
//! - Default values for all settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    /// First IT account, created at startup when absent
    #[serde(default)]
    pub bootstrap: Option<BootstrapConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// TLS/HTTPS configuration (if not set, server runs HTTP)
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    /// Directory with the built front-end, served as a fallback
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    /// Allowed CORS origins; empty means same-origin only
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// TLS/HTTPS configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to TLS certificate file (PEM format)
    pub cert_file: PathBuf,
    /// Path to TLS private key file (PEM format)
    pub key_file: PathBuf,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5050
}

fn default_request_timeout() -> u64 {
    30
}

/// Session and password settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Session lifetime, e.g. `45m`, `2h`, `30s`, `1d`
    #[serde(default = "default_token_ttl")]
    pub token_ttl: String,
    /// Tokens with less than this many minutes left are renewed
    #[serde(default = "default_renew_threshold")]
    pub renew_threshold_mins: u64,
    /// Add `Secure` to the session cookie
    #[serde(default)]
    pub secure_cookies: bool,
    #[serde(default = "default_password_min_length")]
    pub password_min_length: usize,
    /// Temporary password handed to invited workers
    #[serde(default = "default_worker_password")]
    pub default_worker_password: String,
}

impl AuthConfig {
    pub fn ttl(&self) -> Result<chrono::Duration> {
        parse_ttl(&self.token_ttl)
    }

    pub fn renew_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.renew_threshold_mins as i64)
    }
}

fn default_token_ttl() -> String {
    "45m".to_string()
}

fn default_renew_threshold() -> u64 {
    10
}

fn default_password_min_length() -> usize {
    8
}

fn default_worker_password() -> String {
    "12345678".to_string()
}

/// Parse a lifetime such as `45m`, `2h`, `30s`, `1d`; a bare number means seconds
pub fn parse_ttl(input: &str) -> Result<chrono::Duration> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);

    let amount: i64 = digits
        .parse()
        .with_context(|| format!("Invalid duration: {:?}", input))?;

    let duration = match unit {
        "" | "s" => chrono::Duration::seconds(amount),
        "m" => chrono::Duration::minutes(amount),
        "h" => chrono::Duration::hours(amount),
        "d" => chrono::Duration::days(amount),
        other => anyhow::bail!("Invalid duration unit {:?} in {:?}", other, input),
    };

    if duration <= chrono::Duration::zero() {
        anyhow::bail!("Duration must be positive: {:?}", input);
    }

    Ok(duration)
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_busy_timeout() -> u64 {
    5
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file" or "both")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Console,
    File,
    Both,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_log_prefix() -> String {
    "tretize-portal".to_string()
}

fn default_log_rotation() -> bool {
    true
}

/// Outbound mail
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MailConfig {
    /// When false every message is only logged
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    /// Receives quote requests
    #[serde(default)]
    pub main_inbox: Option<String>,
    /// Receives client nudges
    #[serde(default)]
    pub workers_inbox: Option<String>,
    #[serde(default)]
    pub departments: DepartmentInboxes,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Sender address; falls back to the username
    #[serde(default)]
    pub from: Option<String>,
}

impl SmtpConfig {
    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref().or(self.username.as_deref())
    }
}

fn default_smtp_port() -> u16 {
    587
}

/// CC addresses per quote department
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DepartmentInboxes {
    #[serde(default)]
    pub finance: Option<String>,
    #[serde(default)]
    pub admin: Option<String>,
    #[serde(default)]
    pub ops: Option<String>,
    #[serde(default)]
    pub it: Option<String>,
    #[serde(default)]
    pub business: Option<String>,
}

/// Per-IP request quotas
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Login, quote and nudge
    #[serde(default = "default_strict_per_minute")]
    pub strict_per_minute: u32,
    #[serde(default = "default_strict_burst")]
    pub strict_burst: u32,
    /// Everything else
    #[serde(default = "default_standard_per_minute")]
    pub standard_per_minute: u32,
    #[serde(default = "default_standard_burst")]
    pub standard_burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            strict_per_minute: default_strict_per_minute(),
            strict_burst: default_strict_burst(),
            standard_per_minute: default_standard_per_minute(),
            standard_burst: default_standard_burst(),
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_strict_per_minute() -> u32 {
    10
}

fn default_strict_burst() -> u32 {
    5
}

fn default_standard_per_minute() -> u32 {
    600
}

fn default_standard_burst() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BootstrapConfig {
    pub admin_email: String,
    pub admin_password: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                tls: None,
                static_dir: None,
                cors_origins: Vec::new(),
            },
            auth: AuthConfig {
                jwt_secret: "change-me-in-production-minimum-32-characters-long".to_string(),
                token_ttl: default_token_ttl(),
                renew_threshold_mins: default_renew_threshold(),
                secure_cookies: false,
                password_min_length: default_password_min_length(),
                default_worker_password: default_worker_password(),
            },
            database: DatabaseConfig {
                url: "sqlite://./data/tretize.db".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                busy_timeout_secs: default_busy_timeout(),
            },
            logging: LoggingConfig::default(),
            mail: MailConfig::default(),
            rate_limit: RateLimitSettings::default(),
            bootstrap: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Later sources override earlier ones:
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("TRETIZE_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(ref path) if path.exists() => {
                eprintln!("[CONFIG] Loading configuration from: {:?}", path);
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                serde_norway::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {:?}", path))?
            }
            Some(ref path) => {
                eprintln!("[CONFIG] Config file not found: {:?}, using defaults", path);
                AppConfig::default()
            }
            None => {
                eprintln!("[CONFIG] No config file found, using defaults");
                AppConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            PathBuf::from("/etc/tretize-portal/config.yaml"),
            dirs::config_dir()
                .map(|p| p.join("tretize-portal/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; empty values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Server
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        // Database
        if let Some(url) = get("DATABASE_URL") {
            self.database.url = url;
        }

        // Auth
        if let Some(secret) = get("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(ttl) = get("JWT_TTL") {
            self.auth.token_ttl = ttl;
        }
        if let Some(secure) = get("COOKIE_SECURE") {
            self.auth.secure_cookies = is_truthy(&secure);
        }
        if let Some(password) = get("DEFAULT_WORKER_PASSWORD") {
            self.auth.default_worker_password = password;
        }

        // Logging
        if let Some(level) = get("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(format) = get("TRETIZE_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }

        // Mail
        if let Some(send) = get("MAIL_SEND") {
            self.mail.enabled = is_truthy(&send);
        }
        if let Some(host) = get("SMTP_HOST") {
            let smtp = self.mail.smtp.get_or_insert_with(|| SmtpConfig {
                host: host.clone(),
                port: default_smtp_port(),
                username: None,
                password: None,
                from: None,
            });
            smtp.host = host;
        }
        if let Some(ref mut smtp) = self.mail.smtp {
            if let Some(port) = get("SMTP_PORT").and_then(|p| p.parse().ok()) {
                smtp.port = port;
            }
            if let Some(user) = get("SMTP_USER") {
                smtp.username = Some(user);
            }
            if let Some(pass) = get("SMTP_PASS") {
                smtp.password = Some(pass);
            }
            if let Some(from) = get("SMTP_FROM") {
                smtp.from = Some(from);
            }
        }
        if let Some(inbox) = get("MAIN_INBOX") {
            self.mail.main_inbox = Some(inbox);
        }
        if let Some(inbox) = get("WORKERS_INBOX") {
            self.mail.workers_inbox = Some(inbox);
        }

        let departments = &mut self.mail.departments;
        for (key, slot) in [
            ("FINANCE_EMAIL", &mut departments.finance),
            ("ADMIN_EMAIL", &mut departments.admin),
            ("OPERATIONS_EMAIL", &mut departments.ops),
            ("IT_EMAIL", &mut departments.it),
            ("BUSINESS_EMAIL", &mut departments.business),
        ] {
            if let Some(address) = get(key) {
                *slot = Some(address);
            }
        }

        // Bootstrap account
        if let (Some(email), Some(password)) =
            (get("BOOTSTRAP_ADMIN_EMAIL"), get("BOOTSTRAP_ADMIN_PASS"))
        {
            self.bootstrap = Some(BootstrapConfig {
                admin_email: email,
                admin_password: password,
            });
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            anyhow::bail!("JWT secret must be at least 32 characters long");
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        let ttl = self.auth.ttl().context("Invalid auth.token_ttl")?;
        if self.auth.renew_threshold() >= ttl {
            anyhow::bail!(
                "auth.renew_threshold_mins ({}) must be shorter than the token TTL ({})",
                self.auth.renew_threshold_mins,
                self.auth.token_ttl
            );
        }

        if self.auth.default_worker_password.len() < self.auth.password_min_length {
            anyhow::bail!(
                "auth.default_worker_password must be at least {} characters",
                self.auth.password_min_length
            );
        }

        if let Some(ref tls) = self.server.tls {
            if !tls.cert_file.exists() {
                anyhow::bail!("TLS certificate file not found: {:?}", tls.cert_file);
            }
            if !tls.key_file.exists() {
                anyhow::bail!("TLS key file not found: {:?}", tls.key_file);
            }
        }

        if self.mail.enabled && self.mail.smtp.is_none() {
            anyhow::bail!("mail.enabled is set but no SMTP host is configured");
        }

        if let Some(ref static_dir) = self.server.static_dir {
            if !static_dir.exists() {
                tracing::warn!(
                    "Static directory does not exist: {:?}. Frontend will not be served.",
                    static_dir
                );
            }
        }

        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
