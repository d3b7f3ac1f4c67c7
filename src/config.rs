use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Key material for field-level encryption. The key must come from durable
/// configuration: a regenerated key would make every stored field unreadable.
#[derive(Clone)]
pub struct CryptoConfig {
    pub encryption_key: [u8; 32],
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("encryption_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_file: PathBuf,
    pub backup_dir: PathBuf,
    pub max_backups: usize,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
    pub login_max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: Option<String>,
    pub jwt: JwtConfig,
    pub crypto: CryptoConfig,
    pub admin: AdminConfig,
    pub storage: StorageConfig,
    pub rate_limit: RateLimitConfig,
    pub smtp: Option<SmtpConfig>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

/// Unset or blank falls back to `default`; anything else must parse.
fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_setting(key, std::env::var(key).ok(), default)
}

fn parse_setting<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {value:?}")),
    }
}

/// Decodes a 64 character hex string into a 256-bit key.
pub fn parse_encryption_key(raw: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = hex::decode(raw.trim()).context("ENCRYPTION_KEY is not valid hex")?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|v: Vec<u8>| anyhow::anyhow!("ENCRYPTION_KEY must be 32 bytes, got {}", v.len()))?;
    Ok(key)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: env_or("JWT_ISSUER", "repair-desk"),
            audience: env_or("JWT_AUDIENCE", "repair-desk-staff"),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60 * 24)?,
        };

        let raw_key = std::env::var("ENCRYPTION_KEY").context("ENCRYPTION_KEY must be set")?;
        let crypto = CryptoConfig {
            encryption_key: parse_encryption_key(&raw_key)?,
        };

        let admin = AdminConfig {
            username: env_or("ADMIN_USERNAME", "admin"),
            password_hash: std::env::var("ADMIN_PASSWORD_HASH")
                .context("ADMIN_PASSWORD_HASH must be set")?,
        };

        let storage = StorageConfig {
            data_file: PathBuf::from(env_or("DATA_FILE", "repairs.json")),
            backup_dir: PathBuf::from(env_or("BACKUP_DIR", "backups")),
            max_backups: env_parse("MAX_BACKUPS", 10)?,
        };

        let rate_limit = RateLimitConfig {
            window: Duration::from_millis(env_parse("RATE_LIMIT_WINDOW_MS", 15 * 60 * 1000)?),
            max_requests: env_parse("RATE_LIMIT_MAX_REQUESTS", 100)?,
            login_max_attempts: env_parse("LOGIN_MAX_ATTEMPTS", 5)?,
        };

        // SMTP is optional; without credentials notifications are reported as not sent.
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let smtp = match (non_empty("EMAIL_USER"), non_empty("EMAIL_PASS")) {
            (Some(username), Some(password)) => Some(SmtpConfig {
                host: env_or("SMTP_HOST", "smtp.gmail.com"),
                port: env_parse("SMTP_PORT", 587)?,
                from: non_empty("EMAIL_FROM").unwrap_or_else(|| username.clone()),
                username,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            host: env_or("APP_HOST", "0.0.0.0"),
            port: env_parse("APP_PORT", 3001)?,
            cors_origin: non_empty("CORS_ORIGIN"),
            jwt,
            crypto,
            admin,
            storage,
            rate_limit,
            smtp,
        })
    }
}
