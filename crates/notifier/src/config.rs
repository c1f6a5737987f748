//! Notifier configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `NOTIFIER_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `SITE_PRODUCT_PATH_URL` - Product page prefix addressed by item path
//! - `SITE_OBJECT_ID_URL` - Product page prefix addressed by object id
//! - `SITE_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: 60)
//! - `SITE_USER_AGENT` - User agent sent to the shop
//! - `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM` - Email channel (all or none)
//! - `SMTP_PORT` - SMTP port (default: 587)
//! - `TELEGRAM_BOT_TOKEN` - Telegram channel
//! - `NOTIFIER_SHOP_NAME` - Shop name used in messages (default: ecuagenera.com)
//! - `NOTIFIER_BOT_URL` - Link to the bot in expiry warnings
//! - `NOTIFIER_EMAIL_SUBJECT` - Subject of notification emails
//! - `NOTIFIER_ALERT_EMAIL` - Operator address for failure reports
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `LOG_FORMAT` - `json` for structured logs, text otherwise

use std::collections::HashMap;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use plantwatch_core::Email;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

const DEFAULT_PRODUCT_PATH_URL: &str =
    "https://www.ecuagenera.com/epages/ecuagenera.sf/en_US/?ObjectPath=/Shops/ecuagenera/Products/";
const DEFAULT_OBJECT_ID_URL: &str =
    "https://www.ecuagenera.com/epages/ecuagenera.sf/en_US/?ObjectID=";
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0 Safari/537.36";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

const SMTP_GROUP: &[&str] = &["SMTP_HOST", "SMTP_USERNAME", "SMTP_PASSWORD", "SMTP_FROM"];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Notifier configuration.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    pub site: SiteConfig,
    /// Email channel, disabled when `None`
    pub email: Option<EmailConfig>,
    /// Telegram channel, disabled when `None`
    pub telegram: Option<TelegramConfig>,
    pub messages: MessageSettings,
    /// Operator address receiving failure reports
    pub alert_email: Option<Email>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
    /// Emit JSON logs
    pub json_logs: bool,
}

/// Shop website access.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub product_path_url: String,
    pub object_id_url: String,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            product_path_url: DEFAULT_PRODUCT_PATH_URL.to_owned(),
            object_id_url: DEFAULT_OBJECT_ID_URL.to_owned(),
            request_timeout: Duration::from_secs(60),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

/// Email (SMTP) configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Sender address
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// Telegram Bot API configuration.
#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .finish()
    }
}

/// Texts that appear in notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSettings {
    pub shop_name: String,
    pub bot_url: String,
    pub email_subject: String,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            shop_name: "ecuagenera.com".to_owned(),
            bot_url: "https://telegram.me/ecuagenera_bot".to_owned(),
            email_subject: "Plant availability update".to_owned(),
        }
    }
}

impl NotifierConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    /// Weak secrets are logged, not rejected.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("NOTIFIER_DATABASE_URL")?;
        let site = SiteConfig::from_env()?;
        let email = EmailConfig::from_env()?;
        let telegram = TelegramConfig::from_env();
        let messages = MessageSettings::from_env();
        let alert_email = get_optional_env("NOTIFIER_ALERT_EMAIL")
            .map(|value| {
                Email::parse(&value).map_err(|e| {
                    ConfigError::InvalidEnvVar("NOTIFIER_ALERT_EMAIL".to_string(), e.to_string())
                })
            })
            .transpose()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let json_logs = get_optional_env("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json"));

        Ok(Self {
            database_url,
            site,
            email,
            telegram,
            messages,
            alert_email,
            sentry_dsn,
            sentry_environment,
            json_logs,
        })
    }
}

impl SiteConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let timeout_secs = get_env_or_default("SITE_REQUEST_TIMEOUT_SECS", "60")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("SITE_REQUEST_TIMEOUT_SECS".to_string(), e.to_string())
            })?;

        Ok(Self {
            product_path_url: get_url_prefix("SITE_PRODUCT_PATH_URL")?
                .unwrap_or(defaults.product_path_url),
            object_id_url: get_url_prefix("SITE_OBJECT_ID_URL")?.unwrap_or(defaults.object_id_url),
            request_timeout: Duration::from_secs(timeout_secs),
            user_agent: get_optional_env("SITE_USER_AGENT").unwrap_or(defaults.user_agent),
        })
    }
}

impl EmailConfig {
    /// Load SMTP configuration from environment.
    ///
    /// Returns `None` if none of the SMTP variables are set (email disabled).
    /// A partially configured group is an error.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let present: Vec<&str> = SMTP_GROUP
            .iter()
            .copied()
            .filter(|key| get_optional_env(key).is_some())
            .collect();
        if present.is_empty() {
            return Ok(None);
        }
        if let Some(missing) = SMTP_GROUP.iter().find(|key| !present.contains(*key)) {
            return Err(ConfigError::MissingEnvVar((*missing).to_string()));
        }

        let smtp_port = get_env_or_default("SMTP_PORT", "587")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SMTP_PORT".to_string(), e.to_string()))?;

        Ok(Some(Self {
            smtp_host: get_required_env("SMTP_HOST")?,
            smtp_port,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: accept_secret(get_required_env("SMTP_PASSWORD")?, "SMTP_PASSWORD"),
            from_address: get_required_env("SMTP_FROM")?,
        }))
    }
}

impl TelegramConfig {
    /// Returns `None` if `TELEGRAM_BOT_TOKEN` is not set (Telegram disabled).
    fn from_env() -> Option<Self> {
        let bot_token = get_optional_env("TELEGRAM_BOT_TOKEN")?;
        Some(Self {
            bot_token: accept_secret(bot_token, "TELEGRAM_BOT_TOKEN"),
        })
    }
}

impl MessageSettings {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            shop_name: get_optional_env("NOTIFIER_SHOP_NAME").unwrap_or(defaults.shop_name),
            bot_url: get_optional_env("NOTIFIER_BOT_URL").unwrap_or(defaults.bot_url),
            email_subject: get_optional_env("NOTIFIER_EMAIL_SUBJECT")
                .unwrap_or(defaults.email_subject),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an optional URL prefix; the item id is appended to it verbatim.
fn get_url_prefix(key: &str) -> Result<Option<String>, ConfigError> {
    let Some(value) = get_optional_env(key) else {
        return Ok(None);
    };
    url::Url::parse(&value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    Ok(Some(value))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Wrap a credential issued by a third party.
///
/// We do not choose these values, so a weak one only gets a warning.
fn accept_secret(value: String, key: &str) -> SecretString {
    if let Err(e) = validate_secret_strength(&value, key) {
        tracing::warn!("{key} validation warning: {e}");
    }
    SecretString::from(value)
}
