use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

pub const CREDENTIALS_ENV: &str = "FIREBASE_ADMIN_CREDENTIALS";

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub firebase: FirebaseConfig,
    pub feed: FeedConfig,
    pub relay: RelayConfig,
    pub auth: AuthPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
}

#[derive(Clone)]
pub struct FirebaseConfig {
    /// Base64 encoded service account JSON
    pub credentials_b64: String,
    /// Where the decoded key file is written before the store client starts
    pub credentials_path: PathBuf,
    /// Overrides the key's project_id when set
    pub project_id: Option<String>,
    pub collection: String,
    /// Change detection interval of the Firestore change stream
    pub poll_interval: Duration,
}

impl fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("credentials_b64", &"<redacted>")
            .field("credentials_path", &self.credentials_path)
            .field("project_id", &self.project_id)
            .field("collection", &self.collection)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Per-subscriber outbound buffer, in snapshots
    pub send_buffer: usize,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            send_buffer: 64,
            heartbeat_interval: Duration::from_secs(5),
            client_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Which routes require a verified Firebase ID token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthPolicy {
    pub realtime_require_auth: bool,
    pub snapshot_require_auth: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials_b64 = lookup(CREDENTIALS_ENV)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AppError::Config(format!("{} missing", CREDENTIALS_ENV)))?;

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "LOG_FORMAT must be text or json, got {}",
                    other
                )))
            }
        };

        let app = AppConfig {
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_var(&lookup, "PORT", 3001)?,
            log_format,
        };

        let firebase = FirebaseConfig {
            credentials_b64,
            credentials_path: lookup("FIREBASE_CREDENTIALS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("firebase_admin.json")),
            project_id: lookup("FIREBASE_PROJECT_ID").filter(|v| !v.trim().is_empty()),
            collection: lookup("NOTIFICATIONS_COLLECTION")
                .unwrap_or_else(|| "notifications".to_string()),
            poll_interval: Duration::from_millis(parse_var(&lookup, "STORE_POLL_INTERVAL_MS", 1000)?),
        };

        let feed = FeedConfig {
            send_buffer: parse_var(&lookup, "WS_SEND_BUFFER", 64)?,
            heartbeat_interval: Duration::from_secs(parse_var(
                &lookup,
                "WS_HEARTBEAT_INTERVAL_SECS",
                5,
            )?),
            client_timeout: Duration::from_secs(parse_var(&lookup, "WS_CLIENT_TIMEOUT_SECS", 30)?),
        };

        let relay = RelayConfig {
            initial_backoff: Duration::from_millis(parse_var(
                &lookup,
                "RELAY_INITIAL_BACKOFF_MS",
                250,
            )?),
            max_backoff: Duration::from_millis(parse_var(&lookup, "RELAY_MAX_BACKOFF_MS", 30_000)?),
        };

        let auth = AuthPolicy {
            realtime_require_auth: parse_bool(&lookup, "REALTIME_REQUIRE_AUTH", false)?,
            snapshot_require_auth: parse_bool(&lookup, "SNAPSHOT_REQUIRE_AUTH", false)?,
        };

        let config = Config {
            app,
            firebase,
            feed,
            relay,
            auth,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.firebase.collection.trim().is_empty() {
            return Err(AppError::Config("NOTIFICATIONS_COLLECTION is empty".into()));
        }
        if self.firebase.poll_interval.is_zero() {
            return Err(AppError::Config("STORE_POLL_INTERVAL_MS must be > 0".into()));
        }
        if self.feed.send_buffer == 0 {
            return Err(AppError::Config("WS_SEND_BUFFER must be > 0".into()));
        }
        if self.feed.heartbeat_interval.is_zero()
            || self.feed.client_timeout <= self.feed.heartbeat_interval
        {
            return Err(AppError::Config(
                "WS_CLIENT_TIMEOUT_SECS must exceed WS_HEARTBEAT_INTERVAL_SECS (> 0)".into(),
            ));
        }
        if self.relay.initial_backoff.is_zero() || self.relay.max_backoff < self.relay.initial_backoff
        {
            return Err(AppError::Config(
                "RELAY_MAX_BACKOFF_MS must be >= RELAY_INITIAL_BACKOFF_MS (> 0)".into(),
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.app.host, self.app.port)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{} is invalid ({}): {}", key, raw, e))),
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(AppError::Config(format!("{} must be a boolean, got {}", key, v))),
        },
    }
}
