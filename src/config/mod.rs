use anyhow::{bail, Context};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::service::DEFAULT_MAX_ATTEMPTS;
use crate::shortener::{DEFAULT_CODE_LENGTH, MAX_CODE_LENGTH};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub redirect_server: ServerConfig,
    /// Public base URL of the redirect server, used to build full short links
    pub redirect_base_url: String,
    pub auth: AuthConfig,
    pub short_code: ShortCodeConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign and verify owner tokens
    pub token_secret: String,
    /// Validity window of an issued token
    #[serde(default = "AuthConfig::default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    #[serde(default = "AuthConfig::default_cookie_name")]
    pub cookie_name: String,
    /// Where unauthenticated visitors of protected routes are sent
    #[serde(default = "AuthConfig::default_login_url")]
    pub login_url: String,
}

impl AuthConfig {
    pub const fn default_token_ttl_secs() -> u64 {
        7 * 24 * 60 * 60
    }

    pub fn default_cookie_name() -> String {
        "authToken".to_string()
    }

    pub fn default_login_url() -> String {
        "/login".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortCodeConfig {
    pub length: usize,
    /// Upper bound on create attempts when generated codes collide
    pub max_attempts: u32,
}

impl Default for ShortCodeConfig {
    fn default() -> Self {
        Self {
            length: DEFAULT_CODE_LENGTH,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Use the socket peer address only
    None,
    /// Trust Forwarded / X-Forwarded-For
    Standard,
    /// Trust CF-Connecting-IP
    Cloudflare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Number of visit recorder shards
    pub workers: usize,
    /// Per-shard queue capacity; visits beyond it are dropped
    pub buffer_size: usize,
    /// Restrict analytics reads to the link owner
    pub require_owner: bool,
    pub trusted_proxy_mode: TrustedProxyMode,
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
    #[serde(default)]
    pub num_trusted_proxies: Option<usize>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            buffer_size: 10_000,
            require_owner: false,
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: vec![],
            num_trusted_proxies: None,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn parse_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend = match env_or("DATABASE_BACKEND", "sqlite").to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url = env_or("DATABASE_URL", "sqlite://./snaplink.db?mode=rwc");
        let max_connections = parse_env("DATABASE_MAX_CONNECTIONS", 10u32)?;

        let api_host = env_or("API_HOST", "127.0.0.1");
        let api_port = parse_env("API_PORT", 8080u16)?;
        let redirect_host = env_or("REDIRECT_HOST", "127.0.0.1");
        let redirect_port = parse_env("REDIRECT_PORT", 3000u16)?;
        let redirect_base_url = std::env::var("REDIRECT_BASE_URL")
            .unwrap_or_else(|_| format!("http://{redirect_host}:{redirect_port}"));

        let token_secret = std::env::var("AUTH_TOKEN_SECRET")
            .context("AUTH_TOKEN_SECRET must be set to sign owner tokens")?;
        if token_secret.len() < 16 {
            bail!("AUTH_TOKEN_SECRET must be at least 16 bytes long");
        }

        let auth = AuthConfig {
            token_secret,
            token_ttl_secs: parse_env("AUTH_TOKEN_TTL_SECS", AuthConfig::default_token_ttl_secs())?,
            cookie_name: env_or("AUTH_COOKIE_NAME", &AuthConfig::default_cookie_name()),
            login_url: env_or("LOGIN_URL", &AuthConfig::default_login_url()),
        };

        let short_code = ShortCodeConfig {
            length: parse_env("SHORT_CODE_LENGTH", DEFAULT_CODE_LENGTH)?,
            max_attempts: parse_env("SHORT_CODE_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
        };
        if !(4..=MAX_CODE_LENGTH).contains(&short_code.length) {
            bail!(
                "SHORT_CODE_LENGTH must be between 4 and {MAX_CODE_LENGTH}, got {}",
                short_code.length
            );
        }
        if short_code.max_attempts == 0 {
            bail!("SHORT_CODE_MAX_ATTEMPTS must be at least 1");
        }

        let trusted_proxy_mode = match env_or("TRUSTED_PROXY_MODE", "none").to_lowercase().as_str() {
            "none" => TrustedProxyMode::None,
            "standard" => TrustedProxyMode::Standard,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, standard, cloudflare"
                );
                TrustedProxyMode::None
            }
        };

        let trusted_proxies = std::env::var("TRUSTED_PROXIES")
            .ok()
            .map(|raw| parse_cidr_list(&raw))
            .transpose()?
            .unwrap_or_default();

        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .map(|v| {
                v.parse::<usize>()
                    .with_context(|| format!("invalid value for NUM_TRUSTED_PROXIES: '{v}'"))
            })
            .transpose()?;

        let analytics = AnalyticsConfig {
            workers: parse_env("ANALYTICS_WORKERS", 4usize)?.max(1),
            buffer_size: parse_env("ANALYTICS_BUFFER_SIZE", 10_000usize)?.max(1),
            require_owner: parse_flag("ANALYTICS_REQUIRE_OWNER"),
            trusted_proxy_mode,
            trusted_proxies,
            num_trusted_proxies,
        };

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            redirect_server: ServerConfig {
                host: redirect_host,
                port: redirect_port,
            },
            redirect_base_url,
            auth,
            short_code,
            analytics,
        })
    }
}

/// Parse a comma-separated list of CIDR ranges. Bare addresses are treated as host routes.
pub fn parse_cidr_list(raw: &str) -> anyhow::Result<Vec<IpNet>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpNet>()
                .or_else(|_| s.parse::<std::net::IpAddr>().map(IpNet::from))
                .with_context(|| format!("invalid CIDR in TRUSTED_PROXIES: '{s}'"))
        })
        .collect()
}
