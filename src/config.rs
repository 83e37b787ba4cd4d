use crate::booking::FlipStrategy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SPACEBOOK_FLIP_STRATEGY must be 'conditional' or 'blind', got {0:?}")]
    FlipStrategy(String),
}

/// Process settings, all from `SPACEBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub max_connections: usize,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    /// No URL means an in-memory store.
    pub booking_db_url: Option<String>,
    pub resource_db_url: Option<String>,
    pub analytics_db_url: Option<String>,
    pub flip_strategy: FlipStrategy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5433,
            user: "spacebook".into(),
            password: "spacebook".into(),
            max_connections: 256,
            metrics_port: None,
            tls_cert: None,
            tls_key: None,
            booking_db_url: None,
            resource_db_url: None,
            analytics_db_url: None,
            flip_strategy: FlipStrategy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let flip_strategy = match var("SPACEBOOK_FLIP_STRATEGY") {
            Some(s) => s.parse().map_err(|_| ConfigError::FlipStrategy(s))?,
            None => defaults.flip_strategy,
        };

        Ok(Self {
            bind: var("SPACEBOOK_BIND").unwrap_or(defaults.bind),
            port: var("SPACEBOOK_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            user: var("SPACEBOOK_USER").unwrap_or(defaults.user),
            password: var("SPACEBOOK_PASSWORD").unwrap_or(defaults.password),
            max_connections: var("SPACEBOOK_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_connections),
            metrics_port: var("SPACEBOOK_METRICS_PORT").and_then(|s| s.parse().ok()),
            tls_cert: var("SPACEBOOK_TLS_CERT"),
            tls_key: var("SPACEBOOK_TLS_KEY"),
            booking_db_url: var("SPACEBOOK_BOOKING_DB_URL"),
            resource_db_url: var("SPACEBOOK_RESOURCE_DB_URL"),
            analytics_db_url: var("SPACEBOOK_ANALYTICS_DB_URL"),
            flip_strategy,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
