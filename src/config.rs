//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Variable names match the ones used by
//! existing deployments of the feed mirror (`REDIS_ADDR`, `DEX_URL`,
//! `POLLER_CHAIN`, ...).

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Default upstream feed: the public "latest token profiles" endpoint.
pub const DEFAULT_DEX_URL: &str = "https://api.dexscreener.com/token-profiles/latest/v1";

/// Largest accepted record or lock TTL: 100 years.
const MAX_TTL_SECS: u64 = 100 * 365 * 86_400;

/// Startup configuration problem. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `LISTEN_ADDR` / `PORT` did not form a socket address.
    #[error("invalid listen address {0:?}")]
    ListenAddr(String),

    /// `RUN_MODE` is not one of the known modes.
    #[error("unknown run mode {0:?} (expected api|poller|all|purge)")]
    RunMode(String),

    /// `STORE_BACKEND` is not one of the known backends.
    #[error("unknown store backend {0:?} (expected redis|memory)")]
    StoreBackend(String),

    /// A numeric setting is outside its valid range.
    #[error("invalid {key}: {reason}")]
    OutOfRange {
        /// Environment variable name.
        key: &'static str,
        /// What is wrong with the value.
        reason: &'static str,
    },
}

/// Which components the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// HTTP API only.
    Api,
    /// Ingestion poller only.
    Poller,
    /// API and poller in the same process.
    All,
    /// One-shot removal of every key the service owns, then exit.
    Purge,
}

impl RunMode {
    /// Returns `true` if the HTTP server should be started.
    #[must_use]
    pub const fn serves_api(self) -> bool {
        matches!(self, Self::Api | Self::All)
    }

    /// Returns `true` if the ingestion poller should be started.
    #[must_use]
    pub const fn runs_poller(self) -> bool {
        matches!(self, Self::Poller | Self::All)
    }
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "api" => Ok(Self::Api),
            "poller" => Ok(Self::Poller),
            "all" => Ok(Self::All),
            "purge" => Ok(Self::Purge),
            _ => Err(ConfigError::RunMode(s.to_string())),
        }
    }
}

/// Shared store implementation selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Redis server at [`GatewayConfig::redis_url`].
    Redis,
    /// Process-local store; state is lost on exit.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::StoreBackend(s.to_string())),
        }
    }
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Components to run in this process.
    pub run_mode: RunMode,

    /// Store implementation.
    pub store_backend: StoreBackend,

    /// Redis connection URL.
    pub redis_url: String,

    /// Deadline applied to each store command.
    pub store_command_timeout_ms: u64,

    /// TTL of an idempotency lock, in seconds.
    pub idempotency_ttl_secs: u64,

    /// Token refill rate per client identity, in tokens per second.
    pub rate_limit_rps: f64,

    /// Token bucket capacity per client identity.
    pub rate_limit_burst: f64,

    /// Seconds between the end of one poll and the start of the next.
    pub poll_interval_secs: u64,

    /// Upstream feed URL.
    pub dex_url: String,

    /// Timeout for one upstream HTTP request, in seconds.
    pub upstream_timeout_secs: u64,

    /// The only chain the poller ingests and the feed endpoint serves.
    pub poller_chain: String,

    /// Record TTL and rolling index window, in hours (0 = keep forever).
    pub token_ttl_hours: u64,

    /// Number of records served by the compatible feed endpoint.
    pub feed_page_size: usize,

    /// Deadline for one inbound HTTP request, in seconds.
    pub request_timeout_secs: u64,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a setting is present but unusable:
    /// unparsable listen address, unknown run mode or store backend,
    /// non-positive refill rate, burst below one, empty chain, or a TTL
    /// above 100 years.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`GatewayConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let raw_addr = var("LISTEN_ADDR")
            .or_else(|| var("PORT").map(|port| format!("0.0.0.0:{port}")))
            .unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let listen_addr = raw_addr
            .parse()
            .map_err(|_| ConfigError::ListenAddr(raw_addr.clone()))?;

        let run_mode = var("RUN_MODE").map_or(Ok(RunMode::All), |v| v.parse())?;
        let store_backend = var("STORE_BACKEND").map_or(Ok(StoreBackend::Redis), |v| v.parse())?;

        let redis_url = var("REDIS_URL").unwrap_or_else(|| {
            let addr = var("REDIS_ADDR").unwrap_or_else(|| "127.0.0.1:6379".to_string());
            let db: u32 = parse_var(&var, "REDIS_DB", 0);
            format!("redis://{addr}/{db}")
        });

        let rate_limit_rps: f64 = parse_var(&var, "RATE_LIMIT_RPS", 5.0);
        if !(rate_limit_rps.is_finite() && rate_limit_rps > 0.0) {
            return Err(ConfigError::OutOfRange {
                key: "RATE_LIMIT_RPS",
                reason: "must be a positive number",
            });
        }
        let rate_limit_burst: f64 = parse_var(&var, "RATE_LIMIT_BURST", 10.0);
        if !(rate_limit_burst.is_finite() && rate_limit_burst >= 1.0) {
            return Err(ConfigError::OutOfRange {
                key: "RATE_LIMIT_BURST",
                reason: "must be at least 1",
            });
        }

        let poller_chain = var("POLLER_CHAIN").unwrap_or_else(|| "solana".to_string());
        if poller_chain.trim().is_empty() {
            return Err(ConfigError::OutOfRange {
                key: "POLLER_CHAIN",
                reason: "must not be blank",
            });
        }

        let token_ttl_hours: u64 = parse_var(&var, "TOKEN_TTL_HOURS", 72);
        if token_ttl_hours
            .checked_mul(3600)
            .is_none_or(|secs| secs > MAX_TTL_SECS)
        {
            return Err(ConfigError::OutOfRange {
                key: "TOKEN_TTL_HOURS",
                reason: "must be at most 100 years",
            });
        }
        let idempotency_ttl_secs: u64 = parse_var(&var, "IDEMP_TTL_SEC", 60);
        if idempotency_ttl_secs > MAX_TTL_SECS {
            return Err(ConfigError::OutOfRange {
                key: "IDEMP_TTL_SEC",
                reason: "must be at most 100 years",
            });
        }

        let poll_interval_secs = parse_var(&var, "POLL_INTERVAL_SEC", 10_u64).max(1);
        let feed_page_size = parse_var(&var, "FEED_PAGE_SIZE", 50_usize).clamp(1, 200);

        Ok(Self {
            listen_addr,
            run_mode,
            store_backend,
            redis_url,
            store_command_timeout_ms: parse_var(&var, "STORE_COMMAND_TIMEOUT_MS", 1000),
            idempotency_ttl_secs,
            rate_limit_rps,
            rate_limit_burst,
            poll_interval_secs,
            dex_url: var("DEX_URL").unwrap_or_else(|| DEFAULT_DEX_URL.to_string()),
            upstream_timeout_secs: parse_var(&var, "UPSTREAM_TIMEOUT_SECS", 10),
            poller_chain,
            token_ttl_hours,
            feed_page_size,
            request_timeout_secs: parse_var(&var, "REQUEST_TIMEOUT_SECS", 15),
        })
    }

    /// Record TTL, or `None` when records never expire.
    #[must_use]
    pub fn token_ttl(&self) -> Option<Duration> {
        (self.token_ttl_hours > 0)
            .then(|| Duration::from_secs(self.token_ttl_hours.saturating_mul(3600)))
    }

    /// Idempotency lock TTL.
    #[must_use]
    pub const fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
