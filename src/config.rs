use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// TMDB API key
    pub tmdb_api_key: String,

    /// TMDB API base URL
    #[serde(default = "default_tmdb_api_url")]
    pub tmdb_api_url: String,

    /// How many catalog pages to pull per tier when building a pool
    #[serde(default = "default_page_budget")]
    pub catalog_page_budget: u32,

    /// Lifetime of a cached pool in seconds
    #[serde(default = "default_pool_ttl_secs")]
    pub pool_ttl_secs: u64,

    /// Interval between sweeper passes in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Rooms idle longer than this are scheduled for cleanup
    #[serde(default = "default_inactivity_threshold_hours")]
    pub inactivity_threshold_hours: i64,

    /// Base delay in seconds for cleanup retry backoff (delay = 2^retries * base)
    #[serde(default = "default_cleanup_retry_base_secs")]
    pub cleanup_retry_base_secs: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_tmdb_api_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_page_budget() -> u32 {
    3
}

fn default_pool_ttl_secs() -> u64 {
    86400
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_inactivity_threshold_hours() -> i64 {
    24
}

fn default_cleanup_retry_base_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }
}
