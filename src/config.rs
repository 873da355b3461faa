use serde::Deserialize;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// PostgreSQL connection URL; parties are kept in memory when unset
    #[serde(default)]
    pub database_url: Option<String>,

    /// Redis connection URL; metadata lookups are uncached when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Perplexity API key used for recommendation slates
    #[serde(default)]
    pub perplexity_api_key: Option<String>,

    /// Perplexity API base URL
    #[serde(default = "default_perplexity_api_url")]
    pub perplexity_api_url: String,

    /// Perplexity model name
    #[serde(default = "default_perplexity_model")]
    pub perplexity_model: String,

    /// Spotify client-credentials pair for track metadata lookups
    #[serde(default)]
    pub spotify_client_id: Option<String>,
    #[serde(default)]
    pub spotify_client_secret: Option<String>,

    /// Number of candidates requested per slate
    #[serde(default = "default_slate_size")]
    pub slate_size: usize,

    /// Timeout for external recommendation and metadata calls
    #[serde(default = "default_recommendation_timeout_secs")]
    pub recommendation_timeout_secs: u64,

    /// Optional cap on every member's swipe buffer
    #[serde(default)]
    pub swipe_buffer_capacity: Option<usize>,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_perplexity_api_url() -> String {
    "https://api.perplexity.ai".to_string()
}

fn default_perplexity_model() -> String {
    "sonar".to_string()
}

fn default_slate_size() -> usize {
    10
}

fn default_recommendation_timeout_secs() -> u64 {
    30
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.slate_size == 0 {
            anyhow::bail!("SLATE_SIZE must be at least 1");
        }
        if self.swipe_buffer_capacity == Some(0) {
            anyhow::bail!("SWIPE_BUFFER_CAPACITY must be at least 1 when set");
        }
        Ok(())
    }

    pub fn recommendation_timeout(&self) -> Duration {
        Duration::from_secs(self.recommendation_timeout_secs)
    }

    /// Settings consumed by the party and recommendation services
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            slate_size: self.slate_size,
            external_timeout: self.recommendation_timeout(),
            swipe_buffer_capacity: self.swipe_buffer_capacity,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Runtime knobs shared by the session services
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub slate_size: usize,
    pub external_timeout: Duration,
    pub swipe_buffer_capacity: Option<usize>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            slate_size: default_slate_size(),
            external_timeout: Duration::from_secs(default_recommendation_timeout_secs()),
            swipe_buffer_capacity: None,
        }
    }
}
