use std::time::Duration;

use serde::Deserialize;

use crate::models::weather::TempBands;
use crate::services::gateway::RetryPolicy;
use crate::services::recommendations::ScoringConfig;
use crate::services::tryon::AdmissionConfig;
use crate::services::weather::WeatherCacheConfig;

/// Application configuration loaded from environment variables
///
/// Built once at process start and handed into each component's constructor;
/// nothing reads the environment after this point.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// QWeather API key
    pub qweather_key: Option<String>,

    /// QWeather API host
    #[serde(default = "default_qweather_host")]
    pub qweather_host: String,

    /// QWeather response language
    #[serde(default = "default_qweather_lang")]
    pub qweather_lang: String,

    /// QWeather unit system ("m" = metric)
    #[serde(default = "default_qweather_unit")]
    pub qweather_unit: String,

    /// Gemini API key (tag extraction)
    pub gemini_api_key: Option<String>,

    /// Gemini API base URL
    #[serde(default = "default_gemini_api_url")]
    pub gemini_api_url: String,

    /// Gemini model used for tagging
    #[serde(default = "default_gemini_model_name")]
    pub gemini_model_name: String,

    /// DashScope API key (try-on synthesis)
    pub dashscope_api_key: Option<String>,

    /// DashScope API base URL
    #[serde(default = "default_dashscope_api_url")]
    pub dashscope_api_url: String,

    /// Try-on model name (aitryon / aitryon-plus)
    #[serde(default = "default_tryon_model")]
    pub tryon_model: String,

    /// Weather snapshot freshness window in seconds
    #[serde(default = "default_weather_cache_ttl_secs")]
    pub weather_cache_ttl_secs: u64,

    /// Maximum age at which a stale snapshot may still serve as a fallback
    /// during upstream failure, in seconds
    #[serde(default = "default_weather_staleness_ceiling_secs")]
    pub weather_staleness_ceiling_secs: u64,

    /// Absolute age past which a cached snapshot is dropped on next access,
    /// in seconds
    #[serde(default = "default_weather_eviction_ceiling_secs")]
    pub weather_eviction_ceiling_secs: u64,

    /// Per-attempt timeout for the weather provider, in seconds
    #[serde(default = "default_weather_timeout_secs")]
    pub weather_timeout_secs: u64,

    /// Per-attempt timeout for the tag extractor, in seconds
    #[serde(default = "default_tagging_timeout_secs")]
    pub tagging_timeout_secs: u64,

    /// Per-attempt timeout for the image synthesizer, in seconds
    #[serde(default = "default_tryon_timeout_secs")]
    pub tryon_timeout_secs: u64,

    /// Upstream attempts per gateway invocation (first try included)
    #[serde(default = "default_model_retry_max_attempts")]
    pub model_retry_max_attempts: u32,

    /// Base delay for exponential backoff between attempts, in milliseconds
    #[serde(default = "default_model_retry_base_backoff_ms")]
    pub model_retry_base_backoff_ms: u64,

    /// Maximum concurrent try-on syntheses
    #[serde(default = "default_tryon_max_concurrency")]
    pub tryon_max_concurrency: usize,

    /// Try-on requests allowed to wait for a slot before rejection
    #[serde(default = "default_tryon_queue_depth")]
    pub tryon_queue_depth: usize,

    /// Score weight for a season tag matching the temperature band
    #[serde(default = "default_score_season_match")]
    pub score_season_match: i32,

    /// Score weight for a scene tag consistent with the condition
    #[serde(default = "default_score_scene_match")]
    pub score_scene_match: i32,

    /// Signed score weight for an explicit season/scene clash
    #[serde(default = "default_score_mismatch")]
    pub score_mismatch: i32,

    /// Tie-break bonus for favorite-flagged outfits
    #[serde(default = "default_score_favorite_bonus")]
    pub score_favorite_bonus: i32,

    /// Upper bound of the "cold" temperature band, °C (exclusive)
    #[serde(default = "default_temp_cold_max_c")]
    pub temp_cold_max_c: f64,

    /// Upper bound of the "mild" temperature band, °C (exclusive)
    #[serde(default = "default_temp_mild_max_c")]
    pub temp_mild_max_c: f64,

    /// Upper bound of the "warm" temperature band, °C (exclusive); above is "hot"
    #[serde(default = "default_temp_warm_max_c")]
    pub temp_warm_max_c: f64,
}

fn default_qweather_host() -> String {
    "devapi.qweather.com".to_string()
}

fn default_qweather_lang() -> String {
    "zh-hans".to_string()
}

fn default_qweather_unit() -> String {
    "m".to_string()
}

fn default_gemini_api_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_model_name() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_dashscope_api_url() -> String {
    "https://dashscope.aliyuncs.com".to_string()
}

fn default_tryon_model() -> String {
    "aitryon".to_string()
}

fn default_weather_cache_ttl_secs() -> u64 {
    300
}

fn default_weather_staleness_ceiling_secs() -> u64 {
    1800
}

fn default_weather_eviction_ceiling_secs() -> u64 {
    86_400
}

fn default_weather_timeout_secs() -> u64 {
    6
}

fn default_tagging_timeout_secs() -> u64 {
    30
}

fn default_tryon_timeout_secs() -> u64 {
    300
}

fn default_model_retry_max_attempts() -> u32 {
    3
}

fn default_model_retry_base_backoff_ms() -> u64 {
    200
}

fn default_tryon_max_concurrency() -> usize {
    2
}

fn default_tryon_queue_depth() -> usize {
    8
}

fn default_score_season_match() -> i32 {
    3
}

fn default_score_scene_match() -> i32 {
    2
}

fn default_score_mismatch() -> i32 {
    -5
}

fn default_score_favorite_bonus() -> i32 {
    1
}

fn default_temp_cold_max_c() -> f64 {
    8.0
}

fn default_temp_mild_max_c() -> f64 {
    18.0
}

fn default_temp_warm_max_c() -> f64 {
    26.0
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn weather_cache(&self) -> WeatherCacheConfig {
        WeatherCacheConfig {
            ttl: Duration::from_secs(self.weather_cache_ttl_secs),
            staleness_ceiling: Duration::from_secs(self.weather_staleness_ceiling_secs),
            eviction_ceiling: Duration::from_secs(self.weather_eviction_ceiling_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.model_retry_max_attempts,
            base_backoff: Duration::from_millis(self.model_retry_base_backoff_ms),
        }
    }

    pub fn admission(&self) -> AdmissionConfig {
        AdmissionConfig {
            max_in_flight: self.tryon_max_concurrency,
            queue_depth: self.tryon_queue_depth,
        }
    }

    pub fn scoring(&self) -> ScoringConfig {
        ScoringConfig {
            season_match: self.score_season_match,
            scene_match: self.score_scene_match,
            mismatch: self.score_mismatch,
            favorite_bonus: self.score_favorite_bonus,
            bands: TempBands {
                cold_max_c: self.temp_cold_max_c,
                mild_max_c: self.temp_mild_max_c,
                warm_max_c: self.temp_warm_max_c,
            },
        }
    }

    pub fn weather_timeout(&self) -> Duration {
        Duration::from_secs(self.weather_timeout_secs)
    }

    pub fn tagging_timeout(&self) -> Duration {
        Duration::from_secs(self.tagging_timeout_secs)
    }

    pub fn tryon_timeout(&self) -> Duration {
        Duration::from_secs(self.tryon_timeout_secs)
    }
}
