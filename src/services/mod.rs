pub mod gateway;
pub mod providers;
pub mod recommendations;
pub mod tagging;
pub mod tryon;
pub mod weather;

pub use gateway::{ModelGateway, RetryPolicy};
pub use recommendations::{RecommendationEngine, ScoringConfig};
pub use tagging::TagPipeline;
pub use tryon::{AdmissionConfig, TryOnPipeline};
pub use weather::{WeatherCache, WeatherCacheConfig};
