pub mod outfit;
pub mod tryon;
pub mod weather;

pub use outfit::{
    Outfit, OutfitFilter, RecommendationQuery, Tag, TagCategory, TagSet, REQUIRED_CATEGORIES,
    UNKNOWN_TAG,
};
pub use tryon::{ImageBlob, TryOnResult};
pub use weather::{
    Condition, ConditionKind, Location, TempBand, TempBands, WeatherSnapshot,
};
