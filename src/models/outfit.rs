use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::weather::{Location, WeatherSnapshot};

/// Sentinel value recorded when a required tag category is missing from the
/// model output.
pub const UNKNOWN_TAG: &str = "unknown";

/// Tag categories the core understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagCategory {
    Style,
    Season,
    Scene,
    Color,
    Pattern,
    General,
}

/// Categories every complete TagSet must carry a value for.
pub const REQUIRED_CATEGORIES: [TagCategory; 5] = [
    TagCategory::Style,
    TagCategory::Season,
    TagCategory::Scene,
    TagCategory::Color,
    TagCategory::Pattern,
];

impl TagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagCategory::Style => "style",
            TagCategory::Season => "season",
            TagCategory::Scene => "scene",
            TagCategory::Color => "color",
            TagCategory::Pattern => "pattern",
            TagCategory::General => "general",
        }
    }

    /// Normalizes a model-output key to a category.
    ///
    /// Accepts the canonical names plus the aliases the tagging prompt has
    /// historically produced; unrecognized keys are ignored by the parser.
    pub fn from_key(key: &str) -> Option<TagCategory> {
        match key.trim().to_lowercase().as_str() {
            "style" | "overall_style" => Some(TagCategory::Style),
            "season" | "seasons" => Some(TagCategory::Season),
            "scene" | "scenes" | "occasion" | "suitable_occasion" => Some(TagCategory::Scene),
            "color" | "colors" | "color_palette" => Some(TagCategory::Color),
            "pattern" | "patterns" => Some(TagCategory::Pattern),
            "general" | "keywords" | "fashion_keywords" => Some(TagCategory::General),
            _ => None,
        }
    }
}

/// One (category, value) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub category: TagCategory,
    pub value: String,
}

impl Tag {
    pub fn new(category: TagCategory, value: impl Into<String>) -> Self {
        Self {
            category,
            value: value.into(),
        }
    }
}

/// Ordered, deduplicated collection of tags describing one outfit.
///
/// Values are normalized (trimmed, lowercased) on insert; a repeated
/// (category, value) pair is dropped, preserving first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet {
    tags: Vec<Tag>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a tag, normalizing the value. Empty values and duplicates are
    /// dropped.
    pub fn push(&mut self, category: TagCategory, value: &str) {
        let value = value.trim().to_lowercase();
        if value.is_empty() {
            return;
        }
        if self.has(category, &value) {
            return;
        }
        self.tags.push(Tag { category, value });
    }

    pub fn has(&self, category: TagCategory, value: &str) -> bool {
        let value = value.trim().to_lowercase();
        self.tags
            .iter()
            .any(|t| t.category == category && t.value == value)
    }

    /// Values recorded under one category, in insertion order.
    pub fn values(&self, category: TagCategory) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .filter(move |t| t.category == category)
            .map(|t| t.value.as_str())
    }

    /// Fills every required category that has no value with the `unknown`
    /// sentinel, so a TagSet is complete even from partial model output.
    pub fn fill_missing_required(&mut self) {
        for category in REQUIRED_CATEGORIES {
            if self.values(category).next().is_none() {
                self.tags.push(Tag {
                    category,
                    value: UNKNOWN_TAG.to_string(),
                });
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for tag in iter {
            set.push(tag.category, &tag.value);
        }
        set
    }
}

/// An outfit as the core sees it across the store boundary.
///
/// The favorite flag is owned by the store; the core only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outfit {
    pub id: i64,
    pub title: String,
    pub image_url: Option<String>,
    pub gender: Option<String>,
    pub tags: TagSet,
    pub favorite: bool,
    pub created_at: DateTime<Utc>,
}

/// Candidate selection filter handed to the outfit store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutfitFilter {
    /// Every listed tag must be present on a matching outfit.
    pub tags: Vec<Tag>,
    pub gender: Option<String>,
    /// Free-text match against title and tag values.
    pub text: Option<String>,
}

/// One recommendation request. Pure input; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationQuery {
    pub location: Location,
    /// When set, the weather cache/provider path is skipped entirely.
    pub weather_override: Option<WeatherSnapshot>,
    pub filters: Vec<Tag>,
}

impl RecommendationQuery {
    pub fn for_location(location: Location) -> Self {
        Self {
            location,
            weather_override: None,
            filters: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagset_dedupes_and_normalizes() {
        let mut tags = TagSet::new();
        tags.push(TagCategory::Style, " Casual ");
        tags.push(TagCategory::Style, "casual");
        tags.push(TagCategory::Color, "casual");
        tags.push(TagCategory::Style, "");

        assert_eq!(tags.len(), 2);
        assert!(tags.has(TagCategory::Style, "casual"));
        assert!(tags.has(TagCategory::Color, "casual"));
    }

    #[test]
    fn test_tagset_preserves_insertion_order() {
        let mut tags = TagSet::new();
        tags.push(TagCategory::Season, "winter");
        tags.push(TagCategory::Season, "autumn");
        let seasons: Vec<&str> = tags.values(TagCategory::Season).collect();
        assert_eq!(seasons, vec!["winter", "autumn"]);
    }

    #[test]
    fn test_fill_missing_required_adds_sentinels() {
        let mut tags = TagSet::new();
        tags.push(TagCategory::Style, "street");
        tags.fill_missing_required();

        assert!(tags.has(TagCategory::Style, "street"));
        assert!(!tags.has(TagCategory::Style, UNKNOWN_TAG));
        assert!(tags.has(TagCategory::Season, UNKNOWN_TAG));
        assert!(tags.has(TagCategory::Scene, UNKNOWN_TAG));
        assert!(tags.has(TagCategory::Color, UNKNOWN_TAG));
        assert!(tags.has(TagCategory::Pattern, UNKNOWN_TAG));
    }

    #[test]
    fn test_category_from_key_aliases() {
        assert_eq!(TagCategory::from_key("overall_style"), Some(TagCategory::Style));
        assert_eq!(
            TagCategory::from_key("suitable_occasion"),
            Some(TagCategory::Scene)
        );
        assert_eq!(TagCategory::from_key("color_palette"), Some(TagCategory::Color));
        assert_eq!(
            TagCategory::from_key("fashion_keywords"),
            Some(TagCategory::General)
        );
        assert_eq!(TagCategory::from_key("Season"), Some(TagCategory::Season));
        assert_eq!(TagCategory::from_key("top"), None);
    }

    #[test]
    fn test_tagset_serde_is_transparent() {
        let mut tags = TagSet::new();
        tags.push(TagCategory::Season, "winter");
        let json = serde_json::to_string(&tags).unwrap();
        assert_eq!(json, r#"[{"category":"season","value":"winter"}]"#);

        let parsed: TagSet = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, tags);
    }
}
