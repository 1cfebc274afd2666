use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    error::AppResult,
    models::{
        ConditionKind, Outfit, OutfitFilter, RecommendationQuery, TagCategory, TempBand,
        TempBands, WeatherSnapshot,
    },
    services::weather::WeatherCache,
    store::OutfitStore,
};

/// Scoring weights and temperature bands. Externally supplied so ranking is
/// tunable without code changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    pub season_match: i32,
    pub scene_match: i32,
    /// Signed; added once per clashing dimension.
    pub mismatch: i32,
    pub favorite_bonus: i32,
    pub bands: TempBands,
}

enum TagOutcome {
    Match,
    Clash,
    Neutral,
}

/// Weather-aware outfit ranking.
///
/// `recommend` is a pure function of the query plus current cache and store
/// state: no hidden iteration state, and the tie-break chain makes the output
/// order total and reproducible.
pub struct RecommendationEngine {
    weather: Arc<WeatherCache>,
    store: Arc<dyn OutfitStore>,
    scoring: ScoringConfig,
}

impl RecommendationEngine {
    pub fn new(
        weather: Arc<WeatherCache>,
        store: Arc<dyn OutfitStore>,
        scoring: ScoringConfig,
    ) -> Self {
        Self {
            weather,
            store,
            scoring,
        }
    }

    /// Ranks candidate outfits against current (or overridden) weather.
    ///
    /// Weather resolution failures propagate as `WeatherUnavailable`; the
    /// engine never silently ranks against weather it could not obtain. An
    /// explicit override in the query skips the cache/provider path entirely.
    pub async fn recommend(
        &self,
        query: &RecommendationQuery,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<Outfit>> {
        let snapshot = match &query.weather_override {
            Some(snapshot) => snapshot.clone(),
            None => self.weather.get(&query.location, cancel).await?,
        };

        let filter = OutfitFilter {
            tags: query.filters.clone(),
            ..Default::default()
        };
        let candidates = self.store.list_outfits(&filter).await?;

        let mut scored: Vec<(i32, Outfit)> = candidates
            .into_iter()
            .map(|outfit| (self.score(&outfit, &snapshot), outfit))
            .collect();

        scored.sort_by(|(score_a, a), (score_b, b)| {
            score_b
                .cmp(score_a)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        tracing::debug!(
            location = %snapshot.location_key,
            candidates = scored.len(),
            condition = ?snapshot.condition.kind,
            "recommendations ranked"
        );

        Ok(scored.into_iter().map(|(_, outfit)| outfit).collect())
    }

    /// Scores one outfit against a snapshot.
    ///
    /// Per dimension (season vs. temperature band, scene vs. condition): any
    /// matching tag earns the match weight; otherwise any clashing tag earns
    /// the mismatch weight; tags absent or unrecognized contribute nothing.
    pub fn score(&self, outfit: &Outfit, snapshot: &WeatherSnapshot) -> i32 {
        let mut score = 0;

        let band = snapshot.temp_band(&self.scoring.bands);
        match season_outcome(band, outfit.tags.values(TagCategory::Season)) {
            TagOutcome::Match => score += self.scoring.season_match,
            TagOutcome::Clash => score += self.scoring.mismatch,
            TagOutcome::Neutral => {}
        }

        match scene_outcome(
            snapshot.condition.kind,
            outfit.tags.values(TagCategory::Scene),
        ) {
            TagOutcome::Match => score += self.scoring.scene_match,
            TagOutcome::Clash => score += self.scoring.mismatch,
            TagOutcome::Neutral => {}
        }

        if outfit.favorite {
            score += self.scoring.favorite_bonus;
        }

        score
    }
}

/// Season vocabulary per temperature band: (matching, clashing).
fn season_vocabulary(band: TempBand) -> (&'static [&'static str], &'static [&'static str]) {
    match band {
        TempBand::Cold => (&["winter", "冬"], &["summer", "夏"]),
        TempBand::Mild => (&["spring", "autumn", "fall", "春", "秋"], &[]),
        TempBand::Warm => (&["spring", "summer", "autumn", "fall", "春", "夏", "秋"], &["winter", "冬"]),
        TempBand::Hot => (&["summer", "夏"], &["winter", "冬"]),
    }
}

/// Scene vocabulary per condition class: (matching, clashing).
fn scene_vocabulary(kind: ConditionKind) -> (&'static [&'static str], &'static [&'static str]) {
    match kind {
        ConditionKind::Rain | ConditionKind::Storm | ConditionKind::Snow => (
            &["indoor", "home", "居家"],
            &["outdoor", "beach", "picnic", "hiking", "sports", "户外", "运动"],
        ),
        ConditionKind::Clear => (
            &["outdoor", "travel", "picnic", "sports", "beach", "date", "户外", "旅行", "运动", "约会"],
            &[],
        ),
        ConditionKind::Cloudy | ConditionKind::Fog | ConditionKind::Unknown => (&[], &[]),
    }
}

fn outcome_for<'a>(
    vocabulary: (&[&str], &[&str]),
    mut values: impl Iterator<Item = &'a str>,
) -> TagOutcome {
    let (matching, clashing) = vocabulary;
    let mut clashed = false;
    for value in &mut values {
        if matching.contains(&value) {
            return TagOutcome::Match;
        }
        if clashing.contains(&value) {
            clashed = true;
        }
    }
    if clashed {
        TagOutcome::Clash
    } else {
        TagOutcome::Neutral
    }
}

fn season_outcome<'a>(band: TempBand, values: impl Iterator<Item = &'a str>) -> TagOutcome {
    outcome_for(season_vocabulary(band), values)
}

fn scene_outcome<'a>(kind: ConditionKind, values: impl Iterator<Item = &'a str>) -> TagOutcome {
    outcome_for(scene_vocabulary(kind), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Condition, TagSet};
    use chrono::{TimeZone, Utc};

    fn scoring() -> ScoringConfig {
        ScoringConfig {
            season_match: 3,
            scene_match: 2,
            mismatch: -5,
            favorite_bonus: 1,
            bands: TempBands {
                cold_max_c: 8.0,
                mild_max_c: 18.0,
                warm_max_c: 26.0,
            },
        }
    }

    fn snapshot(temp: f64, kind: ConditionKind) -> WeatherSnapshot {
        WeatherSnapshot {
            location_key: "city:hangzhou".to_string(),
            city: "Hangzhou".to_string(),
            temperature_c: temp,
            condition: Condition {
                kind,
                text: "test".to_string(),
                icon: None,
            },
            wind_dir: None,
            wind_scale: None,
            humidity: None,
            observed_at: Utc::now(),
            fetched_at: Utc::now(),
        }
    }

    fn outfit(id: i64, tags: &[(TagCategory, &str)], favorite: bool) -> Outfit {
        let mut set = TagSet::new();
        for (category, value) in tags {
            set.push(*category, value);
        }
        Outfit {
            id,
            title: format!("outfit {id}"),
            image_url: None,
            gender: None,
            tags: set,
            favorite,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    // Engine wiring is exercised in the integration suite; these tests pin
    // the scoring arithmetic, which needs no cache or store.
    fn engine_for_scoring() -> RecommendationEngine {
        use crate::services::gateway::{ModelGateway, RetryPolicy};
        use crate::services::providers::MockWeatherProvider;
        use crate::services::weather::{WeatherCache, WeatherCacheConfig};
        use crate::store::MockOutfitStore;
        use std::time::Duration;

        let cache = WeatherCache::new(
            WeatherCacheConfig {
                ttl: Duration::from_secs(300),
                staleness_ceiling: Duration::from_secs(1800),
                eviction_ceiling: Duration::from_secs(86_400),
            },
            Duration::from_secs(5),
            Arc::new(ModelGateway::new(RetryPolicy::default())),
            Arc::new(MockWeatherProvider::new()),
        );
        RecommendationEngine::new(Arc::new(cache), Arc::new(MockOutfitStore::new()), scoring())
    }

    #[test]
    fn test_score_example_from_tuning_doc() {
        let engine = engine_for_scoring();
        let hot = snapshot(30.0, ConditionKind::Cloudy);

        // A: season match + favorite = 3 + 1 = 4
        let a = outfit(1, &[(TagCategory::Season, "summer")], true);
        // B: scene-neutral condition, season absent; give B a scene match via
        // clear weather instead
        let clear = snapshot(30.0, ConditionKind::Clear);
        let b = outfit(2, &[(TagCategory::Scene, "outdoor")], false);

        assert_eq!(engine.score(&a, &hot), 4);
        assert_eq!(engine.score(&b, &clear), 2);
    }

    #[test]
    fn test_score_explicit_mismatch_penalized() {
        let engine = engine_for_scoring();
        let hot = snapshot(30.0, ConditionKind::Clear);
        let winter_coat = outfit(1, &[(TagCategory::Season, "winter")], false);
        assert_eq!(engine.score(&winter_coat, &hot), -5);
    }

    #[test]
    fn test_score_match_beats_clash_within_dimension() {
        let engine = engine_for_scoring();
        let hot = snapshot(30.0, ConditionKind::Cloudy);
        // An all-rounder tagged both summer and winter counts as a match.
        let both = outfit(1, &[(TagCategory::Season, "summer"), (TagCategory::Season, "winter")], false);
        assert_eq!(engine.score(&both, &hot), 3);
    }

    #[test]
    fn test_score_absent_and_unknown_tags_are_neutral() {
        let engine = engine_for_scoring();
        let cold = snapshot(-2.0, ConditionKind::Snow);
        let untagged = outfit(1, &[], false);
        assert_eq!(engine.score(&untagged, &cold), 0);

        let unknown = outfit(2, &[(TagCategory::Season, "unknown")], false);
        assert_eq!(engine.score(&unknown, &cold), 0);
    }

    #[test]
    fn test_score_rainy_day_penalizes_outdoor_scenes() {
        let engine = engine_for_scoring();
        let rain = snapshot(15.0, ConditionKind::Rain);
        let picnic = outfit(1, &[(TagCategory::Scene, "picnic")], false);
        let home = outfit(2, &[(TagCategory::Scene, "home")], false);
        assert_eq!(engine.score(&picnic, &rain), -5);
        assert_eq!(engine.score(&home, &rain), 2);
    }

    #[test]
    fn test_score_chinese_vocabulary() {
        let engine = engine_for_scoring();
        let cold = snapshot(0.0, ConditionKind::Cloudy);
        let dong = outfit(1, &[(TagCategory::Season, "冬")], false);
        assert_eq!(engine.score(&dong, &cold), 3);
    }
}
