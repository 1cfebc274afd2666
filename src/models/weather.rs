use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A weather lookup target.
///
/// Either a provider-native location id, a free-form city name, or raw
/// coordinates. Each form maps to a stable cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Location {
    /// Provider location id (e.g. QWeather LocationID)
    Id(String),
    /// City name (e.g. "杭州", "Hangzhou")
    City(String),
    /// WGS84 coordinates
    Coords { lat: f64, lon: f64 },
}

impl Location {
    /// Parses a client-supplied location string.
    ///
    /// Clients sometimes concatenate coordinates into the city field, in
    /// either "lat,lon" or "lon,lat" order; a first component within ±90 is
    /// read as a latitude.
    pub fn parse(raw: &str) -> Option<Location> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some((first, second)) = raw.split_once(',') {
            if let (Ok(a), Ok(b)) = (first.trim().parse::<f64>(), second.trim().parse::<f64>()) {
                let (lat, lon) = if a.abs() <= 90.0 && b.abs() <= 180.0 {
                    (a, b)
                } else {
                    (b, a)
                };
                return Some(Location::Coords { lat, lon });
            }
        }
        Some(Location::City(raw.to_string()))
    }

    /// Stable cache key for this location.
    pub fn cache_key(&self) -> String {
        format!("{}", self)
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Id(id) => write!(f, "id:{}", id),
            Location::City(name) => write!(f, "city:{}", name.trim().to_lowercase()),
            Location::Coords { lat, lon } => write!(f, "geo:{:.2},{:.2}", lon, lat),
        }
    }
}

/// Coarse condition classes the recommendation scoring understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Clear,
    Cloudy,
    Rain,
    Snow,
    Storm,
    Fog,
    Unknown,
}

impl ConditionKind {
    /// Maps a QWeather icon code to a condition class.
    ///
    /// Code ranges: 1xx clear/cloudy (daytime), 15x the night variants,
    /// 3xx precipitation (302-304 thunderstorms), 4xx snow, 5xx fog/haze.
    pub fn from_icon_code(code: &str) -> Self {
        let Ok(n) = code.trim().parse::<u32>() else {
            return ConditionKind::Unknown;
        };
        match n {
            100 | 150 => ConditionKind::Clear,
            101..=104 | 151..=154 => ConditionKind::Cloudy,
            302..=304 => ConditionKind::Storm,
            300..=301 | 305..=399 => ConditionKind::Rain,
            400..=499 => ConditionKind::Snow,
            500..=515 => ConditionKind::Fog,
            _ => ConditionKind::Unknown,
        }
    }
}

/// Observed condition: normalized class plus what the provider reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    /// Provider display text (e.g. "晴", "小雨")
    pub text: String,
    /// Provider icon code, when given
    pub icon: Option<String>,
}

/// One weather observation. Immutable; a refetch produces a new snapshot
/// rather than mutating this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// Cache key of the location this snapshot answers for
    pub location_key: String,
    /// Resolved city/display name
    pub city: String,
    pub temperature_c: f64,
    pub condition: Condition,
    pub wind_dir: Option<String>,
    pub wind_scale: Option<String>,
    /// Relative humidity, percent
    pub humidity: Option<u8>,
    /// When the provider observed these values
    pub observed_at: DateTime<Utc>,
    /// When this process fetched them
    pub fetched_at: DateTime<Utc>,
}

/// Temperature band cutoffs, °C. Each bound is exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempBands {
    pub cold_max_c: f64,
    pub mild_max_c: f64,
    pub warm_max_c: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempBand {
    Cold,
    Mild,
    Warm,
    Hot,
}

impl WeatherSnapshot {
    pub fn temp_band(&self, bands: &TempBands) -> TempBand {
        if self.temperature_c < bands.cold_max_c {
            TempBand::Cold
        } else if self.temperature_c < bands.mild_max_c {
            TempBand::Mild
        } else if self.temperature_c < bands.warm_max_c {
            TempBand::Warm
        } else {
            TempBand::Hot
        }
    }
}
