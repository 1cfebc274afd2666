/// QWeather provider
///
/// Resolves free-form locations through the GeoAPI city lookup, then reads
/// the current observation from /v7/weather/now. QWeather signals errors both
/// via HTTP status and via a "code" field inside a 200 body; both paths are
/// normalized here.
use chrono::{DateTime, Utc};
use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::{
    error::ModelError,
    models::{Condition, ConditionKind, Location, WeatherSnapshot},
    services::providers::{check_status, WeatherProvider},
};

const CAPABILITY: &str = "qweather";

#[derive(Clone)]
pub struct QweatherProvider {
    http_client: HttpClient,
    api_key: String,
    base_url: String,
    lang: String,
    unit: String,
}

#[derive(Debug, Deserialize)]
struct GeoLookupResponse {
    code: String,
    #[serde(default)]
    location: Vec<GeoLocation>,
}

#[derive(Debug, Deserialize)]
struct GeoLocation {
    id: Option<String>,
    name: Option<String>,
    adm1: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NowResponse {
    code: String,
    #[serde(rename = "updateTime")]
    update_time: Option<String>,
    now: Option<NowObservation>,
}

#[derive(Debug, Deserialize)]
struct NowObservation {
    #[serde(rename = "obsTime")]
    obs_time: Option<String>,
    temp: Option<String>,
    text: Option<String>,
    icon: Option<String>,
    #[serde(rename = "windDir")]
    wind_dir: Option<String>,
    #[serde(rename = "windScale")]
    wind_scale: Option<String>,
    humidity: Option<String>,
}

impl QweatherProvider {
    pub fn new(api_key: String, host: String, lang: String, unit: String) -> Self {
        let host = host.trim().trim_matches('/').to_string();
        Self {
            http_client: HttpClient::new(),
            api_key,
            base_url: format!("https://{host}"),
            lang,
            unit,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ModelError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .get(&url)
            .header("Accept", "application/json")
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| ModelError::from_transport(CAPABILITY, &e))?;
        let response = check_status(CAPABILITY, response).await?;

        response
            .json::<T>()
            .await
            .map_err(|e| ModelError::NonRetryable(format!("{CAPABILITY}: unparseable body: {e}")))
    }

    /// Resolves a location to a QWeather LocationID plus a display name.
    async fn resolve(&self, location: &Location) -> Result<(String, String), ModelError> {
        let query = match location {
            Location::Id(id) => return Ok((id.clone(), id.clone())),
            Location::City(name) => name.clone(),
            Location::Coords { lat, lon } => format!("{lon:.2},{lat:.2}"),
        };

        let lookup: GeoLookupResponse = self
            .get_json(
                "/geo/v2/city/lookup",
                &[("location", query.as_str()), ("lang", self.lang.as_str())],
            )
            .await?;
        check_body_code(&lookup.code)?;

        let best = lookup
            .location
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::NonRetryable(format!("{CAPABILITY}: no match for location '{query}'")))?;
        let id = best
            .id
            .ok_or_else(|| ModelError::NonRetryable(format!("{CAPABILITY}: lookup returned no location id")))?;
        let name = match (best.name, best.adm1) {
            (Some(name), Some(adm1)) if adm1 != name => format!("{adm1} {name}"),
            (Some(name), _) => name,
            (None, _) => query,
        };
        Ok((id, name))
    }
}

#[async_trait::async_trait]
impl WeatherProvider for QweatherProvider {
    async fn observe(&self, location: &Location) -> Result<WeatherSnapshot, ModelError> {
        let (location_id, city) = self.resolve(location).await?;

        let weather: NowResponse = self
            .get_json(
                "/v7/weather/now",
                &[
                    ("location", location_id.as_str()),
                    ("lang", self.lang.as_str()),
                    ("unit", self.unit.as_str()),
                ],
            )
            .await?;
        check_body_code(&weather.code)?;

        let now = weather
            .now
            .ok_or_else(|| ModelError::NonRetryable(format!("{CAPABILITY}: response missing 'now' block")))?;

        let temperature_c = now
            .temp
            .as_deref()
            .and_then(|t| t.trim().parse::<f64>().ok())
            .ok_or_else(|| ModelError::NonRetryable(format!("{CAPABILITY}: unparseable temperature")))?;

        let fetched_at = Utc::now();
        let observed_at = now
            .obs_time
            .as_deref()
            .or(weather.update_time.as_deref())
            .and_then(parse_qweather_time)
            .unwrap_or(fetched_at);

        let icon = now.icon.clone();
        let kind = icon
            .as_deref()
            .map(ConditionKind::from_icon_code)
            .unwrap_or(ConditionKind::Unknown);

        let snapshot = WeatherSnapshot {
            location_key: location.cache_key(),
            city,
            temperature_c,
            condition: Condition {
                kind,
                text: now.text.unwrap_or_default(),
                icon,
            },
            wind_dir: now.wind_dir,
            wind_scale: now.wind_scale,
            humidity: now
                .humidity
                .as_deref()
                .and_then(|h| h.trim().parse::<u8>().ok()),
            observed_at,
            fetched_at,
        };

        tracing::debug!(
            location = %snapshot.location_key,
            condition = %snapshot.condition.text,
            temperature_c = snapshot.temperature_c,
            provider = CAPABILITY,
            "weather observation fetched"
        );

        Ok(snapshot)
    }

    fn name(&self) -> &'static str {
        CAPABILITY
    }
}

/// QWeather embeds a status code in 200 bodies; "200" means success.
fn check_body_code(code: &str) -> Result<(), ModelError> {
    match code {
        "200" => Ok(()),
        "429" => Err(ModelError::RateLimited {
            reason: format!("{CAPABILITY}: body code 429"),
            retry_after: None,
        }),
        "500" => Err(ModelError::Retryable(format!("{CAPABILITY}: body code 500"))),
        other => Err(ModelError::NonRetryable(format!(
            "{CAPABILITY}: body code {other}"
        ))),
    }
}

/// QWeather timestamps come as RFC 3339 with or without seconds.
fn parse_qweather_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M%z"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
