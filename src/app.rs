use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{
        ImageBlob, Location, Outfit, RecommendationQuery, TagSet, TryOnResult, WeatherSnapshot,
    },
    services::{
        gateway::ModelGateway,
        providers::{
            dashscope::DashscopeSynthesizer, gemini::GeminiTagExtractor,
            qweather::QweatherProvider, ImageSynthesizer, TagExtractor, WeatherProvider,
        },
        recommendations::RecommendationEngine,
        tagging::TagPipeline,
        tryon::TryOnPipeline,
        weather::WeatherCache,
    },
    store::{AssetStore, OutfitStore},
};

/// The three upstream model capabilities, bundled for wiring.
pub struct Upstreams {
    pub weather: Arc<dyn WeatherProvider>,
    pub tags: Arc<dyn TagExtractor>,
    pub synthesis: Arc<dyn ImageSynthesizer>,
}

impl Upstreams {
    /// Builds the live vendor providers from configuration.
    ///
    /// Fails when a required API key is absent, so misconfiguration surfaces
    /// at startup rather than on the first request.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let qweather_key = config
            .qweather_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("QWEATHER_KEY is not set"))?;
        let gemini_key = config
            .gemini_api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("GEMINI_API_KEY is not set"))?;
        let dashscope_key = config
            .dashscope_api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("DASHSCOPE_API_KEY is not set"))?;

        Ok(Self {
            weather: Arc::new(QweatherProvider::new(
                qweather_key,
                config.qweather_host.clone(),
                config.qweather_lang.clone(),
                config.qweather_unit.clone(),
            )),
            tags: Arc::new(GeminiTagExtractor::new(
                gemini_key,
                config.gemini_api_url.clone(),
                config.gemini_model_name.clone(),
            )),
            synthesis: Arc::new(DashscopeSynthesizer::new(
                dashscope_key,
                config.dashscope_api_url.clone(),
                config.tryon_model.clone(),
            )),
        })
    }
}

/// The orchestration core behind the service layer.
///
/// Owns the weather cache, the two pipelines, and the recommendation engine;
/// the outfit and asset stores are external collaborators handed in at
/// construction. Every operation takes a `CancellationToken` so a
/// disconnected caller can abandon its upstream wait.
pub struct App {
    weather: Arc<WeatherCache>,
    tagging: TagPipeline,
    tryon: TryOnPipeline,
    recommendations: RecommendationEngine,
    outfits: Arc<dyn OutfitStore>,
}

impl App {
    pub fn new(
        config: &Config,
        upstreams: Upstreams,
        outfits: Arc<dyn OutfitStore>,
        assets: Arc<dyn AssetStore>,
    ) -> Self {
        let gateway = Arc::new(ModelGateway::new(config.retry_policy()));

        let weather = Arc::new(WeatherCache::new(
            config.weather_cache(),
            config.weather_timeout(),
            gateway.clone(),
            upstreams.weather,
        ));
        let tagging = TagPipeline::new(gateway.clone(), upstreams.tags, config.tagging_timeout());
        let tryon = TryOnPipeline::new(
            gateway,
            upstreams.synthesis,
            assets,
            config.tryon_timeout(),
            config.admission(),
        );
        let recommendations =
            RecommendationEngine::new(weather.clone(), outfits.clone(), config.scoring());

        Self {
            weather,
            tagging,
            tryon,
            recommendations,
            outfits,
        }
    }

    /// Outfits ranked against current (or overridden) weather.
    pub async fn get_recommendations(
        &self,
        query: &RecommendationQuery,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<Outfit>> {
        self.recommendations.recommend(query, cancel).await
    }

    /// Extracts a TagSet from an outfit image without persisting it.
    pub async fn extract_tags(
        &self,
        image: &ImageBlob,
        cancel: &CancellationToken,
    ) -> AppResult<TagSet> {
        self.tagging.tag(image, cancel).await
    }

    /// Tags an outfit image and persists the result on the outfit.
    ///
    /// Complete-or-nothing: the store is only touched once a full TagSet
    /// exists, and a missing outfit is rejected before the model is called.
    pub async fn tag_outfit(
        &self,
        outfit_id: i64,
        image: &ImageBlob,
        cancel: &CancellationToken,
    ) -> AppResult<TagSet> {
        if self.outfits.get_outfit(outfit_id).await?.is_none() {
            return Err(AppError::NotFound(format!("outfit {outfit_id}")));
        }
        let tags = self.tagging.tag(image, cancel).await?;
        self.outfits.save_tags(outfit_id, &tags).await?;
        Ok(tags)
    }

    /// Renders the outfit onto the portrait, returning the inline payload and
    /// the durable asset references.
    pub async fn synthesize_try_on(
        &self,
        portrait: &ImageBlob,
        outfit: &ImageBlob,
        cancel: &CancellationToken,
    ) -> AppResult<TryOnResult> {
        self.tryon.synthesize(portrait, outfit, cancel).await
    }

    /// Current weather for a location, served through the cache.
    pub async fn get_current_weather(
        &self,
        location: &Location,
        cancel: &CancellationToken,
    ) -> AppResult<WeatherSnapshot> {
        self.weather.get(location, cancel).await
    }

    pub async fn set_favorite(&self, outfit_id: i64, favorite: bool) -> AppResult<()> {
        self.outfits.set_favorite(outfit_id, favorite).await
    }

    pub async fn is_favorite(&self, outfit_id: i64) -> AppResult<bool> {
        self.outfits.is_favorite(outfit_id).await
    }
}
