/// Persistence collaborator interfaces
///
/// The outfit/favorites store and the asset store are owned by the
/// surrounding service; the core only talks to them through these traits.
/// `memory` provides in-process implementations for tests and local wiring.
use crate::{
    error::AppResult,
    models::{Outfit, OutfitFilter, TagSet},
};

pub mod memory;

/// Outfit/favorites persistence, owned externally.
///
/// The core reads candidate sets, writes tag sets back, and proxies the
/// favorite flag; it never owns a row.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait OutfitStore: Send + Sync {
    /// Candidate outfits matching the filter, ordered by ascending id.
    async fn list_outfits(&self, filter: &OutfitFilter) -> AppResult<Vec<Outfit>>;

    async fn get_outfit(&self, id: i64) -> AppResult<Option<Outfit>>;

    /// Replaces the outfit's tag set. All-or-nothing: the caller only hands
    /// over complete tag sets.
    async fn save_tags(&self, outfit_id: i64, tags: &TagSet) -> AppResult<()>;

    async fn is_favorite(&self, outfit_id: i64) -> AppResult<bool>;

    async fn set_favorite(&self, outfit_id: i64, favorite: bool) -> AppResult<()>;
}

/// Durable blob storage, owned externally.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AssetStore: Send + Sync {
    /// Stores a blob and returns a stable reference (URL or path).
    async fn put_blob(&self, bytes: &[u8], content_type: &str) -> AppResult<String>;
}
