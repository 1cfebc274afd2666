use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{Outfit, OutfitFilter, TagSet},
    store::{AssetStore, OutfitStore},
};

/// In-memory outfit store for tests and local wiring.
#[derive(Default)]
pub struct InMemoryOutfitStore {
    outfits: RwLock<HashMap<i64, Outfit>>,
}

impl InMemoryOutfitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, outfit: Outfit) {
        self.outfits.write().await.insert(outfit.id, outfit);
    }

    fn matches(outfit: &Outfit, filter: &OutfitFilter) -> bool {
        if let Some(gender) = &filter.gender {
            let wanted = gender.trim().to_lowercase();
            let actual = outfit
                .gender
                .as_deref()
                .unwrap_or("unisex")
                .trim()
                .to_lowercase();
            if !actual.contains(&wanted) {
                return false;
            }
        }
        for tag in &filter.tags {
            if !outfit.tags.has(tag.category, &tag.value) {
                return false;
            }
        }
        if let Some(text) = &filter.text {
            let needle = text.trim().to_lowercase();
            if !needle.is_empty() {
                let in_title = outfit.title.to_lowercase().contains(&needle);
                let in_tags = outfit.tags.iter().any(|t| t.value.contains(&needle));
                if !in_title && !in_tags {
                    return false;
                }
            }
        }
        true
    }
}

#[async_trait::async_trait]
impl OutfitStore for InMemoryOutfitStore {
    async fn list_outfits(&self, filter: &OutfitFilter) -> AppResult<Vec<Outfit>> {
        let outfits = self.outfits.read().await;
        let mut matched: Vec<Outfit> = outfits
            .values()
            .filter(|o| Self::matches(o, filter))
            .cloned()
            .collect();
        matched.sort_by_key(|o| o.id);
        Ok(matched)
    }

    async fn get_outfit(&self, id: i64) -> AppResult<Option<Outfit>> {
        Ok(self.outfits.read().await.get(&id).cloned())
    }

    async fn save_tags(&self, outfit_id: i64, tags: &TagSet) -> AppResult<()> {
        let mut outfits = self.outfits.write().await;
        let outfit = outfits
            .get_mut(&outfit_id)
            .ok_or_else(|| AppError::NotFound(format!("outfit {outfit_id}")))?;
        outfit.tags = tags.clone();
        Ok(())
    }

    async fn is_favorite(&self, outfit_id: i64) -> AppResult<bool> {
        let outfits = self.outfits.read().await;
        let outfit = outfits
            .get(&outfit_id)
            .ok_or_else(|| AppError::NotFound(format!("outfit {outfit_id}")))?;
        Ok(outfit.favorite)
    }

    async fn set_favorite(&self, outfit_id: i64, favorite: bool) -> AppResult<()> {
        let mut outfits = self.outfits.write().await;
        let outfit = outfits
            .get_mut(&outfit_id)
            .ok_or_else(|| AppError::NotFound(format!("outfit {outfit_id}")))?;
        outfit.favorite = favorite;
        Ok(())
    }
}

/// In-memory asset store; hands out `mem://` references.
#[derive(Default)]
pub struct InMemoryAssetStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    next_id: AtomicU64,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, reference: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(reference).cloned()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn put_blob(&self, bytes: &[u8], content_type: &str) -> AppResult<String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let ext = match content_type {
            "image/png" => "png",
            "image/webp" => "webp",
            _ => "jpg",
        };
        let reference = format!("mem://assets/{id}.{ext}");
        self.blobs
            .write()
            .await
            .insert(reference.clone(), bytes.to_vec());
        Ok(reference)
    }
}
