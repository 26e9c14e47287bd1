//! crates/collection_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the catalog's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete backend-as-a-service, geocoder and codecs.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    Category, CompressedImage, CompressionOptions, ConfirmPrompt, ItemFields, ItemPage,
    ItemQuery, PlaceCandidate, SignedUrl, StoredObject,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Backend Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait ItemStore: Send + Sync {
    // --- Items ---
    /// Returns one page of items in the query's category, newest first,
    /// together with the exact number of matching rows.
    async fn search_items(&self, query: &ItemQuery) -> PortResult<ItemPage>;

    /// Inserts an item row and returns its generated identifier.
    async fn insert_item(&self, fields: &ItemFields) -> PortResult<Uuid>;

    async fn link_category(&self, item_id: Uuid, category_id: Uuid) -> PortResult<()>;

    async fn update_item(&self, item_id: Uuid, fields: &ItemFields) -> PortResult<()>;

    async fn delete_item(&self, item_id: Uuid) -> PortResult<()>;

    // --- Categories ---
    async fn list_categories(&self) -> PortResult<Vec<Category>>;

    async fn create_category(&self, name: &str) -> PortResult<Category>;

    async fn delete_category(&self, category_id: Uuid) -> PortResult<()>;
}

/// Sort order requested from a storage listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub limit: u32,
    pub order: ListOrder,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Lists the objects directly under `prefix`. Returned names are relative to it.
    async fn list(&self, prefix: &str, options: ListOptions) -> PortResult<Vec<StoredObject>>;

    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> PortResult<()>;

    async fn create_signed_url(&self, path: &str, expires_in: Duration) -> PortResult<String>;

    /// Signs several paths. The provided implementation issues one call per path;
    /// backends with a batch endpoint override it to sign in a single round-trip.
    async fn create_signed_urls(
        &self,
        paths: &[String],
        expires_in: Duration,
    ) -> PortResult<Vec<SignedUrl>> {
        let mut signed = Vec::with_capacity(paths.len());
        for path in paths {
            let url = self.create_signed_url(path, expires_in).await?;
            signed.push(SignedUrl {
                path: path.clone(),
                url,
            });
        }
        Ok(signed)
    }

    /// Removes every listed object by exact path.
    async fn remove(&self, paths: &[String]) -> PortResult<()>;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Looks up the currently authenticated user, if any.
    async fn current_user(&self) -> PortResult<Option<Uuid>>;
}

#[async_trait]
pub trait ImageCompressor: Send + Sync {
    /// Re-encodes a raw image file under the given constraints.
    async fn compress(
        &self,
        source: &[u8],
        options: &CompressionOptions,
    ) -> PortResult<CompressedImage>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn search(&self, query: &str, limit: usize, lang: &str) -> PortResult<Vec<PlaceCandidate>>;
}

#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Asks the user to approve a destructive action.
    async fn confirm(&self, prompt: ConfirmPrompt) -> bool;
}

/// A small key-value store for client-local UX preferences.
pub trait PrefStore: Send + Sync {
    fn get_bool(&self, key: &str) -> Option<bool>;

    fn set_bool(&self, key: &str, value: bool) -> PortResult<()>;
}
