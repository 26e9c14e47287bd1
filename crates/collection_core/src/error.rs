//! crates/collection_core/src/error.rs
//!
//! The error taxonomy surfaced by the catalog controllers.

use crate::ports::PortError;

/// Errors surfaced to the user by catalog operations.
///
/// The wrapping variants display exactly the underlying message, so a failure
/// can be shown to the user as-is.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// No authenticated user when a storage-scoped action needs one.
    #[error("No user session")]
    NoSession,

    /// A query, insert, update or delete failed in the relational store.
    #[error("{0}")]
    Store(PortError),

    /// A list, upload, sign or remove failed in object storage.
    #[error("{0}")]
    Storage(PortError),

    /// The source file could not be decoded or re-encoded.
    #[error("{0}")]
    Compression(PortError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;
