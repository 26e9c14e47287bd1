pub mod catalog;
pub mod categories;
pub mod domain;
pub mod error;
pub mod i18n;
pub mod images;
pub mod mutations;
pub mod places;
pub mod ports;
pub mod prefs;
pub mod query;
pub mod upload;

#[cfg(test)]
mod testing;

pub use catalog::{CatalogServices, CatalogView, ImageDeletion, PageWithImages};
pub use categories::CategoryList;
pub use domain::{
    Category, CompressedImage, CompressionOptions, ConfirmPrompt, ImageEntry, Item, ItemDraft,
    ItemFields, ItemPage, ItemQuery, PlaceCandidate, RasterFormat, SignedUrl, StoredObject,
};
pub use error::{CatalogError, CatalogResult};
pub use i18n::{Language, Translations};
pub use places::PlaceAutocomplete;
pub use ports::{
    AuthService, Confirmer, Geocoder, ImageCompressor, ItemStore, ListOptions, ListOrder,
    ObjectStorage, PortError, PortResult, PrefStore,
};
pub use query::{FetchOutcome, PageView, Pagination, QueryCoordinator};
