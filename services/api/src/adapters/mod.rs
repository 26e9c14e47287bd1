pub mod auth;
pub mod compress;
pub mod db;
pub mod geocode;
pub mod prefs;
pub mod storage;

pub use auth::{BaasAuthClient, SessionAuth};
pub use compress::RasterCompressor;
pub use db::{DbAdapter, UserItemStore};
pub use geocode::PhotonGeocoder;
pub use prefs::{JsonFilePrefs, UserPrefs};
pub use storage::BaasStorageAdapter;
