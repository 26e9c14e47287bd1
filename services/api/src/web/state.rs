//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-request auth context.

use crate::adapters::{BaasAuthClient, BaasStorageAdapter, DbAdapter, JsonFilePrefs, SessionAuth};
use crate::config::Config;
use collection_core::catalog::CatalogServices;
use collection_core::ports::{Confirmer, Geocoder, ImageCompressor};
use std::sync::Arc;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DbAdapter,
    pub config: Arc<Config>,
    pub http: reqwest::Client,
    pub auth: BaasAuthClient,
    pub prefs: Arc<JsonFilePrefs>,
    pub geocoder: Arc<dyn Geocoder>,
    pub compressor: Arc<dyn ImageCompressor>,
}

/// The authenticated caller, inserted into request extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub access_token: String,
}

impl AppState {
    /// Wires the core ports for one authenticated user.
    pub fn catalog_services(
        &self,
        auth: &AuthContext,
        confirmer: Arc<dyn Confirmer>,
    ) -> CatalogServices {
        CatalogServices {
            store: Arc::new(self.db.for_user(auth.user_id)),
            storage: Arc::new(BaasStorageAdapter::new(
                self.http.clone(),
                &self.config.baas_url,
                &self.config.baas_anon_key,
                &self.config.storage_bucket,
                &auth.access_token,
            )),
            auth: Arc::new(SessionAuth::new(Some(auth.user_id))),
            compressor: self.compressor.clone(),
            confirmer,
            prefs: Arc::new(self.prefs.for_user(auth.user_id)),
        }
    }
}
