//! services/api/src/adapters/geocode.rs
//!
//! A `Geocoder` backed by a Photon endpoint, which answers with GeoJSON features.

use async_trait::async_trait;
use collection_core::domain::PlaceCandidate;
use collection_core::ports::{Geocoder, PortError, PortResult};
use reqwest::{Client, Url};
use serde::Deserialize;

#[derive(Clone)]
pub struct PhotonGeocoder {
    client: Client,
    endpoint: String,
}

impl PhotonGeocoder {
    pub fn new(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    properties: Properties,
}

#[derive(Deserialize)]
struct Properties {
    osm_id: i64,
    name: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    state: Option<String>,
    country: Option<String>,
    countrycode: Option<String>,
}

impl Properties {
    fn to_domain(self) -> PlaceCandidate {
        PlaceCandidate {
            osm_id: self.osm_id,
            name: self.name,
            city: self.city,
            town: self.town,
            village: self.village,
            municipality: self.municipality,
            state: self.state,
            country: self.country,
            country_code: self.countrycode,
        }
    }
}

fn decode(body: &str) -> PortResult<Vec<PlaceCandidate>> {
    let collection: FeatureCollection = serde_json::from_str(body)
        .map_err(|e| PortError::Unexpected(format!("Invalid geocoder response: {e}")))?;
    Ok(collection
        .features
        .into_iter()
        .map(|f| f.properties.to_domain())
        .collect())
}

#[async_trait]
impl Geocoder for PhotonGeocoder {
    async fn search(&self, query: &str, limit: usize, lang: &str) -> PortResult<Vec<PlaceCandidate>> {
        let limit = limit.to_string();
        let url = Url::parse_with_params(
            &self.endpoint,
            [("q", query), ("limit", limit.as_str()), ("lang", lang)],
        )
        .map_err(|e| PortError::Unexpected(format!("Invalid geocoder URL: {e}")))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PortError::Unexpected(format!("HTTP {}", status.as_u16())));
        }
        let body = response
            .text()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        decode(&body)
    }
}
