//! crates/collection_core/src/places.rs
//!
//! Place autocomplete against the geocoder. Each keystroke supersedes and
//! cancels the lookup still in flight for the previous one.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::PlaceCandidate;
use crate::ports::Geocoder;

pub const PLACE_DEBOUNCE: Duration = Duration::from_millis(300);
pub const MIN_QUERY_CHARS: usize = 3;
pub const PLACE_LIMIT: usize = 5;

const GERMAN_REGIONS: [&str; 5] = ["DE", "AT", "CH", "LI", "LU"];

/// Geocoder language for a locale tag: German for German-speaking regions, else English.
pub fn geocoder_lang(locale: &str) -> &'static str {
    let region = locale
        .split(['-', '_'])
        .nth(1)
        .unwrap_or_default()
        .to_ascii_uppercase();
    if GERMAN_REGIONS.contains(&region.as_str()) {
        "de"
    } else {
        "en"
    }
}

/// The two display lines of a candidate and its normalised dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceDisplay {
    pub city: String,
    pub line2: String,
    pub key: String,
}

pub fn display(candidate: &PlaceCandidate) -> PlaceDisplay {
    let city = [
        &candidate.city,
        &candidate.town,
        &candidate.village,
        &candidate.municipality,
        &candidate.name,
    ]
    .into_iter()
    .find_map(|v| v.as_deref().filter(|s| !s.is_empty()))
    .unwrap_or_default()
    .to_string();

    let country = candidate
        .country
        .clone()
        .or_else(|| candidate.country_code.as_ref().map(|c| c.to_ascii_uppercase()));
    let line2 = [candidate.state.clone(), country]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    let key = format!("{city}|||{line2}")
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    PlaceDisplay { city, line2, key }
}

/// Drops repeated OSM ids, then candidates that would display identically.
pub fn dedupe(candidates: Vec<PlaceCandidate>) -> Vec<PlaceCandidate> {
    let mut by_osm: Vec<PlaceCandidate> = Vec::new();
    for candidate in candidates {
        match by_osm.iter_mut().find(|c| c.osm_id == candidate.osm_id) {
            Some(existing) => *existing = candidate,
            None => by_osm.push(candidate),
        }
    }

    let mut seen = HashSet::new();
    by_osm
        .into_iter()
        .filter(|c| seen.insert(display(c).key))
        .collect()
}

/// The label stored on an item when a candidate is chosen: "City, Country".
pub fn label(candidate: &PlaceCandidate) -> String {
    let PlaceDisplay { city, line2, .. } = display(candidate);
    match line2.rsplit(", ").next().filter(|c| !c.is_empty()) {
        Some(country) => format!("{city}, {country}"),
        None => city,
    }
}

pub struct PlaceAutocomplete {
    geocoder: Arc<dyn Geocoder>,
    lang: &'static str,
    inflight: Mutex<Option<CancellationToken>>,
}

impl PlaceAutocomplete {
    pub fn new(geocoder: Arc<dyn Geocoder>, locale: &str) -> Self {
        Self {
            geocoder,
            lang: geocoder_lang(locale),
            inflight: Mutex::new(None),
        }
    }

    /// Looks up candidates for the current input.
    ///
    /// Returns `None` when a newer input superseded this one before it finished.
    /// Short input and geocoder failures both yield an empty list.
    pub async fn lookup(&self, input: &str) -> Option<Vec<PlaceCandidate>> {
        let token = CancellationToken::new();
        if let Some(previous) = self.inflight.lock().await.replace(token.clone()) {
            previous.cancel();
        }

        let query = input.trim();
        if query.chars().count() < MIN_QUERY_CHARS {
            return Some(Vec::new());
        }

        tokio::select! {
            _ = token.cancelled() => return None,
            _ = tokio::time::sleep(PLACE_DEBOUNCE) => {}
        }

        let result = tokio::select! {
            _ = token.cancelled() => {
                debug!(query, "Place lookup superseded.");
                return None;
            }
            result = self.geocoder.search(query, PLACE_LIMIT, self.lang) => result,
        };

        match result {
            Ok(candidates) => Some(dedupe(candidates)),
            Err(e) => {
                debug!(query, "Place lookup failed: {}", e);
                Some(Vec::new())
            }
        }
    }

    /// Cancels any lookup in flight, e.g. when the input loses focus.
    pub async fn cancel(&self) {
        if let Some(token) = self.inflight.lock().await.take() {
            token.cancel();
        }
    }
}
