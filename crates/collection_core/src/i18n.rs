//! crates/collection_core/src/i18n.rs
//!
//! Translation lookup by dotted key.

use serde_json::Value;
use std::collections::HashMap;
use tracing::error;

const DE: &str = include_str!("../locales/de.json");
const EN: &str = include_str!("../locales/en.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    De,
    En,
}

impl Language {
    /// Picks a language from a locale tag such as `en-US`; unknown tags fall back to German.
    pub fn from_locale(tag: &str) -> Self {
        let primary = tag.split(['-', '_']).next().unwrap_or_default();
        match primary.to_ascii_lowercase().as_str() {
            "en" => Language::En,
            _ => Language::De,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::De => "de",
            Language::En => "en",
        }
    }
}

/// A flattened dotted-key to string map for one language.
#[derive(Debug, Clone, Default)]
pub struct Translations {
    entries: HashMap<String, String>,
}

impl Translations {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(json)?;
        let mut entries = HashMap::new();
        flatten("", &value, &mut entries);
        Ok(Self { entries })
    }

    /// The translations shipped with the crate.
    pub fn bundled(language: Language) -> Self {
        let source = match language {
            Language::De => DE,
            Language::En => EN,
        };
        Self::from_json(source).unwrap_or_else(|e| {
            error!(lang = language.code(), "Bundled translations are malformed: {}", e);
            Self::default()
        })
    }

    /// Resolves a key; an unknown key is returned unchanged.
    pub fn t<'a>(&'a self, key: &'a str) -> &'a str {
        self.entries.get(key).map(String::as_str).unwrap_or(key)
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut HashMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(&key, v, out);
            }
        }
        Value::String(s) if !prefix.is_empty() => {
            out.insert(prefix.to_string(), s.clone());
        }
        _ => {}
    }
}
