//! Mod-list extraction from an HTML document.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::errors::ManifestError;

/// Selector for mod entries: `<li><a href="...">Name</a></li>`.
pub const ENTRY_SELECTOR: &str = "li > a";

/// Mapping of mod display name to download reference.
///
/// Duplicate names keep the last reference seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(BTreeMap<String, String>);

impl Manifest {
    /// Creates an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, replacing any previous reference for `name`.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        reference: impl Into<String>,
    ) -> Option<String> {
        self.0.insert(name.into(), reference.into())
    }

    /// Reference for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serializes as a pretty JSON object.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Extracts every `li > a` entry from `html`.
///
/// Names are the anchor text trimmed at both ends; references are the `href`
/// value as written. Anchors without an `href` or without text are skipped.
/// Zero matches is an empty manifest, not an error.
pub fn parse_manifest(html: &str) -> Result<Manifest, ManifestError> {
    let selector = Selector::parse(ENTRY_SELECTOR).map_err(|e| ManifestError::Selector {
        selector: ENTRY_SELECTOR.to_string(),
        message: e.to_string(),
    })?;
    let document = Html::parse_document(html);

    let mut manifest = Manifest::new();
    for anchor in document.select(&selector) {
        let text = anchor.text().collect::<String>();
        let name = text.trim();
        let Some(href) = anchor.value().attr("href") else {
            debug!(name, "Skipping mod entry without href");
            continue;
        };
        if name.is_empty() {
            debug!(href, "Skipping mod entry without a name");
            continue;
        }
        if let Some(previous) = manifest.insert(name, href) {
            debug!(name, previous = %previous, "Duplicate mod entry; keeping the last one");
        }
    }
    Ok(manifest)
}

/// Reads the document at `path` and extracts its manifest.
pub async fn extract(path: &Path) -> Result<Manifest, ManifestError> {
    let html = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    parse_manifest(&html)
}
