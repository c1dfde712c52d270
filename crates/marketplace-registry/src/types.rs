//! Wire and storage types for integration records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Maximum number of gallery images per integration.
pub const MAX_IMAGES: usize = 5;

/// Inbound publish request.
///
/// Unknown fields are ignored; absent fields default to empty so that
/// validation can report every missing field at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishRequest {
    /// Package identifier (stable across versions).
    pub id: String,

    /// Display name, unique among latest versions.
    pub name: String,

    /// Version, must equal the CI tag.
    pub version: String,

    pub description: String,

    /// Where the manifest document is served from.
    pub manifest_url: String,

    /// Manifest document as published.
    #[serde(deserialize_with = "null_as_default")]
    pub manifest: serde_json::Map<String, serde_json::Value>,

    /// Primary container image reference.
    pub image: String,

    /// Gallery image URLs (at most [`MAX_IMAGES`]).
    #[serde(deserialize_with = "null_as_default")]
    pub images: Vec<String>,

    /// Named asset URLs (icon, banner, ...).
    #[serde(deserialize_with = "null_as_default")]
    pub assets: BTreeMap<String, String>,

    /// Externally visible routing path, unique among latest versions.
    #[serde(rename = "listen_path", alias = "routing_path")]
    pub routing_path: String,

    /// URL of the integration compose file.
    pub compose_file: String,

    pub repo_url: String,

    pub release_tag: String,

    pub publisher: String,
}

/// Explicit `null` reads the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl PublishRequest {
    /// Copy of the request with every scalar field trimmed.
    pub fn trimmed(&self) -> Self {
        Self {
            id: self.id.trim().to_string(),
            name: self.name.trim().to_string(),
            version: self.version.trim().to_string(),
            description: self.description.trim().to_string(),
            manifest_url: self.manifest_url.trim().to_string(),
            manifest: self.manifest.clone(),
            image: self.image.trim().to_string(),
            images: self.images.iter().map(|i| i.trim().to_string()).collect(),
            assets: self
                .assets
                .iter()
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .collect(),
            routing_path: self.routing_path.trim().to_string(),
            compose_file: self.compose_file.trim().to_string(),
            repo_url: self.repo_url.trim().to_string(),
            release_tag: self.release_tag.trim().to_string(),
            publisher: self.publisher.trim().to_string(),
        }
    }
}

/// Persisted integration version, keyed by `(id, version)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationRecord {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub manifest_url: String,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub manifest: serde_json::Map<String, serde_json::Value>,

    pub image: String,
    pub images: Vec<String>,
    pub assets: BTreeMap<String, String>,

    #[serde(rename = "listen_path")]
    pub routing_path: String,

    pub compose_file: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo_url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub release_tag: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub publisher: String,

    /// Published through a verified CI identity.
    pub verified: bool,

    /// Current latest version of its package.
    pub latest: bool,

    /// Lifetime download count, carried across versions.
    pub downloads: i64,

    /// Downloads within the trailing trending window.
    #[serde(rename = "trending")]
    pub trending_score: f64,

    pub featured: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Engagement statistics carried forward when a new version becomes latest.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngagementStats {
    pub downloads: i64,
    pub trending_score: f64,
    pub featured: bool,
}

/// Sort order for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Download count, highest first.
    Downloads,
    /// Trending score, highest first.
    Trending,
    /// Version string, lexicographically descending.
    Version,
    /// Display name, ascending.
    #[default]
    Name,
}

impl SortKey {
    /// Parse a sort key; unknown values fall back to [`SortKey::Name`].
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "downloads" => Self::Downloads,
            "trending" => Self::Trending,
            "version" => Self::Version,
            _ => Self::Name,
        }
    }

    pub(crate) fn order_by(&self) -> &'static str {
        match self {
            Self::Downloads => "downloads DESC, name ASC",
            Self::Trending => "trending_score DESC, name ASC",
            Self::Version => "version DESC",
            Self::Name => "name ASC",
        }
    }
}

/// Filters for [`crate::IntegrationStore::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    /// Only latest versions (default true).
    pub latest_only: bool,
    /// Only featured integrations.
    pub featured_only: bool,
    pub sort: SortKey,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            latest_only: true,
            featured_only: false,
            sort: SortKey::Name,
        }
    }
}
