//! Row mapping between `integrations` and [`IntegrationRecord`].

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;

use crate::error::{RegistryError, RegistryResult};
use crate::types::IntegrationRecord;

pub(crate) const RECORD_COLUMNS: &str = "id, version, name, description, manifest_url, \
     manifest_json, image, images_json, assets_json, routing_path, compose_file, repo_url, \
     release_tag, publisher, verified, latest, downloads, trending_score, featured, \
     created_at, updated_at";

/// Raw column values; JSON and timestamps are decoded outside the row callback.
pub(crate) struct RecordRow {
    id: String,
    version: String,
    name: String,
    description: String,
    manifest_url: String,
    manifest_json: String,
    image: String,
    images_json: String,
    assets_json: String,
    routing_path: String,
    compose_file: String,
    repo_url: String,
    release_tag: String,
    publisher: String,
    verified: bool,
    latest: bool,
    downloads: i64,
    trending_score: f64,
    featured: bool,
    created_at: String,
    updated_at: String,
}

impl RecordRow {
    /// Read a row selected with [`RECORD_COLUMNS`].
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            version: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            manifest_url: row.get(4)?,
            manifest_json: row.get(5)?,
            image: row.get(6)?,
            images_json: row.get(7)?,
            assets_json: row.get(8)?,
            routing_path: row.get(9)?,
            compose_file: row.get(10)?,
            repo_url: row.get(11)?,
            release_tag: row.get(12)?,
            publisher: row.get(13)?,
            verified: row.get(14)?,
            latest: row.get(15)?,
            downloads: row.get(16)?,
            trending_score: row.get(17)?,
            featured: row.get(18)?,
            created_at: row.get(19)?,
            updated_at: row.get(20)?,
        })
    }

    pub(crate) fn into_record(self) -> RegistryResult<IntegrationRecord> {
        Ok(IntegrationRecord {
            manifest: serde_json::from_str(&self.manifest_json)?,
            images: serde_json::from_str(&self.images_json)?,
            assets: serde_json::from_str(&self.assets_json)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            id: self.id,
            version: self.version,
            name: self.name,
            description: self.description,
            manifest_url: self.manifest_url,
            image: self.image,
            routing_path: self.routing_path,
            compose_file: self.compose_file,
            repo_url: self.repo_url,
            release_tag: self.release_tag,
            publisher: self.publisher,
            verified: self.verified,
            latest: self.latest,
            downloads: self.downloads,
            trending_score: self.trending_score,
            featured: self.featured,
        })
    }
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> RegistryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RegistryError::Storage {
            message: format!("invalid timestamp {value:?}: {e}"),
        })
}
