use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use super::query::find_latest;
use super::row::format_timestamp;
use super::IntegrationStore;
use crate::error::{RegistryError, RegistryResult};
use crate::types::IntegrationRecord;

/// Trailing window for the trending score.
pub const TRENDING_WINDOW_DAYS: i64 = 7;

impl IntegrationStore {
    /// Record one download of the latest version of `package_id`.
    ///
    /// Appends a download event, bumps the lifetime count and recomputes
    /// the trending score over the trailing window.
    pub fn record_download(&self, package_id: &str) -> RegistryResult<IntegrationRecord> {
        let record = self.write_txn(|conn| {
            let exists: Option<String> = conn
                .query_row(
                    "SELECT version FROM integrations WHERE id = ?1 AND latest = 1",
                    [package_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(not_found(package_id));
            }

            let now = Utc::now();
            let now_str = format_timestamp(now);
            let window_start = format_timestamp(now - Duration::days(TRENDING_WINDOW_DAYS));

            conn.execute(
                "INSERT INTO integration_download_events (integration_id, created_at) VALUES (?1, ?2)",
                params![package_id, now_str],
            )?;

            conn.execute(
                r#"
                UPDATE integrations SET
                    downloads = downloads + 1,
                    trending_score = (
                        SELECT COUNT(*) FROM integration_download_events
                        WHERE integration_id = ?1 AND created_at >= ?2
                    ),
                    updated_at = ?3
                WHERE id = ?1 AND latest = 1
                "#,
                params![package_id, window_start, now_str],
            )?;

            find_latest(conn, package_id)?.ok_or_else(|| not_found(package_id))
        })?;

        debug!(
            event = "download_recorded",
            package_id = %record.id,
            version = %record.version,
            downloads = record.downloads,
            trending = record.trending_score
        );
        Ok(record)
    }

    /// Set or clear the featured flag on the latest version.
    pub fn set_featured(&self, package_id: &str, featured: bool) -> RegistryResult<IntegrationRecord> {
        let record = self.write_txn(|conn| {
            let changed = conn.execute(
                "UPDATE integrations SET featured = ?2, updated_at = ?3 WHERE id = ?1 AND latest = 1",
                params![package_id, featured, format_timestamp(Utc::now())],
            )?;
            if changed == 0 {
                return Err(not_found(package_id));
            }
            find_latest(conn, package_id)?.ok_or_else(|| not_found(package_id))
        })?;

        info!(event = "featured_changed", package_id = %package_id, featured);
        Ok(record)
    }
}

fn not_found(package_id: &str) -> RegistryError {
    RegistryError::NotFound {
        package_id: package_id.to_string(),
        version: None,
    }
}
