use rusqlite::{params, Connection, OptionalExtension};

use super::row::{RecordRow, RECORD_COLUMNS};
use super::IntegrationStore;
use crate::error::{RegistryError, RegistryResult};
use crate::types::{IntegrationRecord, ListQuery};

impl IntegrationStore {
    /// List integrations matching `query`.
    pub fn list(&self, query: ListQuery) -> RegistryResult<Vec<IntegrationRecord>> {
        let mut filters = Vec::new();
        if query.latest_only {
            filters.push("latest = 1");
        }
        if query.featured_only {
            filters.push("featured = 1");
        }
        let where_clause = if filters.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", filters.join(" AND "))
        };

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM integrations{where_clause} ORDER BY {}",
            query.sort.order_by()
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], RecordRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RecordRow::into_record).collect()
    }

    /// Fetch one version, or the latest version when `version` is `None`.
    pub fn get(&self, package_id: &str, version: Option<&str>) -> RegistryResult<IntegrationRecord> {
        let conn = self.lock()?;
        let found = match version.map(str::trim).filter(|v| !v.is_empty()) {
            Some(version) => find_version(&conn, package_id, version)?,
            None => find_latest(&conn, package_id)?,
        };
        found.ok_or_else(|| RegistryError::NotFound {
            package_id: package_id.to_string(),
            version: version.map(str::to_string),
        })
    }

    /// All versions of a package, newest first. Unknown packages yield an
    /// empty list.
    pub fn list_versions(&self, package_id: &str) -> RegistryResult<Vec<IntegrationRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM integrations WHERE id = ?1 \
             ORDER BY created_at DESC, version DESC"
        ))?;
        let rows = stmt
            .query_map([package_id], RecordRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RecordRow::into_record).collect()
    }
}

pub(super) fn find_latest(
    conn: &Connection,
    package_id: &str,
) -> RegistryResult<Option<IntegrationRecord>> {
    conn.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM integrations WHERE id = ?1 AND latest = 1"),
        [package_id],
        RecordRow::from_row,
    )
    .optional()?
    .map(RecordRow::into_record)
    .transpose()
}

pub(super) fn find_version(
    conn: &Connection,
    package_id: &str,
    version: &str,
) -> RegistryResult<Option<IntegrationRecord>> {
    conn.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM integrations WHERE id = ?1 AND version = ?2"),
        params![package_id, version],
        RecordRow::from_row,
    )
    .optional()?
    .map(RecordRow::into_record)
    .transpose()
}
