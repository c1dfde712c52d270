use rusqlite::Connection;

use crate::error::RegistryResult;

/// Integration store schema.
///
/// The partial unique indexes back the latest-version invariants: one
/// latest row per package, and unique routing path and name among latest
/// rows.
pub const INTEGRATION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS integrations (
    id              TEXT NOT NULL,
    version         TEXT NOT NULL,
    name            TEXT NOT NULL,
    description     TEXT NOT NULL DEFAULT '',
    manifest_url    TEXT NOT NULL,
    manifest_json   TEXT NOT NULL DEFAULT '{}',
    image           TEXT NOT NULL,
    images_json     TEXT NOT NULL DEFAULT '[]',
    assets_json     TEXT NOT NULL DEFAULT '{}',
    routing_path    TEXT NOT NULL,
    compose_file    TEXT NOT NULL DEFAULT '',
    repo_url        TEXT NOT NULL DEFAULT '',
    release_tag     TEXT NOT NULL DEFAULT '',
    publisher       TEXT NOT NULL DEFAULT '',
    verified        INTEGER NOT NULL DEFAULT 0,
    latest          INTEGER NOT NULL DEFAULT 0,
    downloads       INTEGER NOT NULL DEFAULT 0,
    trending_score  REAL NOT NULL DEFAULT 0,
    featured        INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    PRIMARY KEY (id, version)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_integrations_latest_id
    ON integrations(id) WHERE latest = 1;
CREATE UNIQUE INDEX IF NOT EXISTS idx_integrations_latest_routing_path
    ON integrations(routing_path) WHERE latest = 1;
CREATE UNIQUE INDEX IF NOT EXISTS idx_integrations_latest_name
    ON integrations(name) WHERE latest = 1;

CREATE TABLE IF NOT EXISTS integration_download_events (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    integration_id  TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_download_events_integration
    ON integration_download_events(integration_id, created_at);
"#;

pub(crate) fn init_connection(conn: &Connection) -> RegistryResult<()> {
    // WAL is a no-op for in-memory databases.
    let _ = conn.execute("PRAGMA journal_mode = WAL", []);
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.execute_batch(INTEGRATION_SCHEMA)?;
    Ok(())
}
