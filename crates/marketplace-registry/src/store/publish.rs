use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::query::find_version;
use super::row::format_timestamp;
use super::IntegrationStore;
use crate::error::{RegistryError, RegistryResult};
use crate::types::{EngagementStats, IntegrationRecord, PublishRequest};

impl IntegrationStore {
    /// Publish `request` as the latest version of its package.
    ///
    /// Idempotent per `(id, version)`: republishing overwrites the row in
    /// place. Engagement stats of the current latest version carry forward.
    pub fn publish(
        &self,
        request: &PublishRequest,
        verified: bool,
    ) -> RegistryResult<IntegrationRecord> {
        let record = self.write_txn(|conn| publish_in_txn(conn, request, verified))?;

        info!(
            event = "integration_published",
            package_id = %record.id,
            version = %record.version,
            latest = record.latest,
            verified = record.verified,
            downloads = record.downloads
        );
        Ok(record)
    }
}

fn publish_in_txn(
    conn: &Connection,
    request: &PublishRequest,
    verified: bool,
) -> RegistryResult<IntegrationRecord> {
    // Step 1: routing path is required
    if request.routing_path.is_empty() {
        return Err(RegistryError::validation("listen_path required"));
    }

    // Step 2-3: uniqueness among other packages' latest versions
    ensure_routing_path_available(conn, &request.routing_path, &request.id)?;
    ensure_name_available(conn, &request.name, &request.id)?;

    // Step 4: stats of the current latest version
    let stats = latest_stats(conn, &request.id)?;

    // Step 5: retire the current latest
    conn.execute(
        "UPDATE integrations SET latest = 0 WHERE id = ?1 AND latest = 1",
        [&request.id],
    )?;

    // Step 6: upsert the new latest; created_at survives a republish
    let now = format_timestamp(Utc::now());
    let upsert = conn.execute(
        r#"
        INSERT INTO integrations (
            id, version, name, description, manifest_url, manifest_json,
            image, images_json, assets_json, routing_path, compose_file,
            repo_url, release_tag, publisher, verified, latest,
            downloads, trending_score, featured, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
            ?12, ?13, ?14, ?15, 1, ?16, ?17, ?18, ?19, ?19
        )
        ON CONFLICT(id, version) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            manifest_url = excluded.manifest_url,
            manifest_json = excluded.manifest_json,
            image = excluded.image,
            images_json = excluded.images_json,
            assets_json = excluded.assets_json,
            routing_path = excluded.routing_path,
            compose_file = excluded.compose_file,
            repo_url = excluded.repo_url,
            release_tag = excluded.release_tag,
            publisher = excluded.publisher,
            verified = excluded.verified,
            latest = 1,
            downloads = excluded.downloads,
            trending_score = excluded.trending_score,
            featured = excluded.featured,
            updated_at = excluded.updated_at
        "#,
        params![
            request.id,
            request.version,
            request.name,
            request.description,
            request.manifest_url,
            serde_json::to_string(&request.manifest)?,
            request.image,
            serde_json::to_string(&request.images)?,
            serde_json::to_string(&request.assets)?,
            request.routing_path,
            request.compose_file,
            request.repo_url,
            request.release_tag,
            request.publisher,
            verified,
            stats.downloads,
            stats.trending_score,
            stats.featured,
            now,
        ],
    );
    if let Err(e) = upsert {
        return Err(map_constraint_error(e, request));
    }

    // Step 7: re-read
    find_version(conn, &request.id, &request.version)?.ok_or_else(|| RegistryError::Storage {
        message: format!(
            "published row {}@{} not readable",
            request.id, request.version
        ),
    })
}

fn ensure_routing_path_available(
    conn: &Connection,
    routing_path: &str,
    package_id: &str,
) -> RegistryResult<()> {
    let holder: Option<String> = conn
        .query_row(
            "SELECT id FROM integrations WHERE latest = 1 AND routing_path = ?1 AND id <> ?2 LIMIT 1",
            params![routing_path, package_id],
            |row| row.get(0),
        )
        .optional()?;
    match holder {
        Some(_) => Err(RegistryError::RoutingPathInUse {
            routing_path: routing_path.to_string(),
        }),
        None => Ok(()),
    }
}

fn ensure_name_available(conn: &Connection, name: &str, package_id: &str) -> RegistryResult<()> {
    if name.is_empty() {
        return Ok(());
    }
    let holder: Option<String> = conn
        .query_row(
            "SELECT id FROM integrations WHERE latest = 1 AND name = ?1 AND id <> ?2 LIMIT 1",
            params![name, package_id],
            |row| row.get(0),
        )
        .optional()?;
    match holder {
        Some(_) => Err(RegistryError::NameInUse {
            name: name.to_string(),
        }),
        None => Ok(()),
    }
}

fn latest_stats(conn: &Connection, package_id: &str) -> RegistryResult<EngagementStats> {
    let stats = conn
        .query_row(
            "SELECT downloads, trending_score, featured FROM integrations WHERE id = ?1 AND latest = 1",
            [package_id],
            |row| {
                Ok(EngagementStats {
                    downloads: row.get(0)?,
                    trending_score: row.get(1)?,
                    featured: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(stats.unwrap_or_default())
}

/// The partial unique indexes are the last line of defence; report their
/// violations as the matching conflict.
fn map_constraint_error(err: rusqlite::Error, request: &PublishRequest) -> RegistryError {
    let message = err.to_string();
    if message.contains("UNIQUE constraint failed") {
        if message.contains("integrations.routing_path") {
            return RegistryError::RoutingPathInUse {
                routing_path: request.routing_path.clone(),
            };
        }
        if message.contains("integrations.name") {
            return RegistryError::NameInUse {
                name: request.name.clone(),
            };
        }
    }
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ListQuery, SortKey};

    fn request(id: &str, version: &str, path: &str) -> PublishRequest {
        PublishRequest {
            id: id.into(),
            name: format!("{id} integration"),
            version: version.into(),
            description: "test".into(),
            manifest_url: format!("https://raw.githubusercontent.com/org/{id}/{version}/m.json"),
            image: format!("ghcr.io/org/{id}:{version}"),
            images: vec!["https://example.com/shot.png".into()],
            routing_path: path.into(),
            compose_file: format!(
                "https://raw.githubusercontent.com/org/{id}/{version}/docker-compose.integration.yml"
            ),
            repo_url: format!("https://github.com/org/{id}"),
            release_tag: version.into(),
            publisher: "org".into(),
            ..Default::default()
        }
    }

    fn latest_versions(store: &IntegrationStore, id: &str) -> Vec<String> {
        store
            .list_versions(id)
            .unwrap()
            .into_iter()
            .filter(|r| r.latest)
            .map(|r| r.version)
            .collect()
    }

    #[test]
    fn test_first_publish_is_latest() {
        let store = IntegrationStore::memory().unwrap();
        let rec = store
            .publish(&request("spotify", "v0.1.0", "/integrations/spotify"), true)
            .unwrap();
        assert!(rec.latest);
        assert!(rec.verified);
        assert_eq!(rec.downloads, 0);
        assert_eq!(rec.images, vec!["https://example.com/shot.png".to_string()]);
    }

    #[test]
    fn test_republish_same_version_is_idempotent() {
        let store = IntegrationStore::memory().unwrap();
        let req = request("spotify", "v0.1.0", "/integrations/spotify");
        let first = store.publish(&req, true).unwrap();
        store.record_download("spotify").unwrap();
        let second = store.publish(&req, true).unwrap();

        assert_eq!(store.list_versions("spotify").unwrap().len(), 1);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.downloads, 1);

        let third = store.publish(&req, true).unwrap();
        assert_eq!(
            IntegrationRecord {
                updated_at: second.updated_at,
                ..third
            },
            second
        );
    }

    #[test]
    fn test_exactly_one_latest_after_sequential_publishes() {
        let store = IntegrationStore::memory().unwrap();
        for v in ["v1.0.0", "v1.1.0", "v1.2.0", "v2.0.0"] {
            store
                .publish(&request("spotify", v, "/integrations/spotify"), true)
                .unwrap();
            assert_eq!(latest_versions(&store, "spotify"), vec![v.to_string()]);
        }
        assert_eq!(store.list_versions("spotify").unwrap().len(), 4);
        assert_eq!(store.get("spotify", None).unwrap().version, "v2.0.0");
    }

    #[test]
    fn test_republishing_older_version_moves_latest_back() {
        let store = IntegrationStore::memory().unwrap();
        store
            .publish(&request("spotify", "v1.0.0", "/p"), true)
            .unwrap();
        store
            .publish(&request("spotify", "v2.0.0", "/p"), true)
            .unwrap();
        store
            .publish(&request("spotify", "v1.0.0", "/p"), true)
            .unwrap();
        assert_eq!(latest_versions(&store, "spotify"), vec!["v1.0.0".to_string()]);
    }

    #[test]
    fn test_routing_path_conflict_with_other_package() {
        let store = IntegrationStore::memory().unwrap();
        store.publish(&request("a", "v1.0.0", "/p"), true).unwrap();

        let err = store
            .publish(&request("b", "v1.0.0", "/p"), true)
            .unwrap_err();
        assert!(matches!(err, RegistryError::RoutingPathInUse { ref routing_path } if routing_path == "/p"));
        assert!(store.list_versions("b").unwrap().is_empty());

        // Self-republish at the same path is fine.
        store.publish(&request("a", "v1.1.0", "/p"), true).unwrap();
    }

    #[test]
    fn test_name_conflict_with_other_package() {
        let store = IntegrationStore::memory().unwrap();
        store.publish(&request("a", "v1.0.0", "/a"), true).unwrap();

        let mut other = request("b", "v1.0.0", "/b");
        other.name = "a integration".into();
        let err = store.publish(&other, true).unwrap_err();
        assert!(matches!(err, RegistryError::NameInUse { .. }));
    }

    #[test]
    fn test_failed_publish_leaves_latest_untouched() {
        let store = IntegrationStore::memory().unwrap();
        store.publish(&request("a", "v1.0.0", "/a"), true).unwrap();
        store.publish(&request("b", "v1.0.0", "/b"), true).unwrap();

        // b moving onto a's path must not retire b@v1.0.0.
        let err = store
            .publish(&request("b", "v2.0.0", "/a"), true)
            .unwrap_err();
        assert!(matches!(err, RegistryError::RoutingPathInUse { .. }));
        assert_eq!(latest_versions(&store, "b"), vec!["v1.0.0".to_string()]);
    }

    #[test]
    fn test_empty_routing_path_rejected() {
        let store = IntegrationStore::memory().unwrap();
        let err = store.publish(&request("a", "v1.0.0", ""), true).unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));
    }

    #[test]
    fn test_stats_carry_forward_to_new_version() {
        let store = IntegrationStore::memory().unwrap();
        store.publish(&request("a", "v1.0.0", "/a"), true).unwrap();
        for _ in 0..3 {
            store.record_download("a").unwrap();
        }
        store.set_featured("a", true).unwrap();

        let v2 = store.publish(&request("a", "v2.0.0", "/a"), true).unwrap();
        assert_eq!(v2.downloads, 3);
        assert_eq!(v2.trending_score, 3.0);
        assert!(v2.featured);

        let v1 = store.get("a", Some("v1.0.0")).unwrap();
        assert!(!v1.latest);
    }

    #[test]
    fn test_retired_version_frees_routing_path() {
        let store = IntegrationStore::memory().unwrap();
        store.publish(&request("a", "v1.0.0", "/old"), true).unwrap();
        store.publish(&request("a", "v2.0.0", "/new"), true).unwrap();

        // Only latest rows hold paths.
        store.publish(&request("b", "v1.0.0", "/old"), true).unwrap();
        let listed = store
            .list(ListQuery {
                sort: SortKey::Name,
                ..ListQuery::default()
            })
            .unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marketplace.db");
        {
            let store = IntegrationStore::open(&path).unwrap();
            store.publish(&request("a", "v1.0.0", "/a"), false).unwrap();
        }
        let store = IntegrationStore::open(&path).unwrap();
        let rec = store.get("a", None).unwrap();
        assert!(!rec.verified);
        assert_eq!(rec.version, "v1.0.0");
    }

    #[test]
    fn test_concurrent_publishers_cannot_share_routing_path() {
        use std::sync::{Arc, Barrier};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marketplace.db");
        // One connection each, as two registry processes would have.
        let first = IntegrationStore::open(&path).unwrap();
        let second = IntegrationStore::open(&path).unwrap();

        for round in 0..10 {
            let shared = format!("/shared-{round}");
            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = [(first.clone(), "a"), (second.clone(), "b")]
                .into_iter()
                .map(|(store, id)| {
                    let barrier = Arc::clone(&barrier);
                    let req = request(&format!("{id}{round}"), "v1.0.0", &shared);
                    std::thread::spawn(move || {
                        barrier.wait();
                        store.publish(&req, true)
                    })
                })
                .collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            let winners = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(winners, 1, "round {round}: {results:?}");
            let loser = results.into_iter().find_map(Result::err).unwrap();
            assert!(
                matches!(loser, RegistryError::RoutingPathInUse { ref routing_path } if *routing_path == shared),
                "round {round}: {loser:?}"
            );

            let holders: i64 = first
                .lock()
                .unwrap()
                .query_row(
                    "SELECT COUNT(*) FROM integrations WHERE routing_path = ?1 AND latest = 1",
                    [&shared],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(holders, 1);
        }
    }
}
