//! `SQLite`-backed [`DocumentStore`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace};

use super::{migrations, Document, DocumentStore, DocumentStream, Query, StoredDocument};
use crate::error::{Error, Result};

/// Capacity of the change-notification channel shared by subscribers.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Capacity of each subscriber's snapshot channel.
const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;

/// Local document store backed by a single `SQLite` table.
///
/// Cloning is cheap and clones share the same connection and change feed.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    conn: Mutex<Connection>,
    /// Names of collections that changed.
    changes: broadcast::Sender<String>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema
    /// initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening document store at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Document store opened at {}", path.display());
        Ok(Self::from_connection(path, conn))
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;
        Ok(Self::from_connection(PathBuf::from(":memory:"), conn))
    }

    fn from_connection(path: PathBuf, conn: Connection) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                path,
                conn: Mutex::new(conn),
                changes,
            }),
        }
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.inner
            .conn
            .lock()
            .map_err(|_| Error::internal("document store connection lock poisoned"))
    }

    fn get_sync(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        let body: Option<String> = self
            .conn()?
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND key = ?2",
                params![collection, key],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|text| parse_body(&text)).transpose()
    }

    fn set_sync(&self, collection: &str, key: &str, document: Document, merge: bool) -> Result<()> {
        {
            let conn = self.conn()?;
            let body = if merge {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT body FROM documents WHERE collection = ?1 AND key = ?2",
                        params![collection, key],
                        |row| row.get(0),
                    )
                    .optional()?;
                match existing {
                    Some(text) => {
                        let mut merged = parse_body(&text)?;
                        merged.extend(document);
                        merged
                    }
                    None => document,
                }
            } else {
                document
            };

            let text = serde_json::to_string(&body)?;
            conn.execute(
                r"
                INSERT INTO documents (collection, key, body, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(collection, key)
                DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
                ",
                params![collection, key, text, Utc::now().to_rfc3339()],
            )?;
        }

        trace!(collection, key, merge, "document written");
        // No subscribers is not an error
        let _ = self.inner.changes.send(collection.to_string());
        Ok(())
    }

    fn merge_if_sync(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        expected: &serde_json::Value,
        patch: Document,
    ) -> Result<bool> {
        {
            // One lock for the read and the write
            let conn = self.conn()?;
            let existing: Option<String> = conn
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND key = ?2",
                    params![collection, key],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(text) = existing else {
                return Ok(false);
            };
            let mut body = parse_body(&text)?;
            if body.get(field) != Some(expected) {
                return Ok(false);
            }
            body.extend(patch);

            conn.execute(
                "UPDATE documents SET body = ?3, updated_at = ?4 WHERE collection = ?1 AND key = ?2",
                params![
                    collection,
                    key,
                    serde_json::to_string(&body)?,
                    Utc::now().to_rfc3339()
                ],
            )?;
        }

        trace!(collection, key, field, "conditional merge applied");
        let _ = self.inner.changes.send(collection.to_string());
        Ok(true)
    }

    fn query_sync(&self, query: &Query) -> Result<Vec<StoredDocument>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT key, body FROM documents WHERE collection = ?1 ORDER BY key")?;
        let rows = stmt
            .query_map([&query.collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let documents = rows
            .into_iter()
            .map(|(key, text)| {
                Ok(StoredDocument {
                    key,
                    body: parse_body(&text)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(query.apply(documents))
    }

    /// Count documents in a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self, collection: &str) -> Result<i64> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [collection],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Get store statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StoreStats> {
        let collections = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT collection, COUNT(*) FROM documents GROUP BY collection ORDER BY collection",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<(String, i64)>, _>>()?;
            rows
        };

        let db_size_bytes = if self.inner.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.inner.path)
                .map(|m| m.len())
                .unwrap_or(0)
        };

        Ok(StoreStats {
            total_documents: collections.iter().map(|(_, n)| n).sum(),
            collections,
            db_size_bytes,
        })
    }
}

fn parse_body(text: &str) -> Result<Document> {
    match serde_json::from_str(text)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(Error::internal("stored document is not a JSON object")),
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        self.get_sync(collection, key)
    }

    async fn set(
        &self,
        collection: &str,
        key: &str,
        document: Document,
        merge: bool,
    ) -> Result<()> {
        self.set_sync(collection, key, document, merge)
    }

    async fn merge_if(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        expected: &serde_json::Value,
        patch: Document,
    ) -> Result<bool> {
        self.merge_if_sync(collection, key, field, expected, patch)
    }

    async fn query(&self, query: &Query) -> Result<Vec<StoredDocument>> {
        self.query_sync(query)
    }

    fn subscribe(&self, query: Query) -> Result<DocumentStream> {
        // Listen before the first read so no write falls between the two
        let mut changes = self.inner.changes.subscribe();
        let initial = self.query_sync(&query)?;

        let (tx, rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let store = self.clone();

        tokio::spawn(async move {
            if tx.send(initial).await.is_err() {
                return;
            }
            loop {
                match changes.recv().await {
                    Ok(collection) if collection != query.collection => continue,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let snapshot = match store.query_sync(&query) {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        tracing::warn!(collection = %query.collection, "subscription query failed: {e}");
                        continue;
                    }
                };
                if tx.send(snapshot).await.is_err() {
                    debug!(collection = %query.collection, "subscriber dropped");
                    break;
                }
            }
        });

        Ok(DocumentStream::new(rx))
    }
}

/// Statistics about the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Total number of documents stored.
    pub total_documents: i64,
    /// Document count per collection, sorted by name.
    pub collections: Vec<(String, i64)>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("failed to create test store")
    }

    fn body(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = create_test_store();
        store
            .set("user_profiles", "u1", body(json!({"displayName": "Asha"})), false)
            .await
            .unwrap();

        let doc = store.get("user_profiles", "u1").await.unwrap().unwrap();
        assert_eq!(doc["displayName"], "Asha");
        assert!(store.get("user_profiles", "u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_replaces_without_merge() {
        let store = create_test_store();
        store
            .set("p", "k", body(json!({"a": 1, "b": 2})), false)
            .await
            .unwrap();
        store.set("p", "k", body(json!({"a": 3})), false).await.unwrap();

        let doc = store.get("p", "k").await.unwrap().unwrap();
        assert_eq!(doc.get("a"), Some(&json!(3)));
        assert!(doc.get("b").is_none());
    }

    #[tokio::test]
    async fn test_set_merges_fields() {
        let store = create_test_store();
        store
            .set("sos", "e1", body(json!({"status": "active", "userId": "u1"})), false)
            .await
            .unwrap();
        store
            .set("sos", "e1", body(json!({"status": "resolved"})), true)
            .await
            .unwrap();

        let doc = store.get("sos", "e1").await.unwrap().unwrap();
        assert_eq!(doc["status"], "resolved");
        assert_eq!(doc["userId"], "u1");
    }

    #[tokio::test]
    async fn test_merge_if_checks_field() {
        let store = create_test_store();
        let active = json!("active");
        store
            .set("sos", "e1", body(json!({"status": "active", "userId": "u1"})), false)
            .await
            .unwrap();

        let resolve = || body(json!({"status": "resolved"}));
        assert!(store
            .merge_if("sos", "e1", "status", &active, resolve())
            .await
            .unwrap());
        let doc = store.get("sos", "e1").await.unwrap().unwrap();
        assert_eq!(doc["status"], "resolved");
        assert_eq!(doc["userId"], "u1");

        assert!(!store
            .merge_if("sos", "e1", "status", &active, resolve())
            .await
            .unwrap());

        assert!(!store
            .merge_if("sos", "nope", "status", &active, resolve())
            .await
            .unwrap());
        assert!(store.get("sos", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merge_into_missing_document_creates_it() {
        let store = create_test_store();
        store.set("c", "k", body(json!({"x": true})), true).await.unwrap();
        assert_eq!(store.count("c").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_is_scoped_to_collection() {
        let store = create_test_store();
        store.set("alerts", "a1", body(json!({"timestamp": 1})), false).await.unwrap();
        store.set("alerts", "a2", body(json!({"timestamp": 2})), false).await.unwrap();
        store.set("other", "o1", body(json!({"timestamp": 3})), false).await.unwrap();

        let docs = store
            .query(&Query::collection("alerts").order_by("timestamp", true))
            .await
            .unwrap();
        let keys: Vec<_> = docs.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["a2", "a1"]);
    }

    #[tokio::test]
    async fn test_subscribe_delivers_initial_and_updates() {
        let store = create_test_store();
        store.set("alerts", "a1", body(json!({"n": 1})), false).await.unwrap();

        let mut stream = store.subscribe(Query::collection("alerts")).unwrap();
        let first = stream.next().await.unwrap();
        assert_eq!(first.len(), 1);

        store.set("other", "x", body(json!({})), false).await.unwrap();
        store.set("alerts", "a2", body(json!({"n": 2})), false).await.unwrap();

        let second = stream.next().await.unwrap();
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = create_test_store();
        store.set("a", "1", body(json!({})), false).await.unwrap();
        store.set("a", "2", body(json!({})), false).await.unwrap();
        store.set("b", "1", body(json!({})), false).await.unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_documents, 3);
        assert_eq!(
            stats.collections,
            vec![("a".to_string(), 2), ("b".to_string(), 1)]
        );
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = std::env::temp_dir().join(format!("safewalk-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("store.db");

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.path(), path.as_path());
        assert!(path.exists());

        drop(store);
        let _ = std::fs::remove_dir_all(dir);
    }
}
