//! Document store collaborator.
//!
//! Profiles, contacts, alerts, SOS events and last-known locations live in a
//! keyed document store. The engine only depends on the [`DocumentStore`]
//! trait; [`SqliteStore`] is the local implementation used by the CLI and
//! the tests.

pub mod migrations;
pub mod schema;
mod sqlite;

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

pub use sqlite::{SqliteStore, StoreStats};

/// A JSON object stored under a `(collection, key)` pair.
pub type Document = serde_json::Map<String, Value>;

/// Collection names shared by every component.
pub mod collections {
    /// One profile document per user.
    pub const USER_PROFILES: &str = "user_profiles";
    /// One document per user holding the full ordered contact list.
    pub const EMERGENCY_CONTACTS: &str = "emergency_contacts";
    /// One document per community alert.
    pub const ALERTS: &str = "alerts";
    /// One document per SOS trigger.
    pub const SOS_EVENTS: &str = "sos_alerts";
    /// Last-known location, one document per user.
    pub const LOCATIONS: &str = "locations";
    /// Danger zones, one document per user.
    pub const DANGER_ZONES: &str = "danger_zones";
}

/// A document together with its key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Key within the collection.
    pub key: String,
    /// Document body.
    pub body: Document,
}

impl StoredDocument {
    /// Deserialize the body into a typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.body.clone()))?)
    }
}

/// A collection query: every document of one collection, optionally ordered
/// by a top-level field and truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Collection to read.
    pub collection: String,
    /// Field to order by; documents missing it sort last.
    pub order_by: Option<String>,
    /// Whether `order_by` sorts descending.
    pub descending: bool,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
}

impl Query {
    /// Query every document of `collection` in key order.
    #[must_use]
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            order_by: None,
            descending: false,
            limit: None,
        }
    }

    /// Order results by `field`.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.order_by = Some(field.into());
        self.descending = descending;
        self
    }

    /// Return at most `limit` documents.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sort and truncate documents already filtered to this collection.
    #[must_use]
    pub fn apply(&self, mut documents: Vec<StoredDocument>) -> Vec<StoredDocument> {
        if let Some(field) = &self.order_by {
            documents.sort_by(|a, b| {
                let ordering = compare_field(a.body.get(field), b.body.get(field));
                match (a.body.get(field), b.body.get(field)) {
                    // Missing fields stay last in both directions
                    (Some(_), Some(_)) if self.descending => ordering.reverse(),
                    _ => ordering,
                }
            });
        }
        if let Some(limit) = self.limit {
            documents.truncate(limit);
        }
        documents
    }
}

fn compare_field(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// A live feed of query snapshots.
///
/// The first snapshot is delivered immediately; a new one follows every
/// write to the queried collection. Dropping the stream ends the
/// subscription.
#[derive(Debug)]
pub struct DocumentStream {
    rx: mpsc::Receiver<Vec<StoredDocument>>,
}

impl DocumentStream {
    /// Wrap a snapshot channel.
    #[must_use]
    pub fn new(rx: mpsc::Receiver<Vec<StoredDocument>>) -> Self {
        Self { rx }
    }

    /// Wait for the next snapshot. Returns `None` once the store side ends.
    pub async fn next(&mut self) -> Option<Vec<StoredDocument>> {
        self.rx.recv().await
    }
}

/// The document store collaborator.
#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Read one document.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>>;

    /// Write one document. With `merge`, top-level fields are merged into an
    /// existing document instead of replacing it.
    async fn set(&self, collection: &str, key: &str, document: Document, merge: bool)
        -> Result<()>;

    /// Merge `patch` into an existing document only while its top-level
    /// `field` equals `expected`. The check and the write are atomic.
    ///
    /// Returns `false` without writing if the document is missing or the
    /// field holds anything else.
    async fn merge_if(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        expected: &Value,
        patch: Document,
    ) -> Result<bool>;

    /// Read a collection.
    async fn query(&self, query: &Query) -> Result<Vec<StoredDocument>>;

    /// Subscribe to a collection. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial snapshot cannot be read.
    fn subscribe(&self, query: Query) -> Result<DocumentStream>;
}

/// Serialize a value into a document body.
///
/// # Errors
///
/// Returns an error if `value` does not serialize to a JSON object.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::internal(format!(
            "expected a JSON object document, got {other}"
        ))),
    }
}

/// Read and decode one document.
///
/// # Errors
///
/// Returns an error if the read fails or the document does not decode.
pub async fn load<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    key: &str,
) -> Result<Option<T>> {
    match store.get(collection, key).await? {
        Some(document) => Ok(Some(serde_json::from_value(Value::Object(document))?)),
        None => Ok(None),
    }
}

/// Encode and write one document, replacing any previous body.
///
/// # Errors
///
/// Returns an error if encoding or the write fails.
pub async fn save<T: Serialize + Sync>(
    store: &dyn DocumentStore,
    collection: &str,
    key: &str,
    value: &T,
) -> Result<()> {
    store.set(collection, key, to_document(value)?, false).await
}
