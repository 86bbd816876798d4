//! # MongoDB
//!
//! Durable storage for notes.
//!
//! The handlers only see the [`NoteStore`] trait. [`MongoNoteStore`] is the
//! production implementation; tests swap in an in-memory one.
//!
//! ## Schema
//! - Collection `notes`
//! - Fields: `_id` (**ObjectId**), `title` (**string**), `content` (**string**),
//!   `createdAt` (**date**), `updatedAt` (**date**)
//! - Listing sorts on `createdAt` descending
//!
//! ## Startup
//! The client is created and pinged before the server binds its socket, so a
//! bad connection string or unreachable cluster stops the process instead of
//! serving requests that can only fail.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::{
    Client, Collection, Database,
    bson::{self, doc, oid::ObjectId},
    options::ReturnDocument,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::note::{Note, NoteDraft};

pub const NOTES_COLLECTION: &str = "notes";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cast to ObjectId failed for value \"{0}\"")]
    InvalidId(String),

    #[error("{0}")]
    Database(#[from] mongodb::error::Error),

    /// Backend failure outside the driver. Test doubles use it to simulate
    /// an unavailable store.
    #[error("{0}")]
    Backend(String),
}

/// Storage operations the notes handlers depend on.
///
/// `get`, `update` and `delete` return `Ok(None)` when no note has the id.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// All notes, newest `created_at` first.
    async fn list(&self) -> Result<Vec<Note>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Note>, StoreError>;

    async fn create(&self, draft: NoteDraft) -> Result<Note, StoreError>;

    /// Replaces title and content, returning the note as it is after the write.
    async fn update(&self, id: &str, draft: NoteDraft) -> Result<Option<Note>, StoreError>;

    /// Removes the note, returning what was stored.
    async fn delete(&self, id: &str) -> Result<Option<Note>, StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct NoteDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    title: String,
    content: String,
    #[serde(rename = "createdAt")]
    created_at: bson::DateTime,
    #[serde(rename = "updatedAt")]
    updated_at: bson::DateTime,
}

impl From<NoteDocument> for Note {
    fn from(document: NoteDocument) -> Self {
        Note {
            id: document.id.to_hex(),
            title: document.title,
            content: document.content,
            created_at: to_utc(document.created_at),
            updated_at: to_utc(document.updated_at),
        }
    }
}

fn to_utc(timestamp: bson::DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(timestamp.timestamp_millis()).unwrap_or_default()
}

fn parse_id(id: &str) -> Result<ObjectId, StoreError> {
    ObjectId::parse_str(id).map_err(|_| StoreError::InvalidId(id.to_string()))
}

#[derive(Clone)]
pub struct MongoNoteStore {
    notes: Collection<NoteDocument>,
}

impl MongoNoteStore {
    pub fn new(database: &Database) -> Self {
        Self::with_collection(database, NOTES_COLLECTION)
    }

    pub fn with_collection(database: &Database, collection: &str) -> Self {
        Self {
            notes: database.collection(collection),
        }
    }
}

#[async_trait]
impl NoteStore for MongoNoteStore {
    async fn list(&self) -> Result<Vec<Note>, StoreError> {
        let mut cursor = self.notes.find(doc! {}).sort(doc! { "createdAt": -1 }).await?;

        let mut notes = Vec::new();
        while cursor.advance().await? {
            notes.push(cursor.deserialize_current()?.into());
        }

        Ok(notes)
    }

    async fn get(&self, id: &str) -> Result<Option<Note>, StoreError> {
        let id = parse_id(id)?;

        Ok(self.notes.find_one(doc! { "_id": id }).await?.map(Note::from))
    }

    async fn create(&self, draft: NoteDraft) -> Result<Note, StoreError> {
        let now = bson::DateTime::now();
        let document = NoteDocument {
            id: ObjectId::new(),
            title: draft.title().to_string(),
            content: draft.content().to_string(),
            created_at: now,
            updated_at: now,
        };

        self.notes.insert_one(&document).await?;

        Ok(document.into())
    }

    async fn update(&self, id: &str, draft: NoteDraft) -> Result<Option<Note>, StoreError> {
        let id = parse_id(id)?;
        let update = doc! {
            "$set": {
                "title": draft.title(),
                "content": draft.content(),
                "updatedAt": bson::DateTime::now(),
            }
        };

        let updated = self
            .notes
            .find_one_and_update(doc! { "_id": id }, update)
            .return_document(ReturnDocument::After)
            .await?;

        Ok(updated.map(Note::from))
    }

    async fn delete(&self, id: &str) -> Result<Option<Note>, StoreError> {
        let id = parse_id(id)?;

        Ok(self
            .notes
            .find_one_and_delete(doc! { "_id": id })
            .await?
            .map(Note::from))
    }
}

/// Connects and pings the deployment. The database named in the URI wins
/// over `fallback_db`.
pub async fn init_mongo(
    mongo_uri: &str,
    fallback_db: &str,
) -> Result<Database, mongodb::error::Error> {
    let client = Client::with_uri_str(mongo_uri).await?;
    let database = client
        .default_database()
        .unwrap_or_else(|| client.database(fallback_db));

    database.run_command(doc! { "ping": 1 }).await?;
    info!("MongoDB connected, using database {}", database.name());

    Ok(database)
}
