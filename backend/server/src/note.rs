//! # Notes
//!
//! The only persisted entity. A note is a title and a body with timestamps
//! owned by the store.
//!
//! ## Wire Format
//! - `_id`: 24 character hex ObjectId, assigned on create
//! - `title`, `content`: non-empty text
//! - `createdAt`, `updatedAt`: RFC 3339 timestamps
//!
//! Field names match what the frontend already reads, so `_id` keeps its
//! Mongo spelling on the wire.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Request body for create and update. Fields are optional so a missing
/// field is reported as a validation error instead of a parse failure.
#[derive(Debug, Default, Deserialize)]
pub struct NotePayload {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// A validated title/content pair, ready to be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteDraft {
    title: String,
    content: String,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Result<Self, AppError> {
        let title = title.into();
        let content = content.into();

        if title.trim().is_empty() {
            return Err(AppError::Validation("title is required"));
        }
        if content.trim().is_empty() {
            return Err(AppError::Validation("content is required"));
        }

        Ok(Self { title, content })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

impl TryFrom<NotePayload> for NoteDraft {
    type Error = AppError;

    fn try_from(payload: NotePayload) -> Result<Self, Self::Error> {
        NoteDraft::new(
            payload.title.unwrap_or_default(),
            payload.content.unwrap_or_default(),
        )
    }
}

/// Envelope returned by the write endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct NoteEnvelope {
    pub message: String,
    pub note: Note,
}

impl NoteEnvelope {
    pub fn new(message: &str, note: Note) -> Self {
        Self {
            message: message.to_string(),
            note,
        }
    }
}
