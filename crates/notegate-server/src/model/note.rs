//! Note domain model and event payloads
//!
//! The note itself is ordinary CRUD data owned by the record-store
//! collaborator; this layer only moves it through the cache and the
//! broadcaster. Timestamps are `chrono` UTC values and serialize as
//! RFC 3339, so cached snapshots round-trip losslessly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A note as stored by the record-store collaborator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Request body for creating or updating a note
#[derive(Clone, Debug, Deserialize)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
}

/// Pagination block mirrored into list responses and cache entries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total_count: u32,
    pub total_pages: u32,
}

/// One page of notes, the unit the list cache stores
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteListPage {
    pub notes: Vec<Note>,
    pub pagination: Pagination,
}

/// Event payload published on the notes channel per successful mutation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub action: String,
    pub note_id: i64,
    pub owner_id: String,
    pub title: String,
}

impl NoteEvent {
    pub fn new(action: &str, note: &Note) -> Self {
        Self {
            action: action.to_string(),
            note_id: note.id,
            owner_id: note.owner_id.clone(),
            title: note.title.clone(),
        }
    }
}
