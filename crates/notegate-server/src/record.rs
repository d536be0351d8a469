//! Record store collaborator
//!
//! The persistent store for notes is an external collaborator: this layer
//! only issues ordinary create/read/update/delete calls through the
//! [`RecordStore`] trait and caches the *results*, never reasoning about
//! the store's internals. [`MemoryRecordStore`] stands in for the real
//! collaborator in tests and standalone runs.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use dashmap::DashMap;

use notegate_common::GateError;

use crate::model::note::Note;

/// Filter for record lookups
#[derive(Clone, Debug, Default)]
pub struct NoteFilter {
    pub owner_id: Option<String>,
    pub note_id: Option<i64>,
}

/// A note to be inserted (the store assigns id and timestamps)
#[derive(Clone, Debug)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    pub owner_id: String,
}

/// CRUD interface of the persistent record store collaborator
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Find notes matching the filter, newest first.
    async fn find(&self, filter: &NoteFilter) -> Result<Vec<Note>, GateError>;

    /// Insert a new note and return it with id and timestamps assigned.
    async fn insert(&self, new: NewNote) -> Result<Note, GateError>;

    /// Replace a stored note.
    async fn update(&self, note: &Note) -> Result<(), GateError>;

    /// Delete by id. Returns whether a note was removed.
    async fn delete(&self, id: i64) -> Result<bool, GateError>;
}

/// In-memory record store used by tests and standalone runs
pub struct MemoryRecordStore {
    notes: DashMap<i64, Note>,
    next_id: AtomicI64,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            notes: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find(&self, filter: &NoteFilter) -> Result<Vec<Note>, GateError> {
        let mut notes: Vec<Note> = self
            .notes
            .iter()
            .filter(|entry| {
                let note = entry.value();
                filter
                    .owner_id
                    .as_ref()
                    .is_none_or(|owner| &note.owner_id == owner)
                    && filter.note_id.is_none_or(|id| note.id == id)
            })
            .map(|entry| entry.value().clone())
            .collect();

        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(notes)
    }

    async fn insert(&self, new: NewNote) -> Result<Note, GateError> {
        let note = Note {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            title: new.title,
            content: new.content,
            owner_id: new.owner_id,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.notes.insert(note.id, note.clone());
        Ok(note)
    }

    async fn update(&self, note: &Note) -> Result<(), GateError> {
        if !self.notes.contains_key(&note.id) {
            return Err(GateError::NotFound(format!("note {}", note.id)));
        }
        self.notes.insert(note.id, note.clone());
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool, GateError> {
        Ok(self.notes.remove(&id).is_some())
    }
}
