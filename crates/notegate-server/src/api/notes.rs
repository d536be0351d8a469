//! Note endpoints
//!
//! These are the write and read handlers the admission pipeline wraps.
//! Reads go through the cache manager before touching the record store;
//! writes invalidate the owner-scoped cache fingerprints, serialize
//! entity edits under the mutation lock, and publish one event per
//! successful mutation.

use actix_web::{HttpResponse, Scope, delete, get, patch, post, web};
use chrono::Utc;
use serde::Deserialize;
use tracing::warn;

use notegate_common::{CACHE_PREFIX, GateError};

use crate::{
    identity::Identity,
    model::{
        app_state::AppState,
        note::{Note, NoteDraft, NoteEvent, NoteListPage, Pagination},
        response::{ApiResult, gate_error_response},
    },
    record::{NewNote, NoteFilter},
};

use super::events;

pub fn routes() -> Scope {
    web::scope("/notes")
        // Literal segment must register before the `{id}` matcher
        .service(events::note_events)
        .service(list_notes)
        .service(create_note)
        .service(get_note)
        .service(update_note)
        .service(delete_note)
}

/// Prefix covering every cached list fingerprint of one owner, so a write
/// only invalidates that owner's entries
fn owner_cache_prefix(owner_id: &str) -> String {
    format!("{CACHE_PREFIX}:notes:{owner_id}:")
}

/// Full query fingerprint: owner, filter id, page and page size
fn list_cache_key(owner_id: &str, note_id: Option<i64>, page: u32, limit: u32) -> String {
    let filter = note_id.map_or("all".to_string(), |id| id.to_string());
    format!("{}{filter}:{page}:{limit}", owner_cache_prefix(owner_id))
}

fn detail_cache_key(note_id: i64) -> String {
    format!("{CACHE_PREFIX}:note:{note_id}")
}

/// Publish a note lifecycle event; delivery is best-effort and never fails
/// the request.
async fn publish_note_event(state: &AppState, action: &str, note: &Note) {
    let event = NoteEvent::new(action, note);
    let payload = match serde_json::to_string(&event) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(%err, "Skipping unserializable note event");
            return;
        }
    };
    let channel = state.configuration.notes_channel();
    if let Err(err) = state.broadcaster.publish(&channel, &payload).await {
        warn!(channel = %channel, %err, "Note event publish failed");
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub note_id: Option<i64>,
}

#[get("")]
pub async fn list_notes(
    state: web::Data<AppState>,
    identity: Identity,
    params: web::Query<ListParams>,
) -> HttpResponse {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).clamp(1, 100);

    let cache_key = list_cache_key(&identity.user_id, params.note_id, page, limit);
    if let Some(cached) = state.cache.get_json::<NoteListPage>(&cache_key).await {
        return ApiResult::http_success(cached);
    }

    let filter = NoteFilter {
        owner_id: Some(identity.user_id.clone()),
        note_id: params.note_id,
    };
    match state.records.find(&filter).await {
        Ok(notes) => {
            let total_count = notes.len() as u32;
            let total_pages = total_count.div_ceil(limit);
            let page = if total_pages > 0 { page.min(total_pages) } else { 1 };
            let offset = ((page - 1) * limit) as usize;

            let page_notes: Vec<Note> =
                notes.into_iter().skip(offset).take(limit as usize).collect();
            let result = NoteListPage {
                notes: page_notes,
                pagination: Pagination {
                    page,
                    limit,
                    total_count,
                    total_pages,
                },
            };

            state
                .cache
                .set_json(&cache_key, &result, state.configuration.list_cache_ttl())
                .await;
            ApiResult::http_success(result)
        }
        Err(err) => gate_error_response(&err),
    }
}

#[post("")]
pub async fn create_note(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<NoteDraft>,
) -> HttpResponse {
    let draft = body.into_inner();
    let new = NewNote {
        title: draft.title,
        content: draft.content,
        owner_id: identity.user_id.clone(),
    };

    match state.records.insert(new).await {
        Ok(note) => {
            state
                .cache
                .delete_prefix(&owner_cache_prefix(&identity.user_id))
                .await;
            publish_note_event(&state, "created", &note).await;
            ApiResult::http_created("note created", note)
        }
        Err(err) => gate_error_response(&err),
    }
}

/// Fetch a note by id, through the detail cache, enforcing ownership.
async fn fetch_owned_note(state: &AppState, identity: &Identity, id: i64) -> Result<Note, GateError> {
    let cache_key = detail_cache_key(id);
    let note = match state.cache.get_json::<Note>(&cache_key).await {
        Some(note) => note,
        None => {
            let filter = NoteFilter {
                owner_id: None,
                note_id: Some(id),
            };
            let mut notes = state.records.find(&filter).await?;
            let Some(note) = notes.pop() else {
                return Err(GateError::NotFound(format!("note {id}")));
            };
            state
                .cache
                .set_json(&cache_key, &note, state.configuration.detail_cache_ttl())
                .await;
            note
        }
    };

    if note.owner_id != identity.user_id {
        return Err(GateError::Forbidden("not the note owner".to_string()));
    }
    Ok(note)
}

#[get("/{id}")]
pub async fn get_note(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<i64>,
) -> HttpResponse {
    match fetch_owned_note(&state, &identity, path.into_inner()).await {
        Ok(note) => ApiResult::http_success(note),
        Err(err) => gate_error_response(&err),
    }
}

#[patch("/{id}")]
pub async fn update_note(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<i64>,
    body: web::Json<NoteDraft>,
) -> HttpResponse {
    let id = path.into_inner();
    let draft = body.into_inner();

    // Existence and ownership are checked up front; the lock serializes
    // the read-modify-write below against concurrent editors.
    if let Err(err) = fetch_owned_note(&state, &identity, id).await {
        return gate_error_response(&err);
    }

    let resource = format!("note:{id}");
    let result = state
        .mutation_lock
        .with_lock(&resource, || async {
            let filter = NoteFilter {
                owner_id: None,
                note_id: Some(id),
            };
            let mut notes = state.records.find(&filter).await?;
            let Some(mut note) = notes.pop() else {
                return Err(GateError::NotFound(format!("note {id}")));
            };

            note.title = draft.title.clone();
            note.content = draft.content.clone();
            note.updated_at = Some(Utc::now());
            state.records.update(&note).await?;

            // Refresh the detail snapshot, drop the owner's list pages
            state
                .cache
                .set_json(
                    &detail_cache_key(id),
                    &note,
                    state.configuration.detail_cache_ttl(),
                )
                .await;
            state
                .cache
                .delete_prefix(&owner_cache_prefix(&identity.user_id))
                .await;

            Ok(note)
        })
        .await;

    match result {
        Ok(note) => {
            publish_note_event(&state, "updated", &note).await;
            ApiResult::http_success(note)
        }
        Err(err) => gate_error_response(&err),
    }
}

#[delete("/{id}")]
pub async fn delete_note(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<i64>,
) -> HttpResponse {
    let id = path.into_inner();

    let note = match fetch_owned_note(&state, &identity, id).await {
        Ok(note) => note,
        Err(err) => return gate_error_response(&err),
    };

    let resource = format!("note:{id}");
    let result = state
        .mutation_lock
        .with_lock(&resource, || async {
            state.records.delete(id).await?;
            state.cache.delete(&detail_cache_key(id)).await;
            state
                .cache
                .delete_prefix(&owner_cache_prefix(&identity.user_id))
                .await;
            Ok(())
        })
        .await;

    match result {
        Ok(()) => {
            publish_note_event(&state, "deleted", &note).await;
            ApiResult::http_success(Option::<Note>::None)
        }
        Err(err) => gate_error_response(&err),
    }
}
