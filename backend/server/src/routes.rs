use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State as AxumState, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use crate::{
    error::AppError,
    note::{NoteEnvelope, NotePayload},
    state::State,
    utils::draft_from_body,
};

pub async fn list_notes_handler(
    AxumState(state): AxumState<Arc<State>>,
) -> Result<impl IntoResponse, AppError> {
    let notes = state.notes.list().await?;

    Ok((StatusCode::OK, Json(notes)))
}

pub async fn get_note_handler(
    AxumState(state): AxumState<Arc<State>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let note = state.notes.get(&id).await?.ok_or(AppError::NotFound)?;

    Ok((StatusCode::OK, Json(note)))
}

pub async fn create_note_handler(
    AxumState(state): AxumState<Arc<State>>,
    body: Result<Json<NotePayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let draft = draft_from_body(body)?;
    let note = state.notes.create(draft).await?;

    info!("Created note {}", note.id);

    Ok((
        StatusCode::CREATED,
        Json(NoteEnvelope::new("Note created successfully", note)),
    ))
}

pub async fn update_note_handler(
    AxumState(state): AxumState<Arc<State>>,
    Path(id): Path<String>,
    body: Result<Json<NotePayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let draft = draft_from_body(body)?;
    let note = state
        .notes
        .update(&id, draft)
        .await?
        .ok_or(AppError::NotFound)?;

    info!("Updated note {}", note.id);

    Ok((
        StatusCode::OK,
        Json(NoteEnvelope::new("Note updated successfully", note)),
    ))
}

pub async fn delete_note_handler(
    AxumState(state): AxumState<Arc<State>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let note = state.notes.delete(&id).await?.ok_or(AppError::NotFound)?;

    info!("Deleted note {}", note.id);

    Ok((
        StatusCode::OK,
        Json(NoteEnvelope::new("Note deleted successfully", note)),
    ))
}
