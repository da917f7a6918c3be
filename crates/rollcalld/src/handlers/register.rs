//! Registration handler
//!
//! Handles POST /register: store the encodings of every face in an
//! enrollment image under the student's identity key.

use axum::extract::{Multipart, State};
use axum::Json;
use rollcall_core::StudentRecord;
use serde::Serialize;

use crate::error::ApiError;
use crate::ingest::{self, IngestError, UploadForm};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    /// An earlier registration under the same key was overwritten.
    pub replaced: bool,
    #[serde(flatten)]
    pub record: StudentRecord,
}

/// Register a student face
///
/// Accepts multipart/form-data with:
/// - **image** (required): JPEG enrollment photo
/// - **name** (optional unless strict fields are enabled): student name
/// - **student_id** (optional unless strict fields are enabled): identity key;
///   the filename is used when absent, and must then be a safe key as sent
pub async fn register_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<RegisterResponse>, ApiError> {
    let form = UploadForm::parse(&mut multipart, state.config.body_limit_bytes()).await?;

    if state.config.require_student_fields {
        let missing = form.missing_student_fields();
        if !missing.is_empty() {
            return Err(IngestError::MissingFields(missing).into());
        }
    }
    let upload = form.require_image()?;
    let identity_key = match form.student_id.as_deref() {
        Some(id) => {
            ingest::validate_student_id(id)?;
            id.to_string()
        }
        None => ingest::validate_filename_key(upload.file_name.as_deref())?.to_string(),
    };

    let ingested = ingest::ingest(&state.config.data_dir, upload).await?;
    let extraction = state.engine.extract(ingested.image).await?;
    if extraction.faces.is_empty() {
        return Err(ApiError::NoFaceDetected);
    }

    let record = StudentRecord {
        identity_key: identity_key.clone(),
        student_name: form.name.clone(),
        student_id: form.student_id.clone(),
        filename: ingested.file_name,
        stored_file: Some(ingested.stored_file),
        face_encoding: extraction.faces.into_iter().map(|f| f.embedding).collect(),
        model_version: extraction.model_version,
        registered_at: Some(chrono::Utc::now().to_rfc3339()),
    };

    let replaced = state.store.upsert(record.clone()).await?;
    tracing::info!(
        identity_key = %identity_key,
        faces = record.face_encoding.len(),
        replaced,
        "student registered"
    );

    Ok(Json(RegisterResponse {
        message: format!("Registered {identity_key}"),
        replaced,
        record,
    }))
}
