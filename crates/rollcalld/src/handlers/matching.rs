//! Match handler
//!
//! Handles POST /match: compare every face in a probe image against the
//! registered gallery.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::ingest::{self, UploadForm};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub identity_key: String,
    pub student_name: Option<String>,
    pub student_id: Option<String>,
    pub filename: String,
    /// Euclidean distance between the probe face and the matched record.
    pub distance: f32,
}

/// Match a probe image
///
/// Accepts multipart/form-data with **image** (required, JPEG). Probe faces
/// are tried in detector confidence order; the first one that matches a
/// record decides the answer. No match is a 404.
pub async fn match_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<MatchResponse>, ApiError> {
    let form = UploadForm::parse(&mut multipart, state.config.body_limit_bytes()).await?;
    let upload = form.require_image()?;

    let ingested = ingest::ingest(&state.config.data_dir, upload).await?;
    let extraction = state.engine.extract(ingested.image).await?;
    if extraction.faces.is_empty() {
        return Err(ApiError::NoFaceDetected);
    }

    let gallery = state.store.list().await;
    let threshold = state.config.match_threshold;

    for (probe_idx, face) in extraction.faces.iter().enumerate() {
        let Some(hit) = state.matcher.find(&face.embedding, &gallery, threshold) else {
            continue;
        };
        let record = &gallery[hit.index];
        tracing::info!(
            identity_key = %record.identity_key,
            distance = hit.distance,
            probe_face = probe_idx,
            "probe matched"
        );
        return Ok(Json(MatchResponse {
            identity_key: record.identity_key.clone(),
            student_name: record.student_name.clone(),
            student_id: record.student_id.clone(),
            filename: record.filename.clone(),
            distance: hit.distance,
        }));
    }

    tracing::debug!(
        probe_faces = extraction.faces.len(),
        gallery = gallery.len(),
        "no record within threshold"
    );
    Err(ApiError::NoMatch)
}
