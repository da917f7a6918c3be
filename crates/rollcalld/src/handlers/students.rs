use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// Registered student without its encodings.
#[derive(Debug, Serialize)]
pub struct StudentSummary {
    pub identity_key: String,
    pub student_name: Option<String>,
    pub student_id: Option<String>,
    pub filename: String,
    pub faces: usize,
    pub registered_at: Option<String>,
}

/// GET /students - registered students in registration order
pub async fn list_students(State(state): State<AppState>) -> Json<Vec<StudentSummary>> {
    let students = state
        .store
        .list()
        .await
        .into_iter()
        .map(|r| StudentSummary {
            faces: r.face_encoding.len(),
            identity_key: r.identity_key,
            student_name: r.student_name,
            student_id: r.student_id,
            filename: r.filename,
            registered_at: r.registered_at,
        })
        .collect();
    Json(students)
}
