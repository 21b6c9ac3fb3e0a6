//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use exam_core::ports::PortError;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_exam_handler,
    ),
    components(
        schemas(ExamSummary)
    ),
    tags(
        (name = "Exam Portal API", description = "API endpoints for the proctored online exam portal.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// Public metadata about an exam, shown before the student enters it.
/// Questions and the answer key are only delivered over the exam socket.
#[derive(Serialize, ToSchema)]
pub struct ExamSummary {
    id: Uuid,
    title: String,
    duration_minutes: u32,
    available: bool,
    requires_access_code: bool,
    question_count: usize,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Fetch the public metadata for one exam.
#[utoipa::path(
    get,
    path = "/exams/{exam_id}",
    responses(
        (status = 200, description = "Exam metadata", body = ExamSummary),
        (status = 404, description = "No exam with this id exists"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("exam_id" = Uuid, Path, description = "The unique ID of the exam.")
    )
)]
pub async fn get_exam_handler(
    State(app_state): State<Arc<AppState>>,
    Path(exam_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match app_state.store.read_exam(exam_id).await {
        Ok(exam) => {
            let summary = ExamSummary {
                id: exam.id,
                title: exam.title,
                duration_minutes: exam.duration_minutes,
                available: exam.available,
                requires_access_code: exam
                    .access_code
                    .as_deref()
                    .map(|code| !code.trim().is_empty())
                    .unwrap_or(false),
                question_count: exam.questions.len(),
            };
            Ok(Json(summary))
        }
        Err(PortError::NotFound(_)) => {
            Err((StatusCode::NOT_FOUND, "Exam not found".to_string()))
        }
        Err(e) => {
            error!("Failed to read exam {}: {:?}", exam_id, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load exam".to_string(),
            ))
        }
    }
}
