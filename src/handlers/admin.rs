// src/handlers/admin.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        assessment::{AssessmentFilter, PageQuery},
        question::{BulkCreateQuestionsRequest, CreateQuestionRequest, UpdateQuestionRequest},
    },
    services::AssessmentService,
    store::QuestionRepository,
    utils::html::{sanitize_create, sanitize_update},
};

/// Active and total question counts per level.
/// Admin only.
pub async fn question_stats(
    State(questions): State<Arc<dyn QuestionRepository>>,
) -> Result<impl IntoResponse, AppError> {
    let stats = questions.stats().await?;
    Ok(Json(stats))
}

/// Creates a new question.
/// Admin only.
pub async fn create_question(
    State(questions): State<Arc<dyn QuestionRepository>>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let question = questions.create(sanitize_create(payload)).await?;
    tracing::info!(question_id = question.id, level = %question.level, "Question created");

    Ok((StatusCode::CREATED, Json(question)))
}

/// Imports a batch of questions. Every entry is validated before any is
/// stored; one bad entry rejects the whole batch.
/// Admin only.
pub async fn bulk_create_questions(
    State(questions): State<Arc<dyn QuestionRepository>>,
    Json(payload): Json<BulkCreateQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    for (index, question) in payload.questions.iter().enumerate() {
        if let Err(validation_errors) = question.validate() {
            return Err(AppError::BadRequest(format!(
                "questions[{}]: {}",
                index, validation_errors
            )));
        }
    }

    let mut ids = Vec::with_capacity(payload.questions.len());
    for question in payload.questions {
        ids.push(questions.create(sanitize_create(question)).await?.id);
    }
    tracing::info!(count = ids.len(), "Questions imported");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "created": ids.len(), "ids": ids })),
    ))
}

/// Updates a question. Content of a question that has already been served
/// is frozen; only its active flag may change.
/// Admin only.
pub async fn update_question(
    State(questions): State<Arc<dyn QuestionRepository>>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let question = questions.update(id, sanitize_update(payload)).await?;
    Ok(Json(question))
}

/// Retires a question from future selection. The row is kept so past
/// assessments can still be scored and audited.
/// Admin only.
pub async fn delete_question(
    State(questions): State<Arc<dyn QuestionRepository>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    questions.deactivate(id).await?;
    tracing::info!(question_id = id, "Question deactivated");
    Ok(StatusCode::NO_CONTENT)
}

/// Paged assessment report, filterable by user, completion and level.
/// Admin only.
pub async fn list_assessments(
    State(service): State<Arc<AssessmentService>>,
    Query(filter): Query<AssessmentFilter>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let report = service.report(&filter, page).await?;
    Ok(Json(report))
}

/// Runs one certificate retry pass immediately.
/// Admin only.
pub async fn retry_certificates(
    State(service): State<Arc<AssessmentService>>,
) -> Result<impl IntoResponse, AppError> {
    let report = service.retry_pending_certificates().await?;
    Ok(Json(report))
}
