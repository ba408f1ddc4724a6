// src/handlers/assessment.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::assessment::{PageQuery, SubmitStepRequest},
    services::AssessmentService,
    utils::jwt::Claims,
};

/// Starts a new assessment for the calling user at step 1.
///
/// Fails with 403 if the user is blocked and 409 if an assessment is
/// already in progress.
pub async fn start_assessment(
    State(service): State<Arc<AssessmentService>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let assessment = service.start_assessment(claims.user_id()?).await?;
    Ok((StatusCode::CREATED, Json(assessment)))
}

/// Current standing: the latest assessment, certificate and block flag.
pub async fn get_status(
    State(service): State<Arc<AssessmentService>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let status = service.status(claims.user_id()?).await?;
    Ok(Json(status))
}

pub async fn get_history(
    State(service): State<Arc<AssessmentService>>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let history = service.history(claims.user_id()?, page).await?;
    Ok(Json(history))
}

/// Draws (or replays) the question set for a step. Answers are never
/// included in the payload.
pub async fn get_step_questions(
    State(service): State<Arc<AssessmentService>>,
    Extension(claims): Extension<Claims>,
    Path(step): Path<u8>,
) -> Result<impl IntoResponse, AppError> {
    let questions = service.get_step_questions(claims.user_id()?, step).await?;
    Ok(Json(questions))
}

/// Scores the submitted answers and applies the progression decision.
pub async fn submit_step(
    State(service): State<Arc<AssessmentService>>,
    Extension(claims): Extension<Claims>,
    Path(step): Path<u8>,
    Json(payload): Json<SubmitStepRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = service
        .submit_step(claims.user_id()?, step, payload.answers)
        .await?;
    Ok(Json(response))
}
