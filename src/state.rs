// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::config::Config;
use crate::services::AssessmentService;
use crate::store::QuestionRepository;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AssessmentService>,
    pub questions: Arc<dyn QuestionRepository>,
    pub config: Config,
}

impl FromRef<AppState> for Arc<AssessmentService> {
    fn from_ref(state: &AppState) -> Self {
        state.service.clone()
    }
}

impl FromRef<AppState> for Arc<dyn QuestionRepository> {
    fn from_ref(state: &AppState) -> Self {
        state.questions.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
