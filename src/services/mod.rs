// src/services/mod.rs

pub mod certificate;
pub mod lifecycle;
mod locks;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::engine::{AssessmentStep, EngineError};
use crate::store::StoreError;

pub use certificate::{
    CertificateError, CertificateService, CertificateTrigger, HttpCertificateService, RetryReport,
    UnconfiguredCertificateService, spawn_retry_worker,
};
pub use lifecycle::AssessmentService;

/// Source of "now" for lease and timestamp decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Error)]
pub enum AssessmentError {
    #[error("user is permanently blocked from taking the assessment")]
    UserBlocked,

    #[error("an assessment is already in progress")]
    AssessmentAlreadyActive,

    #[error("no assessment in progress")]
    NoActiveAssessment,

    #[error("step {requested} is not the current step")]
    StepNotCurrent {
        requested: AssessmentStep,
        current: AssessmentStep,
    },

    #[error("questions for step {0} have not been fetched yet")]
    StepNotOpened(AssessmentStep),

    #[error("step {0} has already been submitted")]
    StepAlreadySubmitted(AssessmentStep),

    #[error("answers reference questions not assigned to this step: {question_ids:?}")]
    StaleQuestionSet { question_ids: Vec<i64> },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AssessmentError {
    /// Stable machine-readable code for clients.
    pub fn kind(&self) -> &'static str {
        match self {
            AssessmentError::UserBlocked => "user_blocked",
            AssessmentError::AssessmentAlreadyActive => "assessment_already_active",
            AssessmentError::NoActiveAssessment => "no_active_assessment",
            AssessmentError::StepNotCurrent { .. } => "step_not_current",
            AssessmentError::StepNotOpened(_) => "step_not_opened",
            AssessmentError::StepAlreadySubmitted(_) => "step_already_submitted",
            AssessmentError::StaleQuestionSet { .. } => "stale_question_set",
            AssessmentError::Engine(EngineError::InsufficientQuestionPool { .. }) => "insufficient_question_pool",
            AssessmentError::Engine(EngineError::StepNotCompleted(_)) => "step_not_completed",
            AssessmentError::Engine(_) => "invalid_input",
            AssessmentError::Store(_) => "store",
        }
    }
}
