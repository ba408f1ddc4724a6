// src/store/mod.rs

//! Persistence ports. The lifecycle manager only talks to these traits; the
//! in-memory implementations back tests and database-less runs, the
//! PostgreSQL ones back production.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::engine::CompetencyLevel;
use crate::models::assessment::{Assessment, AssessmentFilter};
use crate::models::question::{CreateQuestionRequest, LevelStats, Question, UpdateQuestionRequest};

pub use memory::{InMemoryAssessmentRepository, InMemoryQuestionRepository};
pub use postgres::{PgAssessmentRepository, PgQuestionRepository};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// The row changed between read and write.
    #[error("assessment {0} was modified concurrently")]
    Conflict(i64),

    #[error("user {0} already has an active assessment")]
    ActiveExists(i64),

    #[error("question {0} has been served and can no longer be edited")]
    Frozen(i64),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait AssessmentRepository: Send + Sync {
    /// Inserts a fresh assessment at step 1. Fails with `ActiveExists` when
    /// the user already has a non-completed, non-blocked one.
    async fn create(&self, user_id: i64, now: DateTime<Utc>) -> StoreResult<Assessment>;

    async fn get(&self, id: i64) -> StoreResult<Option<Assessment>>;

    /// All of a user's assessments, newest first.
    async fn list_for_user(&self, user_id: i64) -> StoreResult<Vec<Assessment>>;

    /// Writes `assessment` if its `version` still matches the stored one and
    /// returns it with the bumped version.
    async fn save(&self, assessment: &Assessment) -> StoreResult<Assessment>;

    /// Newest first, with the unpaginated match count.
    async fn list(
        &self,
        filter: &AssessmentFilter,
        offset: u32,
        limit: u32,
    ) -> StoreResult<(Vec<Assessment>, u64)>;

    /// Assessments whose certificate is still pending, oldest first.
    async fn pending_certificates(&self, limit: u32) -> StoreResult<Vec<Assessment>>;
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Up to `limit` active questions of `level` not in `exclude`, in random
    /// order.
    async fn random_active(
        &self,
        level: CompetencyLevel,
        exclude: &[i64],
        limit: usize,
    ) -> StoreResult<Vec<Question>>;

    async fn get(&self, id: i64) -> StoreResult<Option<Question>>;

    /// Questions with the given ids; missing ids are skipped.
    async fn get_many(&self, ids: &[i64]) -> StoreResult<Vec<Question>>;

    async fn create(&self, req: CreateQuestionRequest) -> StoreResult<Question>;

    /// Content edits on a served question fail with `Frozen`; toggling
    /// `is_active` alone is always allowed.
    async fn update(&self, id: i64, req: UpdateQuestionRequest) -> StoreResult<Question>;

    async fn deactivate(&self, id: i64) -> StoreResult<()>;

    async fn mark_served(&self, ids: &[i64]) -> StoreResult<()>;

    async fn stats(&self) -> StoreResult<Vec<LevelStats>>;
}

/// True when the update touches anything that affects scoring or display.
pub(crate) fn changes_content(req: &UpdateQuestionRequest) -> bool {
    req.competency.is_some()
        || req.level.is_some()
        || req.question_text.is_some()
        || req.options.is_some()
        || req.correct_answer.is_some()
}
