// src/engine/mod.rs

//! Scoring and progression core. Nothing in here touches HTTP; only
//! question selection reaches the store.

pub mod level;
pub mod progression;
pub mod scorer;
pub mod selection;

use thiserror::Error;

pub use level::{AssessmentStep, CompetencyLevel};
pub use progression::{Decision, Outcome, ProgressionRules, Thresholds, decide, evaluate};
pub use scorer::{Answer, OptionLabel, StepScore, score};
pub use selection::select_questions;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unknown competency level '{0}'")]
    UnknownLevel(String),

    #[error("step {0} does not exist")]
    UnknownStep(i64),

    /// Reading a result before the step was submitted is a caller bug.
    #[error("step {0} has not been completed")]
    StepNotCompleted(AssessmentStep),

    #[error("not enough active {level} questions: {available} available, {required} required")]
    InsufficientQuestionPool {
        level: CompetencyLevel,
        available: usize,
        required: usize,
    },
}
