// src/models/assessment.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{Answer, AssessmentStep, CompetencyLevel, Decision, EngineError, StepScore};
use crate::models::certificate::CertificateStatus;
use crate::models::question::PublicQuestion;

/// One step of an assessment. Frozen once `completed_at` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step: AssessmentStep,
    /// Assigned question ids, in the order served.
    pub questions: Vec<i64>,
    pub answers: Vec<Answer>,
    pub result: Option<StepScore>,
    pub decision: Option<Decision>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    pub fn new(step: AssessmentStep) -> Self {
        Self {
            step,
            questions: Vec::new(),
            answers: Vec::new(),
            result: None,
            decision: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_opened(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn percentage(&self) -> Result<f64, EngineError> {
        match (self.completed_at, self.result) {
            (Some(_), Some(result)) => Ok(result.percentage),
            _ => Err(EngineError::StepNotCompleted(self.step)),
        }
    }
}

/// Aggregate root for one candidate's run through the exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: i64,
    pub user_id: i64,
    pub current_step: AssessmentStep,
    pub step1: StepRecord,
    pub step2: StepRecord,
    pub step3: StepRecord,
    pub final_level: Option<CompetencyLevel>,
    /// Highest level secured so far, including by advancing.
    pub confirmed_level: Option<CompetencyLevel>,
    pub is_completed: bool,
    pub is_blocked: bool,
    /// Seconds, summed over every answered question of every step.
    pub total_time_spent: u64,
    pub certificate: CertificateStatus,
    /// Optimistic concurrency token, bumped on every write.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assessment {
    pub fn new(id: i64, user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            current_step: AssessmentStep::One,
            step1: StepRecord::new(AssessmentStep::One),
            step2: StepRecord::new(AssessmentStep::Two),
            step3: StepRecord::new(AssessmentStep::Three),
            final_level: None,
            confirmed_level: None,
            is_completed: false,
            is_blocked: false,
            total_time_spent: 0,
            certificate: CertificateStatus::NotApplicable,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Neither completed nor blocked.
    pub fn is_active(&self) -> bool {
        !self.is_completed && !self.is_blocked
    }

    pub fn step(&self, step: AssessmentStep) -> &StepRecord {
        match step {
            AssessmentStep::One => &self.step1,
            AssessmentStep::Two => &self.step2,
            AssessmentStep::Three => &self.step3,
        }
    }

    pub fn step_mut(&mut self, step: AssessmentStep) -> &mut StepRecord {
        match step {
            AssessmentStep::One => &mut self.step1,
            AssessmentStep::Two => &mut self.step2,
            AssessmentStep::Three => &mut self.step3,
        }
    }

    pub fn steps(&self) -> [&StepRecord; 3] {
        [&self.step1, &self.step2, &self.step3]
    }

    /// Every question id served in this assessment.
    pub fn served_question_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.steps().into_iter().flat_map(|s| s.questions.iter().copied())
    }
}

/// Response for `GET /assessment/step/{step}/questions`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepQuestionsResponse {
    pub step: AssessmentStep,
    pub questions: Vec<PublicQuestion>,
    pub started_at: DateTime<Utc>,
    /// Seconds allowed per question.
    pub time_per_question: u32,
}

#[derive(Debug, Deserialize)]
pub struct SubmitStepRequest {
    #[serde(default)]
    pub answers: Vec<Answer>,
}

/// Result of scoring one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitStepResponse {
    pub score: u32,
    pub total_questions: u32,
    pub percentage: f64,
    pub final_level: Option<CompetencyLevel>,
    pub proceed_to_next: bool,
    pub is_completed: bool,
    pub is_blocked: bool,
}

impl SubmitStepResponse {
    pub fn new(result: StepScore, decision: &Decision) -> Self {
        Self {
            score: result.score,
            total_questions: result.total_questions,
            percentage: result.percentage,
            final_level: decision.final_level(),
            proceed_to_next: decision.proceed_to_next(),
            is_completed: decision.is_completed(),
            is_blocked: decision.is_blocked(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub has_assessment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<Assessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<crate::models::certificate::CertificateRef>,
    /// Highest certified level across all of the user's assessments.
    pub highest_level: Option<CompetencyLevel>,
    pub is_blocked: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub const MAX_LIMIT: u32 = 100;

    /// (offset, limit) with page starting at 1 and limit clamped to 1..=100.
    pub fn bounds(&self) -> (u32, u32) {
        let limit = self.limit.unwrap_or(10).clamp(1, Self::MAX_LIMIT);
        let page = self.page.unwrap_or(1).max(1);
        ((page - 1).saturating_mul(limit), limit)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

/// Filters for the admin assessment report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentFilter {
    pub user_id: Option<i64>,
    pub is_completed: Option<bool>,
    pub level: Option<CompetencyLevel>,
    /// Inclusive bounds on `created_at`.
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl AssessmentFilter {
    pub fn matches(&self, a: &Assessment) -> bool {
        self.user_id.is_none_or(|id| a.user_id == id)
            && self.is_completed.is_none_or(|c| a.is_completed == c)
            && self.level.is_none_or(|l| a.final_level == Some(l))
            && self.date_from.is_none_or(|from| a.created_at >= from)
            && self.date_to.is_none_or(|to| a.created_at <= to)
    }
}
