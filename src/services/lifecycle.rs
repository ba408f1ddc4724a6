// src/services/lifecycle.rs

//! The only code path that creates assessments, opens steps and records
//! submissions. Every mutation of an existing assessment happens while
//! holding that assessment's lock, and every write is version-checked by the
//! store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::certificate::{CertificateTrigger, RetryReport};
use super::locks::KeyedLocks;
use super::{AssessmentError, Clock, SystemClock};
use crate::config::AssessmentConfig;
use crate::engine::scorer::time_spent;
use crate::engine::{Answer, AssessmentStep, CompetencyLevel, Decision, OptionLabel, Outcome, evaluate, score};
use crate::engine::selection::{SelectionError, select_questions};
use crate::models::assessment::{
    Assessment, AssessmentFilter, Page, PageQuery, StatusResponse, StepQuestionsResponse, SubmitStepResponse,
};
use crate::models::certificate::CertificateStatus;
use crate::models::question::PublicQuestion;
use crate::store::{AssessmentRepository, QuestionRepository, StoreError};

type Result<T> = std::result::Result<T, AssessmentError>;

/// Pending certificates handled per retry pass.
const RETRY_BATCH: u32 = 100;

impl From<SelectionError> for AssessmentError {
    fn from(err: SelectionError) -> Self {
        match err {
            SelectionError::Engine(e) => AssessmentError::Engine(e),
            SelectionError::Store(e) => AssessmentError::Store(e),
        }
    }
}

pub struct AssessmentService {
    assessments: Arc<dyn AssessmentRepository>,
    questions: Arc<dyn QuestionRepository>,
    certificates: CertificateTrigger,
    config: AssessmentConfig,
    clock: Arc<dyn Clock>,
    locks: Arc<KeyedLocks>,
}

impl AssessmentService {
    pub fn new(
        assessments: Arc<dyn AssessmentRepository>,
        questions: Arc<dyn QuestionRepository>,
        certificates: CertificateTrigger,
        config: AssessmentConfig,
    ) -> Self {
        Self {
            assessments,
            questions,
            certificates,
            config,
            clock: Arc::new(SystemClock),
            locks: Arc::new(KeyedLocks::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Opens a new assessment at step 1.
    pub async fn start_assessment(&self, user_id: i64) -> Result<Assessment> {
        let history = self.refreshed_history(user_id).await?;

        if history.iter().any(|a| a.is_blocked) {
            tracing::info!(user_id, "Blocked user tried to start an assessment");
            return Err(AssessmentError::UserBlocked);
        }
        if history.iter().any(Assessment::is_active) {
            return Err(AssessmentError::AssessmentAlreadyActive);
        }

        let assessment = self
            .assessments
            .create(user_id, self.clock.now())
            .await
            .map_err(|e| match e {
                StoreError::ActiveExists(_) => AssessmentError::AssessmentAlreadyActive,
                other => AssessmentError::Store(other),
            })?;

        tracing::info!(user_id, assessment_id = assessment.id, "Assessment started");
        Ok(assessment)
    }

    /// Serves the questions of the current step, selecting them on first
    /// call and replaying the same set on later calls until submission.
    pub async fn get_step_questions(&self, user_id: i64, step: u8) -> Result<StepQuestionsResponse> {
        let step = AssessmentStep::try_from(step)?;
        let active = self.active_assessment(user_id).await?;

        let _guard = self.locks.acquire(active.id).await;
        let mut assessment = self.reload(active.id).await?;
        let now = self.clock.now();
        if self.expire_if_abandoned(&mut assessment, now).await? {
            // The expired step has been scored; whatever was asked is stale now.
            if !assessment.is_active() {
                return Err(AssessmentError::NoActiveAssessment);
            }
            return Err(AssessmentError::StepNotCurrent {
                requested: step,
                current: assessment.current_step,
            });
        }
        ensure_current(&assessment, step)?;

        let record = assessment.step(step);
        if record.is_completed() {
            return Err(AssessmentError::StepAlreadySubmitted(step));
        }

        if let Some(started_at) = record.started_at {
            let questions = self.load_in_order(&record.questions).await?;
            return Ok(self.questions_response(step, questions, started_at));
        }

        let exclude = self.previously_served(user_id).await?;
        let selected = select_questions(
            self.questions.as_ref(),
            step,
            &exclude,
            self.config.questions_per_step,
        )
        .await
        .inspect_err(|e| tracing::warn!(user_id, step = %step, "Question selection failed: {}", e))?;

        let ids: Vec<i64> = selected.iter().map(|q| q.id).collect();
        let record = assessment.step_mut(step);
        record.questions = ids.clone();
        record.started_at = Some(now);
        assessment.updated_at = now;
        self.assessments.save(&assessment).await?;

        // Counted only once the step that serves them is persisted.
        self.questions.mark_served(&ids).await?;

        tracing::info!(user_id, assessment_id = assessment.id, step = %step, "Step opened");
        Ok(self.questions_response(step, selected, now))
    }

    /// Scores a step, decides the transition and persists it in one write.
    pub async fn submit_step(&self, user_id: i64, step: u8, answers: Vec<Answer>) -> Result<SubmitStepResponse> {
        let step = AssessmentStep::try_from(step)?;
        let latest = self
            .assessments
            .list_for_user(user_id)
            .await?
            .into_iter()
            .next()
            .ok_or(AssessmentError::NoActiveAssessment)?;

        let _guard = self.locks.acquire(latest.id).await;
        let mut assessment = self.reload(latest.id).await?;

        let record = assessment.step(step);
        if record.is_completed() {
            return Err(AssessmentError::StepAlreadySubmitted(step));
        }
        if !assessment.is_active() {
            return Err(AssessmentError::NoActiveAssessment);
        }
        ensure_current(&assessment, step)?;
        if !record.is_opened() {
            return Err(AssessmentError::StepNotOpened(step));
        }

        let assigned: HashSet<i64> = record.questions.iter().copied().collect();
        let mut stale: Vec<i64> = answers
            .iter()
            .map(|a| a.question_id)
            .filter(|id| !assigned.contains(id))
            .collect();
        if !stale.is_empty() {
            stale.sort_unstable();
            stale.dedup();
            return Err(AssessmentError::StaleQuestionSet { question_ids: stale });
        }

        let now = self.clock.now();
        let decision = self.finalize_step(&mut assessment, step, answers, now).await?;
        let saved = self.assessments.save(&assessment).await.map_err(|e| match e {
            StoreError::Conflict(_) => AssessmentError::StepAlreadySubmitted(step),
            other => AssessmentError::Store(other),
        })?;

        let record = saved.step(step);
        let result = record
            .result
            .ok_or(crate::engine::EngineError::StepNotCompleted(step))?;
        tracing::info!(
            user_id,
            assessment_id = saved.id,
            step = %step,
            score = result.score,
            total = result.total_questions,
            percentage = result.percentage,
            outcome = ?decision.outcome,
            "Step submitted"
        );

        self.spawn_issuance(&saved);
        Ok(SubmitStepResponse::new(result, &decision))
    }

    /// The user's latest assessment, with its certificate and best level.
    pub async fn status(&self, user_id: i64) -> Result<StatusResponse> {
        let history = self.refreshed_history(user_id).await?;

        let highest_level = history.iter().filter_map(|a| a.final_level).max();
        let certificate = history
            .iter()
            .filter_map(|a| a.certificate.issued())
            .max_by_key(|cert| cert.level)
            .cloned();
        let is_blocked = history.iter().any(|a| a.is_blocked);
        let assessment = history.into_iter().next();

        Ok(StatusResponse {
            has_assessment: assessment.is_some(),
            assessment,
            certificate,
            highest_level,
            is_blocked,
        })
    }

    pub async fn history(&self, user_id: i64, page: PageQuery) -> Result<Page<Assessment>> {
        let filter = AssessmentFilter {
            user_id: Some(user_id),
            ..AssessmentFilter::default()
        };
        self.report(&filter, page).await
    }

    /// Admin listing over all users.
    pub async fn report(&self, filter: &AssessmentFilter, page: PageQuery) -> Result<Page<Assessment>> {
        let (offset, limit) = page.bounds();
        let (items, total) = self.assessments.list(filter, offset, limit).await?;
        Ok(Page {
            items,
            page: offset / limit + 1,
            limit,
            total,
        })
    }

    /// One pass over pending certificate issuances.
    pub async fn retry_pending_certificates(&self) -> Result<RetryReport> {
        let pending = self.assessments.pending_certificates(RETRY_BATCH).await?;
        let mut report = RetryReport::default();

        for candidate in pending {
            let _guard = self.locks.acquire(candidate.id).await;
            let Some(fresh) = self.assessments.get(candidate.id).await? else {
                continue;
            };
            if !fresh.certificate.is_pending() {
                continue;
            }
            report.attempted += 1;
            match self.certificates.process(fresh).await {
                Ok(done) => match done.certificate {
                    CertificateStatus::Issued(_) => report.issued += 1,
                    CertificateStatus::Superseded { .. } => report.superseded += 1,
                    _ => report.still_pending += 1,
                },
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(assessment_id = candidate.id, "Failed to record certificate retry: {}", e);
                }
            }
        }
        Ok(report)
    }

    async fn reload(&self, id: i64) -> Result<Assessment> {
        self.assessments
            .get(id)
            .await?
            .ok_or(AssessmentError::Store(StoreError::NotFound))
    }

    async fn active_assessment(&self, user_id: i64) -> Result<Assessment> {
        let history = self.assessments.list_for_user(user_id).await?;
        if let Some(active) = history.iter().find(|a| a.is_active()) {
            return Ok(active.clone());
        }
        if history.iter().any(|a| a.is_blocked) {
            return Err(AssessmentError::UserBlocked);
        }
        Err(AssessmentError::NoActiveAssessment)
    }

    /// The user's assessments, newest first, after expiring an abandoned
    /// step on the active one.
    async fn refreshed_history(&self, user_id: i64) -> Result<Vec<Assessment>> {
        let mut history = self.assessments.list_for_user(user_id).await?;
        if let Some(slot) = history.iter().position(Assessment::is_active) {
            let id = history[slot].id;
            let _guard = self.locks.acquire(id).await;
            let mut assessment = self.reload(id).await?;
            self.expire_if_abandoned(&mut assessment, self.clock.now()).await?;
            history[slot] = self.reload(id).await?;
        }
        Ok(history)
    }

    /// Scores the current step as submitted with no answers once its lease
    /// has run out. Caller holds the lock. Returns whether anything changed.
    async fn expire_if_abandoned(&self, assessment: &mut Assessment, now: DateTime<Utc>) -> Result<bool> {
        if !assessment.is_active() {
            return Ok(false);
        }
        let step = assessment.current_step;
        let record = assessment.step(step);
        let Some(started_at) = record.started_at else {
            return Ok(false);
        };
        if record.is_completed() {
            return Ok(false);
        }
        let deadline = started_at + Duration::seconds(self.config.lease_secs(record.questions.len()));
        if now <= deadline {
            return Ok(false);
        }

        tracing::warn!(
            user_id = assessment.user_id,
            assessment_id = assessment.id,
            step = %step,
            %deadline,
            "Step lease expired, scoring without answers"
        );
        self.finalize_step(assessment, step, Vec::new(), now).await?;
        let saved = self.assessments.save(assessment).await?;
        self.spawn_issuance(&saved);
        *assessment = saved;
        Ok(true)
    }

    /// Stamps completion, scores, decides and applies the transition to the
    /// in-memory aggregate. Nothing is persisted here.
    async fn finalize_step(
        &self,
        assessment: &mut Assessment,
        step: AssessmentStep,
        answers: Vec<Answer>,
        now: DateTime<Utc>,
    ) -> Result<Decision> {
        let assigned = assessment.step(step).questions.clone();
        let answer_key: HashMap<i64, OptionLabel> = self
            .questions
            .get_many(&assigned)
            .await?
            .into_iter()
            .map(|q| (q.id, q.correct_answer))
            .collect();
        if answer_key.len() != assigned.len() {
            return Err(StoreError::Corrupt(format!(
                "assessment {} step {}: {} of {} assigned questions missing",
                assessment.id,
                step,
                assigned.len() - answer_key.len(),
                assigned.len()
            ))
            .into());
        }

        let result = score(&answers, &answer_key);
        let spent = time_spent(&answers);
        let prior = assessment.confirmed_level;

        let record = assessment.step_mut(step);
        record.answers = answers;
        record.result = Some(result);
        record.completed_at = Some(now);
        let decision = evaluate(record, prior, &self.config.rules())?;
        record.decision = Some(decision);

        apply_transition(assessment, &decision);
        assessment.total_time_spent += spent;
        assessment.updated_at = now;
        Ok(decision)
    }

    /// Hands a freshly scored assessment to the certificate trigger on its
    /// own task, so the caller neither waits on the certificate service nor
    /// keeps the assessment locked meanwhile. The task takes the lock once
    /// the caller releases it and re-reads the assessment first.
    fn spawn_issuance(&self, saved: &Assessment) {
        if !saved.certificate.is_pending() {
            return;
        }
        let id = saved.id;
        let locks = self.locks.clone();
        let assessments = self.assessments.clone();
        let certificates = self.certificates.clone();

        tokio::spawn(async move {
            let _guard = locks.acquire(id).await;
            let fresh = match assessments.get(id).await {
                Ok(Some(fresh)) if fresh.certificate.is_pending() => fresh,
                Ok(_) => return,
                Err(e) => {
                    tracing::error!(assessment_id = id, "Failed to reload assessment for issuance: {}", e);
                    return;
                }
            };
            if let Err(e) = certificates.process(fresh).await {
                tracing::error!(assessment_id = id, "Failed to record certificate state: {}", e);
            }
        });
    }

    async fn load_in_order(&self, ids: &[i64]) -> Result<Vec<crate::models::question::Question>> {
        let mut by_id: HashMap<i64, _> = self
            .questions
            .get_many(ids)
            .await?
            .into_iter()
            .map(|q| (q.id, q))
            .collect();
        ids.iter()
            .map(|id| {
                by_id
                    .remove(id)
                    .ok_or_else(|| StoreError::Corrupt(format!("assigned question {id} is missing")).into())
            })
            .collect()
    }

    async fn previously_served(&self, user_id: i64) -> Result<Vec<i64>> {
        let history = self.assessments.list_for_user(user_id).await?;
        let mut ids: Vec<i64> = history.iter().flat_map(Assessment::served_question_ids).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    fn questions_response(
        &self,
        step: AssessmentStep,
        questions: Vec<crate::models::question::Question>,
        started_at: DateTime<Utc>,
    ) -> StepQuestionsResponse {
        StepQuestionsResponse {
            step,
            questions: questions.into_iter().map(PublicQuestion::from).collect(),
            started_at,
            time_per_question: self.config.time_per_question_secs,
        }
    }
}

fn ensure_current(assessment: &Assessment, step: AssessmentStep) -> Result<()> {
    if assessment.current_step != step {
        return Err(AssessmentError::StepNotCurrent {
            requested: step,
            current: assessment.current_step,
        });
    }
    Ok(())
}

/// Moves the aggregate to the state named by `decision`.
fn apply_transition(assessment: &mut Assessment, decision: &Decision) {
    assessment.confirmed_level = decision.confirmed_level;
    match decision.outcome {
        Outcome::Advance { next } => {
            assessment.current_step = next;
        }
        Outcome::Award { .. } | Outcome::Retain { .. } => {
            assessment.is_completed = true;
            assessment.final_level = decision.final_level();
        }
        Outcome::Block => {
            assessment.is_completed = true;
            assessment.is_blocked = true;
            assessment.final_level = None;
        }
    }
    assessment.certificate = match assessment.final_level {
        Some(level) if assessment.is_completed => pending(level),
        _ => CertificateStatus::NotApplicable,
    };
}

fn pending(level: CompetencyLevel) -> CertificateStatus {
    CertificateStatus::Pending {
        level,
        attempts: 0,
        last_error: None,
    }
}
