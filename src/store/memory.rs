// src/store/memory.rs

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use tokio::sync::RwLock;

use super::{AssessmentRepository, QuestionRepository, StoreError, StoreResult, changes_content};
use crate::engine::CompetencyLevel;
use crate::models::assessment::{Assessment, AssessmentFilter};
use crate::models::question::{CreateQuestionRequest, LevelStats, Question, UpdateQuestionRequest};

#[derive(Default, Clone)]
pub struct InMemoryAssessmentRepository {
    store: Arc<RwLock<BTreeMap<i64, Assessment>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryAssessmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssessmentRepository for InMemoryAssessmentRepository {
    async fn create(&self, user_id: i64, now: DateTime<Utc>) -> StoreResult<Assessment> {
        let mut store = self.store.write().await;
        if store.values().any(|a| a.user_id == user_id && a.is_active()) {
            return Err(StoreError::ActiveExists(user_id));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let assessment = Assessment::new(id, user_id, now);
        store.insert(id, assessment.clone());
        Ok(assessment)
    }

    async fn get(&self, id: i64) -> StoreResult<Option<Assessment>> {
        Ok(self.store.read().await.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: i64) -> StoreResult<Vec<Assessment>> {
        let store = self.store.read().await;
        Ok(store.values().rev().filter(|a| a.user_id == user_id).cloned().collect())
    }

    async fn save(&self, assessment: &Assessment) -> StoreResult<Assessment> {
        let mut store = self.store.write().await;
        let current = store.get_mut(&assessment.id).ok_or(StoreError::NotFound)?;
        if current.version != assessment.version {
            return Err(StoreError::Conflict(assessment.id));
        }
        let mut saved = assessment.clone();
        saved.version += 1;
        *current = saved.clone();
        Ok(saved)
    }

    async fn list(
        &self,
        filter: &AssessmentFilter,
        offset: u32,
        limit: u32,
    ) -> StoreResult<(Vec<Assessment>, u64)> {
        let store = self.store.read().await;
        let matching: Vec<&Assessment> = store.values().rev().filter(|a| filter.matches(a)).collect();
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn pending_certificates(&self, limit: u32) -> StoreResult<Vec<Assessment>> {
        let store = self.store.read().await;
        Ok(store
            .values()
            .filter(|a| a.certificate.is_pending())
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryQuestionRepository {
    store: Arc<RwLock<BTreeMap<i64, Question>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryQuestionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuestionRepository for InMemoryQuestionRepository {
    async fn random_active(
        &self,
        level: CompetencyLevel,
        exclude: &[i64],
        limit: usize,
    ) -> StoreResult<Vec<Question>> {
        let excluded: HashSet<i64> = exclude.iter().copied().collect();
        let mut candidates: Vec<Question> = self
            .store
            .read()
            .await
            .values()
            .filter(|q| q.level == level && q.is_active && !excluded.contains(&q.id))
            .cloned()
            .collect();
        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn get(&self, id: i64) -> StoreResult<Option<Question>> {
        Ok(self.store.read().await.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[i64]) -> StoreResult<Vec<Question>> {
        let store = self.store.read().await;
        Ok(ids.iter().filter_map(|id| store.get(id).cloned()).collect())
    }

    async fn create(&self, req: CreateQuestionRequest) -> StoreResult<Question> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let question = Question {
            id,
            competency: req.competency,
            level: req.level,
            question_text: req.question_text,
            options: req.options,
            correct_answer: req.correct_answer,
            is_active: true,
            times_served: 0,
            created_at: Some(Utc::now()),
        };
        self.store.write().await.insert(id, question.clone());
        Ok(question)
    }

    async fn update(&self, id: i64, req: UpdateQuestionRequest) -> StoreResult<Question> {
        let mut store = self.store.write().await;
        let question = store.get_mut(&id).ok_or(StoreError::NotFound)?;
        if question.is_frozen() && changes_content(&req) {
            return Err(StoreError::Frozen(id));
        }
        if let Some(competency) = req.competency {
            question.competency = competency;
        }
        if let Some(level) = req.level {
            question.level = level;
        }
        if let Some(text) = req.question_text {
            question.question_text = text;
        }
        if let Some(options) = req.options {
            question.options = options;
        }
        if let Some(correct) = req.correct_answer {
            question.correct_answer = correct;
        }
        if let Some(active) = req.is_active {
            question.is_active = active;
        }
        Ok(question.clone())
    }

    async fn deactivate(&self, id: i64) -> StoreResult<()> {
        let mut store = self.store.write().await;
        let question = store.get_mut(&id).ok_or(StoreError::NotFound)?;
        question.is_active = false;
        Ok(())
    }

    async fn mark_served(&self, ids: &[i64]) -> StoreResult<()> {
        let mut store = self.store.write().await;
        for id in ids {
            if let Some(question) = store.get_mut(id) {
                question.times_served += 1;
            }
        }
        Ok(())
    }

    async fn stats(&self) -> StoreResult<Vec<LevelStats>> {
        let store = self.store.read().await;
        let mut counts: HashMap<CompetencyLevel, (i64, i64)> = HashMap::new();
        for q in store.values() {
            let entry = counts.entry(q.level).or_default();
            entry.1 += 1;
            if q.is_active {
                entry.0 += 1;
            }
        }
        Ok(CompetencyLevel::ALL
            .into_iter()
            .map(|level| {
                let (active, total) = counts.get(&level).copied().unwrap_or_default();
                LevelStats { level, active, total }
            })
            .collect())
    }
}

/// In-memory assessments with a configurable read delay and failing saves,
/// for exercising interleavings and partial failures.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct FaultyAssessmentRepository {
    pub inner: InMemoryAssessmentRepository,
    pub list_delay: std::time::Duration,
    pub fail_saves: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
#[async_trait]
impl AssessmentRepository for FaultyAssessmentRepository {
    async fn create(&self, user_id: i64, now: DateTime<Utc>) -> StoreResult<Assessment> {
        self.inner.create(user_id, now).await
    }

    async fn get(&self, id: i64) -> StoreResult<Option<Assessment>> {
        self.inner.get(id).await
    }

    async fn list_for_user(&self, user_id: i64) -> StoreResult<Vec<Assessment>> {
        let snapshot = self.inner.list_for_user(user_id).await;
        tokio::time::sleep(self.list_delay).await;
        snapshot
    }

    async fn save(&self, assessment: &Assessment) -> StoreResult<Assessment> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("save rejected".into()));
        }
        self.inner.save(assessment).await
    }

    async fn list(
        &self,
        filter: &AssessmentFilter,
        offset: u32,
        limit: u32,
    ) -> StoreResult<(Vec<Assessment>, u64)> {
        self.inner.list(filter, offset, limit).await
    }

    async fn pending_certificates(&self, limit: u32) -> StoreResult<Vec<Assessment>> {
        self.inner.pending_certificates(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OptionLabel;
    use crate::models::question::QuestionOptions;

    fn create_req(level: CompetencyLevel) -> CreateQuestionRequest {
        CreateQuestionRequest {
            competency: "Safety".into(),
            level,
            question_text: "What is phishing?".into(),
            options: QuestionOptions {
                a: "A scam".into(),
                b: "A sport".into(),
                c: "A font".into(),
                d: "A file".into(),
            },
            correct_answer: OptionLabel::A,
        }
    }

    #[tokio::test]
    async fn only_one_active_assessment_per_user() {
        let repo = InMemoryAssessmentRepository::new();
        let first = repo.create(7, Utc::now()).await.unwrap();
        assert!(matches!(repo.create(7, Utc::now()).await, Err(StoreError::ActiveExists(7))));

        let mut done = first.clone();
        done.is_completed = true;
        repo.save(&done).await.unwrap();
        assert!(repo.create(7, Utc::now()).await.is_ok());
        assert_eq!(repo.list_for_user(7).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let repo = InMemoryAssessmentRepository::new();
        let a = repo.create(1, Utc::now()).await.unwrap();
        let saved = repo.save(&a).await.unwrap();
        assert_eq!(saved.version, 1);
        assert!(matches!(repo.save(&a).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn served_questions_are_frozen() {
        let repo = InMemoryQuestionRepository::new();
        let q = repo.create(create_req(CompetencyLevel::A1)).await.unwrap();
        repo.mark_served(&[q.id]).await.unwrap();

        let edit = UpdateQuestionRequest {
            competency: None,
            level: None,
            question_text: Some("Edited".into()),
            options: None,
            correct_answer: None,
            is_active: None,
        };
        assert!(matches!(repo.update(q.id, edit).await, Err(StoreError::Frozen(_))));

        let toggle = UpdateQuestionRequest {
            competency: None,
            level: None,
            question_text: None,
            options: None,
            correct_answer: None,
            is_active: Some(false),
        };
        assert!(!repo.update(q.id, toggle).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn random_active_honours_level_and_exclusions() {
        let repo = InMemoryQuestionRepository::new();
        for _ in 0..5 {
            repo.create(create_req(CompetencyLevel::B1)).await.unwrap();
        }
        repo.create(create_req(CompetencyLevel::B2)).await.unwrap();
        repo.deactivate(2).await.unwrap();

        let drawn = repo.random_active(CompetencyLevel::B1, &[1], 10).await.unwrap();
        let mut ids: Vec<i64> = drawn.iter().map(|q| q.id).collect();
        ids.sort();
        assert_eq!(ids, vec![3, 4, 5]);

        let stats = repo.stats().await.unwrap();
        let b1 = stats.iter().find(|s| s.level == CompetencyLevel::B1).unwrap();
        assert_eq!((b1.active, b1.total), (4, 5));
    }
}
