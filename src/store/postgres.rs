// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, types::Json};

use super::{AssessmentRepository, QuestionRepository, StoreError, StoreResult, changes_content};
use crate::engine::{AssessmentStep, CompetencyLevel, OptionLabel};
use crate::models::assessment::{Assessment, AssessmentFilter, StepRecord};
use crate::models::certificate::CertificateStatus;
use crate::models::question::{CreateQuestionRequest, LevelStats, Question, QuestionOptions, UpdateQuestionRequest};

/// Postgres error code for unique violations.
const UNIQUE_VIOLATION: &str = "23505";

const ASSESSMENT_COLUMNS: &str = "id, user_id, current_step, steps, final_level, confirmed_level, \
     is_completed, is_blocked, total_time_spent, certificate, version, created_at, updated_at";

const QUESTION_COLUMNS: &str = "id, competency, level, question_text, option_a, option_b, option_c, option_d, \
     correct_answer, is_active, times_served, created_at";

fn parse_level(raw: &str) -> StoreResult<CompetencyLevel> {
    raw.parse().map_err(|e| StoreError::Corrupt(format!("{e}")))
}

fn parse_optional_level(raw: Option<String>) -> StoreResult<Option<CompetencyLevel>> {
    raw.as_deref().map(parse_level).transpose()
}

#[derive(FromRow)]
struct AssessmentRow {
    id: i64,
    user_id: i64,
    current_step: i16,
    steps: Json<Vec<StepRecord>>,
    final_level: Option<String>,
    confirmed_level: Option<String>,
    is_completed: bool,
    is_blocked: bool,
    total_time_spent: i64,
    certificate: Json<CertificateStatus>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AssessmentRow> for Assessment {
    type Error = StoreError;

    fn try_from(row: AssessmentRow) -> Result<Self, Self::Error> {
        let current_step = AssessmentStep::try_from(i64::from(row.current_step))
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let [step1, step2, step3]: [StepRecord; 3] = row
            .steps
            .0
            .try_into()
            .map_err(|_| StoreError::Corrupt(format!("assessment {} does not have three steps", row.id)))?;

        Ok(Assessment {
            id: row.id,
            user_id: row.user_id,
            current_step,
            step1,
            step2,
            step3,
            final_level: parse_optional_level(row.final_level)?,
            confirmed_level: parse_optional_level(row.confirmed_level)?,
            is_completed: row.is_completed,
            is_blocked: row.is_blocked,
            total_time_spent: u64::try_from(row.total_time_spent).unwrap_or_default(),
            certificate: row.certificate.0,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn collect_assessments(rows: Vec<AssessmentRow>) -> StoreResult<Vec<Assessment>> {
    rows.into_iter().map(Assessment::try_from).collect()
}

#[derive(Clone)]
pub struct PgAssessmentRepository {
    pool: PgPool,
}

impl PgAssessmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &AssessmentFilter) {
    builder.push(" WHERE TRUE");
    if let Some(user_id) = filter.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(is_completed) = filter.is_completed {
        builder.push(" AND is_completed = ").push_bind(is_completed);
    }
    if let Some(level) = filter.level {
        builder.push(" AND final_level = ").push_bind(level.as_str());
    }
    if let Some(from) = filter.date_from {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.date_to {
        builder.push(" AND created_at <= ").push_bind(to);
    }
}

#[async_trait]
impl AssessmentRepository for PgAssessmentRepository {
    async fn create(&self, user_id: i64, now: DateTime<Utc>) -> StoreResult<Assessment> {
        let blank = Assessment::new(0, user_id, now);
        let steps: Vec<StepRecord> = blank.steps().into_iter().cloned().collect();

        let row = sqlx::query_as::<_, AssessmentRow>(&format!(
            r#"
            INSERT INTO assessments (user_id, current_step, steps, certificate, created_at, updated_at)
            VALUES ($1, 1, $2, $3, $4, $4)
            RETURNING {ASSESSMENT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(Json(steps))
        .bind(Json(CertificateStatus::NotApplicable))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let unique = e
                .as_database_error()
                .and_then(|db| db.code())
                .is_some_and(|code| code == UNIQUE_VIOLATION);
            if unique {
                StoreError::ActiveExists(user_id)
            } else {
                tracing::error!("Failed to create assessment: {:?}", e);
                StoreError::from(e)
            }
        })?;

        row.try_into()
    }

    async fn get(&self, id: i64) -> StoreResult<Option<Assessment>> {
        let row = sqlx::query_as::<_, AssessmentRow>(&format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Assessment::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: i64) -> StoreResult<Vec<Assessment>> {
        let rows = sqlx::query_as::<_, AssessmentRow>(&format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE user_id = $1 ORDER BY id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        collect_assessments(rows)
    }

    async fn save(&self, assessment: &Assessment) -> StoreResult<Assessment> {
        let steps: Vec<StepRecord> = assessment.steps().into_iter().cloned().collect();
        let total_time_spent = i64::try_from(assessment.total_time_spent).unwrap_or(i64::MAX);

        let row = sqlx::query_as::<_, AssessmentRow>(&format!(
            r#"
            UPDATE assessments SET
                current_step = $3,
                steps = $4,
                final_level = $5,
                confirmed_level = $6,
                is_completed = $7,
                is_blocked = $8,
                total_time_spent = $9,
                certificate = $10,
                updated_at = $11,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {ASSESSMENT_COLUMNS}
            "#
        ))
        .bind(assessment.id)
        .bind(assessment.version)
        .bind(i16::from(assessment.current_step.number()))
        .bind(Json(steps))
        .bind(assessment.final_level.map(CompetencyLevel::as_str))
        .bind(assessment.confirmed_level.map(CompetencyLevel::as_str))
        .bind(assessment.is_completed)
        .bind(assessment.is_blocked)
        .bind(total_time_spent)
        .bind(Json(&assessment.certificate))
        .bind(assessment.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None if self.get(assessment.id).await?.is_some() => Err(StoreError::Conflict(assessment.id)),
            None => Err(StoreError::NotFound),
        }
    }

    async fn list(
        &self,
        filter: &AssessmentFilter,
        offset: u32,
        limit: u32,
    ) -> StoreResult<(Vec<Assessment>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM assessments");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {ASSESSMENT_COLUMNS} FROM assessments"));
        push_filter(&mut query, filter);
        query
            .push(" ORDER BY id DESC LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(i64::from(offset));
        let rows: Vec<AssessmentRow> = query.build_query_as().fetch_all(&self.pool).await?;

        Ok((collect_assessments(rows)?, u64::try_from(total).unwrap_or_default()))
    }

    async fn pending_certificates(&self, limit: u32) -> StoreResult<Vec<Assessment>> {
        let rows = sqlx::query_as::<_, AssessmentRow>(&format!(
            r#"
            SELECT {ASSESSMENT_COLUMNS} FROM assessments
            WHERE certificate->>'state' = 'pending'
            ORDER BY updated_at ASC
            LIMIT $1
            "#
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        collect_assessments(rows)
    }
}

#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    competency: String,
    level: String,
    question_text: String,
    option_a: String,
    option_b: String,
    option_c: String,
    option_d: String,
    correct_answer: String,
    is_active: bool,
    times_served: i64,
    created_at: Option<DateTime<Utc>>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = StoreError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let correct_answer = OptionLabel::parse(&row.correct_answer)
            .ok_or_else(|| StoreError::Corrupt(format!("question {} has no valid answer key", row.id)))?;
        Ok(Question {
            id: row.id,
            competency: row.competency,
            level: parse_level(&row.level)?,
            question_text: row.question_text,
            options: QuestionOptions {
                a: row.option_a,
                b: row.option_b,
                c: row.option_c,
                d: row.option_d,
            },
            correct_answer,
            is_active: row.is_active,
            times_served: row.times_served,
            created_at: row.created_at,
        })
    }
}

fn collect_questions(rows: Vec<QuestionRow>) -> StoreResult<Vec<Question>> {
    rows.into_iter().map(Question::try_from).collect()
}

#[derive(Clone)]
pub struct PgQuestionRepository {
    pool: PgPool,
}

impl PgQuestionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionRepository for PgQuestionRepository {
    async fn random_active(
        &self,
        level: CompetencyLevel,
        exclude: &[i64],
        limit: usize,
    ) -> StoreResult<Vec<Question>> {
        let rows = sqlx::query_as::<_, QuestionRow>(&format!(
            r#"
            SELECT {QUESTION_COLUMNS} FROM questions
            WHERE level = $1 AND is_active AND NOT (id = ANY($2))
            ORDER BY RANDOM()
            LIMIT $3
            "#
        ))
        .bind(level.as_str())
        .bind(exclude)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to draw {} questions: {:?}", level, e);
            StoreError::from(e)
        })?;

        collect_questions(rows)
    }

    async fn get(&self, id: i64) -> StoreResult<Option<Question>> {
        let row = sqlx::query_as::<_, QuestionRow>(&format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Question::try_from).transpose()
    }

    async fn get_many(&self, ids: &[i64]) -> StoreResult<Vec<Question>> {
        let rows = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        collect_questions(rows)
    }

    async fn create(&self, req: CreateQuestionRequest) -> StoreResult<Question> {
        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            r#"
            INSERT INTO questions (competency, level, question_text, option_a, option_b, option_c, option_d, correct_answer)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {QUESTION_COLUMNS}
            "#
        ))
        .bind(&req.competency)
        .bind(req.level.as_str())
        .bind(&req.question_text)
        .bind(&req.options.a)
        .bind(&req.options.b)
        .bind(&req.options.c)
        .bind(&req.options.d)
        .bind(req.correct_answer.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn update(&self, id: i64, req: UpdateQuestionRequest) -> StoreResult<Question> {
        let content = changes_content(&req);
        let options = req.options.as_ref();

        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            r#"
            UPDATE questions SET
                competency = COALESCE($2, competency),
                level = COALESCE($3, level),
                question_text = COALESCE($4, question_text),
                option_a = COALESCE($5, option_a),
                option_b = COALESCE($6, option_b),
                option_c = COALESCE($7, option_c),
                option_d = COALESCE($8, option_d),
                correct_answer = COALESCE($9, correct_answer),
                is_active = COALESCE($10, is_active)
            WHERE id = $1 AND (times_served = 0 OR NOT $11)
            RETURNING {QUESTION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(req.competency.as_deref())
        .bind(req.level.map(CompetencyLevel::as_str))
        .bind(req.question_text.as_deref())
        .bind(options.map(|o| o.a.as_str()))
        .bind(options.map(|o| o.b.as_str()))
        .bind(options.map(|o| o.c.as_str()))
        .bind(options.map(|o| o.d.as_str()))
        .bind(req.correct_answer.map(OptionLabel::as_str))
        .bind(req.is_active)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None if self.get(id).await?.is_some() => Err(StoreError::Frozen(id)),
            None => Err(StoreError::NotFound),
        }
    }

    async fn deactivate(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("UPDATE questions SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn mark_served(&self, ids: &[i64]) -> StoreResult<()> {
        sqlx::query("UPDATE questions SET times_served = times_served + 1 WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stats(&self) -> StoreResult<Vec<LevelStats>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT level, COUNT(*) FILTER (WHERE is_active), COUNT(*)
            FROM questions
            GROUP BY level
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats: Vec<LevelStats> = CompetencyLevel::ALL
            .into_iter()
            .map(|level| LevelStats { level, active: 0, total: 0 })
            .collect();
        for (level, active, total) in rows {
            let level = parse_level(&level)?;
            if let Some(entry) = stats.iter_mut().find(|s| s.level == level) {
                entry.active = active;
                entry.total = total;
            }
        }
        Ok(stats)
    }
}
