// src/engine/selection.rs

use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;

use super::{AssessmentStep, CompetencyLevel, EngineError};
use crate::models::question::Question;
use crate::store::{QuestionRepository, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Draws `per_step` questions for `step`, half from each of its two levels,
/// skipping anything in `exclude`, in random order.
pub async fn select_questions(
    questions: &dyn QuestionRepository,
    step: AssessmentStep,
    exclude: &[i64],
    per_step: usize,
) -> Result<Vec<Question>, SelectionError> {
    let half = per_step / 2;
    let (lo, hi) = step.levels();

    let lo_pool = questions.random_active(lo, exclude, half).await?;
    let hi_pool = questions.random_active(hi, exclude, half).await?;

    let selected = assemble(step, lo_pool, hi_pool, exclude, per_step, &mut rand::thread_rng())?;
    tracing::debug!(step = %step, count = selected.len(), "Selected step questions");
    Ok(selected)
}

/// Checks and combines the two per-level draws.
///
/// The repository is trusted for randomness but not for shape: anything from
/// the wrong level, inactive, excluded or repeated is dropped before counting.
pub fn assemble<R: Rng + ?Sized>(
    step: AssessmentStep,
    lo_pool: Vec<Question>,
    hi_pool: Vec<Question>,
    exclude: &[i64],
    per_step: usize,
    rng: &mut R,
) -> Result<Vec<Question>, EngineError> {
    let half = per_step / 2;
    let (lo, hi) = step.levels();
    let excluded: HashSet<i64> = exclude.iter().copied().collect();
    let mut seen = HashSet::with_capacity(per_step);

    let mut take = |pool: Vec<Question>, level: CompetencyLevel| -> Result<Vec<Question>, EngineError> {
        let picked: Vec<Question> = pool
            .into_iter()
            .filter(|q| q.level == level && q.is_active && !excluded.contains(&q.id))
            .filter(|q| seen.insert(q.id))
            .take(half)
            .collect();
        if picked.len() < half {
            return Err(EngineError::InsufficientQuestionPool {
                level,
                available: picked.len(),
                required: half,
            });
        }
        Ok(picked)
    };

    let mut selected = take(lo_pool, lo)?;
    selected.extend(take(hi_pool, hi)?);
    selected.shuffle(rng);
    Ok(selected)
}
