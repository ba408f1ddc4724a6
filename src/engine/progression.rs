// src/engine/progression.rs

//! The decision table that turns a scored step into the next state of an
//! assessment. Everything here is pure: the only inputs are the step's
//! percentage, the step number and the level already confirmed by earlier
//! steps.

use serde::{Deserialize, Serialize};

use super::{AssessmentStep, CompetencyLevel, EngineError};
use crate::models::assessment::StepRecord;

/// Lower bounds (inclusive) of the scoring bands, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub advance: f64,
    pub mid: f64,
    pub low: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            advance: 75.0,
            mid: 50.0,
            low: 25.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressionRules {
    pub thresholds: Thresholds,
    /// Final step of the exam; reaching the advance band here awards its
    /// higher level instead of advancing.
    pub last_step: AssessmentStep,
}

impl Default for ProgressionRules {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            last_step: AssessmentStep::Three,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Advance,
    Mid,
    Low,
    Fail,
}

impl Thresholds {
    /// NaN falls through every comparison and lands in `Fail`.
    pub fn band(&self, percentage: f64) -> Band {
        if percentage >= self.advance {
            Band::Advance
        } else if percentage >= self.mid {
            Band::Mid
        } else if percentage >= self.low {
            Band::Low
        } else {
            Band::Fail
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Open the next step; nothing is awarded yet.
    Advance { next: AssessmentStep },
    /// Complete with this level.
    Award { level: CompetencyLevel },
    /// Complete, keeping whatever earlier steps confirmed.
    Retain { level: Option<CompetencyLevel> },
    /// Complete with no level and bar the user from any further attempt.
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub outcome: Outcome,
    /// Floor carried forward to later steps.
    pub confirmed_level: Option<CompetencyLevel>,
}

impl Decision {
    pub fn final_level(&self) -> Option<CompetencyLevel> {
        match self.outcome {
            Outcome::Advance { .. } | Outcome::Block => None,
            Outcome::Award { level } => Some(level),
            Outcome::Retain { level } => level,
        }
    }

    pub fn proceed_to_next(&self) -> bool {
        matches!(self.outcome, Outcome::Advance { .. })
    }

    pub fn is_completed(&self) -> bool {
        !self.proceed_to_next()
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self.outcome, Outcome::Block)
    }
}

/// Total function over (percentage, step, prior confirmed level).
pub fn decide(
    percentage: f64,
    step: AssessmentStep,
    prior: Option<CompetencyLevel>,
    rules: &ProgressionRules,
) -> Decision {
    let (lo, hi) = step.levels();
    let not_below_prior = |level: CompetencyLevel| prior.map_or(level, |p| p.max(level));

    let outcome = match rules.thresholds.band(percentage) {
        Band::Advance => match step.next() {
            Some(next) if step < rules.last_step => Outcome::Advance { next },
            _ => Outcome::Award {
                level: not_below_prior(hi),
            },
        },
        Band::Mid => Outcome::Award {
            level: not_below_prior(hi),
        },
        Band::Low => Outcome::Award {
            level: not_below_prior(lo),
        },
        Band::Fail if step == AssessmentStep::One => Outcome::Block,
        Band::Fail => Outcome::Retain { level: prior },
    };

    let confirmed_level = match outcome {
        Outcome::Advance { .. } => Some(not_below_prior(hi)),
        Outcome::Award { level } => Some(level),
        Outcome::Retain { level } => level,
        Outcome::Block => None,
    };

    Decision {
        outcome,
        confirmed_level,
    }
}

/// Decides a completed step record.
///
/// A record that already carries a decision returns it unchanged, so a
/// retried submission never rescores.
pub fn evaluate(
    record: &StepRecord,
    prior: Option<CompetencyLevel>,
    rules: &ProgressionRules,
) -> Result<Decision, EngineError> {
    if let Some(decision) = record.decision {
        return Ok(decision);
    }
    let percentage = record.percentage()?;
    Ok(decide(percentage, record.step, prior, rules))
}
