// src/engine/level.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::EngineError;

/// Proficiency tiers, declared in increasing order so that the derived
/// `Ord` is the proficiency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CompetencyLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl CompetencyLevel {
    pub const ALL: [CompetencyLevel; 6] = [
        CompetencyLevel::A1,
        CompetencyLevel::A2,
        CompetencyLevel::B1,
        CompetencyLevel::B2,
        CompetencyLevel::C1,
        CompetencyLevel::C2,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CompetencyLevel::A1 => "A1",
            CompetencyLevel::A2 => "A2",
            CompetencyLevel::B1 => "B1",
            CompetencyLevel::B2 => "B2",
            CompetencyLevel::C1 => "C1",
            CompetencyLevel::C2 => "C2",
        }
    }

    /// The step whose question pool contains this level.
    pub fn step(self) -> AssessmentStep {
        match self {
            CompetencyLevel::A1 | CompetencyLevel::A2 => AssessmentStep::One,
            CompetencyLevel::B1 | CompetencyLevel::B2 => AssessmentStep::Two,
            CompetencyLevel::C1 | CompetencyLevel::C2 => AssessmentStep::Three,
        }
    }
}

impl fmt::Display for CompetencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompetencyLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CompetencyLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EngineError::UnknownLevel(s.to_string()))
    }
}

/// One of the three sequential exam phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AssessmentStep {
    One = 1,
    Two = 2,
    Three = 3,
}

impl AssessmentStep {
    pub const ALL: [AssessmentStep; 3] = [AssessmentStep::One, AssessmentStep::Two, AssessmentStep::Three];

    pub fn number(self) -> u8 {
        self as u8
    }

    /// The (lower, higher) level pair examined by this step.
    pub fn levels(self) -> (CompetencyLevel, CompetencyLevel) {
        match self {
            AssessmentStep::One => (CompetencyLevel::A1, CompetencyLevel::A2),
            AssessmentStep::Two => (CompetencyLevel::B1, CompetencyLevel::B2),
            AssessmentStep::Three => (CompetencyLevel::C1, CompetencyLevel::C2),
        }
    }

    pub fn lo(self) -> CompetencyLevel {
        self.levels().0
    }

    pub fn hi(self) -> CompetencyLevel {
        self.levels().1
    }

    pub fn next(self) -> Option<AssessmentStep> {
        match self {
            AssessmentStep::One => Some(AssessmentStep::Two),
            AssessmentStep::Two => Some(AssessmentStep::Three),
            AssessmentStep::Three => None,
        }
    }
}

impl TryFrom<u8> for AssessmentStep {
    type Error = EngineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AssessmentStep::One),
            2 => Ok(AssessmentStep::Two),
            3 => Ok(AssessmentStep::Three),
            other => Err(EngineError::UnknownStep(other as i64)),
        }
    }
}

impl TryFrom<i64> for AssessmentStep {
    type Error = EngineError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| EngineError::UnknownStep(value))
            .and_then(AssessmentStep::try_from)
    }
}

impl From<AssessmentStep> for u8 {
    fn from(step: AssessmentStep) -> Self {
        step.number()
    }
}

impl fmt::Display for AssessmentStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}
