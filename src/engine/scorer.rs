// src/engine/scorer.rs

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One of the four labelled options of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionLabel {
    A,
    B,
    C,
    D,
}

impl OptionLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            OptionLabel::A => "a",
            OptionLabel::B => "b",
            OptionLabel::C => "c",
            OptionLabel::D => "d",
        }
    }

    /// Lenient parse: anything other than a-d (any case) is `None`.
    pub fn parse(raw: &str) -> Option<OptionLabel> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "a" => Some(OptionLabel::A),
            "b" => Some(OptionLabel::B),
            "c" => Some(OptionLabel::C),
            "d" => Some(OptionLabel::D),
            _ => None,
        }
    }
}

impl fmt::Display for OptionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OptionLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OptionLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        OptionLabel::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid option '{raw}', expected a-d")))
    }
}

/// Unanswered and unrecognised selections both land on `None`.
fn lenient_option<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<OptionLabel>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(OptionLabel::parse))
}

fn serialize_option<S: Serializer>(value: &Option<OptionLabel>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value.map(OptionLabel::as_str).unwrap_or(""))
}

/// A candidate's response to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: i64,
    #[serde(default, deserialize_with = "lenient_option", serialize_with = "serialize_option")]
    pub answer: Option<OptionLabel>,
    /// Seconds spent on the question.
    #[serde(default)]
    pub time_spent: u32,
}

impl Answer {
    pub fn new(question_id: i64, answer: Option<OptionLabel>, time_spent: u32) -> Self {
        Self {
            question_id,
            answer,
            time_spent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepScore {
    pub score: u32,
    pub total_questions: u32,
    /// Unrounded; presentation layers round for display.
    pub percentage: f64,
}

impl StepScore {
    /// The only place a percentage is derived from counts.
    pub fn from_counts(score: u32, total_questions: u32) -> Self {
        let percentage = if total_questions == 0 {
            0.0
        } else {
            100.0 * f64::from(score) / f64::from(total_questions)
        };
        Self {
            score,
            total_questions,
            percentage,
        }
    }
}

/// Scores a step's answers against its answer key.
///
/// `answer_key` holds exactly the questions assigned to the step, so its size
/// is the denominator whether or not every question was answered. Answers to
/// ids outside the key and repeated answers after the first for the same
/// question are ignored.
pub fn score(answers: &[Answer], answer_key: &HashMap<i64, OptionLabel>) -> StepScore {
    let mut seen = HashSet::with_capacity(answers.len());
    let mut correct = 0u32;

    for answer in answers {
        if !seen.insert(answer.question_id) {
            continue;
        }
        let Some(expected) = answer_key.get(&answer.question_id) else {
            continue;
        };
        if answer.answer == Some(*expected) {
            correct += 1;
        }
    }

    StepScore::from_counts(correct, answer_key.len() as u32)
}

/// Sum of per-question time, counting each question once.
pub fn time_spent(answers: &[Answer]) -> u64 {
    let mut seen = HashSet::with_capacity(answers.len());
    answers
        .iter()
        .filter(|a| seen.insert(a.question_id))
        .map(|a| u64::from(a.time_spent))
        .sum()
}
