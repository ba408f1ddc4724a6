// src/config.rs

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use dotenvy::dotenv;
use thiserror::Error;
use url::Url;

use crate::engine::{AssessmentStep, ProgressionRules, Thresholds};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Tunables of the scoring engine and step lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentConfig {
    /// Questions served per step; split evenly between the step's levels.
    pub questions_per_step: usize,
    pub thresholds: Thresholds,
    /// Number of steps in the exam (1..=3).
    pub step_count: u8,
    pub time_per_question_secs: u32,
    /// Extra time after the nominal countdown before an opened step counts
    /// as abandoned.
    pub submit_grace_secs: u32,
    pub certificate_retry_interval_secs: u64,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            questions_per_step: 44,
            thresholds: Thresholds::default(),
            step_count: 3,
            time_per_question_secs: 60,
            submit_grace_secs: 120,
            certificate_retry_interval_secs: 60,
        }
    }
}

impl AssessmentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.questions_per_step == 0 || self.questions_per_step % 2 != 0 {
            return Err(invalid("QUESTIONS_PER_STEP", "must be a positive even number"));
        }
        let t = &self.thresholds;
        if !(0.0 <= t.low && t.low <= t.mid && t.mid <= t.advance && t.advance <= 100.0) {
            return Err(invalid(
                "THRESHOLDS",
                "expected 0 <= LOW_THRESHOLD <= MID_THRESHOLD <= ADVANCE_THRESHOLD <= 100",
            ));
        }
        if AssessmentStep::try_from(self.step_count).is_err() {
            return Err(invalid("STEP_COUNT", "must be 1, 2 or 3"));
        }
        if self.time_per_question_secs == 0 {
            return Err(invalid("TIME_PER_QUESTION_SECS", "must be positive"));
        }
        Ok(())
    }

    pub fn last_step(&self) -> AssessmentStep {
        AssessmentStep::try_from(self.step_count).unwrap_or(AssessmentStep::Three)
    }

    pub fn rules(&self) -> ProgressionRules {
        ProgressionRules {
            thresholds: self.thresholds,
            last_step: self.last_step(),
        }
    }

    /// Seconds an opened step with `questions` questions stays submittable
    /// before it is treated as abandoned.
    pub fn lease_secs(&self, questions: usize) -> i64 {
        let nominal = questions as i64 * i64::from(self.time_per_question_secs);
        nominal + i64::from(self.submit_grace_secs)
    }

    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            questions_per_step: parse_var("QUESTIONS_PER_STEP", defaults.questions_per_step)?,
            thresholds: Thresholds {
                advance: parse_var("ADVANCE_THRESHOLD", defaults.thresholds.advance)?,
                mid: parse_var("MID_THRESHOLD", defaults.thresholds.mid)?,
                low: parse_var("LOW_THRESHOLD", defaults.thresholds.low)?,
            },
            step_count: parse_var("STEP_COUNT", defaults.step_count)?,
            time_per_question_secs: parse_var("TIME_PER_QUESTION_SECS", defaults.time_per_question_secs)?,
            submit_grace_secs: parse_var("SUBMIT_GRACE_SECS", defaults.submit_grace_secs)?,
            certificate_retry_interval_secs: parse_var(
                "CERTIFICATE_RETRY_INTERVAL_SECS",
                defaults.certificate_retry_interval_secs,
            )?,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Without a database the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub rust_log: String,
    pub listen_addr: SocketAddr,
    /// Base URL of the certificate service; issuance stays pending when unset.
    pub certificate_service_url: Option<Url>,
    pub assessment: AssessmentConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let listen_addr = parse_var("LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        let certificate_service_url = match env::var("CERTIFICATE_SERVICE_URL") {
            Ok(raw) if !raw.is_empty() => {
                Some(Url::parse(&raw).map_err(|e| invalid("CERTIFICATE_SERVICE_URL", e))?)
            }
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            rust_log,
            listen_addr,
            certificate_service_url,
            assessment: AssessmentConfig::from_env()?,
        })
    }
}

fn invalid(name: &'static str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.to_string(),
    }
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|e: T::Err| invalid(name, e)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AssessmentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rules(), ProgressionRules::default());
        // 44 questions at 60s plus two minutes of grace.
        assert_eq!(config.lease_secs(44), 44 * 60 + 120);
    }

    #[test]
    fn odd_question_count_is_rejected() {
        let config = AssessmentConfig {
            questions_per_step: 43,
            ..AssessmentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unordered_thresholds_are_rejected() {
        let config = AssessmentConfig {
            thresholds: Thresholds {
                advance: 50.0,
                mid: 75.0,
                low: 25.0,
            },
            ..AssessmentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn step_count_is_bounded() {
        let config = AssessmentConfig {
            step_count: 4,
            ..AssessmentConfig::default()
        };
        assert!(config.validate().is_err());

        let short = AssessmentConfig {
            step_count: 2,
            ..AssessmentConfig::default()
        };
        assert_eq!(short.last_step(), AssessmentStep::Two);
    }
}
