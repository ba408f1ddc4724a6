// src/services/certificate.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::task::JoinHandle;
use url::Url;

use super::AssessmentService;
use super::locks::KeyedLocks;
use crate::engine::CompetencyLevel;
use crate::models::assessment::Assessment;
use crate::models::certificate::{CertificateRef, CertificateStatus, IssueCertificateRequest};
use crate::store::{AssessmentRepository, StoreResult};

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("certificate service is not configured")]
    NotConfigured,
    #[error("certificate service rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("certificate service transport error: {0}")]
    Transport(String),
    #[error("certificate service response decode error: {0}")]
    InvalidResponse(String),
}

/// The external service that mints certificates.
#[async_trait]
pub trait CertificateService: Send + Sync {
    async fn issue(&self, req: &IssueCertificateRequest) -> Result<CertificateRef, CertificateError>;
}

/// `POST {base}/certificates` with a JSON body.
#[derive(Clone)]
pub struct HttpCertificateService {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpCertificateService {
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self, CertificateError> {
        let mut base = base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("certificates")
            .map_err(|e| CertificateError::Transport(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CertificateError::Transport(e.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl CertificateService for HttpCertificateService {
    async fn issue(&self, req: &IssueCertificateRequest) -> Result<CertificateRef, CertificateError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(req)
            .send()
            .await
            .map_err(|e| CertificateError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(CertificateError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<CertificateRef>()
            .await
            .map_err(|e| CertificateError::InvalidResponse(e.to_string()))
    }
}

/// Stand-in used when no certificate service URL is configured; every
/// award stays pending until one is.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredCertificateService;

#[async_trait]
impl CertificateService for UnconfiguredCertificateService {
    async fn issue(&self, _req: &IssueCertificateRequest) -> Result<CertificateRef, CertificateError> {
        Err(CertificateError::NotConfigured)
    }
}

/// Turns pending awards into certificates.
#[derive(Clone)]
pub struct CertificateTrigger {
    assessments: Arc<dyn AssessmentRepository>,
    service: Arc<dyn CertificateService>,
    /// Keyed by user id: one user's awards are decided one at a time.
    users: Arc<KeyedLocks>,
}

impl CertificateTrigger {
    pub fn new(assessments: Arc<dyn AssessmentRepository>, service: Arc<dyn CertificateService>) -> Self {
        Self {
            assessments,
            service,
            users: Arc::new(KeyedLocks::default()),
        }
    }

    /// Highest level that outranks an award of `level` on `assessment`: an
    /// issued certificate on another assessment, or a pending award there
    /// that goes first (a higher level, or the same level on an older
    /// assessment).
    async fn held_level(
        &self,
        assessment: &Assessment,
        level: CompetencyLevel,
    ) -> StoreResult<Option<CompetencyLevel>> {
        let others = self.assessments.list_for_user(assessment.user_id).await?;
        Ok(others
            .iter()
            .filter(|a| a.id != assessment.id)
            .filter_map(|a| match &a.certificate {
                CertificateStatus::Issued(cert) => cert.level,
                CertificateStatus::Pending { level: other, .. }
                    if *other > level || (*other == level && a.id < assessment.id) =>
                {
                    Some(*other)
                }
                _ => None,
            })
            .max())
    }

    /// Attempts issuance for an assessment whose certificate is pending and
    /// persists the new certificate state. Issuance failures are recorded,
    /// never returned; only store failures are.
    ///
    /// Callers must hold the assessment's lock; the user's lock is taken
    /// here, after it.
    pub async fn process(&self, assessment: Assessment) -> StoreResult<Assessment> {
        let CertificateStatus::Pending { level, attempts, .. } = assessment.certificate.clone() else {
            return Ok(assessment);
        };

        let _user = self.users.acquire(assessment.user_id).await;
        let mut updated = assessment;

        if let Some(held) = self.held_level(&updated, level).await? {
            if held >= level {
                tracing::info!(
                    assessment_id = updated.id,
                    user_id = updated.user_id,
                    %level,
                    %held,
                    "Skipping certificate: user already holds an equal or higher level"
                );
                updated.certificate = CertificateStatus::Superseded { level, held };
                updated.updated_at = Utc::now();
                return self.assessments.save(&updated).await;
            }
        }

        let req = IssueCertificateRequest {
            user_id: updated.user_id,
            assessment_id: updated.id,
            level,
        };

        updated.certificate = match self.service.issue(&req).await {
            Ok(mut cert) => {
                cert.level = Some(level);
                tracing::info!(
                    assessment_id = updated.id,
                    certificate_number = %cert.certificate_number,
                    %level,
                    "Certificate issued"
                );
                CertificateStatus::Issued(cert)
            }
            Err(e) => {
                tracing::warn!(
                    assessment_id = updated.id,
                    attempts = attempts + 1,
                    "Certificate issuance failed, will retry: {}",
                    e
                );
                CertificateStatus::Pending {
                    level,
                    attempts: attempts + 1,
                    last_error: Some(e.to_string()),
                }
            }
        };
        updated.updated_at = Utc::now();
        self.assessments.save(&updated).await
    }
}

/// Outcome of one pass over pending certificates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryReport {
    pub attempted: usize,
    pub issued: usize,
    pub superseded: usize,
    pub still_pending: usize,
    pub failed: usize,
}

/// Retries pending certificates every `interval` until the task is aborted.
pub fn spawn_retry_worker(service: Arc<AssessmentService>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match service.retry_pending_certificates().await {
                Ok(report) if report.attempted > 0 => {
                    tracing::info!(?report, "Certificate retry pass finished");
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Certificate retry pass failed: {}", e),
            }
        }
    })
}
