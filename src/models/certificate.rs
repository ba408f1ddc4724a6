// src/models/certificate.rs

use serde::{Deserialize, Serialize};

use crate::engine::CompetencyLevel;

/// Body sent to the certificate service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCertificateRequest {
    pub user_id: i64,
    pub assessment_id: i64,
    pub level: CompetencyLevel,
}

/// What the certificate service hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRef {
    pub certificate_id: String,
    pub certificate_number: String,
    pub verification_code: String,
    /// Filled in locally; the service does not echo it.
    #[serde(default)]
    pub level: Option<CompetencyLevel>,
}

/// Issuance state recorded on an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CertificateStatus {
    /// No level awarded.
    #[default]
    NotApplicable,
    /// Awarded but not yet confirmed by the certificate service.
    #[serde(rename_all = "camelCase")]
    Pending {
        level: CompetencyLevel,
        attempts: u32,
        last_error: Option<String>,
    },
    Issued(CertificateRef),
    /// Not requested because the user already holds an equal or higher level.
    Superseded {
        level: CompetencyLevel,
        held: CompetencyLevel,
    },
}

impl CertificateStatus {
    pub fn issued(&self) -> Option<&CertificateRef> {
        match self {
            CertificateStatus::Issued(cert) => Some(cert),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, CertificateStatus::Pending { .. })
    }
}
