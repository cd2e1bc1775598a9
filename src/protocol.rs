//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::Serialize;

use crate::auth::{VerificationTier, VerifiedToken};
use crate::domain::{DiagnosticReport, GeneratedPlan};

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub analyst: &'static str,
    #[serde(rename = "cachedReports")]
    pub cached_reports: usize,
    #[serde(rename = "inflightAnalyses")]
    pub inflight_analyses: usize,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeOut {
    pub report: DiagnosticReport,
    /// `hit`, `computed` or `joined`.
    pub cache: &'static str,
    /// Whether the caller's credential was cryptographically verified.
    #[serde(rename = "credentialVerified")]
    pub credential_verified: bool,
}

#[derive(Debug, Serialize)]
pub struct AdjustPlanOut {
    #[serde(rename = "updatedPlan")]
    pub updated_plan: GeneratedPlan,
}

#[derive(Debug, Serialize)]
pub struct SessionOut {
    pub subject: String,
    pub email: Option<String>,
    pub tier: VerificationTier,
    pub verified: bool,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<i64>,
}

impl From<&VerifiedToken> for SessionOut {
    fn from(t: &VerifiedToken) -> Self {
        Self {
            subject: t.claims.subject.clone(),
            email: t.claims.email.clone(),
            tier: t.tier,
            verified: t.is_verified(),
            expires_at: t.claims.expires_at,
        }
    }
}
