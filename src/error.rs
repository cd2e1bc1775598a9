//! Error taxonomy for the diagnostic pipeline and the HTTP surface.
//!
//! Every failure that can reach a client carries structured detail (field name,
//! offending value, allowed/missing sets). Nothing here is retried inside the
//! core; retry policy belongs to the caller.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::auth::AuthError;
use crate::taxonomy::TaxonomyViolation;

/// Failures of the analysis pipeline (input validation, AI output validation, AI transport).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DiagnosticError {
  #[error(transparent)]
  Taxonomy(#[from] TaxonomyViolation),

  #[error("incomplete analysis: missing required field `{field}`")]
  IncompleteAnalysis { field: String },

  #[error("topic coverage mismatch (missing: {missing:?}, extraneous: {extraneous:?}, duplicated: {duplicated:?})")]
  TopicCoverageMismatch {
    missing: Vec<String>,
    extraneous: Vec<String>,
    duplicated: Vec<String>,
  },

  #[error("error classification mismatch (unclassified: {unclassified:?}, unexpected: {unexpected:?})")]
  ClassificationMismatch {
    unclassified: Vec<String>,
    unexpected: Vec<String>,
  },

  #[error("invalid field `{field}`: {reason}")]
  InvalidField { field: String, reason: String },

  #[error("upstream returned malformed output: {0}")]
  UpstreamFormat(String),

  #[error("upstream call failed (status {status}): {message}")]
  Upstream { status: u16, message: String },

  #[error("invalid input: {0}")]
  InvalidInput(String),
}

impl DiagnosticError {
  pub fn incomplete(field: impl Into<String>) -> Self {
    Self::IncompleteAnalysis { field: field.into() }
  }

  pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
    Self::InvalidField { field: field.into(), reason: reason.into() }
  }

  /// Stable machine-readable code used in API responses and logs.
  pub fn code(&self) -> &'static str {
    match self {
      Self::Taxonomy(_) => "taxonomy_violation",
      Self::IncompleteAnalysis { .. } => "incomplete_analysis",
      Self::TopicCoverageMismatch { .. } => "topic_coverage_mismatch",
      Self::ClassificationMismatch { .. } => "classification_mismatch",
      Self::InvalidField { .. } => "invalid_field",
      Self::UpstreamFormat(_) => "upstream_format_error",
      Self::Upstream { .. } => "upstream_unavailable",
      Self::InvalidInput(_) => "invalid_input",
    }
  }

  pub fn details(&self) -> Value {
    match self {
      Self::Taxonomy(v) => json!({ "field": v.field, "value": v.value, "allowed": v.allowed }),
      Self::IncompleteAnalysis { field } => json!({ "field": field }),
      Self::TopicCoverageMismatch { missing, extraneous, duplicated } => {
        json!({ "missing": missing, "extraneous": extraneous, "duplicated": duplicated })
      }
      Self::ClassificationMismatch { unclassified, unexpected } => {
        json!({ "unclassified": unclassified, "unexpected": unexpected })
      }
      Self::InvalidField { field, reason } => json!({ "field": field, "reason": reason }),
      Self::Upstream { status, .. } => json!({ "status": status }),
      Self::UpstreamFormat(_) | Self::InvalidInput(_) => Value::Null,
    }
  }

  pub fn status_code(&self) -> StatusCode {
    match self {
      Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
      Self::Upstream { status, .. } => match *status {
        408 | 504 => StatusCode::GATEWAY_TIMEOUT,
        429 => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::SERVICE_UNAVAILABLE,
      },
      // The model produced output we refuse to serve.
      _ => StatusCode::BAD_GATEWAY,
    }
  }
}

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Diagnostic(#[from] DiagnosticError),

  #[error(transparent)]
  Auth(#[from] AuthError),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, code, details) = match &self {
      ApiError::Diagnostic(e) => (e.status_code(), e.code(), e.details()),
      ApiError::Auth(e) => (StatusCode::UNAUTHORIZED, e.code(), Value::Null),
      ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden", Value::Null),
      ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", Value::Null),
    };
    let body = json!({ "error": code, "message": self.to_string(), "details": details });
    (status, Json(body)).into_response()
  }
}
