//! Closed-set validation for qualitative labels coming back from the model.
//!
//! A label is either an exact member of its field's allowed set or a hard
//! failure. There is no trimming, case folding or nearest-match mapping.

use thiserror::Error;

use crate::domain::{ErrorType, Severity, TopicStatus};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("taxonomy violation on `{field}`: {value:?} is not one of {allowed:?}")]
pub struct TaxonomyViolation {
  pub field: String,
  pub value: String,
  pub allowed: &'static [&'static str],
}

/// Returns `value` unchanged when it is a member of `allowed`.
pub fn ensure_member<'a>(
  field: &str,
  value: &'a str,
  allowed: &'static [&'static str],
) -> Result<&'a str, TaxonomyViolation> {
  if allowed.contains(&value) {
    Ok(value)
  } else {
    Err(TaxonomyViolation { field: field.to_string(), value: value.to_string(), allowed })
  }
}

impl ErrorType {
  pub const LABELS: &'static [&'static str] = &[
    "conceptual_gap",
    "procedural_error",
    "careless_mistake",
    "knowledge_gap",
    "misinterpretation",
  ];

  pub fn parse_label(field: &str, value: &str) -> Result<Self, TaxonomyViolation> {
    Ok(match ensure_member(field, value, Self::LABELS)? {
      "conceptual_gap" => Self::ConceptualGap,
      "procedural_error" => Self::ProceduralError,
      "careless_mistake" => Self::CarelessMistake,
      "knowledge_gap" => Self::KnowledgeGap,
      _ => Self::Misinterpretation,
    })
  }
}

impl TopicStatus {
  pub const LABELS: &'static [&'static str] = &["weak", "developing", "strong"];

  pub fn parse_label(field: &str, value: &str) -> Result<Self, TaxonomyViolation> {
    Ok(match ensure_member(field, value, Self::LABELS)? {
      "weak" => Self::Weak,
      "developing" => Self::Developing,
      _ => Self::Strong,
    })
  }
}

impl Severity {
  pub const LABELS: &'static [&'static str] = &["critical", "moderate", "mild"];

  pub fn parse_label(field: &str, value: &str) -> Result<Self, TaxonomyViolation> {
    Ok(match ensure_member(field, value, Self::LABELS)? {
      "critical" => Self::Critical,
      "moderate" => Self::Moderate,
      _ => Self::Mild,
    })
  }
}
