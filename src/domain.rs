//! Domain models: quiz submissions, taxonomy enums, the diagnostic report and
//! the follow-up study plans and answer explanations built on it.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DiagnosticError;

/// One answered question.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QuizResponseRecord {
  pub question_id: String,
  pub topic: String,
  pub student_answer: String,
  pub correct_answer: String,
  pub is_correct: bool,
  /// Self-reported confidence, 1 (guess) to 5 (certain).
  pub confidence: u8,
  #[serde(default)] pub explanation: String,
  #[serde(default)] pub time_spent_seconds: u32,
}

/// Everything the analysis needs about one quiz attempt.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QuizAnalysisInput {
  pub subject: String,
  pub total_questions: usize,
  pub time_taken_minutes: f64,
  pub records: Vec<QuizResponseRecord>,
}

impl QuizAnalysisInput {
  /// Schema-level checks performed before the input reaches the cache or the model.
  pub fn validate(&self) -> Result<(), DiagnosticError> {
    if self.records.is_empty() {
      return Err(DiagnosticError::InvalidInput("records must not be empty".into()));
    }
    if self.records.len() != self.total_questions {
      return Err(DiagnosticError::InvalidInput(format!(
        "total_questions is {} but {} records were submitted",
        self.total_questions,
        self.records.len()
      )));
    }
    if !(self.time_taken_minutes.is_finite() && self.time_taken_minutes > 0.0) {
      return Err(DiagnosticError::InvalidInput("time_taken_minutes must be > 0".into()));
    }
    let mut seen = HashSet::new();
    for r in &self.records {
      if !(1..=5).contains(&r.confidence) {
        return Err(DiagnosticError::InvalidInput(format!(
          "question {}: confidence {} is outside 1..=5",
          r.question_id, r.confidence
        )));
      }
      if r.topic.trim().is_empty() {
        return Err(DiagnosticError::InvalidInput(format!("question {}: topic is blank", r.question_id)));
      }
      if !seen.insert(r.question_id.as_str()) {
        return Err(DiagnosticError::InvalidInput(format!("duplicate question_id {}", r.question_id)));
      }
    }
    Ok(())
  }

  /// Rewrite every record topic through `normalize_topic`.
  pub fn normalize_topics(&mut self) {
    for r in &mut self.records {
      let cleaned = normalize_topic(&r.topic, &self.subject);
      if cleaned != r.topic {
        r.topic = cleaned.to_string();
      }
    }
  }

  /// Distinct topics in first-appearance order.
  pub fn topics(&self) -> Vec<&str> {
    let mut seen = HashSet::new();
    self.records
      .iter()
      .map(|r| r.topic.as_str())
      .filter(|t| seen.insert(*t))
      .collect()
  }
}

/// Trim a topic name and drop a leading `"<subject>:"` qualifier.
/// Falls back to the trimmed name when nothing follows the qualifier.
pub fn normalize_topic<'a>(name: &'a str, subject: &str) -> &'a str {
  let trimmed = name.trim();
  if let Some((prefix, rest)) = trimmed.split_once(':') {
    let rest = rest.trim();
    if !rest.is_empty() && prefix.trim().eq_ignore_ascii_case(subject.trim()) {
      return rest;
    }
  }
  trimmed
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
  ConceptualGap,
  ProceduralError,
  CarelessMistake,
  KnowledgeGap,
  Misinterpretation,
}

impl ErrorType {
  pub const ALL: [ErrorType; 5] = [
    ErrorType::ConceptualGap,
    ErrorType::ProceduralError,
    ErrorType::CarelessMistake,
    ErrorType::KnowledgeGap,
    ErrorType::Misinterpretation,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      ErrorType::ConceptualGap => "conceptual_gap",
      ErrorType::ProceduralError => "procedural_error",
      ErrorType::CarelessMistake => "careless_mistake",
      ErrorType::KnowledgeGap => "knowledge_gap",
      ErrorType::Misinterpretation => "misinterpretation",
    }
  }

  /// Student-facing phrase, used in generated summaries.
  pub fn describe(self) -> &'static str {
    match self {
      ErrorType::ConceptualGap => "conceptual understanding",
      ErrorType::ProceduralError => "procedural application",
      ErrorType::CarelessMistake => "attention to detail",
      ErrorType::KnowledgeGap => "foundational knowledge",
      ErrorType::Misinterpretation => "question interpretation",
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
  Weak,
  Developing,
  Strong,
}

impl TopicStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      TopicStatus::Weak => "weak",
      TopicStatus::Developing => "developing",
      TopicStatus::Strong => "strong",
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Critical,
  Moderate,
  Mild,
}

impl Severity {
  pub fn as_str(self) -> &'static str {
    match self {
      Severity::Critical => "critical",
      Severity::Moderate => "moderate",
      Severity::Mild => "mild",
    }
  }
}

/// How the projected score is derived from the model's declared value.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScorePolicy {
  /// Keep the model's score (base + its adjustments) but clamp into range.
  #[default]
  Clamp,
  /// Replace the model's score with the deterministic base.
  Recompute,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OverallPerformance {
  pub accuracy: f64,
  pub total_questions: usize,
  pub correct_answers: usize,
  pub avg_confidence: f64,
  /// Minutes per question.
  pub time_per_question: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TopicBreakdownEntry {
  pub topic: String,
  pub questions_attempted: usize,
  pub correct_answers: usize,
  pub accuracy: f64,
  pub avg_confidence: f64,
  pub fluency_index: f64,
  pub status: TopicStatus,
  pub severity: Option<Severity>,
  pub dominant_error_type: Option<ErrorType>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorClassification {
  pub question_id: String,
  pub error_type: ErrorType,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RootCauseAnalysis {
  /// `None` when every answer was correct.
  pub primary_weakness: Option<ErrorType>,
  pub error_distribution: BTreeMap<ErrorType, u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScoreProjection {
  /// Final projected JAMB score, always within [0, 400].
  pub score: u16,
  /// Deterministic base derived from overall accuracy.
  pub base_score: u16,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub confidence_interval: Option<String>,
  pub policy: ScorePolicy,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FoundationalGap {
  pub description: String,
  #[serde(default)] pub affected_topics: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StudyWeek {
  pub week: u8,
  pub focus: String,
  pub study_hours: u32,
  #[serde(default)] pub key_activities: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StudyPlan {
  pub weekly_schedule: Vec<StudyWeek>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
  pub priority: u32,
  pub category: String,
  pub action: String,
  pub rationale: String,
}

/// A model-declared number that was replaced by the recomputed value.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Correction {
  pub field: String,
  pub declared: f64,
  pub corrected: f64,
}

/// The validated, immutable result of one analysis.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticReport {
  pub id: Uuid,
  pub subject: String,
  pub fingerprint: String,
  pub overall_performance: OverallPerformance,
  pub topic_breakdown: Vec<TopicBreakdownEntry>,
  pub weak_topics: Vec<String>,
  pub strong_topics: Vec<String>,
  pub error_classifications: Vec<ErrorClassification>,
  pub root_cause_analysis: RootCauseAnalysis,
  pub projected_score: ScoreProjection,
  pub analysis_summary: String,
  pub foundational_gaps: Vec<FoundationalGap>,
  pub study_plan: StudyPlan,
  pub recommendations: Vec<Recommendation>,
  pub corrections: Vec<Correction>,
  pub generated_at: DateTime<Utc>,
}

/// Ask for a standalone plan built on a saved diagnostic.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudyPlanRequest {
  pub diagnostic_id: Uuid,
  /// Empty means "use the diagnostic's weak topics".
  #[serde(default)]
  pub weak_topics: Vec<String>,
  pub target_score: u16,
  #[serde(default)]
  pub current_score: Option<u16>,
  #[serde(default)]
  pub weeks_available: Option<u8>,
}

/// Resolved planning parameters handed to the analyst.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PlanBrief {
  pub subject: String,
  pub weak_topics: Vec<String>,
  pub target_score: u16,
  pub current_score: u16,
  pub weeks: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GeneratedPlan {
  pub id: Uuid,
  pub diagnostic_id: Uuid,
  pub subject: String,
  pub weak_topics: Vec<String>,
  #[serde(default)]
  pub completed_topics: Vec<String>,
  pub target_score: u16,
  pub current_score: u16,
  pub weekly_schedule: Vec<StudyWeek>,
  pub generated_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdjustPlanRequest {
  pub study_plan_id: Uuid,
  #[serde(default)]
  pub completed_topics: Vec<String>,
  #[serde(default)]
  pub new_weak_topics: Vec<String>,
}

/// One question the student wants explained.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExplainRequest {
  pub question_id: String,
  #[serde(default)]
  pub question: Option<String>,
  #[serde(default)]
  pub topic: Option<String>,
  pub student_answer: String,
  pub correct_answer: String,
  pub student_reasoning: String,
  #[serde(default)]
  pub confidence: Option<u8>,
}

impl ExplainRequest {
  pub fn validate(&self) -> Result<(), DiagnosticError> {
    for (field, value) in [
      ("questionId", &self.question_id),
      ("studentAnswer", &self.student_answer),
      ("correctAnswer", &self.correct_answer),
    ] {
      if value.trim().is_empty() {
        return Err(DiagnosticError::InvalidInput(format!("{field} must not be blank")));
      }
    }
    if let Some(c) = self.confidence {
      if !(1..=5).contains(&c) {
        return Err(DiagnosticError::InvalidInput(format!("confidence {c} is outside 1..=5")));
      }
    }
    Ok(())
  }

  /// Answers compared case-insensitively, ignoring surrounding whitespace.
  pub fn is_correct(&self) -> bool {
    self.student_answer.trim().eq_ignore_ascii_case(self.correct_answer.trim())
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerExplanation {
  pub question_id: String,
  pub is_correct: bool,
  pub explanation: String,
  pub correct_reasoning: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub common_mistake: Option<String>,
  #[serde(default)]
  pub related_topics: Vec<String>,
  /// Absent for a correct answer.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_type: Option<ErrorType>,
}
