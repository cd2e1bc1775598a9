//! Quantitative recomputation engine.
//!
//! Every number the model returns is advisory. Accuracy, Fluency Index, status
//! and the score base are recomputed here from the raw quiz records; the
//! assembler uses these values and records where the model disagreed.

use tracing::warn;

use crate::domain::{Correction, OverallPerformance, QuizAnalysisInput, ScorePolicy, Severity, TopicStatus};
use crate::error::DiagnosticError;

pub const MAX_SCORE: u16 = 400;
const WEAK_FLUENCY: f64 = 50.0;
const WEAK_ACCURACY: f64 = 60.0;
const STRONG_FLUENCY: f64 = 70.0;
const STRONG_ACCURACY: f64 = 75.0;
const CRITICAL_ACCURACY: f64 = 40.0;
/// Declared values within this distance of the recomputed one are not reported as corrections.
const DEVIATION_TOLERANCE: f64 = 0.5;

/// Percentage of correct answers. Zero questions yields 0 rather than NaN.
pub fn accuracy(correct: usize, total: usize) -> f64 {
  if total == 0 {
    return 0.0;
  }
  correct as f64 / total as f64 * 100.0
}

/// Accuracy discounted by confidence: `accuracy × (avg_confidence / 5)`, in [0, 100].
pub fn fluency_index(accuracy: f64, avg_confidence: f64) -> f64 {
  (accuracy * (avg_confidence / 5.0)).clamp(0.0, 100.0)
}

/// Weak is checked first and wins even when one strong condition holds.
pub fn assign_status(fluency_index: f64, accuracy: f64) -> TopicStatus {
  if fluency_index < WEAK_FLUENCY || accuracy < WEAK_ACCURACY {
    TopicStatus::Weak
  } else if fluency_index > STRONG_FLUENCY && accuracy > STRONG_ACCURACY {
    TopicStatus::Strong
  } else {
    TopicStatus::Developing
  }
}

pub fn severity_for(status: TopicStatus, accuracy: f64) -> Option<Severity> {
  match status {
    TopicStatus::Weak if accuracy < CRITICAL_ACCURACY => Some(Severity::Critical),
    TopicStatus::Weak | TopicStatus::Developing => Some(Severity::Moderate),
    TopicStatus::Strong => None,
  }
}

/// `overall_accuracy × 400 / 100`, rounded.
pub fn base_score(overall_accuracy: f64) -> u16 {
  clamp_score(overall_accuracy * f64::from(MAX_SCORE) / 100.0)
}

pub fn clamp_score(value: f64) -> u16 {
  value.round().clamp(0.0, f64::from(MAX_SCORE)) as u16
}

/// Final score under the configured policy. Adjustments the model layered on
/// the base are kept under `Clamp`; only the range is enforced.
pub fn project_score(declared: f64, base: u16, policy: ScorePolicy) -> u16 {
  match policy {
    ScorePolicy::Clamp => clamp_score(declared),
    ScorePolicy::Recompute => base,
  }
}

/// Ground-truth statistics for one topic.
#[derive(Clone, Debug, PartialEq)]
pub struct TopicStats {
  pub topic: String,
  pub questions: usize,
  pub correct: usize,
  pub accuracy: f64,
  pub avg_confidence: f64,
  pub fluency_index: f64,
  pub status: TopicStatus,
  pub severity: Option<Severity>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Recomputed {
  pub overall: OverallPerformance,
  pub topics: Vec<TopicStats>,
}

/// Group records by topic (first-appearance order) and derive every metric.
pub fn recompute(input: &QuizAnalysisInput) -> Recomputed {
  let topics = input
    .topics()
    .into_iter()
    .map(|topic| {
      let records: Vec<_> = input.records.iter().filter(|r| r.topic == topic).collect();
      let questions = records.len();
      let correct = records.iter().filter(|r| r.is_correct).count();
      let avg_confidence = records.iter().map(|r| f64::from(r.confidence)).sum::<f64>() / questions as f64;
      let acc = accuracy(correct, questions);
      let fi = fluency_index(acc, avg_confidence);
      let status = assign_status(fi, acc);
      TopicStats {
        topic: topic.to_string(),
        questions,
        correct,
        accuracy: acc,
        avg_confidence,
        fluency_index: fi,
        status,
        severity: severity_for(status, acc),
      }
    })
    .collect();

  let total = input.records.len();
  let correct = input.records.iter().filter(|r| r.is_correct).count();
  let avg_confidence = if total == 0 {
    0.0
  } else {
    input.records.iter().map(|r| f64::from(r.confidence)).sum::<f64>() / total as f64
  };
  let time_per_question = if total == 0 { 0.0 } else { input.time_taken_minutes / total as f64 };

  Recomputed {
    overall: OverallPerformance {
      accuracy: accuracy(correct, total),
      total_questions: total,
      correct_answers: correct,
      avg_confidence,
      time_per_question,
    },
    topics,
  }
}

/// Require a declared value, then keep the recomputed one.
///
/// A missing value is an `IncompleteAnalysis`; a present value that deviates
/// (including out-of-range values) is recorded as a correction.
pub fn reconcile(
  field: &str,
  declared: Option<f64>,
  recomputed: f64,
  corrections: &mut Vec<Correction>,
) -> Result<f64, DiagnosticError> {
  let declared = declared.ok_or_else(|| DiagnosticError::incomplete(field))?;
  if (declared - recomputed).abs() > DEVIATION_TOLERANCE {
    warn!(target: "diagnostic", %field, declared, recomputed, "Model value disagrees with recomputation; overriding");
    corrections.push(Correction { field: field.to_string(), declared, corrected: recomputed });
  }
  Ok(recomputed)
}
