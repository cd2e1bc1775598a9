//! Diagnostic assembler: turns untrusted model output into a validated report.
//!
//! The model's JSON is parsed into option-typed raw structs so that a missing
//! field can be named precisely instead of surfacing as a generic serde error.
//! Quantitative fields are recomputed (see `scoring`), qualitative labels are
//! checked against closed sets (see `taxonomy`), narrative text passes through.
//! The result is either a complete `DiagnosticReport` or a named error.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::domain::{
  normalize_topic, Correction, DiagnosticReport, ErrorClassification, ErrorType, FoundationalGap, OverallPerformance,
  QuizAnalysisInput, Recommendation, RootCauseAnalysis, ScorePolicy, ScoreProjection, Severity, StudyPlan,
  StudyWeek, TopicBreakdownEntry, TopicStatus,
};
use crate::error::DiagnosticError;
use crate::scoring::{self, TopicStats};
use crate::util::{round2, strip_code_fences, trunc_for_log};

pub const STUDY_PLAN_WEEKS: usize = 6;

#[derive(Deserialize)]
struct RawAnalysis {
  analysis_summary: Option<String>,
  overall_performance: Option<RawOverall>,
  topic_breakdown: Option<Vec<RawTopic>>,
  weak_topics: Option<Vec<String>>,
  strong_topics: Option<Vec<String>>,
  error_classifications: Option<Vec<RawClassification>>,
  predicted_jamb_score: Option<RawScore>,
  foundational_gaps: Option<Vec<FoundationalGap>>,
  study_plan: Option<RawStudyPlan>,
  #[serde(default)]
  recommendations: Option<Vec<Recommendation>>,
}

#[derive(Deserialize)]
struct RawOverall {
  accuracy: Option<f64>,
}

#[derive(Deserialize)]
struct RawTopic {
  topic: Option<String>,
  accuracy: Option<f64>,
  fluency_index: Option<f64>,
  status: Option<String>,
  severity: Option<String>,
  dominant_error_type: Option<String>,
  description: Option<String>,
}

#[derive(Deserialize)]
struct RawClassification {
  question_id: Option<String>,
  error_type: Option<String>,
}

#[derive(Deserialize)]
struct RawScore {
  score: Option<f64>,
  confidence_interval: Option<String>,
}

#[derive(Deserialize)]
struct RawStudyPlan {
  weekly_schedule: Option<Vec<StudyWeek>>,
}

#[derive(Clone, Debug)]
pub struct Assembler {
  pub policy: ScorePolicy,
}

impl Assembler {
  pub fn new(policy: ScorePolicy) -> Self {
    Self { policy }
  }

  #[instrument(level = "info", target = "diagnostic", skip(self, input, raw), fields(subject = %input.subject, raw_len = raw.len()))]
  pub fn assemble(
    &self,
    input: &QuizAnalysisInput,
    fingerprint: &str,
    raw: &str,
  ) -> Result<DiagnosticReport, DiagnosticError> {
    let text = strip_code_fences(raw);
    let parsed: RawAnalysis = serde_json::from_str(text).map_err(|e| {
      warn!(target: "diagnostic", error = %trunc_for_log(&e.to_string(), 200), text_len = text.len(), "Model output is not the expected JSON");
      DiagnosticError::UpstreamFormat(e.to_string())
    })?;

    let recomputed = scoring::recompute(input);
    let mut corrections = Vec::new();

    let analysis_summary = parsed.analysis_summary.ok_or_else(|| DiagnosticError::incomplete("analysis_summary"))?;
    let raw_topics = parsed.topic_breakdown.ok_or_else(|| DiagnosticError::incomplete("topic_breakdown"))?;

    let by_topic = check_topic_coverage(input, raw_topics)?;

    if let Some(overall) = parsed.overall_performance {
      scoring::reconcile(
        "overall_performance.accuracy",
        overall.accuracy,
        recomputed.overall.accuracy,
        &mut corrections,
      )?;
    }

    let classifications = validate_classifications(input, parsed.error_classifications)?;
    let dominant = dominant_error_types(input, &classifications);

    let mut topic_breakdown = Vec::with_capacity(recomputed.topics.len());
    for stats in &recomputed.topics {
      // Coverage guarantees presence.
      let Some(raw_topic) = by_topic.get(stats.topic.as_str()) else {
        return Err(DiagnosticError::incomplete(format!("topic_breakdown[{}]", stats.topic)));
      };
      topic_breakdown.push(self.merge_topic(stats, raw_topic, dominant.get(stats.topic.as_str()).copied(), &mut corrections)?);
    }

    let overall = OverallPerformance {
      accuracy: round2(recomputed.overall.accuracy),
      avg_confidence: round2(recomputed.overall.avg_confidence),
      time_per_question: round2(recomputed.overall.time_per_question),
      ..recomputed.overall.clone()
    };

    let weak_topics = topics_with_status(&topic_breakdown, TopicStatus::Weak);
    let strong_topics = topics_with_status(&topic_breakdown, TopicStatus::Strong);
    log_list_disagreement("weak_topics", parsed.weak_topics.as_deref(), &weak_topics);
    log_list_disagreement("strong_topics", parsed.strong_topics.as_deref(), &strong_topics);

    let raw_score = parsed.predicted_jamb_score.ok_or_else(|| DiagnosticError::incomplete("predicted_jamb_score"))?;
    let declared = raw_score.score.ok_or_else(|| DiagnosticError::incomplete("predicted_jamb_score.score"))?;
    let base = scoring::base_score(recomputed.overall.accuracy);
    let score = scoring::project_score(declared, base, self.policy);
    if (declared - f64::from(score)).abs() > 0.5 {
      warn!(target: "diagnostic", declared, score, base, policy = ?self.policy, "Projected score corrected");
      corrections.push(Correction {
        field: "predicted_jamb_score.score".into(),
        declared,
        corrected: f64::from(score),
      });
    }

    let foundational_gaps = parsed.foundational_gaps.ok_or_else(|| DiagnosticError::incomplete("foundational_gaps"))?;
    let study_plan = validate_study_plan(parsed.study_plan)?;

    let report = DiagnosticReport {
      id: Uuid::new_v4(),
      subject: input.subject.clone(),
      fingerprint: fingerprint.to_string(),
      overall_performance: overall,
      topic_breakdown,
      weak_topics,
      strong_topics,
      root_cause_analysis: root_cause(&classifications),
      error_classifications: classifications,
      projected_score: ScoreProjection {
        score,
        base_score: base,
        confidence_interval: raw_score.confidence_interval,
        policy: self.policy,
      },
      analysis_summary,
      foundational_gaps,
      study_plan,
      recommendations: parsed.recommendations.unwrap_or_default(),
      corrections,
      generated_at: Utc::now(),
    };

    debug!(
      target: "diagnostic",
      report_id = %report.id,
      score = report.projected_score.score,
      weak = report.weak_topics.len(),
      corrections = report.corrections.len(),
      "Diagnostic report assembled"
    );
    Ok(report)
  }

  fn merge_topic(
    &self,
    stats: &TopicStats,
    raw: &RawTopic,
    dominant_error_type: Option<ErrorType>,
    corrections: &mut Vec<Correction>,
  ) -> Result<TopicBreakdownEntry, DiagnosticError> {
    let field = |name: &str| format!("topic_breakdown[{}].{}", stats.topic, name);

    let declared_status = raw.status.as_deref().ok_or_else(|| DiagnosticError::incomplete(field("status")))?;
    let declared_status = TopicStatus::parse_label(&field("status"), declared_status)?;
    if let Some(sev) = raw.severity.as_deref() {
      Severity::parse_label(&field("severity"), sev)?;
    }
    if let Some(det) = raw.dominant_error_type.as_deref() {
      ErrorType::parse_label(&field("dominant_error_type"), det)?;
    }

    let accuracy = scoring::reconcile(&field("accuracy"), raw.accuracy, stats.accuracy, corrections)?;
    let fluency_index = scoring::reconcile(&field("fluency_index"), raw.fluency_index, stats.fluency_index, corrections)?;

    if declared_status != stats.status {
      warn!(
        target: "diagnostic",
        topic = %stats.topic,
        declared = declared_status.as_str(),
        recomputed = stats.status.as_str(),
        "Model status disagrees with thresholds; using recomputed status"
      );
    }

    Ok(TopicBreakdownEntry {
      topic: stats.topic.clone(),
      questions_attempted: stats.questions,
      correct_answers: stats.correct,
      accuracy: round2(accuracy),
      avg_confidence: round2(stats.avg_confidence),
      fluency_index: round2(fluency_index),
      status: stats.status,
      severity: stats.severity,
      dominant_error_type,
      description: raw.description.clone(),
    })
  }
}

/// Every input topic exactly once, nothing else.
fn check_topic_coverage(
  input: &QuizAnalysisInput,
  raw_topics: Vec<RawTopic>,
) -> Result<HashMap<String, RawTopic>, DiagnosticError> {
  let expected = input.topics();
  let expected_set: HashSet<&str> = expected.iter().copied().collect();

  let mut by_topic: HashMap<String, RawTopic> = HashMap::new();
  let mut extraneous = Vec::new();
  let mut duplicated = Vec::new();
  for (i, raw) in raw_topics.into_iter().enumerate() {
    let name = raw
      .topic
      .as_deref()
      .map(|t| normalize_topic(t, &input.subject).to_string())
      .ok_or_else(|| DiagnosticError::incomplete(format!("topic_breakdown[{i}].topic")))?;
    if !expected_set.contains(name.as_str()) {
      extraneous.push(name);
    } else if by_topic.contains_key(&name) {
      if !duplicated.contains(&name) {
        duplicated.push(name);
      }
    } else {
      by_topic.insert(name, raw);
    }
  }
  let missing: Vec<String> = expected
    .iter()
    .filter(|t| !by_topic.contains_key(**t))
    .map(|t| t.to_string())
    .collect();

  if missing.is_empty() && extraneous.is_empty() && duplicated.is_empty() {
    Ok(by_topic)
  } else {
    warn!(target: "diagnostic", ?missing, ?extraneous, ?duplicated, "Topic coverage mismatch");
    Err(DiagnosticError::TopicCoverageMismatch { missing, extraneous, duplicated })
  }
}

/// Each incorrect record classified exactly once with a known label; nothing else classified.
fn validate_classifications(
  input: &QuizAnalysisInput,
  raw: Option<Vec<RawClassification>>,
) -> Result<Vec<ErrorClassification>, DiagnosticError> {
  let raw = raw.ok_or_else(|| DiagnosticError::incomplete("error_classifications"))?;
  let incorrect: HashSet<&str> = input
    .records
    .iter()
    .filter(|r| !r.is_correct)
    .map(|r| r.question_id.as_str())
    .collect();

  let mut classified: HashMap<String, ErrorType> = HashMap::new();
  let mut unexpected = Vec::new();
  for (i, c) in raw.into_iter().enumerate() {
    let qid = c
      .question_id
      .ok_or_else(|| DiagnosticError::incomplete(format!("error_classifications[{i}].question_id")))?;
    let field = format!("error_classifications[{qid}].error_type");
    let label = c.error_type.ok_or_else(|| DiagnosticError::incomplete(field.clone()))?;
    let error_type = ErrorType::parse_label(&field, &label)?;
    if !incorrect.contains(qid.as_str()) || classified.contains_key(&qid) {
      unexpected.push(qid);
    } else {
      classified.insert(qid, error_type);
    }
  }

  let mut out = Vec::with_capacity(classified.len());
  let mut unclassified = Vec::new();
  for r in input.records.iter().filter(|r| !r.is_correct) {
    match classified.get(&r.question_id) {
      Some(t) => out.push(ErrorClassification { question_id: r.question_id.clone(), error_type: *t }),
      None => unclassified.push(r.question_id.clone()),
    }
  }

  if unclassified.is_empty() && unexpected.is_empty() {
    Ok(out)
  } else {
    Err(DiagnosticError::ClassificationMismatch { unclassified, unexpected })
  }
}

fn most_frequent(counts: &BTreeMap<ErrorType, u32>) -> Option<ErrorType> {
  // First in canonical order wins ties.
  let mut best: Option<(ErrorType, u32)> = None;
  for t in ErrorType::ALL {
    let n = counts.get(&t).copied().unwrap_or(0);
    if n > 0 && best.map_or(true, |(_, b)| n > b) {
      best = Some((t, n));
    }
  }
  best.map(|(t, _)| t)
}

fn dominant_error_types<'a>(
  input: &'a QuizAnalysisInput,
  classifications: &[ErrorClassification],
) -> HashMap<&'a str, ErrorType> {
  let topic_of: HashMap<&str, &str> = input
    .records
    .iter()
    .map(|r| (r.question_id.as_str(), r.topic.as_str()))
    .collect();
  let mut per_topic: HashMap<&'a str, BTreeMap<ErrorType, u32>> = HashMap::new();
  for c in classifications {
    if let Some(topic) = topic_of.get(c.question_id.as_str()) {
      *per_topic.entry(*topic).or_default().entry(c.error_type).or_insert(0) += 1;
    }
  }
  per_topic
    .into_iter()
    .filter_map(|(topic, counts)| most_frequent(&counts).map(|t| (topic, t)))
    .collect()
}

fn root_cause(classifications: &[ErrorClassification]) -> RootCauseAnalysis {
  let mut error_distribution: BTreeMap<ErrorType, u32> = ErrorType::ALL.iter().map(|t| (*t, 0)).collect();
  for c in classifications {
    *error_distribution.entry(c.error_type).or_insert(0) += 1;
  }
  RootCauseAnalysis { primary_weakness: most_frequent(&error_distribution), error_distribution }
}

fn validate_study_plan(raw: Option<RawStudyPlan>) -> Result<StudyPlan, DiagnosticError> {
  let weeks = raw
    .ok_or_else(|| DiagnosticError::incomplete("study_plan"))?
    .weekly_schedule
    .ok_or_else(|| DiagnosticError::incomplete("study_plan.weekly_schedule"))?;
  validate_weekly_schedule("study_plan.weekly_schedule", &weeks, STUDY_PLAN_WEEKS)?;
  Ok(StudyPlan { weekly_schedule: weeks })
}

/// Exactly `expected` weeks, numbered 1..=expected in order.
pub fn validate_weekly_schedule(field: &str, weeks: &[StudyWeek], expected: usize) -> Result<(), DiagnosticError> {
  if weeks.len() != expected {
    return Err(DiagnosticError::invalid_field(field, format!("expected {expected} weeks, got {}", weeks.len())));
  }
  for (i, w) in weeks.iter().enumerate() {
    if usize::from(w.week) != i + 1 {
      return Err(DiagnosticError::invalid_field(
        format!("{field}[{i}].week"),
        format!("expected week {}, got {}", i + 1, w.week),
      ));
    }
  }
  Ok(())
}

fn topics_with_status(breakdown: &[TopicBreakdownEntry], status: TopicStatus) -> Vec<String> {
  breakdown.iter().filter(|t| t.status == status).map(|t| t.topic.clone()).collect()
}

fn log_list_disagreement(field: &str, declared: Option<&[String]>, derived: &[String]) {
  if let Some(declared) = declared {
    let a: HashSet<&str> = declared.iter().map(String::as_str).collect();
    let b: HashSet<&str> = derived.iter().map(String::as_str).collect();
    if a != b {
      debug!(target: "diagnostic", %field, ?declared, ?derived, "Model list differs from derived list; using derived");
    }
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::domain::fixtures::*;
  use serde_json::{json, Value};

  /// Well-formed model output for `quiz`, with honest numbers.
  pub(crate) fn valid_output(quiz: &QuizAnalysisInput) -> Value {
    let r = scoring::recompute(quiz);
    let topics: Vec<Value> = r
      .topics
      .iter()
      .map(|t| {
        json!({
          "topic": t.topic,
          "accuracy": t.accuracy,
          "fluency_index": t.fluency_index,
          "status": t.status.as_str(),
          "questions_attempted": t.questions,
          "description": format!("Notes on {}", t.topic),
        })
      })
      .collect();
    let classifications: Vec<Value> = quiz
      .records
      .iter()
      .filter(|q| !q.is_correct)
      .map(|q| json!({ "question_id": q.question_id, "error_type": "conceptual_gap" }))
      .collect();
    let weeks: Vec<Value> = (1..=6)
      .map(|w| json!({ "week": w, "focus": "Foundations", "study_hours": 6, "key_activities": ["Practice"] }))
      .collect();
    json!({
      "analysis_summary": "You show gaps in geometry.",
      "overall_performance": { "accuracy": r.overall.accuracy },
      "topic_breakdown": topics,
      "weak_topics": [],
      "strong_topics": [],
      "error_classifications": classifications,
      "predicted_jamb_score": { "score": 220, "confidence_interval": "200-240" },
      "foundational_gaps": [{ "description": "Fractions", "affected_topics": ["Geometry"] }],
      "study_plan": { "weekly_schedule": weeks },
      "recommendations": [{ "priority": 1, "category": "weakness", "action": "Drill", "rationale": "Lowest topic" }],
    })
  }

  fn assemble(quiz: &QuizAnalysisInput, out: &Value) -> Result<DiagnosticReport, DiagnosticError> {
    Assembler::new(ScorePolicy::Clamp).assemble(quiz, "fp", &out.to_string())
  }

  #[test]
  fn end_to_end_fifteen_questions() {
    let quiz = fifteen_question_quiz();
    let report = assemble(&quiz, &valid_output(&quiz)).unwrap();

    assert_eq!(report.overall_performance.accuracy, 53.33);
    assert_eq!(report.projected_score.base_score, 213);
    assert_eq!(report.projected_score.score, 220);
    assert_eq!(report.projected_score.confidence_interval.as_deref(), Some("200-240"));
    assert_eq!(report.weak_topics, vec!["Geometry", "Calculus"]);
    assert_eq!(report.strong_topics, vec!["Algebra"]);
    assert_eq!(report.error_classifications.len(), 7);
    assert_eq!(report.root_cause_analysis.primary_weakness, Some(ErrorType::ConceptualGap));
    assert_eq!(report.root_cause_analysis.error_distribution.len(), 5);
    assert_eq!(report.topic_breakdown[1].dominant_error_type, Some(ErrorType::ConceptualGap));
    assert_eq!(report.topic_breakdown[0].dominant_error_type, None);
    assert_eq!(report.topic_breakdown[2].description.as_deref(), Some("Notes on Calculus"));
    assert!(report.corrections.is_empty());
    assert_eq!(report.fingerprint, "fp");
  }

  #[test]
  fn declared_score_above_range_is_clamped_and_recorded() {
    // 10 questions, 6 correct: 60% accuracy, base 240.
    let records = (0..10).map(|i| record(&format!("q{i}"), "Algebra", i < 6, 4)).collect();
    let quiz = input(records);
    let mut out = valid_output(&quiz);
    out["predicted_jamb_score"]["score"] = json!(550);

    let report = assemble(&quiz, &out).unwrap();
    assert_eq!(report.projected_score.base_score, 240);
    assert_eq!(report.projected_score.score, 400);
    assert!(report
      .corrections
      .iter()
      .any(|c| c.field == "predicted_jamb_score.score" && c.declared == 550.0 && c.corrected == 400.0));

    let strict = Assembler::new(ScorePolicy::Recompute).assemble(&quiz, "fp", &out.to_string()).unwrap();
    assert_eq!(strict.projected_score.score, 240);
  }

  #[test]
  fn omitted_topic_is_a_coverage_mismatch_naming_it() {
    let quiz = fifteen_question_quiz();
    let mut out = valid_output(&quiz);
    out["topic_breakdown"].as_array_mut().unwrap().retain(|t| t["topic"] != "Calculus");

    let err = assemble(&quiz, &out).unwrap_err();
    assert_eq!(
      err,
      DiagnosticError::TopicCoverageMismatch { missing: vec!["Calculus".into()], extraneous: vec![], duplicated: vec![] }
    );
  }

  #[test]
  fn hallucinated_and_duplicated_topics_are_rejected() {
    let quiz = fifteen_question_quiz();
    let mut out = valid_output(&quiz);
    let topics = out["topic_breakdown"].as_array_mut().unwrap();
    let mut extra = topics[0].clone();
    extra["topic"] = json!("Statistics");
    let dup = topics[1].clone();
    topics.push(extra);
    topics.push(dup);

    match assemble(&quiz, &out).unwrap_err() {
      DiagnosticError::TopicCoverageMismatch { missing, extraneous, duplicated } => {
        assert!(missing.is_empty());
        assert_eq!(extraneous, vec!["Statistics"]);
        assert_eq!(duplicated, vec!["Geometry"]);
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn subject_prefix_on_topic_names_is_tolerated() {
    let quiz = fifteen_question_quiz();
    let mut out = valid_output(&quiz);
    out["topic_breakdown"][0]["topic"] = json!("Mathematics: Algebra");
    assert!(assemble(&quiz, &out).is_ok());
  }

  #[test]
  fn unknown_error_label_is_a_taxonomy_violation() {
    let quiz = fifteen_question_quiz();
    let mut out = valid_output(&quiz);
    out["error_classifications"][0]["error_type"] = json!("silly_mistake");

    match assemble(&quiz, &out).unwrap_err() {
      DiagnosticError::Taxonomy(v) => {
        assert_eq!(v.value, "silly_mistake");
        assert_eq!(v.field, "error_classifications[geo-2].error_type");
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn unknown_status_label_is_a_taxonomy_violation() {
    let quiz = fifteen_question_quiz();
    let mut out = valid_output(&quiz);
    out["topic_breakdown"][0]["status"] = json!("excellent");
    assert!(matches!(assemble(&quiz, &out), Err(DiagnosticError::Taxonomy(_))));
  }

  #[test]
  fn missing_quantitative_field_is_not_fabricated() {
    let quiz = fifteen_question_quiz();
    let mut out = valid_output(&quiz);
    out["topic_breakdown"][1].as_object_mut().unwrap().remove("accuracy");
    assert_eq!(
      assemble(&quiz, &out).unwrap_err(),
      DiagnosticError::incomplete("topic_breakdown[Geometry].accuracy")
    );

    let mut out = valid_output(&quiz);
    out["predicted_jamb_score"]["score"] = Value::Null;
    assert_eq!(assemble(&quiz, &out).unwrap_err(), DiagnosticError::incomplete("predicted_jamb_score.score"));
  }

  #[test]
  fn out_of_range_accuracy_is_corrected_to_recomputed_value() {
    let quiz = fifteen_question_quiz();
    let mut out = valid_output(&quiz);
    out["topic_breakdown"][1]["accuracy"] = json!(130.0);
    out["topic_breakdown"][1]["status"] = json!("strong");

    let report = assemble(&quiz, &out).unwrap();
    let geometry = &report.topic_breakdown[1];
    assert_eq!(geometry.accuracy, 40.0);
    assert_eq!(geometry.status, TopicStatus::Weak);
    assert_eq!(report.corrections.len(), 1);
    assert_eq!(report.corrections[0].field, "topic_breakdown[Geometry].accuracy");
  }

  #[test]
  fn non_json_output_is_an_upstream_format_error() {
    let quiz = fifteen_question_quiz();
    let err = Assembler::new(ScorePolicy::Clamp)
      .assemble(&quiz, "fp", "Sure! Here is your analysis: ...")
      .unwrap_err();
    assert!(matches!(err, DiagnosticError::UpstreamFormat(_)));

    let mut out = valid_output(&quiz);
    out["topic_breakdown"][0]["accuracy"] = json!("80%");
    assert!(matches!(assemble(&quiz, &out), Err(DiagnosticError::UpstreamFormat(_))));
  }

  #[test]
  fn fenced_output_is_accepted() {
    let quiz = fifteen_question_quiz();
    let fenced = format!("```json\n{}\n```", valid_output(&quiz));
    assert!(Assembler::new(ScorePolicy::Clamp).assemble(&quiz, "fp", &fenced).is_ok());
  }

  #[test]
  fn classification_coverage_is_enforced() {
    let quiz = fifteen_question_quiz();
    let mut out = valid_output(&quiz);
    let list = out["error_classifications"].as_array_mut().unwrap();
    list.remove(0);
    list.push(json!({ "question_id": "alg-0", "error_type": "careless_mistake" }));

    assert_eq!(
      assemble(&quiz, &out).unwrap_err(),
      DiagnosticError::ClassificationMismatch { unclassified: vec!["geo-2".into()], unexpected: vec!["alg-0".into()] }
    );
  }

  #[test]
  fn study_plan_must_have_six_numbered_weeks() {
    let quiz = fifteen_question_quiz();
    let mut out = valid_output(&quiz);
    out["study_plan"]["weekly_schedule"].as_array_mut().unwrap().pop();
    assert!(matches!(
      assemble(&quiz, &out),
      Err(DiagnosticError::InvalidField { field, .. }) if field == "study_plan.weekly_schedule"
    ));

    let mut out = valid_output(&quiz);
    out["study_plan"]["weekly_schedule"][2]["week"] = json!(5);
    assert!(matches!(assemble(&quiz, &out), Err(DiagnosticError::InvalidField { .. })));
  }

  #[test]
  fn missing_summary_is_incomplete() {
    let quiz = fifteen_question_quiz();
    let mut out = valid_output(&quiz);
    out.as_object_mut().unwrap().remove("analysis_summary");
    assert_eq!(assemble(&quiz, &out).unwrap_err(), DiagnosticError::incomplete("analysis_summary"));
  }
}
