//! Follow-up guidance built on a saved diagnostic: standalone study plans,
//! plan adjustment and single-answer explanations.
//!
//! Model output goes through the same treatment as a diagnostic: parsed into
//! option-typed raw structs, checked against closed sets and structural rules,
//! rejected whole on the first violation.

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::assembler::{validate_weekly_schedule, STUDY_PLAN_WEEKS};
use crate::domain::{
  AnswerExplanation, DiagnosticReport, ErrorType, ExplainRequest, GeneratedPlan, PlanBrief, StudyPlanRequest,
  StudyWeek, TopicStatus,
};
use crate::error::DiagnosticError;
use crate::scoring::MAX_SCORE;
use crate::util::{strip_code_fences, trunc_for_log};

pub const MAX_PLAN_WEEKS: u8 = 12;
const MAX_WEEKLY_HOURS: u32 = 40;

#[derive(Deserialize)]
struct RawPlan {
  weekly_schedule: Option<Vec<StudyWeek>>,
}

#[derive(Deserialize)]
struct RawExplanation {
  explanation: Option<String>,
  correct_reasoning: Option<String>,
  common_mistake: Option<String>,
  #[serde(default)]
  related_topics: Option<Vec<String>>,
  error_type: Option<String>,
}

fn parse_model_json<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<T, DiagnosticError> {
  let text = strip_code_fences(raw);
  serde_json::from_str(text).map_err(|e| {
    warn!(target: "diagnostic", error = %trunc_for_log(&e.to_string(), 200), text_len = text.len(), "Model output is not the expected JSON");
    DiagnosticError::UpstreamFormat(e.to_string())
  })
}

/// Trimmed, non-blank, first occurrence wins (case-insensitive).
fn clean_topics(topics: &[String]) -> Vec<String> {
  let mut out: Vec<String> = Vec::new();
  for t in topics.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
    if !out.iter().any(|o| o.eq_ignore_ascii_case(t)) {
      out.push(t.to_string());
    }
  }
  out
}

fn week_mentions(week: &StudyWeek, topic: &str) -> bool {
  let topic = topic.to_lowercase();
  week.focus.to_lowercase().contains(&topic) || week.key_activities.iter().any(|a| a.to_lowercase().contains(&topic))
}

/// Fill in request defaults from the diagnostic.
///
/// Weak topics fall back to the report's weak topics, then its developing
/// topics, then every topic it covers.
pub fn resolve_brief(request: &StudyPlanRequest, report: &DiagnosticReport) -> Result<PlanBrief, DiagnosticError> {
  if request.target_score > MAX_SCORE {
    return Err(DiagnosticError::InvalidInput(format!("targetScore must be within 0..={MAX_SCORE}")));
  }
  let current_score = request.current_score.unwrap_or(report.projected_score.score);
  if current_score > MAX_SCORE {
    return Err(DiagnosticError::InvalidInput(format!("currentScore must be within 0..={MAX_SCORE}")));
  }
  let weeks = request.weeks_available.unwrap_or(STUDY_PLAN_WEEKS as u8);
  if !(1..=MAX_PLAN_WEEKS).contains(&weeks) {
    return Err(DiagnosticError::InvalidInput(format!("weeksAvailable must be within 1..={MAX_PLAN_WEEKS}")));
  }

  let mut weak_topics = clean_topics(&request.weak_topics);
  if weak_topics.is_empty() {
    weak_topics = report.weak_topics.clone();
  }
  if weak_topics.is_empty() {
    weak_topics = report
      .topic_breakdown
      .iter()
      .filter(|t| t.status == TopicStatus::Developing)
      .map(|t| t.topic.clone())
      .collect();
  }
  if weak_topics.is_empty() {
    weak_topics = report.topic_breakdown.iter().map(|t| t.topic.clone()).collect();
  }

  Ok(PlanBrief { subject: report.subject.clone(), weak_topics, target_score: request.target_score, current_score, weeks })
}

/// Every week numbered and focused, hours in range, every weak topic named somewhere.
fn check_plan(weeks: &[StudyWeek], brief: &PlanBrief) -> Result<(), DiagnosticError> {
  validate_weekly_schedule("weekly_schedule", weeks, usize::from(brief.weeks))?;
  for (i, w) in weeks.iter().enumerate() {
    if w.focus.trim().is_empty() {
      return Err(DiagnosticError::invalid_field(format!("weekly_schedule[{i}].focus"), "must not be blank"));
    }
    if !(1..=MAX_WEEKLY_HOURS).contains(&w.study_hours) {
      return Err(DiagnosticError::invalid_field(
        format!("weekly_schedule[{i}].study_hours"),
        format!("{} is outside 1..={MAX_WEEKLY_HOURS}", w.study_hours),
      ));
    }
  }
  let uncovered: Vec<&str> = brief
    .weak_topics
    .iter()
    .filter(|t| !weeks.iter().any(|w| week_mentions(w, t)))
    .map(String::as_str)
    .collect();
  if !uncovered.is_empty() {
    return Err(DiagnosticError::invalid_field("weekly_schedule", format!("weak topics not covered: {uncovered:?}")));
  }
  Ok(())
}

#[instrument(level = "info", target = "diagnostic", skip(brief, raw), fields(weeks = brief.weeks, raw_len = raw.len()))]
pub fn assemble_plan(brief: &PlanBrief, diagnostic_id: Uuid, raw: &str) -> Result<GeneratedPlan, DiagnosticError> {
  let parsed: RawPlan = parse_model_json(raw)?;
  let weeks = parsed.weekly_schedule.ok_or_else(|| DiagnosticError::incomplete("weekly_schedule"))?;
  check_plan(&weeks, brief)?;

  let plan = GeneratedPlan {
    id: Uuid::new_v4(),
    diagnostic_id,
    subject: brief.subject.clone(),
    weak_topics: brief.weak_topics.clone(),
    completed_topics: Vec::new(),
    target_score: brief.target_score,
    current_score: brief.current_score,
    weekly_schedule: weeks,
    generated_at: Utc::now(),
    updated_at: None,
  };
  debug!(target: "diagnostic", plan_id = %plan.id, weeks = plan.weekly_schedule.len(), "Study plan assembled");
  Ok(plan)
}

#[instrument(level = "info", target = "diagnostic", skip(request, raw), fields(question_id = %request.question_id, raw_len = raw.len()))]
pub fn assemble_explanation(request: &ExplainRequest, raw: &str) -> Result<AnswerExplanation, DiagnosticError> {
  let parsed: RawExplanation = parse_model_json(raw)?;
  let explanation = parsed
    .explanation
    .filter(|s| !s.trim().is_empty())
    .ok_or_else(|| DiagnosticError::incomplete("explanation"))?;
  let correct_reasoning = parsed
    .correct_reasoning
    .filter(|s| !s.trim().is_empty())
    .ok_or_else(|| DiagnosticError::incomplete("correct_reasoning"))?;

  let declared = parsed.error_type.as_deref().map(|e| ErrorType::parse_label("error_type", e)).transpose()?;
  let is_correct = request.is_correct();
  let error_type = match declared {
    Some(e) if is_correct => {
      warn!(target: "diagnostic", declared = e.as_str(), "Error type given for a correct answer; dropped");
      None
    }
    other => other,
  };

  Ok(AnswerExplanation {
    question_id: request.question_id.clone(),
    is_correct,
    explanation,
    correct_reasoning,
    common_mistake: parsed.common_mistake.filter(|s| !s.trim().is_empty()),
    related_topics: clean_topics(&parsed.related_topics.unwrap_or_default()),
    error_type,
  })
}

/// Fold progress into a plan without calling the model.
///
/// Completed topics leave the weak list and any week focused on them is
/// handed to the next new weak topic (or turned into review). New weak topics
/// that found no week are appended to the last week's activities.
pub fn adjust_plan(
  plan: &GeneratedPlan,
  completed: &[String],
  new_weak: &[String],
) -> Result<GeneratedPlan, DiagnosticError> {
  let completed = clean_topics(completed);
  let new_weak = clean_topics(new_weak);
  if completed.is_empty() && new_weak.is_empty() {
    return Err(DiagnosticError::InvalidInput("nothing to adjust: completedTopics and newWeakTopics are empty".into()));
  }

  let mut completed_topics = plan.completed_topics.clone();
  completed_topics.extend(completed);
  let completed_topics = clean_topics(&completed_topics);
  let is_done = |t: &str| completed_topics.iter().any(|c| c.eq_ignore_ascii_case(t));

  let mut weak_topics: Vec<String> = plan.weak_topics.iter().filter(|t| !is_done(t)).cloned().collect();
  let mut pending: Vec<String> = Vec::new();
  for t in new_weak {
    if !is_done(&t) && !weak_topics.iter().any(|w| w.eq_ignore_ascii_case(&t)) {
      weak_topics.push(t.clone());
      pending.push(t);
    }
  }
  let mut pending = pending.into_iter();

  let mut weekly_schedule: Vec<StudyWeek> = plan
    .weekly_schedule
    .iter()
    .map(|w| {
      let focus_done = completed_topics.iter().any(|c| w.focus.to_lowercase().contains(&c.to_lowercase()));
      if !focus_done {
        return w.clone();
      }
      match pending.next() {
        Some(topic) => StudyWeek {
          week: w.week,
          focus: format!("{topic}: Core Concepts & Practice"),
          study_hours: w.study_hours,
          key_activities: vec![format!("Review {topic}"), "Complete practice problems".to_string()],
        },
        None => StudyWeek {
          week: w.week,
          focus: "Review & Mixed Practice".to_string(),
          study_hours: w.study_hours,
          key_activities: vec!["Mixed practice across completed topics".to_string()],
        },
      }
    })
    .collect();

  let uncovered: Vec<String> = weak_topics
    .iter()
    .filter(|t| !weekly_schedule.iter().any(|w| week_mentions(w, t)))
    .cloned()
    .collect();
  if let Some(last) = weekly_schedule.last_mut() {
    last.key_activities.extend(uncovered.iter().map(|t| format!("Practice {t}")));
  }
  validate_weekly_schedule("weekly_schedule", &weekly_schedule, plan.weekly_schedule.len())?;

  debug!(
    target: "diagnostic",
    plan_id = %plan.id,
    completed = completed_topics.len(),
    weak = weak_topics.len(),
    "Study plan adjusted"
  );
  Ok(GeneratedPlan {
    weak_topics,
    completed_topics,
    weekly_schedule,
    updated_at: Some(Utc::now()),
    ..plan.clone()
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assembler::tests::valid_output;
  use crate::assembler::Assembler;
  use crate::domain::fixtures::*;
  use crate::domain::ScorePolicy;
  use crate::local::{weekly_schedule, LocalAnalyst};
  use serde_json::json;

  fn report() -> DiagnosticReport {
    let quiz = fifteen_question_quiz();
    Assembler::new(ScorePolicy::Clamp).assemble(&quiz, "fp", &valid_output(&quiz).to_string()).unwrap()
  }

  fn request() -> StudyPlanRequest {
    StudyPlanRequest {
      diagnostic_id: Uuid::new_v4(),
      weak_topics: Vec::new(),
      target_score: 300,
      current_score: None,
      weeks_available: None,
    }
  }

  fn brief(weak: &[&str], weeks: u8) -> PlanBrief {
    PlanBrief {
      subject: "Mathematics".into(),
      weak_topics: weak.iter().map(|t| t.to_string()).collect(),
      target_score: 300,
      current_score: 213,
      weeks,
    }
  }

  fn plan_json(weak: &[&str], weeks: usize) -> serde_json::Value {
    json!({ "weekly_schedule": weekly_schedule(weak, weeks) })
  }

  #[test]
  fn brief_defaults_come_from_the_diagnostic() {
    let b = resolve_brief(&request(), &report()).unwrap();
    assert_eq!(b.weak_topics, vec!["Geometry", "Calculus"]);
    assert_eq!(b.current_score, 220);
    assert_eq!(b.weeks, 6);
    assert_eq!(b.subject, "Mathematics");

    let mut r = request();
    r.weak_topics = vec![" Algebra ".into(), "algebra".into(), "".into()];
    r.weeks_available = Some(3);
    let b = resolve_brief(&r, &report()).unwrap();
    assert_eq!(b.weak_topics, vec!["Algebra"]);
    assert_eq!(b.weeks, 3);
  }

  #[test]
  fn brief_rejects_out_of_range_parameters() {
    let mut r = request();
    r.target_score = 401;
    assert!(matches!(resolve_brief(&r, &report()), Err(DiagnosticError::InvalidInput(_))));

    let mut r = request();
    r.weeks_available = Some(0);
    assert!(matches!(resolve_brief(&r, &report()), Err(DiagnosticError::InvalidInput(_))));

    let mut r = request();
    r.weeks_available = Some(MAX_PLAN_WEEKS + 1);
    assert!(matches!(resolve_brief(&r, &report()), Err(DiagnosticError::InvalidInput(_))));
  }

  #[test]
  fn local_plan_passes_validation() {
    let b = brief(&["Geometry", "Calculus", "Algebra"], 2);
    let raw = LocalAnalyst.render_plan(&b).to_string();
    let plan = assemble_plan(&b, Uuid::nil(), &raw).unwrap();
    assert_eq!(plan.weekly_schedule.len(), 2);
    assert_eq!(plan.weak_topics, b.weak_topics);
    assert!(plan.completed_topics.is_empty());
  }

  #[test]
  fn plan_with_wrong_week_count_is_rejected() {
    let b = brief(&["Geometry"], 4);
    let raw = plan_json(&["Geometry"], 6).to_string();
    assert!(matches!(
      assemble_plan(&b, Uuid::nil(), &raw),
      Err(DiagnosticError::InvalidField { field, .. }) if field == "weekly_schedule"
    ));
  }

  #[test]
  fn plan_must_name_every_weak_topic() {
    let b = brief(&["Geometry", "Calculus"], 6);
    let raw = plan_json(&["Geometry"], 6).to_string();
    let err = assemble_plan(&b, Uuid::nil(), &raw).unwrap_err();
    assert!(err.to_string().contains("Calculus"), "{err}");
  }

  #[test]
  fn plan_hours_and_focus_are_checked() {
    let b = brief(&["Geometry"], 6);
    let mut v = plan_json(&["Geometry"], 6);
    v["weekly_schedule"][3]["study_hours"] = json!(90);
    assert!(matches!(
      assemble_plan(&b, Uuid::nil(), &v.to_string()),
      Err(DiagnosticError::InvalidField { field, .. }) if field == "weekly_schedule[3].study_hours"
    ));

    let mut v = plan_json(&["Geometry"], 6);
    v["weekly_schedule"][1]["focus"] = json!("  ");
    assert!(matches!(
      assemble_plan(&b, Uuid::nil(), &v.to_string()),
      Err(DiagnosticError::InvalidField { field, .. }) if field == "weekly_schedule[1].focus"
    ));

    assert!(matches!(
      assemble_plan(&b, Uuid::nil(), "{}"),
      Err(DiagnosticError::IncompleteAnalysis { field }) if field == "weekly_schedule"
    ));
    assert!(matches!(assemble_plan(&b, Uuid::nil(), "not json"), Err(DiagnosticError::UpstreamFormat(_))));
  }

  fn explain_request(student: &str) -> ExplainRequest {
    ExplainRequest {
      question_id: "calc-3".into(),
      question: Some("d/dx of x^3?".into()),
      topic: Some("Calculus".into()),
      student_answer: student.into(),
      correct_answer: "3x^2".into(),
      student_reasoning: "used the power rule".into(),
      confidence: Some(2),
    }
  }

  #[test]
  fn explanation_labels_are_validated() {
    let raw = json!({
      "explanation": "Bring the exponent down.",
      "correct_reasoning": "d/dx x^n = n x^(n-1)",
      "related_topics": ["Calculus", " calculus", "Differentiation"],
      "error_type": "procedural_error",
    });
    let e = assemble_explanation(&explain_request("x^2"), &raw.to_string()).unwrap();
    assert!(!e.is_correct);
    assert_eq!(e.error_type, Some(ErrorType::ProceduralError));
    assert_eq!(e.related_topics, vec!["Calculus", "Differentiation"]);

    let mut bad = raw.clone();
    bad["error_type"] = json!("silly_mistake");
    assert!(matches!(
      assemble_explanation(&explain_request("x^2"), &bad.to_string()),
      Err(DiagnosticError::Taxonomy(_))
    ));
  }

  #[test]
  fn correct_answers_carry_no_error_type() {
    let raw = json!({
      "explanation": "Right.",
      "correct_reasoning": "Power rule.",
      "error_type": "careless_mistake",
    });
    let e = assemble_explanation(&explain_request(" 3X^2 "), &raw.to_string()).unwrap();
    assert!(e.is_correct);
    assert_eq!(e.error_type, None);
  }

  #[test]
  fn explanation_requires_text_fields() {
    let raw = json!({ "explanation": "", "correct_reasoning": "x" });
    assert!(matches!(
      assemble_explanation(&explain_request("x^2"), &raw.to_string()),
      Err(DiagnosticError::IncompleteAnalysis { field }) if field == "explanation"
    ));
  }

  fn stored_plan() -> GeneratedPlan {
    let b = brief(&["Geometry", "Calculus"], 6);
    assemble_plan(&b, Uuid::nil(), &LocalAnalyst.render_plan(&b).to_string()).unwrap()
  }

  #[test]
  fn completed_topic_hands_its_week_to_a_new_weak_topic() {
    let plan = stored_plan();
    let adjusted = adjust_plan(&plan, &["geometry".into()], &["Statistics".into(), "Calculus".into()]).unwrap();

    assert_eq!(adjusted.id, plan.id);
    assert_eq!(adjusted.weak_topics, vec!["Calculus", "Statistics"]);
    assert_eq!(adjusted.completed_topics, vec!["geometry"]);
    assert_eq!(adjusted.weekly_schedule[0].focus, "Statistics: Core Concepts & Practice");
    assert_eq!(adjusted.weekly_schedule[1], plan.weekly_schedule[1]);
    assert_eq!(adjusted.weekly_schedule.len(), 6);
    assert!(adjusted.updated_at.is_some());
  }

  #[test]
  fn unplaced_new_topics_go_to_the_last_week() {
    let plan = stored_plan();
    let adjusted = adjust_plan(&plan, &[], &["Statistics".into()]).unwrap();
    let last = adjusted.weekly_schedule.last().unwrap();
    assert_eq!(last.key_activities.last().map(String::as_str), Some("Practice Statistics"));

    let adjusted = adjust_plan(&adjusted, &["Geometry".into(), "Calculus".into()], &[]).unwrap();
    assert_eq!(adjusted.weak_topics, vec!["Statistics"]);
    assert_eq!(adjusted.weekly_schedule[0].focus, "Review & Mixed Practice");
    assert_eq!(adjusted.weekly_schedule[1].focus, "Review & Mixed Practice");
  }

  #[test]
  fn empty_adjustment_is_rejected() {
    assert!(matches!(adjust_plan(&stored_plan(), &[" ".into()], &[]), Err(DiagnosticError::InvalidInput(_))));
  }
}
