//! Offline analyst.
//!
//! Produces model-shaped JSON deterministically from the quiz records so the
//! service runs (and can be demoed or tested) without an API key. Error types
//! come from keyword heuristics over the student's explanation. Study plans
//! and answer explanations are rendered the same way.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::analyst::{AnalysisPrompt, Analyst, UpstreamError};
use crate::assembler::STUDY_PLAN_WEEKS;
use crate::domain::{ErrorType, ExplainRequest, PlanBrief, QuizAnalysisInput, QuizResponseRecord, StudyWeek, TopicStatus};
use crate::scoring;
use crate::util::round2;

const MISINTERPRETATION: &[&str] = &["misread", "misunderstood", "confused", "thought", "assumed", "interpret"];
const KNOWLEDGE: &[&str] = &["don't know", "never learned", "unfamiliar", "haven't studied", "missing", "lack"];
const CARELESS: &[&str] = &["mistake", "error", "wrong sign", "forgot", "missed", "accident", "careless", "silly"];
const CONCEPTUAL: &[&str] = &["concept", "understand", "why", "reasoning", "logic", "fundamental", "principle", "theory"];
const PROCEDURAL: &[&str] = &["step", "method", "process", "procedure", "formula", "calculation", "solve", "approach"];

fn mentions(text: &str, words: &[&str]) -> bool {
  words.iter().any(|w| text.contains(w))
}

/// Heuristic error type for an incorrect answer.
pub fn classify_error(record: &QuizResponseRecord) -> ErrorType {
  classify_reasoning(&record.explanation, record.confidence)
}

fn classify_reasoning(reasoning: &str, confidence: u8) -> ErrorType {
  let text = reasoning.to_lowercase();
  if mentions(&text, MISINTERPRETATION) {
    return ErrorType::Misinterpretation;
  }
  if mentions(&text, KNOWLEDGE) {
    return ErrorType::KnowledgeGap;
  }
  if confidence >= 4 && mentions(&text, CARELESS) {
    return ErrorType::CarelessMistake;
  }
  if mentions(&text, CONCEPTUAL) {
    return ErrorType::ConceptualGap;
  }
  if mentions(&text, PROCEDURAL) {
    return ErrorType::ProceduralError;
  }
  if confidence >= 4 {
    // Sure of a wrong answer.
    ErrorType::CarelessMistake
  } else if text.chars().count() < 20 {
    ErrorType::KnowledgeGap
  } else if text.contains("calculate") {
    ErrorType::ProceduralError
  } else {
    ErrorType::KnowledgeGap
  }
}

/// One week per weak topic in order, then review weeks; the last week is an
/// exam simulation. Weak topics beyond the horizon go into the last week.
pub fn weekly_schedule(weak: &[&str], weeks: usize) -> Vec<StudyWeek> {
  let mut schedule: Vec<StudyWeek> = (1..=weeks)
    .map(|week| {
      let (focus, review) = match weak.get(week - 1) {
        Some(topic) => (format!("{topic}: Core Concepts & Practice"), topic.to_string()),
        None if week == weeks => ("Full Exam Simulation & Review".to_string(), "all topics".to_string()),
        None => ("Review & Advanced Topics".to_string(), "all topics".to_string()),
      };
      StudyWeek {
        week: week as u8,
        focus,
        study_hours: if week <= 3 { 8 } else { 6 },
        key_activities: vec![
          format!("Review {review}"),
          "Complete practice problems".to_string(),
          if week % 2 == 0 { "Take mini-quiz" } else { "Review notes" }.to_string(),
        ],
      }
    })
    .collect();
  if let Some(last) = schedule.last_mut() {
    last.key_activities.extend(weak.iter().skip(weeks).map(|t| format!("Practice {t}")));
  }
  schedule
}

#[derive(Clone, Debug, Default)]
pub struct LocalAnalyst;

impl LocalAnalyst {
  pub fn render(&self, input: &QuizAnalysisInput) -> Value {
    let r = scoring::recompute(input);

    let classifications: Vec<(&QuizResponseRecord, ErrorType)> = input
      .records
      .iter()
      .filter(|q| !q.is_correct)
      .map(|q| (q, classify_error(q)))
      .collect();

    let topic_breakdown: Vec<Value> = r
      .topics
      .iter()
      .map(|t| {
        let mut counts = [0u32; 5];
        for (q, e) in &classifications {
          if q.topic == t.topic {
            if let Some(i) = ErrorType::ALL.iter().position(|x| x == e) {
              counts[i] += 1;
            }
          }
        }
        let dominant = counts
          .iter()
          .enumerate()
          .filter(|(_, n)| **n > 0)
          .fold(None::<(usize, u32)>, |best, (i, n)| match best {
            Some((_, b)) if b >= *n => best,
            _ => Some((i, *n)),
          })
          .map(|(i, _)| ErrorType::ALL[i].as_str());
        json!({
          "topic": t.topic,
          "accuracy": round2(t.accuracy),
          "fluency_index": round2(t.fluency_index),
          "status": t.status.as_str(),
          "questions_attempted": t.questions,
          "severity": t.severity.map(|s| s.as_str()),
          "dominant_error_type": dominant,
        })
      })
      .collect();

    let weak: Vec<&str> = r.topics.iter().filter(|t| t.status == TopicStatus::Weak).map(|t| t.topic.as_str()).collect();
    let strong: Vec<&str> = r.topics.iter().filter(|t| t.status == TopicStatus::Strong).map(|t| t.topic.as_str()).collect();

    let schedule = weekly_schedule(&weak, STUDY_PLAN_WEEKS);

    let mut totals = [0u32; 5];
    for (_, e) in &classifications {
      if let Some(i) = ErrorType::ALL.iter().position(|x| x == e) {
        totals[i] += 1;
      }
    }
    let primary = totals
      .iter()
      .enumerate()
      .filter(|(_, n)| **n > 0)
      .fold(None::<(usize, u32)>, |best, (i, n)| match best {
        Some((_, b)) if b >= *n => best,
        _ => Some((i, *n)),
      })
      .map(|(i, _)| ErrorType::ALL[i]);

    let accuracy = r.overall.accuracy;
    let mut summary = vec![if accuracy < 60.0 {
      format!("Your performance shows significant gaps with {accuracy:.1}% accuracy.")
    } else if accuracy < 75.0 {
      format!("Your performance is developing with {accuracy:.1}% accuracy.")
    } else {
      format!("You demonstrated strong performance with {accuracy:.1}% accuracy.")
    }];
    if !weak.is_empty() {
      summary.push(format!("You have {} weak topic(s) requiring focused attention.", weak.len()));
    }
    if let Some(p) = primary {
      summary.push(format!("Your primary weakness is in {}.", p.describe()));
    }

    let recommendations: Vec<Value> = weak
      .first()
      .map(|topic| {
        json!({
          "priority": 1,
          "category": "weakness",
          "action": format!("Focus on {topic} for the next 2 weeks"),
          "rationale": "Your lowest performing topic needs immediate attention",
        })
      })
      .into_iter()
      .collect();

    json!({
      "analysis_summary": summary.join(" "),
      "overall_performance": { "accuracy": round2(accuracy) },
      "topic_breakdown": topic_breakdown,
      "weak_topics": weak,
      "strong_topics": strong,
      "error_classifications": classifications
        .iter()
        .map(|(q, e)| json!({ "question_id": q.question_id, "error_type": e.as_str() }))
        .collect::<Vec<_>>(),
      "predicted_jamb_score": {
        "score": scoring::base_score(accuracy),
        "confidence_interval": "± 25 points",
      },
      "foundational_gaps": weak
        .iter()
        .map(|t| json!({ "description": format!("Foundations of {t}"), "affected_topics": [t] }))
        .collect::<Vec<_>>(),
      "study_plan": { "weekly_schedule": schedule },
      "recommendations": recommendations,
    })
  }

  pub fn render_plan(&self, brief: &PlanBrief) -> Value {
    let weak: Vec<&str> = brief.weak_topics.iter().map(String::as_str).collect();
    json!({ "weekly_schedule": weekly_schedule(&weak, usize::from(brief.weeks)) })
  }

  pub fn render_explanation(&self, request: &ExplainRequest) -> Value {
    let topic = request.topic.as_deref().unwrap_or("this topic");
    let related: Vec<&str> = request.topic.as_deref().into_iter().collect();
    if request.is_correct() {
      return json!({
        "explanation": format!("Your answer {} is correct.", request.correct_answer.trim()),
        "correct_reasoning": format!("You applied the key idea of {topic} correctly; keep checking each option against it."),
        "related_topics": related,
      });
    }
    let error_type = classify_reasoning(&request.student_reasoning, request.confidence.unwrap_or(3));
    json!({
      "explanation": format!(
        "The correct answer is {}, not {}.",
        request.correct_answer.trim(),
        request.student_answer.trim()
      ),
      "correct_reasoning": format!("Work from the definition used in {topic} and compute the result directly before comparing options."),
      "common_mistake": format!("Your reasoning points to a gap in {}.", error_type.describe()),
      "related_topics": related,
      "error_type": error_type.as_str(),
    })
  }
}

#[async_trait]
impl Analyst for LocalAnalyst {
  fn name(&self) -> &'static str {
    "local"
  }

  #[instrument(level = "info", skip(self, input, _prompt), fields(records = input.records.len()))]
  async fn analyze(&self, input: &QuizAnalysisInput, _prompt: &AnalysisPrompt) -> Result<String, UpstreamError> {
    let text = self.render(input).to_string();
    debug!(response_len = text.len(), "Local analysis rendered");
    Ok(text)
  }

  #[instrument(level = "info", skip(self, brief, _prompt), fields(weeks = brief.weeks, weak = brief.weak_topics.len()))]
  async fn plan(&self, brief: &PlanBrief, _prompt: &AnalysisPrompt) -> Result<String, UpstreamError> {
    Ok(self.render_plan(brief).to_string())
  }

  #[instrument(level = "info", skip(self, request, _prompt), fields(question_id = %request.question_id))]
  async fn explain(&self, request: &ExplainRequest, _prompt: &AnalysisPrompt) -> Result<String, UpstreamError> {
    Ok(self.render_explanation(request).to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assembler::Assembler;
  use crate::domain::fixtures::*;
  use crate::domain::ScorePolicy;

  fn wrong(explanation: &str, confidence: u8) -> QuizResponseRecord {
    let mut r = record("q", "Algebra", false, confidence);
    r.explanation = explanation.into();
    r
  }

  #[test]
  fn keyword_precedence() {
    assert_eq!(classify_error(&wrong("I misread the question and forgot a sign", 5)), ErrorType::Misinterpretation);
    assert_eq!(classify_error(&wrong("I never learned logarithms", 2)), ErrorType::KnowledgeGap);
    assert_eq!(classify_error(&wrong("made a silly arithmetic slip", 4)), ErrorType::CarelessMistake);
    assert_eq!(classify_error(&wrong("made a silly arithmetic slip", 2)), ErrorType::KnowledgeGap);
    assert_eq!(classify_error(&wrong("I don't see the underlying principle here", 3)), ErrorType::ConceptualGap);
    assert_eq!(classify_error(&wrong("used the quadratic formula on it", 2)), ErrorType::ProceduralError);
  }

  #[test]
  fn defaults_without_keywords() {
    assert_eq!(classify_error(&wrong("", 5)), ErrorType::CarelessMistake);
    assert_eq!(classify_error(&wrong("no idea", 1)), ErrorType::KnowledgeGap);
    assert_eq!(classify_error(&wrong("tried to calculate it by hand quickly", 2)), ErrorType::ProceduralError);
  }

  #[tokio::test]
  async fn local_output_assembles_cleanly() {
    let quiz = fifteen_question_quiz();
    let prompt = AnalysisPrompt { system: String::new(), user: String::new() };
    let raw = LocalAnalyst.analyze(&quiz, &prompt).await.unwrap();

    let report = Assembler::new(ScorePolicy::Clamp).assemble(&quiz, "fp", &raw).unwrap();
    assert_eq!(report.overall_performance.accuracy, 53.33);
    assert_eq!(report.projected_score.score, 213);
    assert!(report.weak_topics.contains(&"Calculus".to_string()));
    assert!(report.corrections.is_empty());
    assert_eq!(report.study_plan.weekly_schedule[0].focus, "Geometry: Core Concepts & Practice");
    assert_eq!(report.root_cause_analysis.primary_weakness, Some(ErrorType::KnowledgeGap));
    assert!(report.analysis_summary.starts_with("Your performance shows significant gaps"));
  }

  #[test]
  fn schedule_spreads_weak_topics_and_keeps_overflow() {
    let weeks = weekly_schedule(&["Geometry", "Calculus", "Algebra"], 2);
    assert_eq!(weeks.len(), 2);
    assert_eq!(weeks[0].focus, "Geometry: Core Concepts & Practice");
    assert_eq!(weeks[1].focus, "Calculus: Core Concepts & Practice");
    assert_eq!(weeks[1].key_activities.last().map(String::as_str), Some("Practice Algebra"));

    let weeks = weekly_schedule(&[], 4);
    assert_eq!(weeks[3].focus, "Full Exam Simulation & Review");
    assert_eq!(weeks.iter().map(|w| w.week).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
  }

  #[test]
  fn explanation_classifies_only_wrong_answers() {
    let mut request = ExplainRequest {
      question_id: "geo-3".into(),
      question: None,
      topic: Some("Geometry".into()),
      student_answer: " b".into(),
      correct_answer: "B".into(),
      student_reasoning: "I misread the angle".into(),
      confidence: Some(4),
    };
    let v = LocalAnalyst.render_explanation(&request);
    assert!(v.get("error_type").is_none());
    assert_eq!(v["related_topics"], json!(["Geometry"]));

    request.student_answer = "D".into();
    let v = LocalAnalyst.render_explanation(&request);
    assert_eq!(v["error_type"], "misinterpretation");
    assert_eq!(v["explanation"], "The correct answer is B, not D.");
  }

  #[test]
  fn perfect_quiz_has_no_classifications() {
    let quiz = input((0..4).map(|i| record(&format!("q{i}"), "Algebra", true, 5)).collect());
    let v = LocalAnalyst.render(&quiz);
    assert_eq!(v["error_classifications"], json!([]));
    assert_eq!(v["predicted_jamb_score"]["score"], 400);
  }
}
