//! The AI collaborator seam.
//!
//! An `Analyst` receives a fully rendered prompt and returns the raw model
//! text. It never validates anything; the assembler (diagnostics) and the
//! guidance module (plans, explanations) treat its output as untrusted.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use crate::config::{GuidancePrompts, Prompts};
use crate::domain::{ExplainRequest, PlanBrief, QuizAnalysisInput};
use crate::error::DiagnosticError;
use crate::scoring;
use crate::util::{fill_template, round2};

/// Transport-level failure of the model call.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("analyst call failed ({status}): {message}")]
pub struct UpstreamError {
  /// HTTP status, or 408 for a client-side timeout, or 502 for connection errors.
  pub status: u16,
  pub message: String,
}

impl From<UpstreamError> for DiagnosticError {
  fn from(e: UpstreamError) -> Self {
    DiagnosticError::Upstream { status: e.status, message: e.message }
  }
}

/// Prompt pair for one analysis.
#[derive(Clone, Debug)]
pub struct AnalysisPrompt {
  pub system: String,
  pub user: String,
}

#[async_trait]
pub trait Analyst: Send + Sync {
  fn name(&self) -> &'static str;

  async fn analyze(&self, input: &QuizAnalysisInput, prompt: &AnalysisPrompt) -> Result<String, UpstreamError>;

  async fn plan(&self, brief: &PlanBrief, prompt: &AnalysisPrompt) -> Result<String, UpstreamError>;

  async fn explain(&self, request: &ExplainRequest, prompt: &AnalysisPrompt) -> Result<String, UpstreamError>;
}

/// Render the prompt. Recomputed statistics are included so the model starts
/// from the same numbers the assembler will enforce.
pub fn build_prompt(prompts: &Prompts, input: &QuizAnalysisInput) -> AnalysisPrompt {
  let r = scoring::recompute(input);
  let topic_stats: Vec<_> = r
    .topics
    .iter()
    .map(|t| {
      json!({
        "topic": t.topic,
        "questions": t.questions,
        "correct": t.correct,
        "accuracy": round2(t.accuracy),
        "avg_confidence": round2(t.avg_confidence),
      })
    })
    .collect();
  let records = serde_json::to_string_pretty(&input.records).unwrap_or_default();
  let topic_stats = serde_json::to_string(&topic_stats).unwrap_or_default();
  let total = input.total_questions.to_string();
  let time = input.time_taken_minutes.to_string();
  let base = scoring::base_score(r.overall.accuracy).to_string();
  let topics = input.topics().join(", ");

  let user = fill_template(
    &prompts.diagnostic_user_template,
    &[
      ("subject", input.subject.as_str()),
      ("total_questions", total.as_str()),
      ("time_taken_minutes", time.as_str()),
      ("topics", topics.as_str()),
      ("topic_stats", topic_stats.as_str()),
      ("base_score", base.as_str()),
      ("records", records.as_str()),
    ],
  );
  AnalysisPrompt { system: prompts.diagnostic_system.clone(), user }
}

pub fn build_plan_prompt(prompts: &GuidancePrompts, brief: &PlanBrief) -> AnalysisPrompt {
  let weak = brief.weak_topics.join(", ");
  let target = brief.target_score.to_string();
  let current = brief.current_score.to_string();
  let weeks = brief.weeks.to_string();
  let user = fill_template(
    &prompts.plan_user_template,
    &[
      ("subject", brief.subject.as_str()),
      ("weak_topics", weak.as_str()),
      ("target_score", target.as_str()),
      ("current_score", current.as_str()),
      ("weeks", weeks.as_str()),
    ],
  );
  AnalysisPrompt { system: prompts.plan_system.clone(), user }
}

pub fn build_explain_prompt(prompts: &GuidancePrompts, request: &ExplainRequest) -> AnalysisPrompt {
  let user = fill_template(
    &prompts.explain_user_template,
    &[
      ("question_id", request.question_id.as_str()),
      ("question", request.question.as_deref().unwrap_or("(not provided)")),
      ("topic", request.topic.as_deref().unwrap_or("(not provided)")),
      ("student_answer", request.student_answer.as_str()),
      ("correct_answer", request.correct_answer.as_str()),
      ("student_reasoning", request.student_reasoning.as_str()),
    ],
  );
  AnalysisPrompt { system: prompts.explain_system.clone(), user }
}
