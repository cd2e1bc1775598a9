//! Configuration: environment settings plus an optional TOML file for tunables.
//!
//! The TOML file (ANALYST_CONFIG_PATH) accepts `[prompts]`, `[guidance]`,
//! `[analysis]`, `[cache]` and a `[[topics]]` catalog. Every section is optional.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::catalog::CatalogTopic;
use crate::domain::ScorePolicy;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub guidance: GuidancePrompts,
  #[serde(default)]
  pub analysis: AnalysisCfg,
  #[serde(default)]
  pub cache: CacheCfg,
  #[serde(default)]
  pub topics: Vec<CatalogTopic>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AnalysisCfg {
  #[serde(default)]
  pub score_policy: ScorePolicy,
}

/// Both limits unset means the cache never evicts.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct CacheCfg {
  #[serde(default)] pub max_entries: Option<usize>,
  #[serde(default)] pub ttl_secs: Option<u64>,
}

impl CacheCfg {
  pub fn is_bounded(&self) -> bool {
    self.max_entries.is_some() || self.ttl_secs.is_some()
  }

  pub fn ttl(&self) -> Option<Duration> {
    self.ttl_secs.map(Duration::from_secs)
  }
}

/// Prompts sent to the analysis model. Override in TOML to tune tone or structure.
///
/// Placeholders in `diagnostic_user_template`: `{subject}`, `{total_questions}`,
/// `{time_taken_minutes}`, `{topics}`, `{topic_stats}`, `{base_score}`, `{records}`.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  pub diagnostic_system: String,
  pub diagnostic_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      diagnostic_system: r#"You are an educational diagnostician for JAMB exam preparation.
Analyse the student's quiz data and return ONLY a JSON object, no markdown.

Rules:
- Use only the provided data. Do not invent questions or topics.
- topic_breakdown must contain exactly one entry per listed topic, using the topic names verbatim.
- Fluency Index (FI) = accuracy * (average confidence / 5).
- status: "weak" if FI < 50 or accuracy < 60; "strong" if FI > 70 and accuracy > 75; otherwise "developing".
- severity (optional): "critical", "moderate" or "mild".
- Classify EVERY incorrect question exactly once with one of:
  conceptual_gap, procedural_error, careless_mistake, knowledge_gap, misinterpretation.
- predicted_jamb_score.score: start from the base score provided, adjust within 0..400.
- study_plan.weekly_schedule: exactly 6 weeks numbered 1..6, foundational gaps first.
- analysis_summary: brief, in the second person ("You ...").

Schema:
{
  "analysis_summary": string,
  "overall_performance": {"accuracy": number},
  "topic_breakdown": [{"topic": string, "accuracy": number, "fluency_index": number,
    "status": string, "questions_attempted": number, "severity": string?,
    "dominant_error_type": string?, "description": string?}],
  "weak_topics": [string], "strong_topics": [string],
  "error_classifications": [{"question_id": string, "error_type": string}],
  "predicted_jamb_score": {"score": number, "confidence_interval": string},
  "foundational_gaps": [{"description": string, "affected_topics": [string]}],
  "study_plan": {"weekly_schedule": [{"week": number, "focus": string,
    "study_hours": number, "key_activities": [string]}]},
  "recommendations": [{"priority": number, "category": string, "action": string, "rationale": string}]
}"#
        .into(),
      diagnostic_user_template: "Subject: {subject}\nTotal questions: {total_questions}\nTime taken (minutes): {time_taken_minutes}\nTopics: {topics}\nPer-topic statistics: {topic_stats}\nBase score: {base_score}\n\nResponses (JSON):\n{records}".into(),
    }
  }
}

/// Prompts for study plan generation and answer explanation.
///
/// `plan_user_template`: `{subject}`, `{weak_topics}`, `{target_score}`, `{current_score}`, `{weeks}`.
/// `explain_user_template`: `{question_id}`, `{question}`, `{topic}`, `{student_answer}`,
/// `{correct_answer}`, `{student_reasoning}`.
#[derive(Clone, Debug, Deserialize)]
pub struct GuidancePrompts {
  pub plan_system: String,
  pub plan_user_template: String,
  pub explain_system: String,
  pub explain_user_template: String,
}

impl Default for GuidancePrompts {
  fn default() -> Self {
    Self {
      plan_system: r#"You are a JAMB preparation coach. Build a week-by-week study plan and return ONLY a JSON object, no markdown.

Rules:
- Start with foundational gaps first and build progressively.
- Every listed weak topic must appear by name in some week's focus or key_activities.
- weekly_schedule has exactly the requested number of weeks, numbered from 1.
- study_hours per week between 1 and 40 (30-45 minutes a day is typical).
- Prioritise topics with the highest exam weight.

Schema:
{"weekly_schedule": [{"week": number, "focus": string, "study_hours": number, "key_activities": [string]}]}"#
        .into(),
      plan_user_template: "Subject: {subject}
Weak topics: {weak_topics}
Target score: {target_score}
Current projected score: {current_score}
Weeks available: {weeks}".into(),
      explain_system: r#"You explain exam answers to a student. Be concise and address the student as "you". Return ONLY a JSON object, no markdown.

If the student's answer is wrong, classify the mistake with one of:
conceptual_gap, procedural_error, careless_mistake, knowledge_gap, misinterpretation.
If the answer is right, omit error_type.

Schema:
{"explanation": string, "correct_reasoning": string, "common_mistake": string?,
 "related_topics": [string], "error_type": string?}"#
        .into(),
      explain_user_template: "Question {question_id}: {question}
Topic: {topic}
Student answer: {student_answer}
Correct answer: {correct_answer}
Student reasoning: {student_reasoning}".into(),
    }
  }
}

/// Attempt to load `AgentConfig` from ANALYST_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("ANALYST_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "quizgap_backend", %path, topics = cfg.topics.len(), policy = ?cfg.analysis.score_policy, "Loaded analyst config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "quizgap_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "quizgap_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

/// Token verification settings.
#[derive(Clone, Debug, Default)]
pub struct AuthSettings {
  pub jwks_url: Option<String>,
  pub shared_secret: Option<String>,
  pub audience: Option<String>,
  /// Refuse `UnverifiedAccepted` credentials instead of letting them through flagged.
  pub require_verified: bool,
}

impl AuthSettings {
  pub fn from_env() -> Self {
    let jwks_url = env_nonempty("AUTH_JWKS_URL").or_else(|| {
      env_nonempty("SUPABASE_URL")
        .map(|base| format!("{}/.well-known/jwks.json", base.trim_end_matches('/')))
    });
    let shared_secret = env_nonempty("SUPABASE_JWT_SECRET").or_else(|| {
      let anon = env_nonempty("SUPABASE_ANON_KEY");
      if anon.is_some() {
        warn!(target: "auth", "SUPABASE_JWT_SECRET not set; using SUPABASE_ANON_KEY as shared secret");
      }
      anon
    });
    let require_verified = env_nonempty("AUTH_REQUIRE_VERIFIED")
      .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
      .unwrap_or(false);

    Self { jwks_url, shared_secret, audience: env_nonempty("AUTH_AUDIENCE"), require_verified }
  }
}

pub fn env_nonempty(key: &str) -> Option<String> {
  std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
