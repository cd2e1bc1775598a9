//! Core behaviors behind the HTTP handlers.
//!
//! This includes:
//!   - Running a diagnostic analysis (validate → canonicalise → cache gate → analyst → assembler)
//!   - Owner-checked report lookup
//!   - Study plans generated from a saved diagnostic, and their adjustment
//!   - Single-answer explanations

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::analyst::{build_explain_prompt, build_plan_prompt, build_prompt};
use crate::auth::VerifiedToken;
use crate::cache::{fingerprint, CacheOutcome};
use crate::domain::{
  AdjustPlanRequest, AnswerExplanation, DiagnosticReport, ExplainRequest, GeneratedPlan, QuizAnalysisInput,
  StudyPlanRequest,
};
use crate::error::{ApiError, DiagnosticError};
use crate::guidance::{adjust_plan, assemble_explanation, assemble_plan, resolve_brief};
use crate::state::{AppState, StoredPlan};

#[instrument(
  level = "info",
  target = "diagnostic",
  skip(state, caller, input),
  fields(subject = %input.subject, records = input.records.len(), verified = caller.is_verified())
)]
pub async fn analyze_diagnostic(
  state: &AppState,
  caller: &VerifiedToken,
  input: QuizAnalysisInput,
) -> Result<(Arc<DiagnosticReport>, CacheOutcome), DiagnosticError> {
  input.validate()?;
  let input = state.catalog.canonicalize(input);
  let fp = fingerprint(&input)?;

  let (report, outcome) = state
    .cache
    .get_or_compute(&fp, || async {
      let prompt = build_prompt(&state.prompts, &input);
      let raw = state.analyst.analyze(&input, &prompt).await?;
      state.assembler.assemble(&input, &fp, &raw)
    })
    .await?;

  state.save_report(&caller.claims.subject, report.clone()).await;
  info!(
    target: "diagnostic",
    report_id = %report.id,
    cache = outcome.as_str(),
    analyst = state.analyst.name(),
    score = report.projected_score.score,
    "Diagnostic served"
  );
  Ok((report, outcome))
}

/// A saved report, visible only to subjects that requested it.
#[instrument(level = "info", skip(state, caller), fields(%id))]
pub async fn fetch_report(state: &AppState, caller: &VerifiedToken, id: Uuid) -> Result<Arc<DiagnosticReport>, ApiError> {
  let stored = state
    .get_report(id)
    .await
    .ok_or_else(|| ApiError::NotFound(format!("diagnostic {id}")))?;
  if !stored.owners.contains(&caller.claims.subject) {
    return Err(ApiError::Forbidden(format!("diagnostic {id} belongs to another user")));
  }
  Ok(stored.report)
}

/// Build a plan on a diagnostic the caller can read; the plan belongs to the caller.
#[instrument(
  level = "info",
  target = "diagnostic",
  skip(state, caller, request),
  fields(diagnostic_id = %request.diagnostic_id, target_score = request.target_score)
)]
pub async fn generate_study_plan(
  state: &AppState,
  caller: &VerifiedToken,
  request: StudyPlanRequest,
) -> Result<Arc<GeneratedPlan>, ApiError> {
  let report = fetch_report(state, caller, request.diagnostic_id).await?;
  let brief = resolve_brief(&request, &report)?;
  let prompt = build_plan_prompt(&state.guidance, &brief);
  let raw = state.analyst.plan(&brief, &prompt).await.map_err(DiagnosticError::from)?;
  let plan = Arc::new(assemble_plan(&brief, report.id, &raw)?);

  state.plans.write().await.insert(
    plan.id,
    StoredPlan { plan: plan.clone(), owner: caller.claims.subject.clone() },
  );
  info!(target: "diagnostic", plan_id = %plan.id, weeks = plan.weekly_schedule.len(), "Study plan served");
  Ok(plan)
}

#[instrument(level = "info", skip(state, caller), fields(%id))]
pub async fn fetch_plan(state: &AppState, caller: &VerifiedToken, id: Uuid) -> Result<Arc<GeneratedPlan>, ApiError> {
  let plans = state.plans.read().await;
  let stored = plans.get(&id).ok_or_else(|| ApiError::NotFound(format!("study plan {id}")))?;
  if stored.owner != caller.claims.subject {
    return Err(ApiError::Forbidden(format!("study plan {id} belongs to another user")));
  }
  Ok(stored.plan.clone())
}

/// Apply progress to an owned plan in place.
#[instrument(level = "info", skip(state, caller, request), fields(plan_id = %request.study_plan_id))]
pub async fn adjust_study_plan(
  state: &AppState,
  caller: &VerifiedToken,
  request: AdjustPlanRequest,
) -> Result<Arc<GeneratedPlan>, ApiError> {
  let id = request.study_plan_id;
  let mut plans = state.plans.write().await;
  let stored = plans.get_mut(&id).ok_or_else(|| ApiError::NotFound(format!("study plan {id}")))?;
  if stored.owner != caller.claims.subject {
    return Err(ApiError::Forbidden(format!("study plan {id} belongs to another user")));
  }
  let adjusted = Arc::new(adjust_plan(&stored.plan, &request.completed_topics, &request.new_weak_topics)?);
  stored.plan = adjusted.clone();
  Ok(adjusted)
}

#[instrument(level = "info", target = "diagnostic", skip(state, request), fields(question_id = %request.question_id))]
pub async fn explain_answer(state: &AppState, request: ExplainRequest) -> Result<AnswerExplanation, DiagnosticError> {
  request.validate()?;
  let prompt = build_explain_prompt(&state.guidance, &request);
  let raw = state.analyst.explain(&request, &prompt).await?;
  assemble_explanation(&request, &raw)
}
