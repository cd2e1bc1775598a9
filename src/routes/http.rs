//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{extract::{Path, State}, http::StatusCode, Json, response::IntoResponse};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{AdjustPlanRequest, ExplainRequest, QuizAnalysisInput, StudyPlanRequest};
use crate::error::ApiError;
use crate::logic::{
  adjust_study_plan, analyze_diagnostic, explain_answer, fetch_plan, fetch_report, generate_study_plan,
};
use crate::protocol::*;
use crate::routes::extract::Caller;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let cached_reports = state.cache.store().len().await;
  Json(HealthOut {
    ok: true,
    analyst: state.analyst.name(),
    cached_reports,
    inflight_analyses: state.cache.inflight_len(),
  })
}

#[instrument(level = "info", skip(state, caller, body), fields(subject = %body.subject, records = body.records.len()))]
pub async fn http_post_analyze(
  State(state): State<Arc<AppState>>,
  Caller(caller): Caller,
  Json(body): Json<QuizAnalysisInput>,
) -> Result<impl IntoResponse, ApiError> {
  let (report, outcome) = analyze_diagnostic(&state, &caller, body).await?;
  info!(target: "diagnostic", report_id = %report.id, cache = outcome.as_str(), "HTTP analysis served");
  Ok(Json(AnalyzeOut {
    report: report.as_ref().clone(),
    cache: outcome.as_str(),
    credential_verified: caller.is_verified(),
  }))
}

#[instrument(level = "info", skip(state, caller), fields(%id))]
pub async fn http_get_diagnostic(
  State(state): State<Arc<AppState>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
  let report = fetch_report(&state, &caller, id).await?;
  Ok(Json(report.as_ref().clone()))
}

#[instrument(level = "info", skip(state, caller, body), fields(diagnostic_id = %body.diagnostic_id))]
pub async fn http_post_study_plan(
  State(state): State<Arc<AppState>>,
  Caller(caller): Caller,
  Json(body): Json<StudyPlanRequest>,
) -> Result<impl IntoResponse, ApiError> {
  let plan = generate_study_plan(&state, &caller, body).await?;
  Ok((StatusCode::CREATED, Json(plan.as_ref().clone())))
}

#[instrument(level = "info", skip(state, caller, body), fields(plan_id = %body.study_plan_id))]
pub async fn http_post_adjust_plan(
  State(state): State<Arc<AppState>>,
  Caller(caller): Caller,
  Json(body): Json<AdjustPlanRequest>,
) -> Result<impl IntoResponse, ApiError> {
  let plan = adjust_study_plan(&state, &caller, body).await?;
  Ok(Json(AdjustPlanOut { updated_plan: plan.as_ref().clone() }))
}

#[instrument(level = "info", skip(state, caller), fields(%id))]
pub async fn http_get_study_plan(
  State(state): State<Arc<AppState>>,
  Caller(caller): Caller,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
  let plan = fetch_plan(&state, &caller, id).await?;
  Ok(Json(plan.as_ref().clone()))
}

/// Public: explaining a single answer needs no account.
#[instrument(level = "info", skip(state, body), fields(question_id = %body.question_id))]
pub async fn http_post_explain(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ExplainRequest>,
) -> Result<impl IntoResponse, ApiError> {
  Ok(Json(explain_answer(&state, body).await?))
}

#[instrument(level = "info", skip(caller))]
pub async fn http_get_session(Caller(caller): Caller) -> impl IntoResponse {
  Json(SessionOut::from(&caller))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::auth::tests::{hs256, now, rs256, static_keys, SECRET};
  use crate::auth::TokenVerifier;
  use crate::config::AgentConfig;
  use crate::domain::fixtures::fifteen_question_quiz;
  use crate::local::LocalAnalyst;
  use crate::routes::build_router;
  use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
  };
  use serde_json::{json, Value};
  use tower::ServiceExt;

  fn app(strict: bool) -> Router {
    let verifier = TokenVerifier::new(Some(static_keys()), Some(SECRET)).with_require_verified(strict);
    build_router(Arc::new(AppState::from_parts(AgentConfig::default(), Arc::new(LocalAnalyst), verifier)))
  }

  fn token_for(sub: &str) -> String {
    rs256(&json!({ "sub": sub, "exp": now() + 600 }))
  }

  async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
  }

  fn analyze_req(token: Option<&str>, body: &Value) -> Request<Body> {
    let mut b = Request::post("/api/v1/ai/analyze-diagnostic").header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token {
      b = b.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    b.body(Body::from(body.to_string())).unwrap()
  }

  #[tokio::test]
  async fn health_is_public() {
    let (status, body) = call(&app(false), Request::get("/api/v1/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["analyst"], "local");
    assert_eq!(body["inflightAnalyses"], 0);
  }

  #[tokio::test]
  async fn analyze_then_fetch_as_owner_only() {
    let app = app(false);
    let quiz = serde_json::to_value(fifteen_question_quiz()).unwrap();
    let alice = token_for("alice");

    let (status, body) = call(&app, analyze_req(Some(&alice), &quiz)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cache"], "computed");
    assert_eq!(body["credentialVerified"], true);
    assert_eq!(body["report"]["projected_score"]["base_score"], 213);
    let id = body["report"]["id"].as_str().unwrap().to_string();

    let get = |token: String| {
      Request::get(format!("/api/v1/diagnostics/{id}"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
    };
    let (status, body) = call(&app, get(alice.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());

    let (status, body) = call(&app, get(token_for("mallory"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
  }

  #[tokio::test]
  async fn missing_or_expired_credentials_are_401() {
    let app = app(false);
    let quiz = serde_json::to_value(fifteen_question_quiz()).unwrap();

    let (status, body) = call(&app, analyze_req(None, &quiz)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing_credential");

    let expired = rs256(&json!({ "sub": "alice", "exp": now() - 5 }));
    let (status, body) = call(&app, analyze_req(Some(&expired), &quiz)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "credential_rejected");
  }

  #[tokio::test]
  async fn strict_mode_refuses_unverified_tokens() {
    let forged = hs256(&json!({ "sub": "alice", "exp": now() + 600 }), "guess");
    let req = || {
      Request::get("/api/v1/auth/session")
        .header(header::AUTHORIZATION, format!("Bearer {forged}"))
        .body(Body::empty())
        .unwrap()
    };

    let (status, body) = call(&app(false), req()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tier"], "unverified_accepted");
    assert_eq!(body["verified"], false);

    let (status, body) = call(&app(true), req()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "credential_unverified");
  }

  #[tokio::test]
  async fn invalid_input_is_400_with_code() {
    let mut quiz = serde_json::to_value(fifteen_question_quiz()).unwrap();
    quiz["time_taken_minutes"] = json!(0);
    let (status, body) = call(&app(false), analyze_req(Some(&token_for("alice")), &quiz)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
  }

  fn post_json(path: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut b = Request::post(path).header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token {
      b = b.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    b.body(Body::from(body.to_string())).unwrap()
  }

  #[tokio::test]
  async fn plan_generate_adjust_and_read_back() {
    let app = app(false);
    let alice = token_for("alice");
    let quiz = serde_json::to_value(fifteen_question_quiz()).unwrap();
    let (_, body) = call(&app, analyze_req(Some(&alice), &quiz)).await;
    let diagnostic_id = body["report"]["id"].clone();
    let report_weak = body["report"]["weak_topics"].clone();

    let request = json!({ "diagnosticId": diagnostic_id, "targetScore": 280, "weeksAvailable": 5 });
    let (status, _) = call(&app, post_json("/api/v1/ai/generate-study-plan", None, &request)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, plan) = call(&app, post_json("/api/v1/ai/generate-study-plan", Some(&alice), &request)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(plan["weekly_schedule"].as_array().map(Vec::len), Some(5));
    assert_eq!(plan["weak_topics"], report_weak);
    let plan_id = plan["id"].as_str().unwrap().to_string();

    let adjust = json!({ "studyPlanId": plan_id, "completedTopics": ["Calculus"], "newWeakTopics": [] });
    let (status, _) = call(&app, post_json("/api/v1/ai/adjust-plan", Some(&token_for("mallory")), &adjust)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body_ok) = call(&app, post_json("/api/v1/ai/adjust-plan", Some(&alice), &adjust)).await;
    assert_eq!(status, StatusCode::OK, "{body_ok}");
    let still_weak = body_ok["updatedPlan"]["weak_topics"].as_array().unwrap();
    assert!(!still_weak.contains(&json!("Calculus")));
    assert_eq!(body_ok["updatedPlan"]["completed_topics"], json!(["Calculus"]));

    let get = Request::get(format!("/api/v1/study-plans/{plan_id}"))
      .header(header::AUTHORIZATION, format!("Bearer {alice}"))
      .body(Body::empty())
      .unwrap();
    let (status, stored) = call(&app, get).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored, body_ok["updatedPlan"]);
  }

  #[tokio::test]
  async fn explain_answer_is_public_and_validated() {
    let app = app(false);
    let request = json!({
      "questionId": "geo-4",
      "topic": "Geometry",
      "studentAnswer": "B",
      "correctAnswer": "A",
      "studentReasoning": "I assumed the triangle was isosceles",
    });
    let (status, body) = call(&app, post_json("/api/v1/ai/explain-answer", None, &request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["questionId"], "geo-4");
    assert_eq!(body["isCorrect"], false);
    assert_eq!(body["errorType"], "misinterpretation");

    let mut blank = request.clone();
    blank["studentAnswer"] = json!("");
    let (status, body) = call(&app, post_json("/api/v1/ai/explain-answer", None, &blank)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
  }
}
