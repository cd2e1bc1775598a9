//! Application state: analyst, cache gate, token verifier, and the report repository.
//!
//! This module owns:
//!   - the analyst (OpenAI when configured, otherwise the local analyst)
//!   - the prompts structs (from TOML or defaults)
//!   - the topic catalog and score policy
//!   - the single-flight report cache
//!   - saved reports with their owners, and study plans with theirs

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::RwLock;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::analyst::Analyst;
use crate::assembler::Assembler;
use crate::auth::TokenVerifier;
use crate::cache::{BoundedStore, CacheGate, ReportStore, UnboundedStore};
use crate::catalog::TopicCatalog;
use crate::config::{load_agent_config_from_env, AgentConfig, AuthSettings, GuidancePrompts, Prompts};
use crate::domain::{DiagnosticReport, GeneratedPlan};
use crate::local::LocalAnalyst;
use crate::openai::OpenAI;

/// A persisted report and every subject that has requested it.
#[derive(Clone, Debug)]
pub struct StoredReport {
    pub report: Arc<DiagnosticReport>,
    pub owners: HashSet<String>,
}

/// A study plan and the single subject allowed to read or adjust it.
#[derive(Clone, Debug)]
pub struct StoredPlan {
    pub plan: Arc<GeneratedPlan>,
    pub owner: String,
}

#[derive(Clone)]
pub struct AppState {
    pub analyst: Arc<dyn Analyst>,
    pub prompts: Prompts,
    pub guidance: GuidancePrompts,
    pub assembler: Assembler,
    pub catalog: Arc<TopicCatalog>,
    pub cache: Arc<CacheGate>,
    pub verifier: Arc<TokenVerifier>,
    pub reports: Arc<RwLock<HashMap<Uuid, StoredReport>>>,
    pub plans: Arc<RwLock<HashMap<Uuid, StoredPlan>>>,
}

impl AppState {
    /// Build state from env: load config, pick the analyst, set up auth and cache.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_agent_config_from_env().unwrap_or_default();

        let analyst: Arc<dyn Analyst> = match OpenAI::from_env() {
            Some(oa) => {
                info!(target: "quizgap_backend", base_url = %oa.base_url, model = %oa.model, "OpenAI enabled.");
                Arc::new(oa)
            }
            None => {
                info!(target: "quizgap_backend", "OpenAI disabled (no OPENAI_API_KEY). Using local analyst.");
                Arc::new(LocalAnalyst)
            }
        };

        let auth = AuthSettings::from_env();
        info!(
            target: "auth",
            jwks = auth.jwks_url.is_some(),
            shared_secret = auth.shared_secret.is_some(),
            require_verified = auth.require_verified,
            "Token verification configured"
        );

        Self::from_parts(cfg, analyst, TokenVerifier::from_settings(&auth))
    }

    pub fn from_parts(cfg: AgentConfig, analyst: Arc<dyn Analyst>, verifier: TokenVerifier) -> Self {
        let store: Arc<dyn ReportStore> = if cfg.cache.is_bounded() {
            Arc::new(BoundedStore::new(cfg.cache.max_entries, cfg.cache.ttl()))
        } else {
            Arc::new(UnboundedStore::default())
        };
        let catalog = TopicCatalog::new(cfg.topics);
        info!(
            target: "quizgap_backend",
            analyst = analyst.name(),
            score_policy = ?cfg.analysis.score_policy,
            catalog_topics = catalog.len(),
            cache_max_entries = ?cfg.cache.max_entries,
            cache_ttl_secs = ?cfg.cache.ttl_secs,
            "Application state ready"
        );

        Self {
            analyst,
            prompts: cfg.prompts,
            guidance: cfg.guidance,
            assembler: Assembler::new(cfg.analysis.score_policy),
            catalog: Arc::new(catalog),
            cache: Arc::new(CacheGate::new(store)),
            verifier: Arc::new(verifier),
            reports: Arc::new(RwLock::new(HashMap::new())),
            plans: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record `owner` against a validated report (idempotent).
    #[instrument(level = "debug", skip(self, report), fields(report_id = %report.id))]
    pub async fn save_report(&self, owner: &str, report: Arc<DiagnosticReport>) {
        let mut reports = self.reports.write().await;
        reports
            .entry(report.id)
            .or_insert_with(|| StoredReport { report: report.clone(), owners: HashSet::new() })
            .owners
            .insert(owner.to_string());
    }

    /// Read-only access to a report by id.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn get_report(&self, id: Uuid) -> Option<StoredReport> {
        self.reports.read().await.get(&id).cloned()
    }
}
