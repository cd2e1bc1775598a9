//! Response cache gate.
//!
//! Reports are keyed by a content fingerprint of the quiz input. At most one
//! analysis runs per fingerprint at a time: concurrent identical requests
//! join the in-flight computation and receive the same report. Failures are
//! shared with whoever was waiting on them but never stored.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, instrument};

use crate::domain::{DiagnosticReport, QuizAnalysisInput};
use crate::error::DiagnosticError;

/// Content hash of an input, insensitive to record order.
pub fn fingerprint(input: &QuizAnalysisInput) -> Result<String, DiagnosticError> {
  let Value::Array(records) = serde_json::to_value(&input.records)
    .map_err(|e| DiagnosticError::InvalidInput(format!("records are not serializable: {e}")))?
  else {
    return Err(DiagnosticError::InvalidInput("records must be a list".into()));
  };
  let mut records: Vec<String> = records.iter().map(Value::to_string).collect();
  records.sort();
  let canonical = json!({
    "subject": input.subject,
    "total_questions": input.total_questions,
    "time_taken_minutes": input.time_taken_minutes,
    "records": records,
  });
  Ok(format!("{:x}", Sha256::digest(canonical.to_string().as_bytes())))
}

#[async_trait]
pub trait ReportStore: Send + Sync {
  async fn get(&self, fingerprint: &str) -> Option<Arc<DiagnosticReport>>;
  async fn insert(&self, fingerprint: &str, report: Arc<DiagnosticReport>);
  async fn len(&self) -> usize;
  async fn clear(&self);
}

/// Never evicts.
#[derive(Default)]
pub struct UnboundedStore {
  entries: RwLock<HashMap<String, Arc<DiagnosticReport>>>,
}

#[async_trait]
impl ReportStore for UnboundedStore {
  async fn get(&self, fingerprint: &str) -> Option<Arc<DiagnosticReport>> {
    self.entries.read().await.get(fingerprint).cloned()
  }

  async fn insert(&self, fingerprint: &str, report: Arc<DiagnosticReport>) {
    self.entries.write().await.insert(fingerprint.to_string(), report);
  }

  async fn len(&self) -> usize {
    self.entries.read().await.len()
  }

  async fn clear(&self) {
    self.entries.write().await.clear();
  }
}

/// Capacity and/or age limited; the oldest insertion goes first.
pub struct BoundedStore {
  max_entries: Option<usize>,
  ttl: Option<Duration>,
  inner: RwLock<BoundedInner>,
}

#[derive(Default)]
struct BoundedInner {
  entries: HashMap<String, (Instant, Arc<DiagnosticReport>)>,
  order: VecDeque<String>,
}

impl BoundedStore {
  pub fn new(max_entries: Option<usize>, ttl: Option<Duration>) -> Self {
    Self { max_entries, ttl, inner: RwLock::new(BoundedInner::default()) }
  }

  fn expired(&self, inserted: Instant) -> bool {
    self.ttl.is_some_and(|ttl| inserted.elapsed() >= ttl)
  }
}

#[async_trait]
impl ReportStore for BoundedStore {
  async fn get(&self, fingerprint: &str) -> Option<Arc<DiagnosticReport>> {
    {
      let inner = self.inner.read().await;
      match inner.entries.get(fingerprint) {
        None => return None,
        Some((at, report)) if !self.expired(*at) => return Some(report.clone()),
        Some(_) => {}
      }
    }
    let mut inner = self.inner.write().await;
    if inner.entries.get(fingerprint).is_some_and(|(at, _)| self.expired(*at)) {
      inner.entries.remove(fingerprint);
      inner.order.retain(|k| k != fingerprint);
      debug!(target: "cache", %fingerprint, "Expired entry dropped");
    }
    None
  }

  async fn insert(&self, fingerprint: &str, report: Arc<DiagnosticReport>) {
    let mut inner = self.inner.write().await;
    if inner.entries.contains_key(fingerprint) {
      inner.order.retain(|k| k != fingerprint);
    }
    inner.entries.insert(fingerprint.to_string(), (Instant::now(), report));
    inner.order.push_back(fingerprint.to_string());

    if let Some(max) = self.max_entries {
      while inner.entries.len() > max {
        let Some(oldest) = inner.order.pop_front() else { break };
        inner.entries.remove(&oldest);
        debug!(target: "cache", fingerprint = %oldest, "Evicted oldest entry");
      }
    }
  }

  async fn len(&self) -> usize {
    self.inner.read().await.entries.len()
  }

  async fn clear(&self) {
    let mut inner = self.inner.write().await;
    inner.entries.clear();
    inner.order.clear();
  }
}

/// How a request was served.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOutcome {
  Hit,
  Computed,
  Joined,
}

impl CacheOutcome {
  pub fn as_str(self) -> &'static str {
    match self {
      CacheOutcome::Hit => "hit",
      CacheOutcome::Computed => "computed",
      CacheOutcome::Joined => "joined",
    }
  }
}

type Flight = Arc<OnceCell<Result<Arc<DiagnosticReport>, DiagnosticError>>>;

pub struct CacheGate {
  store: Arc<dyn ReportStore>,
  inflight: Mutex<HashMap<String, Flight>>,
}

impl CacheGate {
  pub fn new(store: Arc<dyn ReportStore>) -> Self {
    Self { store, inflight: Mutex::new(HashMap::new()) }
  }

  pub fn store(&self) -> &Arc<dyn ReportStore> {
    &self.store
  }

  pub fn inflight_len(&self) -> usize {
    self.inflight.lock().map(|m| m.len()).unwrap_or(0)
  }

  /// Return the stored report for `fingerprint`, or run `compute` exactly once
  /// across all concurrent callers with the same fingerprint.
  #[instrument(level = "debug", target = "cache", skip(self, compute))]
  pub async fn get_or_compute<F, Fut>(
    &self,
    fingerprint: &str,
    compute: F,
  ) -> Result<(Arc<DiagnosticReport>, CacheOutcome), DiagnosticError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<DiagnosticReport, DiagnosticError>>,
  {
    if let Some(hit) = self.store.get(fingerprint).await {
      debug!(target: "cache", "Cache hit");
      return Ok((hit, CacheOutcome::Hit));
    }

    let flight = {
      let mut map = self.inflight.lock().unwrap_or_else(|p| p.into_inner());
      map.entry(fingerprint.to_string()).or_insert_with(|| Arc::new(OnceCell::new())).clone()
    };

    let led = AtomicBool::new(false);
    let store = &self.store;
    let led_ref = &led;
    let result = flight
      .get_or_init(|| async move {
        led_ref.store(true, Ordering::Release);
        // A previous leader may have finished between our miss and joining.
        if let Some(hit) = store.get(fingerprint).await {
          return Ok(hit);
        }
        let report = compute().await.map(Arc::new);
        if let Ok(r) = &report {
          store.insert(fingerprint, r.clone()).await;
        }
        report
      })
      .await
      .clone();

    let outcome = if led.load(Ordering::Acquire) { CacheOutcome::Computed } else { CacheOutcome::Joined };
    if outcome == CacheOutcome::Computed {
      let mut map = self.inflight.lock().unwrap_or_else(|p| p.into_inner());
      if map.get(fingerprint).is_some_and(|f| Arc::ptr_eq(f, &flight)) {
        map.remove(fingerprint);
      }
    }

    match &result {
      Ok(_) => info!(target: "cache", outcome = outcome.as_str(), "Report ready"),
      Err(e) => info!(target: "cache", outcome = outcome.as_str(), error = e.code(), "Computation failed; not cached"),
    }
    result.map(|r| (r, outcome))
  }
}
