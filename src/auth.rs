//! Bearer token verification chain.
//!
//! Tries, in order: JWKS (asymmetric) → shared secret (HS256) → unverified
//! acceptance of a non-expired token. The outcome is a tagged tier so callers
//! can decide whether the weakest tier is good enough for them. An expired
//! token never gets past this module.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{
  decode, decode_header, errors::ErrorKind, jwk::JwkSet, Algorithm, DecodingKey, Header, Validation,
};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::config::AuthSettings;

const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationTier {
  JwksVerified,
  SharedSecretVerified,
  /// Signature could not be checked; claims are untrusted.
  UnverifiedAccepted,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CredentialClaims {
  pub subject: String,
  pub expires_at: Option<i64>,
  pub issuer: Option<String>,
  pub email: Option<String>,
  pub raw: Map<String, Value>,
}

impl CredentialClaims {
  fn from_map(raw: Map<String, Value>) -> Result<Self, AuthError> {
    let subject = ["sub", "user_id"]
      .iter()
      .find_map(|k| raw.get(*k).and_then(Value::as_str))
      .filter(|s| !s.is_empty())
      .map(str::to_string)
      .ok_or_else(|| AuthError::rejected("token has no subject"))?;
    let text = |k: &str| raw.get(k).and_then(Value::as_str).map(str::to_string);
    Ok(Self {
      subject,
      expires_at: exp_of(&raw),
      issuer: text("iss"),
      email: text("email"),
      raw,
    })
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VerifiedToken {
  pub tier: VerificationTier,
  pub claims: CredentialClaims,
}

impl VerifiedToken {
  pub fn is_verified(&self) -> bool {
    self.tier != VerificationTier::UnverifiedAccepted
  }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
  #[error("missing bearer credential")]
  Missing,
  #[error("credential rejected: {reason}")]
  Rejected { reason: String },
  #[error("credential could not be cryptographically verified")]
  Unverified,
}

impl AuthError {
  fn rejected(reason: impl Into<String>) -> Self {
    Self::Rejected { reason: reason.into() }
  }

  pub fn code(&self) -> &'static str {
    match self {
      Self::Missing => "missing_credential",
      Self::Rejected { .. } => "credential_rejected",
      Self::Unverified => "credential_unverified",
    }
  }
}

#[derive(Debug, Clone, Error)]
#[error("key set unavailable: {0}")]
pub struct KeyFetchError(pub String);

/// Where published signing keys come from.
#[async_trait]
pub trait KeySource: Send + Sync {
  async fn key_set(&self) -> Result<Arc<JwkSet>, KeyFetchError>;
}

/// Fetches a JWKS document over HTTP and caches it for an hour.
pub struct HttpKeySource {
  url: String,
  client: reqwest::Client,
  ttl: Duration,
  cached: RwLock<Option<(Instant, Arc<JwkSet>)>>,
}

impl HttpKeySource {
  pub fn new(url: impl Into<String>) -> Option<Self> {
    Self::with_limits(url, JWKS_FETCH_TIMEOUT, JWKS_CACHE_TTL)
  }

  /// `timeout` bounds each fetch; a fetched set is reused for `ttl`.
  pub fn with_limits(url: impl Into<String>, timeout: Duration, ttl: Duration) -> Option<Self> {
    let client = reqwest::Client::builder().timeout(timeout).build().ok()?;
    Some(Self { url: url.into(), client, ttl, cached: RwLock::new(None) })
  }
}

#[async_trait]
impl KeySource for HttpKeySource {
  #[instrument(level = "debug", target = "auth", skip(self), fields(url = %self.url))]
  async fn key_set(&self) -> Result<Arc<JwkSet>, KeyFetchError> {
    if let Some((at, set)) = self.cached.read().await.as_ref() {
      if at.elapsed() < self.ttl {
        return Ok(set.clone());
      }
    }
    let set: JwkSet = self
      .client
      .get(&self.url)
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| KeyFetchError(e.to_string()))?
      .json()
      .await
      .map_err(|e| KeyFetchError(e.to_string()))?;
    let set = Arc::new(set);
    debug!(target: "auth", keys = set.keys.len(), "JWKS refreshed");
    *self.cached.write().await = Some((Instant::now(), set.clone()));
    Ok(set)
  }
}

enum Failure {
  Expired,
  Invalid(String),
}

impl From<jsonwebtoken::errors::Error> for Failure {
  fn from(e: jsonwebtoken::errors::Error) -> Self {
    match e.kind() {
      ErrorKind::ExpiredSignature => Failure::Expired,
      _ => Failure::Invalid(e.to_string()),
    }
  }
}

pub struct TokenVerifier {
  keys: Option<Arc<dyn KeySource>>,
  secret: Option<DecodingKey>,
  audience: Option<String>,
  require_verified: bool,
}

impl TokenVerifier {
  pub fn new(keys: Option<Arc<dyn KeySource>>, secret: Option<&str>) -> Self {
    Self {
      keys,
      secret: secret.map(|s| DecodingKey::from_secret(s.as_bytes())),
      audience: None,
      require_verified: false,
    }
  }

  pub fn from_settings(settings: &AuthSettings) -> Self {
    let keys = settings.jwks_url.as_deref().and_then(|url| {
      let source = HttpKeySource::new(url);
      if source.is_none() {
        warn!(target: "auth", "Could not build JWKS HTTP client; JWKS verification disabled");
      }
      source.map(|s| Arc::new(s) as Arc<dyn KeySource>)
    });
    let mut verifier =
      Self::new(keys, settings.shared_secret.as_deref()).with_require_verified(settings.require_verified);
    verifier.audience = settings.audience.clone();
    verifier
  }

  pub fn with_require_verified(mut self, strict: bool) -> Self {
    self.require_verified = strict;
    self
  }

  /// Run the chain. `UnverifiedAccepted` is a success here.
  #[instrument(level = "debug", target = "auth", skip_all, fields(token_len = bearer.len()))]
  pub async fn verify(&self, bearer: &str) -> Result<VerifiedToken, AuthError> {
    let token = bearer.trim_start();
    let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
    if token.is_empty() {
      return Err(AuthError::Missing);
    }
    let header = decode_header(token).map_err(|e| AuthError::rejected(format!("malformed token header: {e}")))?;
    let unverified = unverified_payload(token)?;

    match self.verify_jwks(token, &header).await {
      Ok(claims) => return finish(VerificationTier::JwksVerified, claims),
      Err(Failure::Expired) => return Err(AuthError::rejected("token expired")),
      Err(Failure::Invalid(reason)) => debug!(target: "auth", %reason, "JWKS verification failed"),
    }

    match self.verify_secret(token) {
      Ok(claims) => return finish(VerificationTier::SharedSecretVerified, claims),
      Err(Failure::Expired) => return Err(AuthError::rejected("token expired")),
      Err(Failure::Invalid(reason)) => debug!(target: "auth", %reason, "Shared-secret verification failed"),
    }

    let now = chrono::Utc::now().timestamp();
    match exp_of(&unverified) {
      None => Err(AuthError::rejected("unverifiable token without expiry")),
      Some(exp) if exp <= now => Err(AuthError::rejected("token expired")),
      Some(_) => {
        warn!(target: "auth", alg = ?header.alg, kid = ?header.kid, "Accepting token without signature verification");
        finish(VerificationTier::UnverifiedAccepted, unverified)
      }
    }
  }

  /// `verify`, then refuse the unverified tier when strict mode is on.
  pub async fn authenticate(&self, bearer: &str) -> Result<VerifiedToken, AuthError> {
    let token = self.verify(bearer).await?;
    if self.require_verified && !token.is_verified() {
      return Err(AuthError::Unverified);
    }
    Ok(token)
  }

  async fn verify_jwks(&self, token: &str, header: &Header) -> Result<Map<String, Value>, Failure> {
    let source = self.keys.as_ref().ok_or_else(|| Failure::Invalid("no key source configured".into()))?;
    if !is_asymmetric(header.alg) {
      return Err(Failure::Invalid(format!("{:?} is not an asymmetric algorithm", header.alg)));
    }
    let set = source.key_set().await.map_err(|e| Failure::Invalid(e.to_string()))?;
    let jwk = match header.kid.as_deref() {
      Some(kid) => set.find(kid),
      None if set.keys.len() == 1 => set.keys.first(),
      None => None,
    }
    .ok_or_else(|| Failure::Invalid(format!("no signing key for kid {:?}", header.kid)))?;
    let key = DecodingKey::from_jwk(jwk)?;
    Ok(decode::<Map<String, Value>>(token, &key, &self.validation(header.alg))?.claims)
  }

  fn verify_secret(&self, token: &str) -> Result<Map<String, Value>, Failure> {
    let key = self.secret.as_ref().ok_or_else(|| Failure::Invalid("no shared secret configured".into()))?;
    Ok(decode::<Map<String, Value>>(token, key, &self.validation(Algorithm::HS256))?.claims)
  }

  fn validation(&self, alg: Algorithm) -> Validation {
    let mut v = Validation::new(alg);
    v.leeway = 0;
    match &self.audience {
      Some(aud) => v.set_audience(&[aud]),
      None => v.validate_aud = false,
    }
    v
  }
}

fn finish(tier: VerificationTier, raw: Map<String, Value>) -> Result<VerifiedToken, AuthError> {
  let claims = CredentialClaims::from_map(raw)?;
  debug!(target: "auth", ?tier, subject = %claims.subject, "Credential accepted");
  Ok(VerifiedToken { tier, claims })
}

fn is_asymmetric(alg: Algorithm) -> bool {
  !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

fn exp_of(raw: &Map<String, Value>) -> Option<i64> {
  raw.get("exp").and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
}

/// Claims read straight from the payload segment, signature ignored.
fn unverified_payload(token: &str) -> Result<Map<String, Value>, AuthError> {
  let mut parts = token.split('.');
  let (Some(_), Some(payload), Some(_), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
    return Err(AuthError::rejected("token is not a three-part JWT"));
  };
  let bytes = URL_SAFE_NO_PAD
    .decode(payload.trim_end_matches('='))
    .map_err(|e| AuthError::rejected(format!("malformed token payload: {e}")))?;
  serde_json::from_slice(&bytes).map_err(|e| AuthError::rejected(format!("malformed token claims: {e}")))
}
