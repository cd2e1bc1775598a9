//! Bearer credential extractor.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::debug;

use crate::auth::{AuthError, VerifiedToken};
use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller. Handlers taking this never run without a token
/// that passed the verification chain (and strict mode, when enabled).
pub struct Caller(pub VerifiedToken);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::Missing)?;

        match state.verifier.authenticate(header).await {
            Ok(token) => Ok(Caller(token)),
            Err(e) => {
                debug!(target: "auth", code = e.code(), path = %parts.uri.path(), "Request rejected");
                Err(e.into())
            }
        }
    }
}
