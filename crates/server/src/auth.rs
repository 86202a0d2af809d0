use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::Utc;
use reqflow_core::domain::user::{Actor, User};
use reqflow_core::errors::ApplicationError;
use uuid::Uuid;

use crate::api::{ApiError, AppState};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// The caller behind a bearer token. Every requisition operation receives the
/// actor from here; nothing about the session outlives the request.
#[derive(Clone, Debug)]
pub struct AuthenticatedActor {
    pub actor: Actor,
    pub user: User,
    pub correlation_id: String,
}

impl FromRequestParts<AppState> for AuthenticatedActor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(parts);
        let unauthorized = |message: &str| {
            ApiError::new(ApplicationError::Unauthorized(message.to_owned()), &correlation_id)
        };

        let Some(token) = bearer_token(parts) else {
            return Err(unauthorized("missing bearer token"));
        };

        let user = state
            .service
            .users()
            .find_by_token(token, Utc::now())
            .await
            .map_err(|error| ApiError::new(error.into(), &correlation_id))?
            .ok_or_else(|| unauthorized("unknown or expired bearer token"))?;

        if !user.active {
            return Err(unauthorized("user account is inactive"));
        }

        Ok(Self { actor: Actor::from(&user), user, correlation_id })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Caller-supplied correlation id when it is sane, a fresh one otherwise.
fn correlation_id(parts: &Parts) -> String {
    parts
        .headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
