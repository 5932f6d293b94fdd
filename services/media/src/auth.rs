//! Bearer-token sign-in for mutating routes.

use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::MediaError;

/// Token claims; the user id travels in `sub` or `userId`
#[derive(Debug, Deserialize)]
pub struct Claims {
    pub sub: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    pub exp: Option<u64>,
}

impl Claims {
    fn subject(&self) -> Option<Uuid> {
        self.sub
            .as_deref()
            .or(self.user_id.as_deref())
            .and_then(|id| Uuid::parse_str(id).ok())
    }
}

/// Verifies HS256 tokens signed with the shared secret
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // `exp` is checked when present but not required
        validation.required_spec_claims = HashSet::new();

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Caller id carried by an `Authorization` header value
    pub fn verify(&self, header_value: &str) -> Result<Uuid, MediaError> {
        let token = header_value
            .strip_prefix("Bearer ")
            .unwrap_or(header_value)
            .trim();

        if token.is_empty() {
            return Err(MediaError::unauthorized("Please sign in."));
        }

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            debug!(error = %e, "Rejected token");
            MediaError::unauthorized("Invalid token. Please sign in again.")
        })?;

        data.claims
            .subject()
            .ok_or_else(|| MediaError::unauthorized("Token does not identify a user."))
    }
}

/// Authenticated caller, placed in request extensions by [`require_sign_in`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub Uuid);

/// Middleware rejecting requests without a valid token
pub async fn require_sign_in(
    State(verifier): State<Arc<JwtVerifier>>,
    mut request: Request,
    next: Next,
) -> Result<Response, MediaError> {
    let header_value = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| MediaError::unauthorized("Please sign in."))?;

    let user_id = verifier.verify(header_value)?;
    request.extensions_mut().insert(AuthUser(user_id));

    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = MediaError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or_else(|| MediaError::unauthorized("Please sign in."))
    }
}
