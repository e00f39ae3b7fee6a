//! Bearer token identity gate.
//!
//! Verifies an HS256 token, resolves the caller's role (from the token, or
//! from a `RoleStore` when the token carries none) and stores the resulting
//! `CallerContext` in the request extensions for handlers to extract.

use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Claims read from the bearer token.
///
/// `exp` is optional: tokens issued without an expiry are accepted, expired
/// ones are not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl Claims {
    /// `userId`, falling back to `sub`. Blank values count as missing.
    pub fn subject(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| self.sub.as_deref().filter(|id| !id.is_empty()))
    }
}

/// Verifies bearer tokens signed with a shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims = HashSet::new();
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}

/// Source of roles for tokens issued without a role claim.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// `Ok(None)` when no such user exists.
    async fn role_for_user(&self, user_id: &str) -> Result<Option<String>, AppError>;
}

/// Authenticated caller, as resolved by `auth_middleware`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub user_id: String,
    pub role: String,
}

impl CallerContext {
    /// Reject callers whose role is not in `allowed`.
    pub fn require_role(&self, allowed: &[String]) -> Result<(), AppError> {
        if allowed.iter().any(|r| r == &self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "Access denied. Role \"{}\" is not allowed.",
                self.role
            )))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerContext>()
            .cloned()
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Caller context missing from request extensions"
                ))
            })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Middleware requiring a valid bearer token.
pub async fn auth_middleware<S>(
    State(state): State<S>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError>
where
    S: AsRef<JwtVerifier> + RoleStore + Clone + Send + Sync + 'static,
{
    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing bearer token")))?;

    let claims = state.as_ref().verify(token)?;

    let user_id = claims.subject().map(str::to_string).ok_or_else(|| {
        AppError::Forbidden(anyhow::anyhow!("Access denied. Missing user information."))
    })?;

    let role = match claims.role.filter(|role| !role.is_empty()) {
        Some(role) => role,
        None => {
            tracing::debug!(user_id = %user_id, "Token has no role claim, resolving from store");
            state
                .role_for_user(&user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?
        }
    };

    req.extensions_mut().insert(CallerContext { user_id, role });

    Ok(next.run(req).await)
}
