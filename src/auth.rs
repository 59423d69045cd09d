use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, TypedHeader},
    headers::{authorization::Bearer, Authorization, Cookie},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use std::convert::Infallible;

use crate::claims::{ClaimSet, Principal};
use crate::AppState;

pub const SESSION_COOKIE: &str = "rpages.session";
pub const NONCE_COOKIE: &str = "rpages.nonce";

pub const COOKIE_AUTHENTICATION: &str = "AuthenticationTypes.Federation";
pub const BEARER_AUTHENTICATION: &str = "Bearer";

const NONCE_MAX_AGE_SECS: u32 = 900;

/// Resolves the request principal from a bearer token or the session
/// cookie. Missing or invalid credentials give the anonymous principal.
#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(principal.clone());
        }
        let app = AppState::from_ref(state);
        let principal = match credential(parts, state).await {
            Some((token, authentication_type)) => match app.provider.validate(&token) {
                Ok(payload) => {
                    Principal::authenticated(ClaimSet::from_token(&payload), authentication_type)
                }
                Err(e) => {
                    tracing::debug!("{}", e);
                    Principal::anonymous()
                }
            },
            None => Principal::anonymous(),
        };
        parts.extensions.insert(principal.clone());
        Ok(principal)
    }
}

async fn credential<S>(parts: &mut Parts, state: &S) -> Option<(String, &'static str)>
where
    S: Send + Sync,
{
    if let Ok(TypedHeader(Authorization(bearer))) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await
    {
        return Some((bearer.token().to_owned(), BEARER_AUTHENTICATION));
    }
    let TypedHeader(cookie) = TypedHeader::<Cookie>::from_request_parts(parts, state)
        .await
        .ok()?;
    cookie
        .get(SESSION_COOKIE)
        .filter(|token| !token.is_empty())
        .map(|token| (token.to_owned(), COOKIE_AUTHENTICATION))
}

fn same_site(secure: bool) -> &'static str {
    if secure {
        "Secure; SameSite=None"
    } else {
        "SameSite=Lax"
    }
}

pub fn session_cookie(token: &str, secure: bool) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; {}", same_site(secure))
}

pub fn nonce_cookie(nonce: &str, secure: bool) -> String {
    format!(
        "{NONCE_COOKIE}={nonce}; Path=/; Max-Age={NONCE_MAX_AGE_SECS}; HttpOnly; {}",
        same_site(secure)
    )
}

pub fn expired_cookie(name: &str, secure: bool) -> String {
    format!("{name}=; Path=/; Max-Age=0; HttpOnly; {}", same_site(secure))
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token".to_string()),
            AuthError::MissingToken => (StatusCode::BAD_REQUEST, "Missing token".to_string()),
            AuthError::NonceMismatch => (StatusCode::UNAUTHORIZED, "Invalid nonce".to_string()),
            AuthError::Provider(message) => (StatusCode::BAD_REQUEST, message.clone()),
            AuthError::InternalServer => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };
        tracing::debug!("{}, {}", status, error_message);
        (status, error_message).into_response()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,
    #[error("missing token")]
    MissingToken,
    #[error("nonce does not match")]
    NonceMismatch,
    #[error("identity provider error: {0}")]
    Provider(String),
    #[error("internal server error")]
    InternalServer,
}
