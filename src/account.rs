//! Sign-in and sign-out against the identity provider.
//!
//! Sign-in sends the browser to the provider's authorize endpoint asking for
//! an id token posted back to the callback path. The callback validates the
//! token, checks the nonce and keeps the token in the session cookie.

use axum::{
    extract::{Query, State, TypedHeader},
    headers::Cookie,
    http::header::SET_COOKIE,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::auth::{
    expired_cookie, nonce_cookie, session_cookie, AuthError, COOKIE_AUTHENTICATION, NONCE_COOKIE,
    SESSION_COOKIE,
};
use crate::claims::{ClaimSet, Principal, NONCE};
use crate::forwarded::RequestOrigin;
use crate::AppState;

pub const SIGN_IN_PATH: &str = "/MicrosoftIdentity/Account/SignIn";
pub const SIGN_OUT_PATH: &str = "/MicrosoftIdentity/Account/SignOut";

const SCOPE: &str = "openid profile email";

#[derive(Debug, Deserialize)]
pub struct SignInQuery {
    #[serde(rename = "redirectUri")]
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackForm {
    pub id_token: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// `path` if it stays on this site, otherwise `/`.
pub fn local_path(path: Option<&str>) -> &str {
    match path {
        Some(p) if p.starts_with('/') && !p.starts_with("//") && !p.starts_with("/\\") => p,
        _ => "/",
    }
}

pub async fn sign_in(
    State(state): State<AppState>,
    origin: RequestOrigin,
    Query(query): Query<SignInQuery>,
) -> Result<Response, AuthError> {
    if !origin.is_secure_context() {
        tracing::warn!(
            "sign-in from insecure origin {}: the nonce cookie will not reach the \
             form_post callback, serve the site over HTTPS",
            origin.base_url()
        );
    }
    let nonce = Uuid::new_v4().to_string();
    let mut url = Url::parse(&state.provider.metadata().authorization_endpoint).map_err(|e| {
        tracing::error!("invalid authorization endpoint: {}", e);
        AuthError::InternalServer
    })?;
    url.query_pairs_mut()
        .append_pair("client_id", state.provider.client_id())
        .append_pair("response_type", "id_token")
        .append_pair("response_mode", "form_post")
        .append_pair("scope", SCOPE)
        .append_pair(
            "redirect_uri",
            &format!("{}{}", origin.base_url(), state.callback_path),
        )
        .append_pair("nonce", &nonce)
        .append_pair("state", local_path(query.redirect_uri.as_deref()));

    Ok((
        [(SET_COOKIE, nonce_cookie(&nonce, origin.is_secure_context()))],
        Redirect::to(url.as_str()),
    )
        .into_response())
}

pub async fn callback(
    State(state): State<AppState>,
    origin: RequestOrigin,
    cookies: Option<TypedHeader<Cookie>>,
    Form(form): Form<CallbackForm>,
) -> Result<Response, AuthError> {
    if let Some(error) = form.error {
        let description = form.error_description.unwrap_or_default();
        tracing::warn!("sign-in failed: {} {}", error, description);
        return Err(AuthError::Provider(format!("{error}: {description}")));
    }
    let token = form
        .id_token
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;
    let payload = state.provider.validate(&token).map_err(|e| {
        tracing::debug!("{}", e);
        AuthError::InvalidToken
    })?;

    let expected = cookies
        .as_ref()
        .and_then(|TypedHeader(cookie)| cookie.get(NONCE_COOKIE))
        .ok_or(AuthError::NonceMismatch)?;
    if payload.get(NONCE).and_then(Value::as_str) != Some(expected) {
        return Err(AuthError::NonceMismatch);
    }

    let principal = Principal::authenticated(ClaimSet::from_token(&payload), COOKIE_AUTHENTICATION);
    tracing::info!("user signed in: {}", principal.display_name());

    Ok((
        AppendHeaders([
            (SET_COOKIE, session_cookie(&token, origin.is_https())),
            (
                SET_COOKIE,
                expired_cookie(NONCE_COOKIE, origin.is_secure_context()),
            ),
        ]),
        Redirect::to(local_path(form.state.as_deref())),
    )
        .into_response())
}

pub async fn sign_out(
    State(state): State<AppState>,
    origin: RequestOrigin,
    principal: Principal,
) -> Response {
    if let Some(name) = &principal.name {
        tracing::info!("user signed out: {}", name);
    }
    let target = state
        .provider
        .metadata()
        .end_session_endpoint
        .as_deref()
        .and_then(|endpoint| Url::parse(endpoint).ok())
        .map(|mut url| {
            url.query_pairs_mut()
                .append_pair("post_logout_redirect_uri", &format!("{}/", origin.base_url()));
            url.to_string()
        })
        .unwrap_or_else(|| "/".to_string());

    (
        [(SET_COOKIE, expired_cookie(SESSION_COOKIE, origin.is_https()))],
        Redirect::to(&target),
    )
        .into_response()
}
