//! The role-gated Secure page.
//!
//! Anonymous callers are sent home. Signed-in callers always get the page;
//! `data-authorized` on the `#authorization` element tells whether their
//! roles allow the protected content. Failures while building the page,
//! panics included, are reported and rendered as "not authorized".

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use std::any::Any;
use std::fmt::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

use super::index::DEFAULT_AUTH_TYPE;
use super::{escape, layout};
use crate::authorization::authorize;
use crate::claims::{aggregate_roles, Principal, UNKNOWN_USER};
use crate::settings::RoleSettings;
use crate::telemetry::{
    properties, timestamp, Telemetry, NO_ROLES_FOUND, SECURE_PAGE_ACCESS,
    UNAUTHORIZED_ACCESS_ATTEMPT,
};
use crate::AppState;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("page rendering failed")]
    Render(#[from] fmt::Error),
    #[error("error processing Secure page request: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureView {
    pub user_name: String,
    pub authentication_type: String,
    pub is_authenticated: bool,
    pub user_roles: Vec<String>,
    pub is_authorized: bool,
}

impl SecureView {
    /// Values shown until the request has been processed, and kept for
    /// whatever was not reached when processing fails.
    pub fn pending() -> Self {
        Self {
            user_name: UNKNOWN_USER.to_string(),
            authentication_type: DEFAULT_AUTH_TYPE.to_string(),
            is_authenticated: true,
            user_roles: Vec::new(),
            is_authorized: false,
        }
    }

    pub fn build(
        principal: &Principal,
        settings: &dyn RoleSettings,
        telemetry: &dyn Telemetry,
    ) -> Self {
        let mut view = Self::pending();
        view.populate(principal, settings, telemetry);
        view
    }

    /// Resolves identity, roles and authorization in that order. Each step
    /// stores its result before the next one starts.
    pub fn populate(
        &mut self,
        principal: &Principal,
        settings: &dyn RoleSettings,
        telemetry: &dyn Telemetry,
    ) {
        self.user_name = principal.display_name();
        self.authentication_type = principal
            .authentication_type
            .clone()
            .unwrap_or_else(|| DEFAULT_AUTH_TYPE.to_string());
        self.is_authenticated = principal.is_authenticated;

        self.user_roles = aggregate_roles(&principal.claims);
        if self.user_roles.is_empty() {
            telemetry.track_event(
                NO_ROLES_FOUND,
                properties([
                    ("UserName", self.user_name.clone()),
                    ("ClaimsCount", principal.claims.len().to_string()),
                ]),
            );
        }

        self.is_authorized = authorize(principal, &self.user_name, settings, telemetry);

        telemetry.track_event(
            SECURE_PAGE_ACCESS,
            properties([
                ("UserName", self.user_name.clone()),
                ("IsAuthorized", bool_text(self.is_authorized).to_string()),
                ("AuthType", self.authentication_type.clone()),
                ("Timestamp", timestamp()),
            ]),
        );
    }

    pub fn render_body(&self) -> Result<String, PageError> {
        let mut html = String::new();
        writeln!(html, "<h1>Secure Page</h1>")?;
        writeln!(html, "<dl class=\"identity\">")?;
        writeln!(html, "<dt>User</dt><dd id=\"user-name\">{}</dd>", escape(&self.user_name))?;
        writeln!(
            html,
            "<dt>Authenticated</dt><dd>{}</dd>",
            bool_text(self.is_authenticated)
        )?;
        writeln!(
            html,
            "<dt>Authentication Type</dt><dd>{}</dd>",
            escape(&self.authentication_type)
        )?;
        writeln!(html, "</dl>")?;

        writeln!(html, "<h2>Roles and Groups</h2>")?;
        if self.user_roles.is_empty() {
            writeln!(html, "<p class=\"roles\">No roles or groups found.</p>")?;
        } else {
            writeln!(html, "<ul class=\"roles\">")?;
            for role in &self.user_roles {
                writeln!(html, "<li>{}</li>", escape(role))?;
            }
            writeln!(html, "</ul>")?;
        }

        writeln!(
            html,
            "<div id=\"authorization\" data-authorized=\"{}\">",
            self.is_authorized
        )?;
        if self.is_authorized {
            writeln!(
                html,
                "<p>You are authorized to view this content.</p>"
            )?;
        } else {
            writeln!(
                html,
                "<p>You are signed in but not authorized to view this content.</p>\n\
                 <p><a href=\"/AccessDenied\">Why am I seeing this?</a></p>"
            )?;
        }
        writeln!(html, "</div>")?;
        Ok(html)
    }
}

fn bool_text(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn report(telemetry: &dyn Telemetry, error: &PageError) {
    telemetry.track_exception(error);
    tracing::error!("Error processing Secure page request: {}", error);
}

pub async fn secure(State(state): State<AppState>, principal: Principal) -> Response {
    if !principal.is_authenticated {
        state.telemetry.track_event(
            UNAUTHORIZED_ACCESS_ATTEMPT,
            properties([
                ("Page", "Secure".to_string()),
                ("Reason", "NotAuthenticated".to_string()),
                ("Timestamp", timestamp()),
            ]),
        );
        return Redirect::to("/").into_response();
    }

    let telemetry = state.telemetry.as_ref();
    let mut view = SecureView::pending();
    let populated = panic::catch_unwind(AssertUnwindSafe(|| {
        view.populate(&principal, state.roles.as_ref(), telemetry)
    }));
    if let Err(payload) = populated {
        report(telemetry, &PageError::Panicked(panic_message(payload.as_ref())));
        view.is_authorized = false;
    }

    let body = view.render_body().or_else(|e| {
        report(telemetry, &e);
        SecureView {
            user_roles: Vec::new(),
            is_authorized: false,
            ..view.clone()
        }
        .render_body()
    });
    match body {
        Ok(body) => Html(layout("Secure", &principal, &body)).into_response(),
        Err(e) => {
            tracing::error!("degraded Secure page failed to render: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
