use axum::response::Html;
use chrono::{DateTime, Local};

use super::{escape, layout};
use crate::claims::Principal;

/// Shown when the principal carries no authentication type.
pub const DEFAULT_AUTH_TYPE: &str = "Azure AD";

pub async fn index(principal: Principal) -> Html<String> {
    let current = current_date_time(&principal, Local::now());
    let body = format!(
        "<h1>Welcome</h1>\n<p id=\"current\">{}</p>",
        escape(&current)
    );
    Html(layout("Home", &principal, &body))
}

pub fn current_date_time(principal: &Principal, now: DateTime<Local>) -> String {
    format!(
        "Current server time: {} | {}",
        now.format("%A, %B %-d, %Y %-I:%M %p"),
        auth_info(principal)
    )
}

fn auth_info(principal: &Principal) -> String {
    format!(
        "User: {} | Authenticated: {} | Auth Type: {}",
        principal.landing_name(),
        if principal.is_authenticated { "True" } else { "False" },
        principal
            .authentication_type
            .as_deref()
            .unwrap_or(DEFAULT_AUTH_TYPE)
    )
}
