use axum::response::Html;

use super::layout;
use crate::claims::Principal;

pub async fn access_denied(principal: Principal) -> Html<String> {
    tracing::warn!(
        "Access denied page accessed by user: {}",
        principal.name.as_deref().unwrap_or("Anonymous")
    );
    Html(layout(
        "Access Denied",
        &principal,
        "<h1>Access Denied</h1>\n\
         <p>You do not have permission to view this resource. \
         Ask an administrator to add you to an authorized role.</p>\n\
         <p><a href=\"/\">Return home</a></p>",
    ))
}
