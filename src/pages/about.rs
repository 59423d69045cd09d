use axum::response::Html;

use super::layout;
use crate::claims::Principal;

pub async fn about(principal: Principal) -> Html<String> {
    Html(layout(
        "About",
        &principal,
        "<h1>About</h1>\n\
         <p>A small site that signs users in with Azure AD and grants access to \
         the Secure page by role membership.</p>",
    ))
}
