//! Server-rendered pages.

use axum::{
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};

use crate::account::{SIGN_IN_PATH, SIGN_OUT_PATH};
use crate::claims::Principal;
use crate::policy;

pub mod about;
pub mod access_denied;
pub mod index;
pub mod secure;

/// Escapes text for use in HTML content and quoted attributes.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Wraps `body` in the site layout. `body` must already be escaped.
pub fn layout(title: &str, principal: &Principal, body: &str) -> String {
    let account = if principal.is_authenticated {
        format!(
            r#"<span class="user">Hello {}!</span> <a href="{SIGN_OUT_PATH}">Sign out</a>"#,
            escape(&principal.display_name())
        )
    } else {
        format!(r#"<a href="{SIGN_IN_PATH}">Sign in</a>"#)
    };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8" />
<meta name="viewport" content="width=device-width, initial-scale=1.0" />
<title>{title} - rpages</title>
</head>
<body>
<header>
<nav>
<a href="/">Home</a> | <a href="/About">About</a> | <a href="/Secure">Secure</a>
<span class="account">{account}</span>
</nav>
</header>
<main>
{body}
</main>
<footer>&copy; rpages</footer>
</body>
</html>
"#,
        title = escape(title),
    )
}

/// Fallback for unmatched routes. Anonymous callers are asked to sign in
/// first, so nothing outside the public routes is served to them.
pub async fn not_found(principal: Principal, uri: Uri) -> Response {
    if let Some(challenge) = policy::challenge(&principal, &uri) {
        return challenge;
    }
    (
        StatusCode::NOT_FOUND,
        Html(layout(
            "Not Found",
            &principal,
            "<h1>Not Found</h1>\n<p>Sorry, there's nothing at this address.</p>",
        )),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{ClaimSet, NAME};

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn layout_shows_sign_in_for_anonymous() {
        let html = layout("Home", &Principal::anonymous(), "<p>hi</p>");
        assert!(html.contains("<title>Home - rpages</title>"));
        assert!(html.contains(SIGN_IN_PATH));
        assert!(!html.contains(SIGN_OUT_PATH));
    }

    #[test]
    fn layout_greets_signed_in_user() {
        let principal =
            Principal::authenticated(ClaimSet::new().with(NAME, "<Alice>"), "Bearer");
        let html = layout("Home", &principal, "");
        assert!(html.contains("Hello &lt;Alice&gt;!"));
        assert!(html.contains(SIGN_OUT_PATH));
    }
}
