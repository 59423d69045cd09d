//! Default access policy: a request needs a signed-in user unless its route
//! is explicitly public.
//!
//! Public routes are the ones registered in [`crate::router`]. Everything
//! else goes through [`challenge`] before it is served.

use axum::{
    http::Uri,
    response::{IntoResponse, Redirect, Response},
};
use url::form_urlencoded;

use crate::account::SIGN_IN_PATH;
use crate::claims::Principal;

/// Sign-in redirect for anonymous callers, `None` once the user is signed in.
pub fn challenge(principal: &Principal, uri: &Uri) -> Option<Response> {
    if principal.is_authenticated {
        return None;
    }
    let return_to = uri.path_and_query().map_or("/", |pq| pq.as_str());
    tracing::debug!("challenging anonymous request for {}", return_to);
    Some(Redirect::to(&sign_in_url(return_to)).into_response())
}

pub fn sign_in_url(return_to: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("redirectUri", return_to)
        .finish();
    format!("{SIGN_IN_PATH}?{query}")
}
