use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::HOST, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::net::IpAddr;

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Scheme, host and client address of a request as seen in front of the
/// reverse proxy. Only the entry appended by the nearest proxy (the last
/// one) is used, since earlier entries come from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub scheme: String,
    pub host: Option<String>,
    pub client_ip: Option<IpAddr>,
}

impl RequestOrigin {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let scheme = last_entry(headers, X_FORWARDED_PROTO)
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_else(|| "http".to_string());
        let client_ip = last_entry(headers, X_FORWARDED_FOR).and_then(|s| s.parse().ok());
        let host = headers
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_owned);
        Self {
            scheme,
            host,
            client_ip,
        }
    }

    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    /// Browsers accept `Secure` cookies from HTTPS origins and from
    /// loopback hosts served over plain HTTP.
    pub fn is_secure_context(&self) -> bool {
        self.is_https() || self.is_loopback()
    }

    fn is_loopback(&self) -> bool {
        let Some(host) = self.host.as_deref() else {
            return false;
        };
        let name = match host.strip_prefix('[') {
            Some(bracketed) => bracketed.split(']').next().unwrap_or_default(),
            None => host.rsplit_once(':').map_or(host, |(name, _)| name),
        };
        name.eq_ignore_ascii_case("localhost")
            || name.parse::<IpAddr>().map_or(false, |ip| ip.is_loopback())
    }

    pub fn base_url(&self) -> String {
        format!(
            "{}://{}",
            self.scheme,
            self.host.as_deref().unwrap_or("localhost")
        )
    }
}

fn last_entry(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.rsplit(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

pub async fn forwarded_headers<B>(mut req: Request<B>, next: Next<B>) -> Response {
    let origin = RequestOrigin::from_headers(req.headers());
    tracing::debug!(scheme = %origin.scheme, client_ip = ?origin.client_ip, "forwarded headers applied");
    req.extensions_mut().insert(origin);
    next.run(req).await
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestOrigin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestOrigin>()
            .cloned()
            .unwrap_or_else(|| RequestOrigin::from_headers(&parts.headers)))
    }
}
