#![allow(dead_code)]

use axum::{body::Body, http, http::Request, response::Response, Router};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rpages::openid::{Metadata, Provider};
use rpages::settings::RoleSettings;
use rpages::telemetry::MemoryTelemetry;
use rpages::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

pub const ISSUER: &str = "https://login.microsoftonline.com/contoso/v2.0";
pub const CLIENT_ID: &str = "11111111-2222-3333-4444-555555555555";
pub const KID: &str = "test-key";
pub const AUTHORIZE: &str = "https://login.microsoftonline.com/contoso/oauth2/v2.0/authorize";
pub const END_SESSION: &str = "https://login.microsoftonline.com/contoso/oauth2/v2.0/logout";

const SIGNING_KEY: &[u8] = include_bytes!("../fixtures/signing_key.pem");
const MODULUS: &str = "8TVJRBCrSedLWoJYCsEVbzQiL1mTtKuJZZ1tlJvuGSn9oH5ee1yYgeDp-9pj_jwevRuQcu3YG0s5xIVixLimUJP_u72Ht1njN8ozwh14cGJ_u1PFmsSrDdyHU6IKhz00SzzRamjjiZxh-_WtML7ka1XqI8_NhsaocSXLw4NJ4DlHKS7LBXJt-yr21y0xevn7OzVYRrcvEDKD9MtRTEHD73C5hw5hMP5VCLXPQ9r1YVOPlPxIdD8OGf6z1RBpI6ahnt2-gurNUS5QYchEJ0Bu5CqbbaaX28M7ud0nN-0aOP41-6bTbX9ERdd-Zhqb1aGnl7gfozwyYOVg1xYucEZ5cQ";
const EXPONENT: &str = "AQAB";

pub fn metadata() -> Metadata {
    Metadata {
        issuer: ISSUER.to_string(),
        jwks_uri: "https://login.microsoftonline.com/contoso/discovery/v2.0/keys".to_string(),
        authorization_endpoint: AUTHORIZE.to_string(),
        end_session_endpoint: Some(END_SESSION.to_string()),
    }
}

pub fn provider() -> Provider {
    let jwks = serde_json::from_value(json!({
        "keys": [{ "kty": "RSA", "use": "sig", "kid": KID, "n": MODULUS, "e": EXPONENT }]
    }))
    .unwrap();
    Provider::from_jwks(metadata(), CLIENT_ID, &jwks)
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Signs `claims` on top of a valid issuer, audience and expiry.
pub fn token(claims: Value) -> String {
    let mut payload = json!({
        "iss": ISSUER,
        "aud": CLIENT_ID,
        "iat": now(),
        "exp": now() + 3600,
        "sub": "subject-1",
    });
    if let (Some(base), Value::Object(extra)) = (payload.as_object_mut(), claims) {
        base.extend(extra);
    }
    sign(KID, &payload)
}

pub fn sign(kid: &str, payload: &Value) -> String {
    let header = Header {
        kid: Some(kid.to_string()),
        ..Header::new(Algorithm::RS256)
    };
    encode(&header, payload, &EncodingKey::from_rsa_pem(SIGNING_KEY).unwrap()).unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub telemetry: Arc<MemoryTelemetry>,
}

pub fn app_with_roles(roles: Arc<dyn RoleSettings>) -> TestApp {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let router = rpages::router(AppState {
        provider: provider(),
        roles,
        telemetry: telemetry.clone(),
        callback_path: "/signin-oidc".to_string(),
    });
    TestApp { router, telemetry }
}

pub fn app() -> TestApp {
    app_with_roles(Arc::new(Vec::<String>::new()))
}

impl TestApp {
    pub async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> Response {
        let mut builder = Request::builder().method(http::Method::GET).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn get_as(&self, uri: &str, token: &str) -> Response {
        let bearer = format!("Bearer {token}");
        self.get(uri, &[("Authorization", &bearer)]).await
    }

    pub async fn post_form(&self, uri: &str, form: &str, headers: &[(&str, &str)]) -> Response {
        let mut builder = Request::builder()
            .method(http::Method::POST)
            .uri(uri)
            .header("Content-Type", "application/x-www-form-urlencoded");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::from(form.to_string())).unwrap())
            .await
            .unwrap()
    }
}

pub async fn body_text(resp: Response) -> String {
    let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn location(resp: &Response) -> String {
    resp.headers()
        .get(http::header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

pub fn set_cookies(resp: &Response) -> Vec<String> {
    resp.headers()
        .get_all(http::header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}
