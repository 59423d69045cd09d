use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

mod account;
pub mod auth;
pub mod authorization;
pub mod claims;
pub mod forwarded;
pub mod openid;
pub mod pages;
pub mod policy;
pub mod settings;
pub mod telemetry;

pub use account::{SIGN_IN_PATH, SIGN_OUT_PATH};

use settings::{RoleSettings, Settings};
use telemetry::SharedTelemetry;

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub provider: openid::Provider,
    pub roles: Arc<dyn RoleSettings>,
    pub telemetry: SharedTelemetry,
    pub callback_path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Settings(#[from] settings::SettingsError),
    #[error("OpenID configuration: {0}")]
    OpenId(#[from] openid::OpenIDError),
    #[error("telemetry: {0}")]
    Telemetry(#[from] telemetry::TelemetryError),
}

/// Discovers the identity provider and builds the application. Roles for
/// the Secure page are read from `config` on every request.
pub async fn app(settings: &Settings, config: config::Config) -> Result<Router, Error> {
    let provider = openid::Provider::discover(
        &settings.azure_ad.metadata_url(),
        &settings.azure_ad.client_id,
    )
    .await?;
    provider.spawn_refresh(settings.azure_ad.jwks_refresh_secs);

    let telemetry = telemetry::from_connection_string(
        settings.application_insights.connection_string.as_deref(),
    )?;

    Ok(router(AppState {
        provider,
        roles: Arc::new(config),
        telemetry,
        callback_path: settings.azure_ad.callback_path.clone(),
    }))
}

pub fn router(state: AppState) -> Router {
    let callback_path = state.callback_path.clone();

    Router::new()
        .route("/", get(pages::index::index))
        .route("/About", get(pages::about::about))
        .route("/AccessDenied", get(pages::access_denied::access_denied))
        .route("/Secure", get(pages::secure::secure))
        .route("/health", get(health))
        .route(SIGN_IN_PATH, get(account::sign_in))
        .route(SIGN_OUT_PATH, get(account::sign_out))
        .route(&callback_path, post(account::callback))
        .fallback(pages::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(forwarded::forwarded_headers))
        .with_state(state)
}

async fn health() -> &'static str {
    "Healthy"
}
