//! Application settings.
//!
//! Settings are read with the `config` crate from an optional `rpages.toml`
//! file followed by environment variables, where `__` separates nested keys:
//!
//! - `AZURE_AD__TENANT_ID=...` -> `azure_ad.tenant_id`
//! - `AUTHORIZATION__ROLES=SecureAppUsers,AppAdministrators` -> `authorization.roles`
//!
//! A `.env` file is loaded first when present.

use serde::Deserialize;
use std::net::SocketAddr;
use thiserror::Error;

/// Roles allowed on the Secure page when none are configured.
pub const DEFAULT_ROLES: [&str; 2] = ["SecureAppUsers", "AppAdministrators"];

const ROLES_KEY: &str = "authorization.roles";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    #[error("required configuration missing: {0}")]
    MissingRequired(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub azure_ad: AzureAdSettings,

    #[serde(default)]
    pub application_insights: ApplicationInsightsSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, SettingsError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| SettingsError::InvalidAddress(format!("{}:{}", self.host, self.port)))
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Azure AD (OpenID Connect) application registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AzureAdSettings {
    #[serde(default = "default_instance")]
    pub instance: String,

    #[serde(default)]
    pub tenant_id: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default = "default_callback_path")]
    pub callback_path: String,

    /// Overrides the discovery document location derived from the tenant.
    #[serde(default)]
    pub metadata_address: Option<String>,

    /// Signing key refresh interval, `0` disables refreshing.
    #[serde(default = "default_jwks_refresh_secs")]
    pub jwks_refresh_secs: u64,
}

impl Default for AzureAdSettings {
    fn default() -> Self {
        Self {
            instance: default_instance(),
            tenant_id: String::new(),
            client_id: String::new(),
            callback_path: default_callback_path(),
            metadata_address: None,
            jwks_refresh_secs: default_jwks_refresh_secs(),
        }
    }
}

impl AzureAdSettings {
    pub fn metadata_url(&self) -> String {
        match &self.metadata_address {
            Some(address) => address.clone(),
            None => format!(
                "{}/{}/v2.0/.well-known/openid-configuration",
                self.instance.trim_end_matches('/'),
                self.tenant_id
            ),
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.client_id.is_empty() {
            return Err(SettingsError::MissingRequired("azure_ad.client_id"));
        }
        if self.tenant_id.is_empty() && self.metadata_address.is_none() {
            return Err(SettingsError::MissingRequired("azure_ad.tenant_id"));
        }
        Ok(())
    }
}

fn default_instance() -> String {
    "https://login.microsoftonline.com/".to_string()
}

fn default_callback_path() -> String {
    "/signin-oidc".to_string()
}

fn default_jwks_refresh_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationInsightsSettings {
    #[serde(default)]
    pub connection_string: Option<String>,
}

impl Settings {
    /// Reads the configuration sources. The returned `config::Config` stays
    /// available for live lookups such as [`RoleSettings`].
    pub fn load() -> Result<(Self, config::Config), SettingsError> {
        dotenvy::dotenv().ok();

        let file = std::env::var("RPAGES_CONFIG").unwrap_or_else(|_| "rpages".to_string());
        let config = config::Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key(ROLES_KEY)
                    .try_parsing(true),
            )
            .build()?;
        Ok((Self::from_config(&config)?, config))
    }

    pub fn from_config(config: &config::Config) -> Result<Self, SettingsError> {
        let settings: Settings = config.clone().try_deserialize()?;
        settings.azure_ad.validate()?;
        Ok(settings)
    }
}

/// Source of the allow-list for the Secure page.
pub trait RoleSettings: Send + Sync {
    /// `Ok(None)` means nothing is configured.
    fn allowed_roles(&self) -> Result<Option<Vec<String>>, SettingsError>;
}

impl RoleSettings for config::Config {
    fn allowed_roles(&self) -> Result<Option<Vec<String>>, SettingsError> {
        match self.get::<Vec<String>>(ROLES_KEY) {
            Ok(roles) => Ok(Some(roles)),
            Err(config::ConfigError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl RoleSettings for Vec<String> {
    fn allowed_roles(&self) -> Result<Option<Vec<String>>, SettingsError> {
        Ok(Some(self.clone()))
    }
}

/// The configured allow-list, or [`DEFAULT_ROLES`] when it is missing or empty.
pub fn allowed_roles_or_default(
    settings: &dyn RoleSettings,
) -> Result<Vec<String>, SettingsError> {
    Ok(match settings.allowed_roles()? {
        Some(roles) if !roles.is_empty() => roles,
        _ => DEFAULT_ROLES.iter().map(|r| r.to_string()).collect(),
    })
}
