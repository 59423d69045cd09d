use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use jsonwebtoken::{jwk, jwk::AlgorithmParameters, DecodingKey};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

type Keys = HashMap<String, DecodingKey>;

/// The parts of the provider's discovery document in use.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Metadata {
    pub issuer: String,
    pub jwks_uri: String,
    pub authorization_endpoint: String,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

/// Discovery metadata plus the signing keys published by the provider.
#[derive(Clone)]
pub struct Provider {
    metadata: Metadata,
    audience: String,
    keys: Arc<RwLock<Keys>>,
}

impl Provider {
    /// Fetches the discovery document and the current signing keys.
    pub async fn discover(metadata_url: &str, audience: &str) -> Result<Self, OpenIDError> {
        let metadata = reqwest::get(metadata_url)
            .await
            .map_err(|_| OpenIDError::InvalidWellKnownUri)?
            .json::<Metadata>()
            .await
            .map_err(|_| OpenIDError::MissingOpenIDConfiguration)?;
        let keys = decoding_keys(&metadata.jwks_uri).await?;
        tracing::info!("loaded {} signing keys from {}", keys.len(), metadata.jwks_uri);
        Ok(Self::with_keys(metadata, audience, keys))
    }

    pub fn with_keys(metadata: Metadata, audience: &str, keys: Keys) -> Self {
        Self {
            metadata,
            audience: audience.to_string(),
            keys: Arc::new(RwLock::new(keys)),
        }
    }

    pub fn from_jwks(metadata: Metadata, audience: &str, jwks: &jwk::JwkSet) -> Self {
        Self::with_keys(metadata, audience, jwks_to_decoding_keys(jwks))
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn client_id(&self) -> &str {
        &self.audience
    }

    /// Re-fetches the signing keys every `sec_interval` seconds. Failures
    /// keep the previous keys.
    pub fn spawn_refresh(&self, sec_interval: u64) {
        if sec_interval == 0 {
            return;
        }
        let provider = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(sec_interval)).await;
                match provider.update_jwks().await {
                    Ok(_) => tracing::debug!("jwks updated"),
                    Err(e) => tracing::error!("Jwks not updated: {}", e),
                };
            }
        });
    }

    async fn update_jwks(&self) -> Result<(), OpenIDError> {
        let new_keys = decoding_keys(&self.metadata.jwks_uri).await?;
        let mut keys = self.keys.write().map_err(|_| OpenIDError::InternalServerError)?;
        *keys = new_keys;
        Ok(())
    }

    /// Verifies signature, issuer, audience and expiry and returns the
    /// token payload.
    pub fn validate(&self, token: &str) -> Result<Map<String, Value>, TokenError> {
        let kid = decode_header(token)
            .map_err(TokenError::Malformed)?
            .kid
            .ok_or(TokenError::MissingKeyId)?;
        let keys = self.keys.read().map_err(|_| TokenError::KeysUnavailable)?;
        let key = keys.get(&kid).ok_or(TokenError::UnknownKey(kid.clone()))?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.metadata.issuer]);
        validation.set_audience(&[&self.audience]);
        let token_data = decode::<Map<String, Value>>(token, key, &validation)
            .map_err(TokenError::Rejected)?;
        Ok(token_data.claims)
    }
}

async fn decoding_keys(jwks_uri: &str) -> Result<Keys, OpenIDError> {
    Ok(jwks_to_decoding_keys(
        &reqwest::get(jwks_uri)
            .await
            .map_err(|_| OpenIDError::InvalidJwksUri)?
            .json()
            .await
            .map_err(|_| OpenIDError::MissingJwksSet)?,
    ))
}

fn jwks_to_decoding_keys(jwks: &jwk::JwkSet) -> Keys {
    let mut hm = HashMap::new();
    for jwk in &jwks.keys {
        if let AlgorithmParameters::RSA(ref rsa) = jwk.algorithm {
            if let Ok(decoding_key) = DecodingKey::from_rsa_components(&rsa.n, &rsa.e) {
                if let Some(kid) = jwk.common.key_id.clone() {
                    hm.insert(kid, decoding_key);
                }
            }
        }
    }
    hm
}

#[derive(Debug, Error)]
pub enum OpenIDError {
    #[error("discovery document could not be fetched")]
    InvalidWellKnownUri,
    #[error("jwks could not be fetched")]
    InvalidJwksUri,
    #[error("discovery document is not a valid openid configuration")]
    MissingOpenIDConfiguration,
    #[error("jwks response is not a valid key set")]
    MissingJwksSet,
    #[error("signing key cache is poisoned")]
    InternalServerError,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(jsonwebtoken::errors::Error),
    #[error("token header has no kid")]
    MissingKeyId,
    #[error("no signing key with kid {0}")]
    UnknownKey(String),
    #[error("signing keys unavailable")]
    KeysUnavailable,
    #[error("token rejected: {0}")]
    Rejected(jsonwebtoken::errors::Error),
}
