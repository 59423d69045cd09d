//! Event and exception reporting.
//!
//! Every item is written to the `telemetry` tracing target. When an
//! Application Insights connection string is configured, items are also
//! posted to its ingestion endpoint in the background.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub type Properties = BTreeMap<String, String>;

pub const UNAUTHORIZED_ACCESS_ATTEMPT: &str = "UnauthorizedAccessAttempt";
pub const SECURE_PAGE_ACCESS: &str = "SecurePageAccess";
pub const NO_ROLES_FOUND: &str = "NoRolesFound";
pub const AUTHORIZATION_GRANTED: &str = "AuthorizationGranted";
pub const AUTHORIZATION_DENIED: &str = "AuthorizationDenied";

const DEFAULT_INGESTION_ENDPOINT: &str = "https://dc.services.visualstudio.com";

pub trait Telemetry: Send + Sync {
    fn track_event(&self, name: &str, properties: Properties);

    fn track_exception(&self, error: &dyn std::error::Error);
}

pub type SharedTelemetry = Arc<dyn Telemetry>;

/// Builds a property map from string pairs.
pub fn properties<const N: usize>(pairs: [(&str, String); N]) -> Properties {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Current UTC time in round-trip format.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Chooses the sink for the configured connection string.
pub fn from_connection_string(connection_string: Option<&str>) -> Result<SharedTelemetry, TelemetryError> {
    match connection_string.filter(|s| !s.trim().is_empty()) {
        Some(s) => {
            let insights = AppInsights::new(ConnectionString::parse(s)?);
            tracing::info!("application insights telemetry enabled");
            Ok(Arc::new(insights))
        }
        None => Ok(Arc::new(TracingTelemetry)),
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("connection string has no InstrumentationKey")]
    MissingInstrumentationKey,

    #[error("malformed connection string segment: {0}")]
    MalformedSegment(String),
}

/// Logs telemetry through `tracing` only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn track_event(&self, name: &str, properties: Properties) {
        log_event(name, &properties);
    }

    fn track_exception(&self, error: &dyn std::error::Error) {
        log_exception(error);
    }
}

fn log_event(name: &str, properties: &Properties) {
    tracing::info!(target: "telemetry", event = name, ?properties);
}

fn log_exception(error: &dyn std::error::Error) {
    tracing::error!(target: "telemetry", exception = %error);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub instrumentation_key: String,
    pub ingestion_endpoint: String,
}

impl ConnectionString {
    /// Parses `Key=Value;Key=Value` pairs. Key names are case-insensitive.
    pub fn parse(s: &str) -> Result<Self, TelemetryError> {
        let mut instrumentation_key = None;
        let mut ingestion_endpoint = None;
        for segment in s.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| TelemetryError::MalformedSegment(segment.to_string()))?;
            match key.trim().to_ascii_lowercase().as_str() {
                "instrumentationkey" => instrumentation_key = Some(value.trim().to_string()),
                "ingestionendpoint" => {
                    ingestion_endpoint = Some(value.trim().trim_end_matches('/').to_string())
                }
                _ => {}
            }
        }
        Ok(Self {
            instrumentation_key: instrumentation_key
                .filter(|k| !k.is_empty())
                .ok_or(TelemetryError::MissingInstrumentationKey)?,
            ingestion_endpoint: ingestion_endpoint
                .unwrap_or_else(|| DEFAULT_INGESTION_ENDPOINT.to_string()),
        })
    }

    pub fn track_url(&self) -> String {
        format!("{}/v2/track", self.ingestion_endpoint)
    }
}

/// Sends telemetry envelopes to Application Insights.
pub struct AppInsights {
    connection: ConnectionString,
    client: reqwest::Client,
}

impl AppInsights {
    pub fn new(connection: ConnectionString) -> Self {
        Self {
            connection,
            client: reqwest::Client::new(),
        }
    }

    fn envelope(&self, kind: &str, base_type: &str, base_data: Value) -> Value {
        json!({
            "name": format!("Microsoft.ApplicationInsights.{kind}"),
            "time": timestamp(),
            "iKey": self.connection.instrumentation_key,
            "tags": { "ai.cloud.role": env!("CARGO_PKG_NAME") },
            "data": { "baseType": base_type, "baseData": base_data },
        })
    }

    fn send(&self, envelope: Value) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no runtime available, telemetry item dropped");
            return;
        };
        let client = self.client.clone();
        let url = self.connection.track_url();
        runtime.spawn(async move {
            let result = client
                .post(&url)
                .json(&envelope)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = result {
                tracing::warn!("telemetry not sent: {}", e);
            }
        });
    }
}

impl Telemetry for AppInsights {
    fn track_event(&self, name: &str, properties: Properties) {
        log_event(name, &properties);
        let envelope = self.envelope(
            "Event",
            "EventData",
            json!({ "ver": 2, "name": name, "properties": properties }),
        );
        self.send(envelope);
    }

    fn track_exception(&self, error: &dyn std::error::Error) {
        log_exception(error);
        let envelope = self.envelope(
            "Exception",
            "ExceptionData",
            json!({
                "ver": 2,
                "exceptions": [{
                    "typeName": "Error",
                    "message": error.to_string(),
                    "hasFullStack": false,
                }],
            }),
        );
        self.send(envelope);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryItem {
    Event { name: String, properties: Properties },
    Exception { message: String },
}

/// Keeps every item in memory. Used by tests.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    items: Mutex<Vec<TelemetryItem>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<TelemetryItem> {
        self.items.lock().map(|i| i.clone()).unwrap_or_default()
    }

    /// Properties of the first event called `name`.
    pub fn event(&self, name: &str) -> Option<Properties> {
        self.items().into_iter().find_map(|item| match item {
            TelemetryItem::Event { name: n, properties } if n == name => Some(properties),
            _ => None,
        })
    }

    pub fn exceptions(&self) -> Vec<String> {
        self.items()
            .into_iter()
            .filter_map(|item| match item {
                TelemetryItem::Exception { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    fn push(&self, item: TelemetryItem) {
        if let Ok(mut items) = self.items.lock() {
            items.push(item);
        }
    }
}

impl Telemetry for MemoryTelemetry {
    fn track_event(&self, name: &str, properties: Properties) {
        log_event(name, &properties);
        self.push(TelemetryItem::Event {
            name: name.to_string(),
            properties,
        });
    }

    fn track_exception(&self, error: &dyn std::error::Error) {
        log_exception(error);
        self.push(TelemetryItem::Exception {
            message: error.to_string(),
        });
    }
}
