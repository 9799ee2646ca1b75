//! Mock call data model.
//!
//! Defines the stored mock-call definition, the wire/file record it is
//! created from, and the normalized route key both sides share.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::AtomicU32;

/// A single name/value constraint. Repeated names form an allowed-value
/// set for that name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchParam {
    /// Parameter, header, or body-path name
    pub name: String,

    /// Expected value
    pub value: String,
}

impl MatchParam {
    /// Convenience constructor, mostly for tests and bulk fixtures.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A registered mock call held by the registry.
#[derive(Debug, Serialize)]
pub struct MockApiCall {
    /// Unique identifier
    pub call_id: String,

    /// API this call belongs to
    pub api_name: String,

    /// Path within the API
    pub api_path: String,

    /// HTTP method
    pub method: String,

    /// Query parameter constraints
    pub query_params_to_match: Option<Vec<MatchParam>>,

    /// Header constraints
    pub headers_to_match: Option<Vec<MatchParam>>,

    /// Dotted JSON body-path constraints
    pub body_paths_to_match: Option<Vec<MatchParam>>,

    /// Status code returned on match
    pub response_code: u16,

    /// Body returned verbatim on match
    pub response: serde_json::Value,

    /// Instant after which this call no longer matches
    pub expiry: DateTime<Utc>,

    /// Return only on exactly the Nth otherwise-matching request
    pub nth_match: Option<u32>,

    /// Otherwise-matching requests observed so far (only tracked when
    /// `nth_match` is set)
    pub match_count: AtomicU32,
}

impl MockApiCall {
    /// Route key this call is registered under.
    pub fn route_key(&self) -> String {
        route_key(&self.api_name, &self.method, &self.api_path)
    }

    /// Whether the call has passed its expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry < now
    }
}

/// Compute the normalized lookup key for an (api, method, path) route.
///
/// Registration and request dispatch must both go through this function;
/// the two sides silently miss each other otherwise.
pub fn route_key(api_name: &str, method: &str, api_path: &str) -> String {
    format!(
        "{}-{}-{}",
        api_name.to_lowercase(),
        method.to_uppercase(),
        api_path.trim_start_matches('/').to_lowercase()
    )
}

/// Wire and file record a mock call is registered from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockApiCallDto {
    /// Explicit id; one is generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,

    /// API this call belongs to; filled in from the file structure by the
    /// bulk loader
    #[serde(default)]
    pub api_name: String,

    /// Path within the API
    #[serde(default)]
    pub api_path: String,

    /// HTTP method
    #[serde(default)]
    pub method: String,

    /// Query parameter constraints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params_to_match: Option<Vec<MatchParam>>,

    /// Header constraints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers_to_match: Option<Vec<MatchParam>>,

    /// Dotted JSON body-path constraints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_paths_to_match: Option<Vec<MatchParam>>,

    /// Status code returned on match
    pub response_code: u16,

    /// Body returned verbatim on match
    #[serde(default)]
    pub response: serde_json::Value,

    /// Seconds until the call expires; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<i64>,

    /// Return only on exactly the Nth otherwise-matching request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth_match: Option<u32>,
}

impl MockApiCallDto {
    /// Validate the record.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_name.trim().is_empty() {
            anyhow::bail!("api_name cannot be empty");
        }
        if self.api_path.trim().is_empty() {
            anyhow::bail!("api_path cannot be empty");
        }
        if self.method.trim().is_empty() {
            anyhow::bail!("method cannot be empty");
        }
        if self.response_code < 100 || self.response_code > 599 {
            anyhow::bail!("Invalid response code: {}", self.response_code);
        }
        if self.nth_match == Some(0) {
            anyhow::bail!("nth_match must be at least 1");
        }
        if let Some(ttl) = self.time_to_live {
            if ttl <= 0 {
                anyhow::bail!("time_to_live must be positive");
            }
        }
        Ok(())
    }

    /// Build the stored call: resolves the id, converts the time-to-live
    /// into an absolute expiry, and starts the match counter at zero.
    pub fn into_call(self, now: DateTime<Utc>) -> MockApiCall {
        let expiry = match self.time_to_live {
            Some(seconds) => now
                .checked_add_signed(Duration::seconds(seconds))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            None => DateTime::<Utc>::MAX_UTC,
        };

        MockApiCall {
            call_id: self.call_id.unwrap_or_else(generate_call_id),
            api_name: self.api_name,
            api_path: self.api_path,
            method: self.method,
            query_params_to_match: self.query_params_to_match,
            headers_to_match: self.headers_to_match,
            body_paths_to_match: self.body_paths_to_match,
            response_code: self.response_code,
            response: self.response,
            expiry,
            nth_match: self.nth_match,
            match_count: AtomicU32::new(0),
        }
    }
}

/// Inbound request as seen by the matching core: method, multimaps for
/// query parameters and headers, and the raw body.
#[derive(Debug, Clone, Default)]
pub struct IncomingRequest {
    /// HTTP method
    pub method: String,

    /// Content-Type header value, if any
    pub content_type: Option<String>,

    /// Query parameters, each name with its ordered values
    pub query_params: HashMap<String, Vec<String>>,

    /// Headers, lowercased names with ordered values
    pub headers: HashMap<String, Vec<String>>,

    /// Raw body bytes
    pub body: Vec<u8>,
}

/// Generate a UUID-shaped random call id.
pub fn generate_call_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    format!(
        "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
        rng.gen::<u32>(),
        rng.gen::<u16>(),
        rng.gen::<u16>() & 0x0fff,
        (rng.gen::<u16>() & 0x3fff) | 0x8000,
        rng.gen::<u64>() & 0xffffffffffff,
    )
}
