//! Response generation for requests to hosted APIs.
//!
//! Registered mock calls are consulted first, then example synthesis from
//! the OpenAPI definition, and finally a fixed 404.

use crate::config::GlobalSettings;
use crate::matcher::find_match;
use crate::model::{route_key, IncomingRequest};
use crate::registry::MockRegistry;
use crate::synth::ExampleBuilder;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Body served when neither a mock call nor the definition can answer.
pub const NO_MATCH_BODY: &str = "I have never met this man in my life.";

/// Produces the response for a request to a hosted API.
pub struct ResponseGenerator {
    registry: Arc<MockRegistry>,
    examples: ExampleBuilder,
    settings: GlobalSettings,
}

impl ResponseGenerator {
    /// Create a generator over the given registry and example source.
    pub fn new(
        registry: Arc<MockRegistry>,
        examples: ExampleBuilder,
        settings: GlobalSettings,
    ) -> Self {
        Self {
            registry,
            examples,
            settings,
        }
    }

    /// Produce the status and JSON body for a request.
    pub async fn respond(
        &self,
        api_name: &str,
        request_path: &str,
        request: &IncomingRequest,
    ) -> (u16, String) {
        let key = route_key(api_name, &request.method, request_path);
        let calls = self.registry.list(&key);
        if let Some(call) = find_match(&calls, request, Utc::now()) {
            if self.settings.log_matches {
                info!(call_id = %call.call_id, route = %key, "Matched a registered mock call");
            }
            return (call.response_code, call.response.to_string());
        }

        if let Some((status, body)) = self
            .examples
            .build_response(api_name, request_path, request)
            .await
        {
            if self.settings.log_unmatched {
                info!(
                    api = api_name,
                    path = request_path,
                    "Built a response from the OpenAPI definition"
                );
            }
            return (status, body);
        }

        if self.settings.log_unmatched {
            warn!(api = api_name, path = request_path, "Unable to handle the path");
        }
        (404, NO_MATCH_BODY.to_string())
    }
}
