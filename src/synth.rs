//! Example synthesis from OpenAPI definitions.
//!
//! When no registered mock call matches a request, the response is built
//! from the examples declared in the API's OpenAPI document.

use crate::model::IncomingRequest;
use crate::spec::{ContentVariant, ExampleNode, SpecModel, SpecResponse};
use crate::swagger::SpecProvider;
use std::sync::Arc;
use tracing::error;

/// Builds responses for unmatched requests from OpenAPI examples.
pub struct ExampleBuilder {
    specs: Arc<dyn SpecProvider>,
}

impl ExampleBuilder {
    /// Create a builder backed by the given definition source.
    pub fn new(specs: Arc<dyn SpecProvider>) -> Self {
        Self { specs }
    }

    /// Synthesize a status and JSON body for the request, or None when the
    /// definition offers nothing usable.
    pub async fn build_response(
        &self,
        api_name: &str,
        request_path: &str,
        request: &IncomingRequest,
    ) -> Option<(u16, String)> {
        let Some(spec) = self.specs.get_spec(api_name).await else {
            error!(api = api_name, "No OpenAPI definition available for the API");
            return None;
        };
        synthesize(&spec.model, request_path, request)
    }
}

/// Walk the definition from path to example and render it.
///
/// Each dead end logs why synthesis stopped. A chosen example that renders
/// to nothing yields None rather than falling back to a later choice.
pub(crate) fn synthesize(
    model: &SpecModel,
    request_path: &str,
    request: &IncomingRequest,
) -> Option<(u16, String)> {
    let api = model.api_name.as_str();

    let Some(path) = model.resolve_path(request_path) else {
        error!(api, path = request_path, "No path in the definition matches the request");
        return None;
    };
    let Some(operation) = path.operation(&request.method) else {
        error!(
            api,
            path = %path.template,
            method = %request.method,
            "No operation matches the request method"
        );
        return None;
    };

    let response = operation
        .responses
        .iter()
        .find(|r| r.status == "200")
        .or_else(|| operation.responses.first());
    let Some(response) = response else {
        error!(
            api,
            path = %path.template,
            method = %request.method,
            "The operation defines no responses"
        );
        return None;
    };

    let Some(content) = select_content(response, request.content_type.as_deref()) else {
        error!(
            api,
            path = %path.template,
            status = %response.status,
            "The response defines no content"
        );
        return None;
    };

    let example = select_example(content, request_path)?;
    let body = example.to_json()?;
    let status = response.status.parse::<u16>().unwrap_or(200);
    Some((status, body.to_string()))
}

/// Pick the content variant matching the request's Content-Type, falling
/// back to the first declared variant.
fn select_content<'a>(
    response: &'a SpecResponse,
    content_type: Option<&str>,
) -> Option<&'a ContentVariant> {
    content_type
        .and_then(|ct| response.content.iter().find(|c| c.media_type == ct))
        .or_else(|| response.content.first())
}

/// Pick an example for the variant, in order: a named example whose name
/// occurs in the request path, the declared default example, the first
/// named example, and last the example derived from the schema.
fn select_example<'a>(content: &'a ContentVariant, request_path: &str) -> Option<&'a ExampleNode> {
    let by_name = content
        .named_examples
        .iter()
        .find(|(name, _)| !name.trim().is_empty() && request_path.contains(name.as_str()));
    if let Some((_, node)) = by_name {
        return Some(node);
    }
    if let Some(node) = &content.default_example {
        return Some(node);
    }
    if let Some((_, node)) = content.named_examples.first() {
        return Some(node);
    }
    content.schema_example.as_ref()
}
