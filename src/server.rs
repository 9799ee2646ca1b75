//! HTTP server assembly.
//!
//! Wires the registry, loader, spec provider, and response generator into
//! an axum router: explicit routes for the management API and a catch-all
//! that dispatches `/{api_name}/{rest}` requests to the match engine.

use crate::config::ServerConfig;
use crate::generator::ResponseGenerator;
use crate::loader::MockCallsLoader;
use crate::management;
use crate::matcher::parse_query_string;
use crate::model::IncomingRequest;
use crate::registry::MockRegistry;
use crate::swagger::{SpecProvider, SwaggerSpecProvider};
use crate::synth::ExampleBuilder;
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Body served when the request path has no API name segment.
pub const NO_API_BODY: &str = "I don't know what to say.";

/// Shared state behind every handler.
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<MockRegistry>,
    pub generator: ResponseGenerator,
    pub specs: Arc<SwaggerSpecProvider>,
    pub loader: MockCallsLoader,
}

impl AppState {
    /// Build the full service graph from a configuration.
    pub fn new(config: Arc<ServerConfig>) -> Arc<Self> {
        let registry = Arc::new(MockRegistry::new());
        let specs = Arc::new(SwaggerSpecProvider::new(Arc::clone(&config)));
        let provider: Arc<dyn SpecProvider> = specs.clone();
        let generator = ResponseGenerator::new(
            Arc::clone(&registry),
            ExampleBuilder::new(provider),
            config.settings.clone(),
        );
        let loader = MockCallsLoader::new(config.mock_calls_folder.clone());
        Arc::new(Self {
            config,
            registry,
            generator,
            specs,
            loader,
        })
    }
}

/// Assemble the router: management routes plus the catch-all dispatcher.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/management/mock-call", post(management::register_call))
        .route(
            "/management/mock-call/{call_id}",
            post(management::register_call_with_id)
                .get(management::get_call)
                .delete(management::delete_call),
        )
        .route("/management/mock-calls", get(management::list_calls))
        .route("/management/reset", post(management::reset))
        .route(
            "/management/swagger/v2/swagger.json",
            get(management::swagger_json),
        )
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load the mock-calls folder, bind, and serve until shutdown.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let state = AppState::new(Arc::clone(&config));

    let summary = state.loader.load(&state.registry).await;
    info!(
        loaded = summary.loaded,
        skipped = summary.skipped,
        "Loaded mock calls at startup"
    );

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, apis = config.apis.len(), "Mock server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Handle a request to a hosted API.
///
/// The first path segment names the API. A path under it containing
/// `swagger/v2/swagger.json` serves the API's definition; everything else
/// goes through mock matching and example synthesis.
async fn dispatch(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().trim_start_matches('/');
    let (api_name, rest) = match path.split_once('/') {
        Some((api_name, rest)) => (api_name, rest),
        None => (path, ""),
    };

    if api_name.is_empty() {
        return (StatusCode::NOT_FOUND, NO_API_BODY).into_response();
    }
    debug!(path = parts.uri.path(), "Handling the path");

    if rest.contains("swagger/v2/swagger.json") {
        let base = base_url(&parts.headers, &state.config);
        return match state.specs.get_swagger_json(&base, api_name).await {
            Some(json) => ([(CONTENT_TYPE, "application/json")], json).into_response(),
            None => (StatusCode::NOT_FOUND, String::new()).into_response(),
        };
    }

    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => Vec::new(),
    };
    let incoming = IncomingRequest {
        method: parts.method.as_str().to_string(),
        content_type: parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        query_params: parse_query_string(parts.uri.query().unwrap_or_default()),
        headers: header_multimap(&parts.headers),
        body,
    };

    let (status, body) = state.generator.respond(api_name, rest, &incoming).await;
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    (status, [(CONTENT_TYPE, "application/json")], body).into_response()
}

/// Base URL clients should use to reach this server, from the Host header.
pub(crate) fn base_url(headers: &HeaderMap, config: &ServerConfig) -> String {
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(&config.listen_addr);
    format!("http://{}", host)
}

/// Header names are already lowercased by the HTTP layer; values keep
/// declaration order.
fn header_multimap(headers: &HeaderMap) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            map.entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }
    map
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiDefinition;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::path::Path;
    use tower::ServiceExt;

    fn petstore_document() -> String {
        json!({
            "openapi": "3.0.0",
            "info": { "title": "Petstore", "version": "1.0.0" },
            "paths": {
                "/pet/{petId}": {
                    "get": {
                        "responses": {
                            "200": {
                                "description": "ok",
                                "content": {
                                    "application/json": {
                                        "example": { "name": "doggie" }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        })
        .to_string()
    }

    fn test_router(defs_dir: &Path, calls_dir: &Path) -> Router {
        let config = Arc::new(ServerConfig {
            api_definitions_folder: defs_dir.to_string_lossy().into_owned(),
            mock_calls_folder: calls_dir.to_string_lossy().into_owned(),
            apis: vec![ApiDefinition {
                api_name: "petstore".to_string(),
                swagger_location: "petstore.json".to_string(),
            }],
            ..ServerConfig::default()
        });
        build_router(AppState::new(config))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn sample_call() -> Value {
        json!({
            "api_name": "petstore",
            "api_path": "pet/42",
            "method": "GET",
            "response_code": 202,
            "response": { "name": "stubbed" }
        })
    }

    #[tokio::test]
    async fn test_register_then_serve_mock_call() {
        let defs = tempfile::tempdir().unwrap();
        let calls = tempfile::tempdir().unwrap();
        let router = test_router(defs.path(), calls.path());

        let response = router
            .clone()
            .oneshot(post_json("/management/mock-call", sample_call()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["id"].as_str().unwrap().to_string();
        assert!(!id.is_empty());

        let response = router.oneshot(get_req("/petstore/pet/42")).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await, json!({ "name": "stubbed" }));
    }

    #[tokio::test]
    async fn test_register_with_explicit_id_then_get_and_delete() {
        let defs = tempfile::tempdir().unwrap();
        let calls = tempfile::tempdir().unwrap();
        let router = test_router(defs.path(), calls.path());

        let response = router
            .clone()
            .oneshot(post_json("/management/mock-call/my-id", sample_call()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["id"], "my-id");

        let response = router
            .clone()
            .oneshot(get_req("/management/mock-call/my-id"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let stored = body_json(response).await;
        assert_eq!(stored["call_id"], "my-id");
        assert_eq!(stored["api_name"], "petstore");

        let response = router
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .method("DELETE")
                    .uri("/management/mock-call/my-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["id"], "my-id");

        let response = router
            .oneshot(get_req("/management/mock-call/my-id"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_register_invalid_call_is_rejected() {
        let defs = tempfile::tempdir().unwrap();
        let calls = tempfile::tempdir().unwrap();
        let router = test_router(defs.path(), calls.path());

        let mut invalid = sample_call();
        invalid["response_code"] = json!(9999);
        let response = router
            .oneshot(post_json("/management/mock-call", invalid))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INVALID_MOCK_CALL");
    }

    #[tokio::test]
    async fn test_list_calls_nested_shape() {
        let defs = tempfile::tempdir().unwrap();
        let calls = tempfile::tempdir().unwrap();
        let router = test_router(defs.path(), calls.path());

        router
            .clone()
            .oneshot(post_json("/management/mock-call/listed", sample_call()))
            .await
            .unwrap();

        let response = router
            .oneshot(get_req("/management/mock-calls"))
            .await
            .unwrap();
        let listing = body_json(response).await;
        assert_eq!(
            listing["petstore"]["pet/42"]["GET"][0]["call_id"],
            "listed"
        );
    }

    #[tokio::test]
    async fn test_reset_reloads_from_folder() {
        let defs = tempfile::tempdir().unwrap();
        let calls = tempfile::tempdir().unwrap();
        std::fs::write(
            calls.path().join("calls.json"),
            json!({
                "petstore": {
                    "pet": { "GET": [{ "call_id": "from-file", "response_code": 200 }] }
                }
            })
            .to_string(),
        )
        .unwrap();
        let router = test_router(defs.path(), calls.path());

        router
            .clone()
            .oneshot(post_json("/management/mock-call/manual", sample_call()))
            .await
            .unwrap();

        let response = router
            .clone()
            .oneshot(post_json("/management/reset", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let summary = body_json(response).await;
        assert_eq!(summary, json!({ "loaded": 1, "skipped": 0 }));

        let response = router
            .clone()
            .oneshot(get_req("/management/mock-call/manual"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router
            .oneshot(get_req("/management/mock-call/from-file"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_dispatch_synthesizes_from_definition() {
        let defs = tempfile::tempdir().unwrap();
        let calls = tempfile::tempdir().unwrap();
        std::fs::write(defs.path().join("petstore.json"), petstore_document()).unwrap();
        let router = test_router(defs.path(), calls.path());

        let response = router.oneshot(get_req("/petstore/pet/7")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "name": "doggie" }));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_api_serves_fixed_message() {
        let defs = tempfile::tempdir().unwrap();
        let calls = tempfile::tempdir().unwrap();
        let router = test_router(defs.path(), calls.path());

        let response = router.oneshot(get_req("/nowhere/at/all")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_text(response).await,
            "I have never met this man in my life."
        );
    }

    #[tokio::test]
    async fn test_root_path_has_no_api_name() {
        let defs = tempfile::tempdir().unwrap();
        let calls = tempfile::tempdir().unwrap();
        let router = test_router(defs.path(), calls.path());

        let response = router.oneshot(get_req("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, NO_API_BODY);
    }

    #[tokio::test]
    async fn test_swagger_passthrough_rewrites_servers() {
        let defs = tempfile::tempdir().unwrap();
        let calls = tempfile::tempdir().unwrap();
        std::fs::write(defs.path().join("petstore.json"), petstore_document()).unwrap();
        let router = test_router(defs.path(), calls.path());

        let request = axum::http::Request::builder()
            .uri("/petstore/swagger/v2/swagger.json")
            .header("host", "mock.local:5000")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let document = body_json(response).await;
        assert_eq!(document["servers"][0]["url"], "http://mock.local:5000/petstore");
    }

    #[tokio::test]
    async fn test_swagger_passthrough_unavailable_is_empty_404() {
        let defs = tempfile::tempdir().unwrap();
        let calls = tempfile::tempdir().unwrap();
        let router = test_router(defs.path(), calls.path());

        let response = router
            .oneshot(get_req("/petstore/swagger/v2/swagger.json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "");
    }

    #[tokio::test]
    async fn test_management_swagger_is_always_available() {
        let defs = tempfile::tempdir().unwrap();
        let calls = tempfile::tempdir().unwrap();
        let router = test_router(defs.path(), calls.path());

        let response = router
            .oneshot(get_req("/management/swagger/v2/swagger.json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let document = body_json(response).await;
        assert_eq!(document["info"]["title"], "Mock Server Management API");
    }

    #[tokio::test]
    async fn test_dispatch_matches_on_query_params() {
        let defs = tempfile::tempdir().unwrap();
        let calls = tempfile::tempdir().unwrap();
        let router = test_router(defs.path(), calls.path());

        let mut call = sample_call();
        call["api_path"] = json!("pet/findByStatus");
        call["query_params_to_match"] = json!([{ "name": "status", "value": "sold" }]);
        router
            .clone()
            .oneshot(post_json("/management/mock-call", call))
            .await
            .unwrap();

        let response = router
            .clone()
            .oneshot(get_req("/petstore/pet/findByStatus?status=sold"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = router
            .oneshot(get_req("/petstore/pet/findByStatus?status=available"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
