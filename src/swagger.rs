//! OpenAPI document loading and caching.
//!
//! Fetches definitions from the definitions folder or over HTTP, parses
//! them into the reduced model, and caches the result for a configurable
//! interval.

use crate::config::{find_base_directory, ServerConfig, MANAGEMENT_API_NAME};
use crate::spec::SpecModel;
use async_trait::async_trait;
use dashmap::DashMap;
use openapiv3::OpenAPI;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// OpenAPI document describing the management endpoints, compiled into the
/// binary so the management API documents itself without configuration.
const MANAGEMENT_API_DOC: &str = include_str!("../resources/management-api.json");

/// A parsed OpenAPI definition.
///
/// Keeps the document as parsed for the passthrough endpoint alongside the
/// flattened model used for example synthesis.
#[derive(Debug)]
pub struct LoadedSpec {
    /// The document exactly as parsed
    pub document: Value,
    /// Flattened view of paths, operations, and response examples
    pub model: SpecModel,
}

/// Source of OpenAPI definitions for hosted APIs.
#[async_trait]
pub trait SpecProvider: Send + Sync {
    /// Fetch the definition for an API, or None when it is unavailable.
    async fn get_spec(&self, api_name: &str) -> Option<Arc<LoadedSpec>>;
}

struct CachedSpec {
    spec: Arc<LoadedSpec>,
    loaded_at: Instant,
}

/// Loads OpenAPI documents for the configured APIs and caches them.
///
/// Failed loads are not cached, so a missing or broken definition is retried
/// on the next request.
pub struct SwaggerSpecProvider {
    config: Arc<ServerConfig>,
    client: reqwest::Client,
    cache: DashMap<String, CachedSpec>,
}

impl SwaggerSpecProvider {
    /// Create a provider for the configured APIs.
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            cache: DashMap::new(),
        }
    }

    /// Serialize the document for an API with its `servers` entry pointing
    /// back at this server, so clients generated from it call the mock.
    pub async fn get_swagger_json(&self, base_url: &str, api_name: &str) -> Option<String> {
        let spec = self.get_spec(api_name).await?;
        let mut document = spec.document.clone();
        if let Value::Object(map) = &mut document {
            map.insert(
                "servers".to_string(),
                serde_json::json!([{ "url": format!("{}/{}", base_url, api_name) }]),
            );
        }
        Some(document.to_string())
    }

    async fn load(&self, api_name: &str) -> Option<LoadedSpec> {
        let raw = if api_name == MANAGEMENT_API_NAME {
            MANAGEMENT_API_DOC.to_string()
        } else {
            let location = match self.config.swagger_location(api_name) {
                Some(location) => location,
                None => {
                    error!(api = api_name, "No definition configured for the API");
                    return None;
                }
            };
            if location.starts_with("http") {
                self.fetch_from_http(api_name, location).await?
            } else {
                self.fetch_from_file(api_name, location).await?
            }
        };
        parse_document(api_name, &raw)
    }

    async fn fetch_from_http(&self, api_name: &str, url: &str) -> Option<String> {
        let response = match self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(response) => response,
            Err(e) => {
                error!(api = api_name, url, error = %e, "Error fetching the OpenAPI document");
                return None;
            }
        };
        match response.text().await {
            Ok(text) => Some(text),
            Err(e) => {
                error!(api = api_name, url, error = %e, "Error reading the OpenAPI document body");
                None
            }
        }
    }

    async fn fetch_from_file(&self, api_name: &str, location: &str) -> Option<String> {
        let folder = &self.config.api_definitions_folder;
        let Some(dir) = find_base_directory(folder) else {
            error!(
                folder,
                "Could not find the definitions folder in the working directory or any parent"
            );
            return None;
        };
        let path = dir.join(location);
        if !path.is_file() {
            error!(api = api_name, path = %path.display(), "Could not find the OpenAPI file");
            return None;
        }
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Some(content),
            Err(e) => {
                error!(api = api_name, path = %path.display(), error = %e, "Error reading the OpenAPI file");
                None
            }
        }
    }
}

#[async_trait]
impl SpecProvider for SwaggerSpecProvider {
    async fn get_spec(&self, api_name: &str) -> Option<Arc<LoadedSpec>> {
        let ttl = Duration::from_secs(self.config.spec_cache_seconds);
        if let Some(entry) = self.cache.get(api_name) {
            if entry.loaded_at.elapsed() < ttl {
                return Some(Arc::clone(&entry.spec));
            }
        }

        let spec = Arc::new(self.load(api_name).await?);
        self.cache.insert(
            api_name.to_string(),
            CachedSpec {
                spec: Arc::clone(&spec),
                loaded_at: Instant::now(),
            },
        );
        debug!(api = api_name, "Loaded the OpenAPI definition");
        Some(spec)
    }
}

/// Parse a document as JSON first, then as YAML.
fn parse_document(api_name: &str, raw: &str) -> Option<LoadedSpec> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => match serde_yaml::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                error!(api = api_name, error = %e, "Could not parse the OpenAPI document");
                return None;
            }
        },
    };
    let document: OpenAPI = match serde_json::from_value(value.clone()) {
        Ok(document) => document,
        Err(e) => {
            error!(api = api_name, error = %e, "The OpenAPI document is not a valid v3 spec");
            return None;
        }
    };
    let model = SpecModel::from_document(api_name, &document);
    Some(LoadedSpec {
        document: value,
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiDefinition;
    use std::path::Path;

    fn petstore_json(title: &str) -> String {
        serde_json::json!({
            "openapi": "3.0.0",
            "info": { "title": title, "version": "1.0.0" },
            "paths": {
                "/pet/{petId}": {
                    "get": {
                        "responses": {
                            "200": {
                                "description": "ok",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "object",
                                            "properties": {
                                                "id": { "type": "integer", "example": 7 }
                                            }
                                        }
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

    fn test_config(dir: &Path, ttl: u64, location: &str) -> Arc<ServerConfig> {
        Arc::new(ServerConfig {
            api_definitions_folder: dir.to_string_lossy().into_owned(),
            spec_cache_seconds: ttl,
            apis: vec![ApiDefinition {
                api_name: "petstore".to_string(),
                swagger_location: location.to_string(),
            }],
            ..ServerConfig::default()
        })
    }

    #[tokio::test]
    async fn test_loads_spec_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("petstore.json"), petstore_json("Petstore")).unwrap();
        let provider = SwaggerSpecProvider::new(test_config(dir.path(), 60, "petstore.json"));

        let spec = provider.get_spec("petstore").await.unwrap();
        assert_eq!(spec.model.api_name, "petstore");
        assert_eq!(spec.document["info"]["title"], "Petstore");
        assert!(spec.model.resolve_path("pet/42").is_some());
    }

    #[tokio::test]
    async fn test_caches_spec_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("petstore.json");
        std::fs::write(&file, petstore_json("First")).unwrap();
        let provider = SwaggerSpecProvider::new(test_config(dir.path(), 60, "petstore.json"));

        provider.get_spec("petstore").await.unwrap();
        std::fs::write(&file, petstore_json("Second")).unwrap();

        let spec = provider.get_spec("petstore").await.unwrap();
        assert_eq!(spec.document["info"]["title"], "First");
    }

    #[tokio::test]
    async fn test_reloads_after_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("petstore.json");
        std::fs::write(&file, petstore_json("First")).unwrap();
        let provider = SwaggerSpecProvider::new(test_config(dir.path(), 0, "petstore.json"));

        provider.get_spec("petstore").await.unwrap();
        std::fs::write(&file, petstore_json("Second")).unwrap();

        let spec = provider.get_spec("petstore").await.unwrap();
        assert_eq!(spec.document["info"]["title"], "Second");
    }

    #[tokio::test]
    async fn test_unknown_api_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SwaggerSpecProvider::new(test_config(dir.path(), 60, "petstore.json"));
        assert!(provider.get_spec("unknown").await.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SwaggerSpecProvider::new(test_config(dir.path(), 60, "absent.json"));
        assert!(provider.get_spec("petstore").await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_document_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("petstore.json"), "{ not json or yaml ][").unwrap();
        let provider = SwaggerSpecProvider::new(test_config(dir.path(), 60, "petstore.json"));
        assert!(provider.get_spec("petstore").await.is_none());
    }

    #[tokio::test]
    async fn test_management_spec_is_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SwaggerSpecProvider::new(test_config(dir.path(), 60, "petstore.json"));

        let spec = provider.get_spec("management").await.unwrap();
        assert_eq!(spec.model.api_name, "management");
        assert!(!spec.model.paths.is_empty());
    }

    #[tokio::test]
    async fn test_get_swagger_json_rewrites_servers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("petstore.json"), petstore_json("Petstore")).unwrap();
        let provider = SwaggerSpecProvider::new(test_config(dir.path(), 60, "petstore.json"));

        let json = provider
            .get_swagger_json("http://localhost:5000", "petstore")
            .await
            .unwrap();
        let document: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            document["servers"][0]["url"],
            "http://localhost:5000/petstore"
        );
        assert_eq!(document["info"]["title"], "Petstore");
    }

    #[tokio::test]
    async fn test_servers_follow_request_host() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("petstore.json"), petstore_json("Petstore")).unwrap();
        let provider = SwaggerSpecProvider::new(test_config(dir.path(), 60, "petstore.json"));

        provider
            .get_swagger_json("http://first:1111", "petstore")
            .await
            .unwrap();
        let json = provider
            .get_swagger_json("http://second:2222", "petstore")
            .await
            .unwrap();
        let document: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(document["servers"][0]["url"], "http://second:2222/petstore");
    }

    #[tokio::test]
    async fn test_loads_yaml_spec() {
        let yaml = r#"
openapi: "3.0.0"
info:
  title: Petstore
  version: "1.0.0"
paths:
  /pet:
    get:
      responses:
        "200":
          description: ok
"#;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("petstore.yaml"), yaml).unwrap();
        let provider = SwaggerSpecProvider::new(test_config(dir.path(), 60, "petstore.yaml"));

        let spec = provider.get_spec("petstore").await.unwrap();
        assert!(spec.model.resolve_path("pet").is_some());
    }
}
