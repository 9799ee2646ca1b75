//! Configuration for the mock server.
//!
//! Defines the listen address, the folders holding OpenAPI definitions and
//! pre-registered mock calls, and the list of hosted APIs.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Name reserved for the built-in management API.
pub const MANAGEMENT_API_NAME: &str = "management";

/// Main configuration for the mock server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Folder containing OpenAPI definition files, resolved via [`find_base_directory`]
    #[serde(default = "default_api_definitions_folder")]
    pub api_definitions_folder: String,

    /// Folder containing mock call files loaded at startup and on reset
    #[serde(default = "default_mock_calls_folder")]
    pub mock_calls_folder: String,

    /// Seconds a fetched OpenAPI document stays cached before re-reading
    #[serde(default = "default_spec_cache_seconds")]
    pub spec_cache_seconds: u64,

    /// APIs hosted by this server
    #[serde(default)]
    pub apis: Vec<ApiDefinition>,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            anyhow::bail!("Invalid listen_addr: {}", self.listen_addr);
        }
        for (i, api) in self.apis.iter().enumerate() {
            api.validate()
                .map_err(|e| anyhow::anyhow!("Api {}: {}", i, e))?;
        }
        let mut names: Vec<&str> = self.apis.iter().map(|a| a.api_name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.apis.len() {
            anyhow::bail!("Duplicate api_name entries in apis");
        }
        Ok(())
    }

    /// Look up the configured OpenAPI location for an API, if any.
    pub fn swagger_location(&self, api_name: &str) -> Option<&str> {
        self.apis
            .iter()
            .find(|a| a.api_name == api_name)
            .map(|a| a.swagger_location.as_str())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            api_definitions_folder: default_api_definitions_folder(),
            mock_calls_folder: default_mock_calls_folder(),
            spec_cache_seconds: default_spec_cache_seconds(),
            apis: Vec::new(),
            settings: GlobalSettings::default(),
        }
    }
}

/// One hosted API: its name and where its OpenAPI document lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiDefinition {
    /// Name used as the first path segment when calling this API
    pub api_name: String,

    /// File name inside the definitions folder, or an http(s) URL
    pub swagger_location: String,
}

impl ApiDefinition {
    /// Validate the API definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_name.is_empty() {
            anyhow::bail!("api_name cannot be empty");
        }
        if self.api_name.contains('/') {
            anyhow::bail!("api_name cannot contain '/': {}", self.api_name);
        }
        if self.api_name == MANAGEMENT_API_NAME {
            anyhow::bail!("api_name '{}' is reserved", MANAGEMENT_API_NAME);
        }
        if self.swagger_location.is_empty() {
            anyhow::bail!("swagger_location cannot be empty");
        }
        Ok(())
    }

    /// Whether the OpenAPI document is fetched over HTTP rather than read
    /// from the definitions folder.
    pub fn is_remote(&self) -> bool {
        self.swagger_location.starts_with("http")
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log all matched mock calls
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log requests that fall through to example synthesis or 404
    #[serde(default = "default_true")]
    pub log_unmatched: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_listen_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_api_definitions_folder() -> String {
    "api-definitions".to_string()
}

fn default_mock_calls_folder() -> String {
    "mock-api-calls".to_string()
}

fn default_spec_cache_seconds() -> u64 {
    60
}

/// Locate a data folder by name.
///
/// An absolute path is used as-is when it exists. A bare folder name is
/// searched for by walking up from the current directory, so the server can
/// run from a build subdirectory and still find the folder at the repo root.
pub fn find_base_directory(folder: &str) -> Option<PathBuf> {
    let direct = Path::new(folder);
    if direct.is_absolute() {
        return direct.is_dir().then(|| direct.to_path_buf());
    }
    let start = std::env::current_dir().ok()?;
    let mut dir = start.as_path();
    loop {
        let candidate = dir.join(folder);
        if candidate.is_dir() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
}
