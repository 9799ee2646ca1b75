//! Bulk loading of mock calls from the mock-calls folder.
//!
//! Each `*.json` file holds the nested structure
//! `api_name -> api_path -> METHOD -> [records]`. Files are read in stable
//! name order and records registered in declaration order.

use crate::config::find_base_directory;
use crate::model::MockApiCallDto;
use crate::registry::MockRegistry;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::{error, info};
use walkdir::WalkDir;

/// Counts reported after a load pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    /// Records registered
    pub loaded: usize,
    /// Records rejected: duplicate id or failed validation
    pub skipped: usize,
}

/// Loads mock call files into a registry.
pub struct MockCallsLoader {
    folder: String,
}

impl MockCallsLoader {
    /// Create a loader over the configured mock-calls folder.
    pub fn new(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    /// Scan the folder and register every valid record.
    ///
    /// A file that fails to parse is logged and contributes nothing; later
    /// files still load. Duplicate explicit ids are skipped, never
    /// overwritten.
    pub async fn load(&self, registry: &MockRegistry) -> LoadSummary {
        let mut summary = LoadSummary {
            loaded: 0,
            skipped: 0,
        };

        let Some(folder) = find_base_directory(&self.folder) else {
            info!(folder = %self.folder, "No mock-calls folder found, nothing to load");
            return summary;
        };

        let mut files = 0;
        for entry in WalkDir::new(&folder)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().map_or(true, |e| e != "json") {
                continue;
            }
            files += 1;
            match parse_file(path).await {
                Ok(records) => register_records(registry, records, path, &mut summary),
                Err(e) => {
                    error!(file = %path.display(), error = %e, "Unable to parse the file");
                }
            }
        }

        if files == 0 {
            info!(folder = %folder.display(), "Did not find any mock call files in the folder");
        } else {
            info!(
                files,
                loaded = summary.loaded,
                skipped = summary.skipped,
                "Loaded mock calls from the folder"
            );
        }
        summary
    }
}

/// Parse one file into records, walking the api/path/method nesting.
///
/// The whole file is parsed before anything registers, so a malformed file
/// never half-loads.
async fn parse_file(path: &Path) -> anyhow::Result<Vec<MockApiCallDto>> {
    let content = tokio::fs::read_to_string(path).await?;
    let document: Value = serde_json::from_str(&content)?;
    let Some(apis) = document.as_object() else {
        anyhow::bail!("expected a top-level object of API names");
    };

    let mut records = Vec::new();
    for (api_name, paths) in apis {
        let Some(paths) = paths.as_object() else {
            anyhow::bail!("expected an object of paths under '{}'", api_name);
        };
        for (api_path, methods) in paths {
            let Some(methods) = methods.as_object() else {
                anyhow::bail!("expected an object of methods under '{}'", api_path);
            };
            for (method, calls) in methods {
                let calls: Vec<MockApiCallDto> = serde_json::from_value(calls.clone())?;
                for mut dto in calls {
                    dto.api_name = api_name.clone();
                    dto.api_path = api_path.clone();
                    dto.method = method.clone();
                    records.push(dto);
                }
            }
        }
    }
    Ok(records)
}

fn register_records(
    registry: &MockRegistry,
    records: Vec<MockApiCallDto>,
    path: &Path,
    summary: &mut LoadSummary,
) {
    for dto in records {
        if let Some(call_id) = &dto.call_id {
            if registry.contains(call_id) {
                error!(
                    call_id = %call_id,
                    file = %path.display(),
                    "Ignoring the call as its id is already registered"
                );
                summary.skipped += 1;
                continue;
            }
        }
        if let Err(e) = dto.validate() {
            error!(file = %path.display(), error = %e, "Ignoring an invalid call record");
            summary.skipped += 1;
            continue;
        }
        registry.add(dto.into_call(Utc::now()));
        summary.loaded += 1;
    }
}
