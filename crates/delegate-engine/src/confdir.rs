//! CNI configuration directory lookups
//!
//! Files are considered in lexical order; `.conf`, `.conflist` and `.json`
//! are CNI configuration files. The meta-plugin's own configuration is
//! skipped so it never delegates to itself.

use crate::error::EngineError;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CONFIG_EXTENSIONS: [&str; 3] = ["conf", "conflist", "json"];

/// A configuration file read from disk
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

pub fn is_config_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| CONFIG_EXTENSIONS.contains(&e))
}

/// Configuration files of `dir`, sorted
pub async fn list_config_files(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| EngineError::io(dir, e))?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| EngineError::io(dir, e))?
    {
        let path = entry.path();
        if is_config_file(&path) && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read one configuration file, returning `None` for the meta-plugin's own
/// configuration and for files that are not JSON objects
async fn read_candidate(path: &Path, self_type: &str) -> Result<Option<(ConfigFile, Value)>, EngineError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| EngineError::io(path, e))?;
    let value: Value = match serde_json::from_slice(&bytes) {
        Ok(v @ Value::Object(_)) => v,
        _ => {
            warn!("Skipping unparsable CNI configuration {}", path.display());
            return Ok(None);
        }
    };
    if is_own_config(&value, self_type) {
        debug!("Skipping meta-plugin configuration {}", path.display());
        return Ok(None);
    }
    Ok(Some((
        ConfigFile {
            path: path.to_path_buf(),
            bytes,
        },
        value,
    )))
}

fn is_own_config(value: &Value, self_type: &str) -> bool {
    let type_of = |v: &Value| v.get("type").and_then(Value::as_str).map(str::to_string);
    let first_plugin = value
        .get("plugins")
        .and_then(Value::as_array)
        .and_then(|p| p.first());
    let plugin_type = type_of(value).or_else(|| first_plugin.and_then(type_of));
    plugin_type.as_deref() == Some(self_type)
}

/// First configuration in `dir` whose network `name` equals `name`
pub async fn find_by_network_name(
    dir: &Path,
    name: &str,
    self_type: &str,
) -> Result<Option<ConfigFile>, EngineError> {
    if !dir.is_dir() {
        return Ok(None);
    }
    for path in list_config_files(dir).await? {
        if let Some((file, value)) = read_candidate(&path, self_type).await? {
            if value.get("name").and_then(Value::as_str) == Some(name) {
                debug!("Network {} found in {}", name, path.display());
                return Ok(Some(file));
            }
        }
    }
    Ok(None)
}

/// First usable configuration in `dir`
pub async fn first_config(dir: &Path, self_type: &str) -> Result<Option<ConfigFile>, EngineError> {
    for path in list_config_files(dir).await? {
        if let Some((file, _)) = read_candidate(&path, self_type).await? {
            return Ok(Some(file));
        }
    }
    Ok(None)
}

/// Read a configuration file named by absolute path
pub async fn read_config_file(path: &Path) -> Result<ConfigFile, EngineError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| EngineError::io(path, e))?;
    Ok(ConfigFile {
        path: path.to_path_buf(),
        bytes,
    })
}
