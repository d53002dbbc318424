//! Where the model artifact comes from: a local file or a remote URL.
//!
//! Remote models are downloaded once into the models directory and reused
//! from there on later runs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::WINDOW_SECS;
use crate::error::{PawsenseError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "location")]
pub enum ModelSource {
    File(PathBuf),
    Url(String),
}

impl Default for ModelSource {
    fn default() -> Self {
        ModelSource::File(selected_models_dir().join(default_model_file_name()))
    }
}

impl ModelSource {
    /// Resolve to a local file, downloading it first if needed.
    ///
    /// # Errors
    /// - `PawsenseError::ModelNotFound` if a local file does not exist.
    /// - `PawsenseError::ModelDownload` if the URL cannot be fetched.
    pub fn resolve(&self) -> Result<PathBuf> {
        match self {
            ModelSource::File(path) => {
                if path.exists() {
                    Ok(path.clone())
                } else {
                    Err(PawsenseError::ModelNotFound { path: path.clone() })
                }
            }
            ModelSource::Url(url) => {
                let target = cache_path_for_url(url, &selected_models_dir());
                if target.exists() {
                    info!(url = %url, path = ?target, "using cached remote model");
                    return Ok(target);
                }
                download(url, &target)?;
                Ok(target)
            }
        }
    }
}

/// `model_<secs>.onnx`: the file name encodes the window length the model
/// was exported for.
pub fn default_model_file_name() -> String {
    format!("model_{WINDOW_SECS}.onnx")
}

/// Local cache path for a remote model URL: the last path segment of the URL
/// (query and fragment stripped) inside `dir`.
pub fn cache_path_for_url(url: &str, dir: &Path) -> PathBuf {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let after_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let path = after_scheme
        .split_once('/')
        .map(|(_, path)| path)
        .unwrap_or_default();
    let name = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| format!("remote_{}", default_model_file_name()));
    dir.join(name)
}

/// Models directory, overridable with `PAWSENSE_MODEL_DIR`.
pub fn selected_models_dir() -> PathBuf {
    if let Ok(explicit) = std::env::var("PAWSENSE_MODEL_DIR") {
        let trimmed = explicit.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    default_models_dir()
}

pub fn default_models_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(|p| PathBuf::from(p).join("Pawsense").join("models"))
            .unwrap_or_else(|| PathBuf::from("models"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("pawsense")
            .join("models")
    }
}

#[cfg(feature = "onnx")]
fn download(url: &str, target: &Path) -> Result<()> {
    use std::io::Write;

    info!(url = %url, path = ?target, "downloading remote model");
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| PawsenseError::ModelDownload(e.to_string()))?;
    let bytes = response
        .bytes()
        .map_err(|e| PawsenseError::ModelDownload(e.to_string()))?;
    if bytes.is_empty() {
        return Err(PawsenseError::ModelDownload(format!(
            "empty response body from {url}"
        )));
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // The cache path only ever holds a complete download.
    let partial = target.with_extension("part");
    {
        let mut file = std::fs::File::create(&partial)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&partial, target)?;
    info!(
        path = ?target,
        size_mb = bytes.len() as f64 / 1_048_576.0,
        "remote model cached"
    );
    Ok(())
}

#[cfg(not(feature = "onnx"))]
fn download(url: &str, _target: &Path) -> Result<()> {
    tracing::warn!(url = %url, "remote model requested but compiled without the onnx feature");
    Err(PawsenseError::ModelDownload(
        "compiled without onnx feature".into(),
    ))
}
