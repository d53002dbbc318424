//! Persistent application settings (JSON file in app data directory).

use std::fs;
use std::path::{Path, PathBuf};

use pawsense_core::config::{DEFAULT_CAT_THRESHOLD, DEFAULT_DOG_THRESHOLD};
use pawsense_core::ModelSource;
use serde::{Deserialize, Serialize};

/// Thresholds below this would label near-uniform output as a pet.
pub const MIN_THRESHOLD: f32 = 0.5;
pub const MAX_THRESHOLD: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_input_device: Option<String>,
    /// Local model file. Ignored when `model_url` is set.
    pub model_path: Option<PathBuf>,
    pub model_url: Option<String>,
    pub dog_threshold: f32,
    pub cat_threshold: f32,
    pub ort_ep: String,
    pub output: OutputMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Chart,
    Json,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            preferred_input_device: None,
            model_path: None,
            model_url: None,
            dog_threshold: DEFAULT_DOG_THRESHOLD,
            cat_threshold: DEFAULT_CAT_THRESHOLD,
            ort_ep: "cpu".into(),
            output: OutputMode::Chart,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.preferred_input_device = trimmed(self.preferred_input_device.take());
        self.model_url = trimmed(self.model_url.take());
        self.model_path = self
            .model_path
            .take()
            .filter(|p| !p.as_os_str().is_empty());
        self.dog_threshold = normalize_threshold(self.dog_threshold, DEFAULT_DOG_THRESHOLD);
        self.cat_threshold = normalize_threshold(self.cat_threshold, DEFAULT_CAT_THRESHOLD);
        self.ort_ep = normalize_ort_ep(&self.ort_ep);
    }

    /// URL wins over a local path; neither means the default models directory.
    pub fn model_source(&self) -> ModelSource {
        if let Some(url) = &self.model_url {
            return ModelSource::Url(url.clone());
        }
        match &self.model_path {
            Some(path) => ModelSource::File(path.clone()),
            None => ModelSource::default(),
        }
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn normalize_threshold(raw: f32, fallback: f32) -> f32 {
    if raw.is_finite() {
        raw.clamp(MIN_THRESHOLD, MAX_THRESHOLD)
    } else {
        fallback
    }
}

/// Canonical execution provider name. Unknown names are kept so that
/// warm-up reports them.
pub fn normalize_ort_ep(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "cpu" => "cpu".into(),
        "dml" | "directml" => "directml".into(),
        other => other.into(),
    }
}

pub fn apply_runtime_env_from_settings(settings: &AppSettings) {
    if std::env::var("PAWSENSE_ORT_EP").is_err() {
        std::env::set_var("PAWSENSE_ORT_EP", &settings.ort_ep);
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Pawsense")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".config")
            })
            .join("pawsense")
            .join("settings.json")
    }
}

/// Missing or unreadable files yield defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = ?path, "ignoring malformed settings file: {e}");
            AppSettings::default()
        }),
        Err(_) => AppSettings::default(),
    };
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_clamped_and_non_finite_falls_back() {
        let mut settings = AppSettings {
            dog_threshold: 0.2,
            cat_threshold: f32::NAN,
            ..AppSettings::default()
        };
        settings.normalize();
        assert_eq!(settings.dog_threshold, MIN_THRESHOLD);
        assert_eq!(settings.cat_threshold, DEFAULT_CAT_THRESHOLD);

        settings.dog_threshold = 1.7;
        settings.normalize();
        assert_eq!(settings.dog_threshold, MAX_THRESHOLD);
    }

    #[test]
    fn ort_ep_is_canonicalized() {
        assert_eq!(normalize_ort_ep("  "), "cpu");
        assert_eq!(normalize_ort_ep("DML"), "directml");
        assert_eq!(normalize_ort_ep("DirectML "), "directml");
        assert_eq!(normalize_ort_ep("Cuda"), "cuda");
    }

    #[test]
    fn blank_strings_become_none() {
        let mut settings = AppSettings {
            preferred_input_device: Some("   ".into()),
            model_url: Some(" https://example.com/model_3.onnx ".into()),
            ..AppSettings::default()
        };
        settings.normalize();
        assert_eq!(settings.preferred_input_device, None);
        assert_eq!(
            settings.model_url.as_deref(),
            Some("https://example.com/model_3.onnx")
        );
    }

    #[test]
    fn url_takes_precedence_over_path() {
        let settings = AppSettings {
            model_path: Some(PathBuf::from("/models/local.onnx")),
            model_url: Some("https://example.com/m.onnx".into()),
            ..AppSettings::default()
        };
        assert_eq!(
            settings.model_source(),
            ModelSource::Url("https://example.com/m.onnx".into())
        );
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"dogThreshold":0.75,"output":"json"}"#).unwrap();
        assert_eq!(settings.dog_threshold, 0.75);
        assert_eq!(settings.cat_threshold, DEFAULT_CAT_THRESHOLD);
        assert_eq!(settings.output, OutputMode::Json);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let path = std::env::temp_dir()
            .join(format!("pawsense-settings-{}", std::process::id()))
            .join("settings.json");
        let settings = AppSettings {
            preferred_input_device: Some("USB Mic".into()),
            cat_threshold: 0.8,
            ..AppSettings::default()
        };
        save_settings(&path, &settings).unwrap();
        let loaded = load_settings(&path);
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
        assert_eq!(loaded, settings);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let loaded = load_settings(Path::new("/nonexistent/pawsense/settings.json"));
        assert_eq!(loaded, AppSettings::default());
    }
}
