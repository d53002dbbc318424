//! Command-line flags. Values given here override the settings file.

use std::path::PathBuf;

use clap::Parser;

use crate::settings::{AppSettings, OutputMode};

#[derive(Debug, Parser)]
#[command(name = "pawsense", about = "Live cat and dog sound detection", version)]
pub struct Cli {
    /// Settings file (default: platform config directory).
    #[arg(long, env = "PAWSENSE_SETTINGS", value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// ONNX classifier exported for a 3 s, 16 kHz mono waveform.
    #[arg(long, value_name = "FILE", conflicts_with = "model_url")]
    pub model: Option<PathBuf>,

    /// Download the model from this URL (cached in the models directory).
    #[arg(long = "model-url", value_name = "URL")]
    pub model_url: Option<String>,

    /// Use the built-in stub classifier instead of a model file.
    #[arg(long, default_value_t = false)]
    pub stub: bool,

    /// Preferred input device name.
    #[arg(long, value_name = "NAME")]
    pub device: Option<String>,

    /// Print input devices and exit.
    #[arg(long = "list-devices", default_value_t = false)]
    pub list_devices: bool,

    /// Classify a WAV file instead of the microphone.
    #[arg(long, value_name = "FILE")]
    pub wav: Option<PathBuf>,

    /// Feed the WAV file as fast as the classifier accepts it.
    #[arg(long = "no-realtime", default_value_t = false, requires = "wav")]
    pub no_realtime: bool,

    #[arg(long = "dog-threshold", value_name = "P")]
    pub dog_threshold: Option<f32>,

    #[arg(long = "cat-threshold", value_name = "P")]
    pub cat_threshold: Option<f32>,

    /// Print one JSON object per classification instead of the chart.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Write the effective settings back to the settings file.
    #[arg(long = "save-settings", default_value_t = false)]
    pub save_settings: bool,
}

impl Cli {
    pub fn apply_to(&self, settings: &mut AppSettings) {
        if let Some(device) = &self.device {
            settings.preferred_input_device = Some(device.clone());
        }
        if let Some(path) = &self.model {
            settings.model_path = Some(path.clone());
            settings.model_url = None;
        }
        if let Some(url) = &self.model_url {
            settings.model_url = Some(url.clone());
        }
        if let Some(p) = self.dog_threshold {
            settings.dog_threshold = p;
        }
        if let Some(p) = self.cat_threshold {
            settings.cat_threshold = p;
        }
        if self.json {
            settings.output = OutputMode::Json;
        }
        settings.normalize();
    }
}
