//! Waveform classifier backend via the `ort` crate.
//!
//! Expects a single-input, single-output export:
//! - input  `[1, 1, samples]` f32: raw 16 kHz mono waveform (`samples = 48000` for 3 s)
//! - output `[1, classes]`    f32: logits in class order cat, dog, none
//!
//! Input/output names are read from the session unless overridden in
//! [`OnnxClassifierConfig`].

use ndarray::Array3;
use ort::session::{Session, SessionInputValue};
use ort::value::{TensorRef, Value};
use ort::{
    ep,
    session::builder::{GraphOptimizationLevel, SessionBuilder},
};
use tracing::{debug, info, warn};

use crate::{
    config::{CHUNK_SAMPLES, WINDOW_CHUNKS},
    error::{PawsenseError, Result},
    inference::{source::ModelSource, AudioClassifier, InputShape},
};

// ── Model config ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct OnnxClassifierConfig {
    pub source: ModelSource,
    /// Override for the waveform input name. `None` uses the first session input.
    pub input_name: Option<String>,
    /// Override for the logits output name. `None` uses the first session output.
    pub output_name: Option<String>,
}

fn intra_threads() -> usize {
    let logical_cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    std::env::var("PAWSENSE_ORT_INTRA_THREADS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or_else(|| logical_cores.clamp(1, 4))
        .clamp(1, 16)
}

/// Execution provider selected with `PAWSENSE_ORT_EP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrtExecutionPreference {
    Cpu,
    DirectML,
}

fn parse_execution_preference(raw: &str) -> Result<OrtExecutionPreference> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "cpu" => Ok(OrtExecutionPreference::Cpu),
        "dml" | "directml" => Ok(OrtExecutionPreference::DirectML),
        other => Err(PawsenseError::OnnxSession(format!(
            "unknown execution provider {other:?} (expected cpu or directml)"
        ))),
    }
}

fn ort_execution_preference() -> Result<OrtExecutionPreference> {
    parse_execution_preference(&std::env::var("PAWSENSE_ORT_EP").unwrap_or_default())
}

#[cfg(all(feature = "directml", target_os = "windows"))]
fn with_directml(builder: SessionBuilder) -> Result<SessionBuilder> {
    info!("ONNX EP preference=directml (strict)");
    builder
        .with_execution_providers([
            ep::DirectML::default()
                .with_device_id(0)
                .build()
                .error_on_failure(),
            ep::CPU::default().build(),
        ])
        .map_err(|e| PawsenseError::OnnxSession(e.to_string()))
}

#[cfg(not(all(feature = "directml", target_os = "windows")))]
fn with_directml(_builder: SessionBuilder) -> Result<SessionBuilder> {
    Err(PawsenseError::OnnxSession(
        "directml execution provider needs a Windows build with the `directml` feature".into(),
    ))
}

fn create_session(model_path: &std::path::Path) -> Result<Session> {
    let pref = ort_execution_preference()?;
    let intra_threads = intra_threads();

    let builder = SessionBuilder::new()
        .map_err(|e| PawsenseError::OnnxSession(e.to_string()))?
        .with_intra_threads(intra_threads)
        .map_err(|e| PawsenseError::OnnxSession(e.to_string()))?
        .with_inter_threads(1)
        .map_err(|e| PawsenseError::OnnxSession(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::All)
        .map_err(|e| PawsenseError::OnnxSession(e.to_string()))?;
    info!(intra_threads, "ONNX session threading configured");

    let builder = match pref {
        OrtExecutionPreference::Cpu => {
            info!("ONNX EP preference=cpu");
            builder
                .with_execution_providers([ep::CPU::default().build()])
                .map_err(|e| PawsenseError::OnnxSession(e.to_string()))?
        }
        OrtExecutionPreference::DirectML => with_directml(builder)?,
    };

    builder
        .commit_from_file(model_path)
        .map_err(|e| PawsenseError::OnnxSession(e.to_string()))
}

/// Pick the configured name, or the first declared one. An override the
/// model does not declare is an error.
fn resolve_io_name(configured: Option<&str>, declared: &[&str], kind: &str) -> Result<String> {
    match configured {
        Some(name) if declared.contains(&name) => Ok(name.to_string()),
        Some(name) => Err(PawsenseError::OnnxSession(format!(
            "model has no {kind} named {name:?} (declared: {declared:?})"
        ))),
        None => declared
            .first()
            .map(|name| name.to_string())
            .ok_or_else(|| PawsenseError::OnnxSession(format!("model declares no {kind}s"))),
    }
}

// ── OnnxClassifier ───────────────────────────────────────────────────────────

pub struct OnnxClassifier {
    config: OnnxClassifierConfig,
    session: Option<Session>,
    input_name: String,
    output_name: String,
    /// Sample count declared by the model's input shape, when static.
    expected_samples: Option<usize>,
}

impl OnnxClassifier {
    pub fn new(config: OnnxClassifierConfig) -> Self {
        Self {
            config,
            session: None,
            input_name: String::new(),
            output_name: String::new(),
            expected_samples: None,
        }
    }
}

impl AudioClassifier for OnnxClassifier {
    fn warm_up(&mut self) -> Result<()> {
        let path = self.config.source.resolve()?;
        let size_mb = std::fs::metadata(&path)
            .map(|m| m.len() as f64 / 1_048_576.0)
            .unwrap_or(0.0);
        info!(path = ?path, size_mb, "loading classifier model");

        let session = create_session(&path)?;

        for input in session.inputs().iter() {
            debug!(name = input.name(), "model input");
        }
        for output in session.outputs().iter() {
            debug!(name = output.name(), "model output");
        }

        let declared_inputs: Vec<&str> = session.inputs().iter().map(|i| i.name()).collect();
        let declared_outputs: Vec<&str> = session.outputs().iter().map(|o| o.name()).collect();
        let input_name =
            resolve_io_name(self.config.input_name.as_deref(), &declared_inputs, "input")?;
        let output_name =
            resolve_io_name(self.config.output_name.as_deref(), &declared_outputs, "output")?;

        let expected_samples = session
            .inputs()
            .iter()
            .find(|i| i.name() == input_name)
            .and_then(|i| i.dtype().tensor_shape())
            .and_then(|shape| shape.last().copied())
            .filter(|dim| *dim > 0)
            .map(|dim| dim as usize);
        let default_samples = WINDOW_CHUNKS * CHUNK_SAMPLES;
        match expected_samples {
            Some(n) if n != default_samples => warn!(
                model_samples = n,
                window_samples = default_samples,
                "model input length differs from the configured window"
            ),
            Some(n) => info!(samples = n, "model input length matches window"),
            None => info!("model input length is dynamic"),
        }

        self.session = Some(session);
        self.input_name = input_name;
        self.output_name = output_name;
        self.expected_samples = expected_samples;

        // Dummy forward pass to populate CPU caches.
        let samples = expected_samples.unwrap_or(default_samples);
        let dummy = Array3::<f32>::zeros((1, 1, samples));
        let dummy_val = Value::from_array(dummy)
            .map_err(|e: ort::Error| PawsenseError::OnnxSession(e.to_string()))?;
        let Some(session) = self.session.as_mut() else {
            return Err(PawsenseError::ModelNotReady);
        };
        let inputs: Vec<(String, SessionInputValue<'_>)> =
            vec![(self.input_name.clone(), SessionInputValue::from(dummy_val))];
        session
            .run(inputs)
            .map_err(|e| PawsenseError::OnnxSession(e.to_string()))?;

        info!(
            input = %self.input_name,
            output = %self.output_name,
            "classifier warm-up complete"
        );
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.session.is_some()
    }

    fn forward(&mut self, waveform: &[f32], shape: &InputShape) -> Result<Vec<Vec<f32>>> {
        if waveform.len() != shape.element_count() {
            return Err(PawsenseError::Inference(format!(
                "waveform has {} samples, input shape {:?} expects {}",
                waveform.len(),
                shape.dims(),
                shape.element_count()
            )));
        }
        if let Some(expected) = self.expected_samples {
            if waveform.len() != expected {
                return Err(PawsenseError::Inference(format!(
                    "model expects {expected} samples, got {}",
                    waveform.len()
                )));
            }
        }
        let Some(session) = self.session.as_mut() else {
            return Err(PawsenseError::ModelNotReady);
        };

        let [batch, channels, samples] = *shape.dims();
        let input = TensorRef::from_array_view((
            [batch as i64, channels as i64, samples as i64],
            waveform,
        ))
        .map_err(|e| PawsenseError::OnnxSession(e.to_string()))?;
        let inputs: Vec<(String, SessionInputValue<'_>)> =
            vec![(self.input_name.clone(), SessionInputValue::from(input))];

        let outputs = session
            .run(inputs)
            .map_err(|e| PawsenseError::OnnxSession(e.to_string()))?;
        let logits = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            PawsenseError::OnnxSession(format!("output {:?} missing from run", self.output_name))
        })?;
        let (out_shape, data) = logits
            .try_extract_tensor::<f32>()
            .map_err(|e| PawsenseError::OnnxSession(e.to_string()))?;

        // Split the flat logits into one row per batch element.
        let classes = out_shape
            .last()
            .copied()
            .filter(|dim| *dim > 0)
            .map(|dim| dim as usize)
            .unwrap_or(data.len());
        if classes == 0 {
            return Err(PawsenseError::Inference("model produced an empty output".into()));
        }
        let rows = data.chunks(classes).map(<[f32]>::to_vec).collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_preference_accepts_known_providers() {
        assert_eq!(parse_execution_preference("").unwrap(), OrtExecutionPreference::Cpu);
        assert_eq!(parse_execution_preference(" CPU ").unwrap(), OrtExecutionPreference::Cpu);
        assert_eq!(
            parse_execution_preference("dml").unwrap(),
            OrtExecutionPreference::DirectML
        );
        assert_eq!(
            parse_execution_preference("DirectML").unwrap(),
            OrtExecutionPreference::DirectML
        );
    }

    #[test]
    fn unknown_execution_provider_is_rejected() {
        let err = parse_execution_preference("cuda").unwrap_err();
        assert!(matches!(err, PawsenseError::OnnxSession(msg) if msg.contains("cuda")));
    }

    #[test]
    fn io_name_defaults_to_first_declared() {
        let declared = ["waveform", "extra"];
        assert_eq!(resolve_io_name(None, &declared, "input").unwrap(), "waveform");
        assert_eq!(
            resolve_io_name(Some("extra"), &declared, "input").unwrap(),
            "extra"
        );
    }

    #[test]
    fn undeclared_io_name_override_fails_warm_up() {
        let err = resolve_io_name(Some("logits"), &["output_0"], "output").unwrap_err();
        assert!(matches!(err, PawsenseError::OnnxSession(msg) if msg.contains("logits")));
        assert!(resolve_io_name(None, &[], "output").is_err());
    }
}
