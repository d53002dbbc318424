//! `pawsense`: terminal host for the rolling-window pet sound classifier.
//!
//! Loads settings, builds the classifier backend, starts the engine and
//! renders every classification as a bar chart (stdout). Logs go to stderr.

mod cli;
mod render;
mod settings;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pawsense_core::{
    audio::device::list_input_devices, AudioSource, ClassificationEvent, EngineConfig,
    EngineStatus, ModelHandle, ModelSource, PawsenseEngine, PawsenseError, StubClassifier,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::settings::{
    apply_runtime_env_from_settings, default_settings_path, load_settings, save_settings,
    AppSettings, OutputMode,
};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pawsense=info,pawsense_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_devices(json: bool) -> Result<()> {
    let devices = list_input_devices();
    let mut out = std::io::stdout().lock();
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&devices)?)?;
        return Ok(());
    }
    if devices.is_empty() {
        writeln!(out, "no input devices found")?;
    }
    for device in &devices {
        let marker = if device.is_default { "*" } else { " " };
        writeln!(out, "{marker} {}", device.name)?;
    }
    Ok(())
}

/// `--stub` is the only way to run without a model artifact.
fn build_model(cli: &Cli, settings: &AppSettings) -> Result<ModelHandle> {
    if cli.stub {
        warn!("using StubClassifier: every window classifies as none");
        return Ok(ModelHandle::new(StubClassifier::new()));
    }
    let source = settings.model_source();
    if let ModelSource::File(path) = &source {
        if !path.exists() {
            return Err(anyhow::Error::new(PawsenseError::ModelNotFound {
                path: path.clone(),
            }))
            .context("no classifier model: pass --model, --model-url or --stub");
        }
    }
    onnx_model(source)
}

#[cfg(feature = "onnx")]
fn onnx_model(source: ModelSource) -> Result<ModelHandle> {
    use pawsense_core::{OnnxClassifier, OnnxClassifierConfig};
    info!(source = ?source, "using ONNX classifier");
    Ok(ModelHandle::new(OnnxClassifier::new(OnnxClassifierConfig {
        source,
        ..OnnxClassifierConfig::default()
    })))
}

#[cfg(not(feature = "onnx"))]
fn onnx_model(source: ModelSource) -> Result<ModelHandle> {
    anyhow::bail!("cannot load {source:?}: built without the onnx feature (use --stub)")
}

fn present(event: &ClassificationEvent, output: OutputMode) -> Result<()> {
    let mut out = std::io::stdout().lock();
    match output {
        OutputMode::Json => writeln!(out, "{}", render::render_json(event)?)?,
        OutputMode::Chart => writeln!(out, "{}\n", render::render_event(event))?,
    }
    out.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if cli.list_devices {
        return print_devices(cli.json);
    }

    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let mut app_settings = load_settings(&settings_path);
    cli.apply_to(&mut app_settings);
    apply_runtime_env_from_settings(&app_settings);
    info!(
        settings_path = ?settings_path,
        dog_threshold = app_settings.dog_threshold,
        cat_threshold = app_settings.cat_threshold,
        device = ?app_settings.preferred_input_device,
        ort_ep = %app_settings.ort_ep,
        "runtime settings loaded"
    );
    if cli.save_settings {
        save_settings(&settings_path, &app_settings)
            .with_context(|| format!("saving settings to {}", settings_path.display()))?;
        info!(path = ?settings_path, "settings saved");
    }

    // ── Engine setup ──────────────────────────────────────────────────────
    let config = EngineConfig {
        dog_threshold: app_settings.dog_threshold,
        cat_threshold: app_settings.cat_threshold,
        ..EngineConfig::default()
    };
    let model = build_model(&cli, &app_settings)?;
    let engine = Arc::new(PawsenseEngine::new(config, model));

    // Warm-up may download the model and runs a dummy forward pass.
    let warm = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || warm.warm_up())
        .await
        .context("warm-up task panicked")?
        .context("model warm-up failed")?;

    let mut events = engine.subscribe_classifications();
    let mut status_rx = engine.subscribe_status();
    let mut capture_rx = engine.subscribe_capture();

    let source = match &cli.wav {
        Some(path) => AudioSource::WavFile {
            path: path.clone(),
            realtime: !cli.no_realtime,
        },
        None => AudioSource::Microphone {
            preferred_device: app_settings.preferred_input_device.clone(),
        },
    };
    let starter = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || starter.start_with_source(source))
        .await
        .context("start task panicked")?
        .context("failed to start audio source")?;

    let output = app_settings.output;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received: stopping");
                if let Err(e) = engine.stop() {
                    info!("engine already stopped: {e}");
                }
                break;
            }
            received = events.recv() => match received {
                Ok(event) => present(&event, output)?,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "presentation lagged behind"),
                Err(RecvError::Closed) => break,
            },
            received = status_rx.recv() => {
                if let Ok(event) = received {
                    info!(status = ?event.status, detail = ?event.detail, "engine status");
                    if matches!(event.status, EngineStatus::Stopped | EngineStatus::Error) {
                        break;
                    }
                }
            }
            received = capture_rx.recv() => {
                if let Ok(event) = received {
                    info!(
                        previous = ?event.previous,
                        current = ?event.current,
                        detail = ?event.detail,
                        "capture status"
                    );
                }
            }
        }
    }

    // Events published just before the source ended.
    while let Ok(event) = events.try_recv() {
        present(&event, output)?;
    }

    let snap = engine.pipeline_diagnostics_snapshot();
    info!(
        inference_calls = snap.inference_calls,
        labels_published = snap.labels_published,
        chunks_dropped = snap.chunks_dropped,
        chunks_coalesced = snap.chunks_coalesced,
        capture_errors = snap.capture_errors,
        "session finished"
    );
    let latest = engine.latest();
    info!(detected = %latest.detected, probs = ?latest.probs, "last classification");
    Ok(())
}
