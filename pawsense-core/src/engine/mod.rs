//! `PawsenseEngine`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! PawsenseEngine::new()
//!     └─► warm_up()          → model loaded, status = WarmingUp → Idle
//!         └─► start()        → audio open, feeder + classifier spawned, status = Listening
//!             └─► stop()     → session flag cleared, stream dropped, status = Stopped
//! ```
//!
//! `start()`/`stop()` return an error in the wrong state rather than panicking.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread affinity).
//! `AudioCapture` is therefore created *inside* the feeder's `spawn_blocking`
//! closure so it never crosses a thread boundary. A sync oneshot channel
//! propagates open-device errors back to the `start()` caller.
//!
//! The classifier runs as a tokio task and awaits inference on the blocking
//! pool, so `start()` must be called from within a tokio runtime.

pub mod feeder;
pub mod pipeline;

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    audio::{
        permission::{ensure_microphone_access, MicrophonePermission, SystemPermission},
        wav::load_wav_at_rate,
        AudioCapture, StreamErrorCallback,
    },
    buffering::create_audio_ring,
    classify::ClassificationState,
    config::{
        CHUNK_SAMPLES, DEFAULT_CAT_THRESHOLD, DEFAULT_DOG_THRESHOLD, SAMPLE_RATE, WINDOW_CHUNKS,
    },
    error::{PawsenseError, Result},
    events::{
        CaptureStatus, CaptureStatusEvent, ClassificationEvent, EngineStatus, EngineStatusEvent,
    },
    inference::ModelHandle,
};

/// Broadcast channel capacity: events buffered for slow subscribers.
const BROADCAST_CAP: usize = 256;

/// Chunks that may wait for the classifier before the feeder starts dropping.
pub const CHUNK_QUEUE_CAP: usize = 16;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model sample rate (Hz). Captured audio is resampled to it.
    pub sample_rate: u32,
    /// Samples per chunk at `sample_rate`.
    pub chunk_samples: usize,
    /// Chunks held by the rolling window (N).
    pub window_chunks: usize,
    pub dog_threshold: f32,
    pub cat_threshold: f32,
    /// Bounded queue between feeder and classifier.
    pub chunk_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            chunk_samples: CHUNK_SAMPLES,
            window_chunks: WINDOW_CHUNKS,
            dog_threshold: DEFAULT_DOG_THRESHOLD,
            cat_threshold: DEFAULT_CAT_THRESHOLD,
            chunk_queue_capacity: CHUNK_QUEUE_CAP,
        }
    }
}

impl EngineConfig {
    /// Samples per inference call (N × chunk length).
    pub fn window_samples(&self) -> usize {
        self.window_chunks * self.chunk_samples
    }
}

/// Where audio comes from for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Live microphone; `None` picks the system default input.
    Microphone { preferred_device: Option<String> },
    /// Replay a WAV file, optionally paced at real time.
    WavFile { path: PathBuf, realtime: bool },
}

impl Default for AudioSource {
    fn default() -> Self {
        AudioSource::Microphone {
            preferred_device: None,
        }
    }
}

/// The top-level engine handle.
///
/// `PawsenseEngine` is `Send + Sync`; all fields use interior mutability.
/// Wrap in `Arc<PawsenseEngine>` to share with presentation tasks.
pub struct PawsenseEngine {
    config: EngineConfig,
    model: ModelHandle,
    permission: Arc<dyn MicrophonePermission>,
    /// `true` while a session is active.
    running: Arc<AtomicBool>,
    /// Flag of the current session; each `start()` gets a fresh one.
    session: Mutex<Arc<AtomicBool>>,
    status: Arc<Mutex<EngineStatus>>,
    capture_status: Arc<Mutex<CaptureStatus>>,
    latest: Arc<RwLock<ClassificationState>>,
    classification_tx: broadcast::Sender<ClassificationEvent>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    capture_tx: broadcast::Sender<CaptureStatusEvent>,
    /// Monotonically increasing event sequence counter.
    seq: Arc<AtomicU64>,
    /// Counters of the current (or last) session.
    diagnostics: Mutex<Arc<pipeline::PipelineDiagnostics>>,
    /// Classifier task of the current session.
    classifier: Mutex<Option<JoinHandle<()>>>,
}

impl PawsenseEngine {
    /// Create a new engine. Does not start capturing; call `warm_up()` then `start()`.
    pub fn new(config: EngineConfig, model: ModelHandle) -> Self {
        let (classification_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (capture_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            model,
            permission: Arc::new(SystemPermission),
            running: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(Arc::new(AtomicBool::new(false))),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            capture_status: Arc::new(Mutex::new(CaptureStatus::Idle)),
            latest: Arc::new(RwLock::new(ClassificationState::reset())),
            classification_tx,
            status_tx,
            capture_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Mutex::new(Arc::new(pipeline::PipelineDiagnostics::default())),
            classifier: Mutex::new(None),
        }
    }

    /// Replace the microphone permission provider (desktop default: always granted).
    pub fn with_permission(mut self, permission: Arc<dyn MicrophonePermission>) -> Self {
        self.permission = permission;
        self
    }

    /// Load the model and run its dummy forward pass.
    ///
    /// Call once at start-up, before `start()`. Blocking.
    pub fn warm_up(&self) -> Result<()> {
        self.set_status(EngineStatus::WarmingUp, None);
        info!("warming up classifier model");
        if let Err(e) = self.model.0.lock().warm_up() {
            self.set_status(EngineStatus::Error, Some(e.to_string()));
            return Err(e);
        }
        self.set_status(EngineStatus::Idle, None);
        info!("classifier model ready");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_ready()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start capturing from the default microphone.
    ///
    /// Blocks until the audio device is confirmed open (or fails).
    ///
    /// # Errors
    /// - `PawsenseError::AlreadyRunning` if already started.
    /// - `PawsenseError::ModelNotReady` if `warm_up()` has not succeeded.
    /// - `PawsenseError::NoDefaultInputDevice` / `PawsenseError::AudioStream` on device error.
    pub fn start(&self) -> Result<()> {
        self.start_with_source(AudioSource::default())
    }

    /// Start with a preferred input device name (`None` = system default).
    pub fn start_with_device(&self, preferred_input_device: Option<String>) -> Result<()> {
        self.start_with_source(AudioSource::Microphone {
            preferred_device: preferred_input_device,
        })
    }

    pub fn start_with_source(&self, source: AudioSource) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(PawsenseError::AlreadyRunning);
        }
        if !self.model.is_ready() {
            return Err(PawsenseError::ModelNotReady);
        }

        // Requested once; capture is not gated on the answer.
        let permission_note = match &source {
            AudioSource::Microphone { .. } => {
                let permission = ensure_microphone_access(self.permission.as_ref());
                if !permission.is_granted() {
                    warn!(
                        status = permission.as_str(),
                        "microphone permission not granted: starting capture anyway"
                    );
                    Some(format!("microphone permission {}", permission.as_str()))
                } else {
                    None
                }
            }
            AudioSource::WavFile { .. } => None,
        };

        // A classifier left over from a stopped session must not outlive it.
        if let Some(previous) = self.classifier.lock().take() {
            previous.abort();
        }
        let diagnostics = Arc::new(pipeline::PipelineDiagnostics::default());
        *self.diagnostics.lock() = Arc::clone(&diagnostics);
        *self.latest.write() = ClassificationState::reset();
        let session = Arc::new(AtomicBool::new(true));
        *self.session.lock() = Arc::clone(&session);
        self.running.store(true, Ordering::SeqCst);

        let (chunk_tx, chunk_rx) = mpsc::channel(self.config.chunk_queue_capacity.max(1));

        let classifier = tokio::spawn(pipeline::run(pipeline::PipelineContext {
            config: self.config.clone(),
            model: self.model.clone(),
            chunk_rx,
            session: Arc::clone(&session),
            running: Arc::clone(&self.running),
            latest: Arc::clone(&self.latest),
            classification_tx: self.classification_tx.clone(),
            status_tx: self.status_tx.clone(),
            status: Arc::clone(&self.status),
            seq: Arc::clone(&self.seq),
            diagnostics: Arc::clone(&diagnostics),
        }));
        *self.classifier.lock() = Some(classifier);

        let feeder_ctx = feeder::FeederContext {
            running: Arc::clone(&session),
            target_sample_rate: self.config.sample_rate,
            chunk_samples: self.config.chunk_samples,
            chunk_tx,
            diagnostics: Arc::clone(&diagnostics),
        };
        let capture = CaptureReporter {
            tx: self.capture_tx.clone(),
            status: Arc::clone(&self.capture_status),
        };

        // Sync oneshot: feeder thread reports open success (with detail) or failure.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<String>>();

        tokio::task::spawn_blocking(move || match source {
            AudioSource::Microphone { preferred_device } => {
                let (producer, consumer) = create_audio_ring();
                let on_error: StreamErrorCallback = {
                    let capture = capture.clone();
                    Arc::new(move |message: &str| {
                        diagnostics.capture_errors.fetch_add(1, Ordering::Relaxed);
                        capture.report_error(message);
                    })
                };
                // Must happen on this thread, cpal::Stream is !Send.
                let audio = match AudioCapture::open_with_preference(
                    producer,
                    Arc::clone(&feeder_ctx.running),
                    preferred_device.as_deref(),
                    on_error,
                ) {
                    Ok(a) => a,
                    Err(e) => {
                        feeder_ctx.running.store(false, Ordering::SeqCst);
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
                capture.transition(CaptureStatus::Recording, Some(audio.device_name.clone()));
                let _ = open_tx.send(Ok(audio.device_name.clone()));

                let sample_rate = audio.sample_rate;
                feeder::run_capture(feeder_ctx, consumer, sample_rate);

                // Stream drops here, releasing the device on this thread.
                audio.stop();
                drop(audio);
                capture.transition(CaptureStatus::Stopped, None);
            }
            AudioSource::WavFile { path, realtime } => {
                let samples = match load_wav_at_rate(&path, feeder_ctx.target_sample_rate) {
                    Ok(s) => s,
                    Err(e) => {
                        feeder_ctx.running.store(false, Ordering::SeqCst);
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
                let detail = path.display().to_string();
                capture.transition(CaptureStatus::Recording, Some(detail.clone()));
                let _ = open_tx.send(Ok(detail));
                feeder::run_samples(feeder_ctx, &samples, realtime);
                capture.transition(CaptureStatus::Stopped, None);
            }
        });

        // Block start() until the source is confirmed open.
        match open_rx.recv() {
            Ok(Ok(source_name)) => {
                info!(source = %source_name, "engine started: listening");
                let detail = match permission_note {
                    Some(note) => format!("{source_name} ({note})"),
                    None => source_name,
                };
                // A short WAV source may already have finished and reported Stopped.
                let mut status = self.status.lock();
                if session.load(Ordering::SeqCst) {
                    *status = EngineStatus::Listening;
                    let _ = self.status_tx.send(EngineStatusEvent {
                        status: EngineStatus::Listening,
                        detail: Some(detail),
                    });
                }
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent, so the feeder panicked.
                session.store(false, Ordering::SeqCst);
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some("feeder failed to start".into()));
                Err(PawsenseError::Other(anyhow::anyhow!(
                    "feeder task died unexpectedly"
                )))
            }
        }
    }

    /// Stop capture and classification.
    ///
    /// # Errors
    /// - `PawsenseError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(PawsenseError::NotRunning);
        }
        {
            // Same lock the classifier publishes under: once this returns,
            // the stopped session can no longer publish.
            let _published = self.latest.write();
            self.session.lock().store(false, Ordering::SeqCst);
        }
        if let Some(classifier) = self.classifier.lock().take() {
            classifier.abort();
        }
        self.running.store(false, Ordering::SeqCst);
        self.set_status(EngineStatus::Stopped, None);
        info!("engine stop requested");
        Ok(())
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    pub fn capture_status(&self) -> CaptureStatus {
        *self.capture_status.lock()
    }

    /// Most recently published probabilities + label.
    pub fn latest(&self) -> ClassificationState {
        *self.latest.read()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe_classifications(&self) -> broadcast::Receiver<ClassificationEvent> {
        self.classification_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_capture(&self) -> broadcast::Receiver<CaptureStatusEvent> {
        self.capture_tx.subscribe()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn pipeline_diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.lock().snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}

/// Publishes capture status transitions from the feeder and audio threads.
#[derive(Clone)]
struct CaptureReporter {
    tx: broadcast::Sender<CaptureStatusEvent>,
    status: Arc<Mutex<CaptureStatus>>,
}

impl CaptureReporter {
    fn transition(&self, current: CaptureStatus, detail: Option<String>) {
        let previous = std::mem::replace(&mut *self.status.lock(), current);
        info!(?previous, ?current, "capture status changed");
        let _ = self.tx.send(CaptureStatusEvent {
            previous,
            current,
            detail,
        });
    }

    /// Stream errors are informational: no reset, no restart.
    fn report_error(&self, message: &str) {
        let current = *self.status.lock();
        let _ = self.tx.send(CaptureStatusEvent {
            previous: current,
            current,
            detail: Some(message.to_string()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::stub::StubClassifier;

    #[test]
    fn default_config_matches_build_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.sample_rate, 16_000);
        assert_eq!(cfg.window_chunks, 6);
        assert_eq!(cfg.window_samples(), 48_000);
        assert_eq!(cfg.chunk_queue_capacity, CHUNK_QUEUE_CAP);
    }

    #[test]
    fn start_requires_a_ready_model() {
        let engine = PawsenseEngine::new(
            EngineConfig::default(),
            ModelHandle::new(StubClassifier::new()),
        );
        assert!(!engine.is_ready());
        assert!(matches!(engine.start(), Err(PawsenseError::ModelNotReady)));
        assert!(!engine.is_running());
    }

    #[test]
    fn stop_without_start_is_an_error() {
        let engine = PawsenseEngine::new(
            EngineConfig::default(),
            ModelHandle::new(StubClassifier::new()),
        );
        assert!(matches!(engine.stop(), Err(PawsenseError::NotRunning)));
    }

    #[test]
    fn warm_up_publishes_status_transitions() {
        let engine = PawsenseEngine::new(
            EngineConfig::default(),
            ModelHandle::new(StubClassifier::new()),
        );
        let mut rx = engine.subscribe_status();
        engine.warm_up().unwrap();
        assert!(engine.is_ready());
        assert_eq!(rx.try_recv().unwrap().status, EngineStatus::WarmingUp);
        assert_eq!(rx.try_recv().unwrap().status, EngineStatus::Idle);
        assert_eq!(engine.status(), EngineStatus::Idle);
        assert!(engine.latest().is_reset());
    }

    #[test]
    fn capture_reporter_tracks_previous_state() {
        let (tx, mut rx) = broadcast::channel(8);
        let reporter = CaptureReporter {
            tx,
            status: Arc::new(Mutex::new(CaptureStatus::Idle)),
        };
        reporter.transition(CaptureStatus::Recording, Some("mic".into()));
        reporter.report_error("device unplugged");
        reporter.transition(CaptureStatus::Stopped, None);

        let started = rx.try_recv().unwrap();
        assert_eq!(
            (started.previous, started.current),
            (CaptureStatus::Idle, CaptureStatus::Recording)
        );
        let error = rx.try_recv().unwrap();
        assert_eq!(error.current, CaptureStatus::Recording);
        assert_eq!(error.detail.as_deref(), Some("device unplugged"));
        let stopped = rx.try_recv().unwrap();
        assert_eq!(stopped.previous, CaptureStatus::Recording);
    }
}
