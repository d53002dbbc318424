//! Classifier task: one cycle per chunk-ready event.
//!
//! ## Stages (per cycle)
//!
//! ```text
//! 1. Receive a chunk from the bounded queue
//! 2. Coalesce: drain every chunk already queued into the window
//! 3. Snapshot the window; defer when it is not full yet
//! 4. Await inference on the blocking pool (sole suspension point)
//! 5. Softmax + threshold → ClassificationState
//! 6. Replace the latest state and broadcast a ClassificationEvent
//! ```
//!
//! Cycles never overlap: the next chunk is only taken from the queue after
//! the previous cycle has published. Chunks that pile up while inference is
//! in flight are appended together, so the next snapshot covers the most
//! recent audio.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    buffering::{chunk::AudioChunk, window::RollingWindow},
    classify::{
        ClassificationCycle, ClassificationState, CycleOutcome, CycleReport, ThresholdPolicy,
    },
    engine::EngineConfig,
    error::{PawsenseError, Result},
    events::{ClassificationEvent, EngineStatus, EngineStatusEvent},
    inference::{InputShape, ModelHandle},
};

#[derive(Default)]
pub struct PipelineDiagnostics {
    pub frames_in: AtomicUsize,
    pub frames_resampled: AtomicUsize,
    pub chunks_queued: AtomicUsize,
    pub chunks_dropped: AtomicUsize,
    pub chunks_coalesced: AtomicUsize,
    pub malformed_chunks: AtomicUsize,
    pub cycles_deferred: AtomicUsize,
    pub inference_calls: AtomicUsize,
    pub inference_errors: AtomicUsize,
    pub labels_published: AtomicUsize,
    pub capture_errors: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_resampled: self.frames_resampled.load(Ordering::Relaxed),
            chunks_queued: self.chunks_queued.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            chunks_coalesced: self.chunks_coalesced.load(Ordering::Relaxed),
            malformed_chunks: self.malformed_chunks.load(Ordering::Relaxed),
            cycles_deferred: self.cycles_deferred.load(Ordering::Relaxed),
            inference_calls: self.inference_calls.load(Ordering::Relaxed),
            inference_errors: self.inference_errors.load(Ordering::Relaxed),
            labels_published: self.labels_published.load(Ordering::Relaxed),
            capture_errors: self.capture_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub frames_in: usize,
    pub frames_resampled: usize,
    pub chunks_queued: usize,
    pub chunks_dropped: usize,
    pub chunks_coalesced: usize,
    pub malformed_chunks: usize,
    pub cycles_deferred: usize,
    pub inference_calls: usize,
    pub inference_errors: usize,
    pub labels_published: usize,
    pub capture_errors: usize,
}

/// All context the classifier task needs, passed as one struct.
pub struct PipelineContext {
    pub config: EngineConfig,
    pub model: ModelHandle,
    pub chunk_rx: mpsc::Receiver<AudioChunk>,
    /// Per-session flag; cleared by `stop()` or when the source ends.
    pub session: Arc<AtomicBool>,
    /// Engine-wide running flag.
    pub running: Arc<AtomicBool>,
    pub latest: Arc<RwLock<ClassificationState>>,
    pub classification_tx: broadcast::Sender<ClassificationEvent>,
    pub status_tx: broadcast::Sender<EngineStatusEvent>,
    pub status: Arc<Mutex<EngineStatus>>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Run classification cycles until the chunk queue closes or the session stops.
pub async fn run(mut ctx: PipelineContext) {
    let span = info_span!(
        "classifier",
        window_chunks = ctx.config.window_chunks,
        chunk_samples = ctx.config.chunk_samples,
    );
    async move {
        info!("classifier started");
        let mut cycle = ClassificationCycle::new(
            RollingWindow::new(ctx.config.window_chunks, ctx.config.chunk_samples),
            ThresholdPolicy::new(ctx.config.dog_threshold, ctx.config.cat_threshold),
        );

        while let Some(chunk) = ctx.chunk_rx.recv().await {
            if !ctx.session.load(Ordering::Acquire) {
                break;
            }
            let report = run_cycle(&mut ctx, &mut cycle, chunk).await;
            if !publish(&ctx, &report) {
                debug!(outcome = ?report.outcome, "session stopped: dropping cycle result");
                break;
            }
        }

        // Source ended on its own (WAV input finished, capture thread gone).
        if ctx.session.swap(false, Ordering::AcqRel) {
            ctx.running.store(false, Ordering::SeqCst);
            let mut status = ctx.status.lock();
            *status = EngineStatus::Stopped;
            let _ = ctx.status_tx.send(EngineStatusEvent {
                status: EngineStatus::Stopped,
                detail: Some("audio source ended".into()),
            });
        }

        let snap = ctx.diagnostics.snapshot();
        info!(
            frames_in = snap.frames_in,
            frames_resampled = snap.frames_resampled,
            chunks_queued = snap.chunks_queued,
            chunks_dropped = snap.chunks_dropped,
            chunks_coalesced = snap.chunks_coalesced,
            malformed_chunks = snap.malformed_chunks,
            cycles_deferred = snap.cycles_deferred,
            inference_calls = snap.inference_calls,
            inference_errors = snap.inference_errors,
            labels_published = snap.labels_published,
            capture_errors = snap.capture_errors,
            "classifier stopped: diagnostics"
        );
    }
    .instrument(span)
    .await
}

/// One full cycle starting from `first`. Never fails: errors become the
/// reset report.
async fn run_cycle(
    ctx: &mut PipelineContext,
    cycle: &mut ClassificationCycle,
    first: AudioChunk,
) -> CycleReport {
    if let Err(e) = accept_with_backlog(ctx, cycle, first) {
        ctx.diagnostics
            .malformed_chunks
            .fetch_add(1, Ordering::Relaxed);
        return cycle.fail(&e);
    }

    let Some(waveform) = cycle.begin() else {
        ctx.diagnostics
            .cycles_deferred
            .fetch_add(1, Ordering::Relaxed);
        return cycle.defer();
    };

    let shape = cycle.input_shape();
    ctx.diagnostics
        .inference_calls
        .fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();
    let raw = infer(ctx.model.clone(), waveform, shape).await;
    debug!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        ok = raw.is_ok(),
        "inference returned"
    );

    let report = cycle.complete(raw);
    if let Some(error) = report.error.as_deref() {
        ctx.diagnostics
            .inference_errors
            .fetch_add(1, Ordering::Relaxed);
        warn!(error, "classification failed: publishing reset state");
    }
    report
}

/// Append `first` plus every chunk already waiting in the queue.
fn accept_with_backlog(
    ctx: &mut PipelineContext,
    cycle: &mut ClassificationCycle,
    first: AudioChunk,
) -> Result<()> {
    cycle.accept_chunk(first)?;
    let mut coalesced = 0usize;
    while let Ok(next) = ctx.chunk_rx.try_recv() {
        coalesced += 1;
        if let Err(e) = cycle.accept_chunk(next) {
            ctx.diagnostics
                .chunks_coalesced
                .fetch_add(coalesced, Ordering::Relaxed);
            return Err(e);
        }
    }
    if coalesced > 0 {
        debug!(coalesced, "coalesced queued chunks into one cycle");
        ctx.diagnostics
            .chunks_coalesced
            .fetch_add(coalesced, Ordering::Relaxed);
    }
    Ok(())
}

/// Run `forward` on the blocking pool and await its single result.
pub(crate) async fn infer(
    model: ModelHandle,
    waveform: Vec<f32>,
    shape: InputShape,
) -> Result<Vec<Vec<f32>>> {
    tokio::task::spawn_blocking(move || model.0.lock().forward(&waveform, &shape))
        .await
        .map_err(|e| PawsenseError::Inference(format!("inference task failed: {e}")))?
}

/// Replace the latest pair and broadcast it as one event.
///
/// Runs under the `latest` write lock and only while the session is live;
/// `stop()` clears the flag under the same lock, so a stopped session never
/// publishes into the next one. Returns `false` when the result was dropped.
fn publish(ctx: &PipelineContext, report: &CycleReport) -> bool {
    let mut latest = ctx.latest.write();
    if !ctx.session.load(Ordering::Acquire) {
        return false;
    }
    *latest = report.state;
    if report.outcome == CycleOutcome::Labeled {
        ctx.diagnostics
            .labels_published
            .fetch_add(1, Ordering::Relaxed);
    }
    let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
    let _ = ctx
        .classification_tx
        .send(ClassificationEvent::new(seq, report.state, report.outcome));
    true
}
