//! Blocking feeder: turns a raw audio source into fixed-size chunks on the
//! classifier queue.
//!
//! ```text
//! microphone: ring buffer → RateConverter → ChunkAssembler → try_send
//! WAV file:   decoded samples → ChunkAssembler → blocking_send (optionally paced)
//! ```
//!
//! Runs inside `spawn_blocking`. Live capture never waits on the classifier:
//! when the queue is full the newest chunk is dropped and counted.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock,
};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::{
    audio::resample::{RateConverter, DEFAULT_RESAMPLE_BLOCK},
    buffering::{assembler::ChunkAssembler, chunk::AudioChunk, AudioConsumer, Consumer},
    engine::pipeline::PipelineDiagnostics,
};

/// Samples drained from the ring buffer per iteration.
const DRAIN_BLOCK: usize = 2048;

/// Sleep when the ring is empty (avoids busy-wait burning a core).
const DEFAULT_SLEEP_EMPTY_MS: u64 = 5;

pub struct FeederContext {
    pub running: Arc<AtomicBool>,
    pub target_sample_rate: u32,
    pub chunk_samples: usize,
    pub chunk_tx: mpsc::Sender<AudioChunk>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Drain live capture until `ctx.running` clears or the classifier goes away.
pub fn run_capture(ctx: FeederContext, mut consumer: AudioConsumer, capture_sample_rate: u32) {
    let mut resampler = match RateConverter::new(
        capture_sample_rate,
        ctx.target_sample_rate,
        DEFAULT_RESAMPLE_BLOCK,
    ) {
        Ok(r) => r,
        Err(e) => {
            error!("failed to create resampler: {e}");
            return;
        }
    };
    let mut assembler = ChunkAssembler::new(ctx.chunk_samples, ctx.target_sample_rate);
    let mut raw = vec![0f32; DRAIN_BLOCK];
    let mut resampled = Vec::with_capacity(DRAIN_BLOCK);
    info!(
        capture_sample_rate,
        target_sample_rate = ctx.target_sample_rate,
        passthrough = resampler.is_passthrough(),
        "feeder started"
    );

    while ctx.running.load(Ordering::Relaxed) {
        let n = consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(Duration::from_millis(empty_sleep_ms()));
            continue;
        }
        ctx.diagnostics.frames_in.fetch_add(n, Ordering::Relaxed);

        resampled.clear();
        resampler.process_into(&raw[..n], &mut resampled);
        if resampled.is_empty() {
            continue;
        }
        ctx.diagnostics
            .frames_resampled
            .fetch_add(resampled.len(), Ordering::Relaxed);

        for chunk in assembler.push(&resampled) {
            if !offer_chunk(&ctx, chunk) {
                info!("classifier queue closed: feeder exiting");
                return;
            }
        }
    }
    debug!(pending = assembler.pending_len(), "feeder stopped");
}

/// Feed pre-decoded samples (already at the target rate).
///
/// With `realtime` the feeder sleeps one chunk duration per chunk, so the
/// classifier sees the same cadence as live capture.
pub fn run_samples(ctx: FeederContext, samples: &[f32], realtime: bool) {
    let mut assembler = ChunkAssembler::new(ctx.chunk_samples, ctx.target_sample_rate);
    let chunks = assembler.push(samples);
    info!(
        chunks = chunks.len(),
        leftover = assembler.pending_len(),
        realtime,
        "feeding decoded audio"
    );
    ctx.diagnostics
        .frames_in
        .fetch_add(samples.len(), Ordering::Relaxed);

    let started = Instant::now();
    for (idx, chunk) in chunks.into_iter().enumerate() {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }
        if realtime {
            let due = started + chunk_period(ctx.chunk_samples, ctx.target_sample_rate) * idx as u32;
            if let Some(wait) = due.checked_duration_since(Instant::now()) {
                std::thread::sleep(wait);
            }
        }
        if ctx.chunk_tx.blocking_send(chunk).is_err() {
            info!("classifier queue closed: feeder exiting");
            return;
        }
        ctx.diagnostics
            .chunks_queued
            .fetch_add(1, Ordering::Relaxed);
    }
}

/// Non-blocking hand-off. Returns `false` once the classifier has gone away.
pub(crate) fn offer_chunk(ctx: &FeederContext, chunk: AudioChunk) -> bool {
    match ctx.chunk_tx.try_send(chunk) {
        Ok(()) => {
            ctx.diagnostics
                .chunks_queued
                .fetch_add(1, Ordering::Relaxed);
            true
        }
        Err(TrySendError::Full(_)) => {
            let dropped = ctx
                .diagnostics
                .chunks_dropped
                .fetch_add(1, Ordering::Relaxed)
                + 1;
            warn!(dropped, "classifier queue full: dropping chunk");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

fn chunk_period(chunk_samples: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(chunk_samples as f64 / sample_rate.max(1) as f64)
}

fn empty_sleep_ms() -> u64 {
    static EMPTY_SLEEP_MS: OnceLock<u64> = OnceLock::new();
    *EMPTY_SLEEP_MS.get_or_init(|| {
        std::env::var("PAWSENSE_FEEDER_EMPTY_SLEEP_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|v| v.clamp(1, 20))
            .unwrap_or(DEFAULT_SLEEP_EMPTY_MS)
    })
}
