use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use hound::{SampleFormat, WavSpec, WavWriter};
use pawsense_core::inference::InputShape;
use pawsense_core::{
    AudioClassifier, AudioSource, CycleOutcome, DetectedClass, EngineConfig, EngineStatus,
    ModelHandle, PawsenseEngine, PawsenseError, StubClassifier,
};
use tokio::sync::broadcast::{self, error::TryRecvError};

const CHUNK: usize = 1_600;

/// Fixed dog logits after a short sleep, like a real forward pass.
struct DelayModel {
    delay: Duration,
}

impl AudioClassifier for DelayModel {
    fn warm_up(&mut self) -> Result<(), PawsenseError> {
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn forward(
        &mut self,
        waveform: &[f32],
        shape: &InputShape,
    ) -> Result<Vec<Vec<f32>>, PawsenseError> {
        assert_eq!(waveform.len(), shape.element_count());
        thread::sleep(self.delay);
        Ok(vec![vec![0.0, 6.0, 0.0]])
    }
}

/// Dog logits for audible input, none for silence, after `delay`.
struct LoudnessModel {
    delay: Duration,
}

impl AudioClassifier for LoudnessModel {
    fn warm_up(&mut self) -> Result<(), PawsenseError> {
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn forward(
        &mut self,
        waveform: &[f32],
        _shape: &InputShape,
    ) -> Result<Vec<Vec<f32>>, PawsenseError> {
        thread::sleep(self.delay);
        let peak = waveform.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        if peak > 0.01 {
            Ok(vec![vec![0.0, 8.0, 0.0]])
        } else {
            Ok(vec![vec![0.0, 0.0, 8.0]])
        }
    }
}

fn small_config() -> EngineConfig {
    EngineConfig {
        chunk_samples: CHUNK,
        window_chunks: 2,
        ..EngineConfig::default()
    }
}

fn write_wav(name: &str, samples: usize) -> PathBuf {
    write_wav_with(name, samples, 8_000.0)
}

fn write_wav_with(name: &str, samples: usize, amplitude: f32) -> PathBuf {
    let path = std::env::temp_dir().join(format!("pawsense-it-{}-{name}.wav", std::process::id()));
    let spec = WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec).expect("create wav");
    for i in 0..samples {
        let v = ((i as f32 * 0.05).sin() * amplitude) as i16;
        writer.write_sample(v).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
    path
}

async fn wait_until_stopped(engine: &PawsenseEngine, timeout: Duration) {
    let start = Instant::now();
    while engine.is_running() {
        if start.elapsed() >= timeout {
            panic!("timed out waiting for engine to stop");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ev) => out.push(ev),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return out,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wav_source_is_classified_and_engine_stops_at_end() {
    let path = write_wav("dog", CHUNK * 10);
    let engine = PawsenseEngine::new(
        small_config(),
        ModelHandle::new(DelayModel {
            delay: Duration::from_millis(20),
        }),
    );
    let mut events = engine.subscribe_classifications();
    let mut status = engine.subscribe_status();

    engine
        .start_with_source(AudioSource::WavFile {
            path: path.clone(),
            realtime: false,
        })
        .expect("start from wav");
    wait_until_stopped(&engine, Duration::from_secs(10)).await;
    // The classifier publishes before it clears the running flag.
    let events = drain(&mut events);
    std::fs::remove_file(&path).ok();

    assert!(!events.is_empty());
    let labeled: Vec<_> = events
        .iter()
        .filter(|e| e.outcome == CycleOutcome::Labeled)
        .collect();
    assert!(!labeled.is_empty(), "expected at least one labeled cycle");
    assert!(labeled.iter().all(|e| e.detected == DetectedClass::Dog));
    assert_eq!(engine.latest().detected, DetectedClass::Dog);

    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1));

    let snap = engine.pipeline_diagnostics_snapshot();
    assert_eq!(snap.chunks_queued, 10);
    assert_eq!(snap.chunks_dropped, 0);
    assert_eq!(events.len() + snap.chunks_coalesced, 10);
    assert_eq!(snap.inference_calls, snap.labels_published);

    assert_eq!(engine.status(), EngineStatus::Stopped);
    let statuses: Vec<EngineStatus> = drain(&mut status).into_iter().map(|e| e.status).collect();
    assert_eq!(statuses.last(), Some(&EngineStatus::Stopped));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_wav_fails_start_and_reports_error() {
    let mut stub = StubClassifier::new();
    stub.warm_up().expect("warm up stub");
    let engine = PawsenseEngine::new(small_config(), ModelHandle::new(stub));

    let err = engine
        .start_with_source(AudioSource::WavFile {
            path: PathBuf::from("/nonexistent/pawsense-missing.wav"),
            realtime: false,
        })
        .unwrap_err();
    assert!(matches!(err, PawsenseError::Wav(_)));
    assert!(!engine.is_running());
    assert_eq!(engine.status(), EngineStatus::Error);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn realtime_wav_can_be_stopped_early() {
    let path = write_wav("long", 16_000 * 5);
    let mut stub = StubClassifier::with_logits([0.0, 0.0, 4.0]);
    stub.warm_up().expect("warm up stub");
    let engine = PawsenseEngine::new(small_config(), ModelHandle::new(stub));

    engine
        .start_with_source(AudioSource::WavFile {
            path: path.clone(),
            realtime: true,
        })
        .expect("start realtime wav");
    assert!(matches!(
        engine.start_with_source(AudioSource::WavFile {
            path: path.clone(),
            realtime: true,
        }),
        Err(PawsenseError::AlreadyRunning)
    ));

    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.stop().expect("stop engine");
    std::fs::remove_file(&path).ok();

    assert!(!engine.is_running());
    assert_eq!(engine.status(), EngineStatus::Stopped);
    assert!(matches!(engine.stop(), Err(PawsenseError::NotRunning)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_after_stop_does_not_see_previous_session_results() {
    let loud = write_wav_with("restart-loud", CHUNK * 10, 8_000.0);
    let silent = write_wav_with("restart-silent", CHUNK * 4, 0.0);
    let engine = PawsenseEngine::new(
        small_config(),
        ModelHandle::new(LoudnessModel {
            delay: Duration::from_millis(400),
        }),
    );

    engine
        .start_with_source(AudioSource::WavFile {
            path: loud.clone(),
            realtime: false,
        })
        .expect("start loud session");
    // Wait until the first session is inside a forward pass, then stop it.
    let started = Instant::now();
    while engine.pipeline_diagnostics_snapshot().inference_calls == 0 {
        assert!(started.elapsed() < Duration::from_secs(5), "no inference started");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    engine.stop().expect("stop loud session");

    let mut events = engine.subscribe_classifications();
    engine
        .start_with_source(AudioSource::WavFile {
            path: silent.clone(),
            realtime: false,
        })
        .expect("start silent session");
    wait_until_stopped(&engine, Duration::from_secs(10)).await;
    // Give an orphaned forward pass time to finish and try to publish.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let events = drain(&mut events);
    std::fs::remove_file(&loud).ok();
    std::fs::remove_file(&silent).ok();

    assert!(
        events.iter().any(|e| e.outcome == CycleOutcome::Labeled),
        "silent session should label at least once"
    );
    assert!(
        events.iter().all(|e| e.detected == DetectedClass::None),
        "silent session published {:?}",
        events
            .iter()
            .map(|e| (e.seq, e.outcome, e.detected))
            .collect::<Vec<_>>()
    );
    assert_eq!(engine.latest().detected, DetectedClass::None);

    let snap = engine.pipeline_diagnostics_snapshot();
    assert_eq!(snap.chunks_queued, 4);
    assert_eq!(snap.inference_calls, snap.labels_published);
}
