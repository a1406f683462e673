use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::audio::domain::consent_classifier::ConsentClassifier;
use crate::audio::domain::speech_recognizer::SpeechRecognizer;
use crate::audio::domain::speech_segmenter::SpeechSegmenter;
use crate::audio::domain::voice_activity::VoiceActivityDetector;
use crate::blurring::domain::frame_blurrer::FrameBlurrer;
use crate::consent::domain::capture_latch::CaptureLatch;
use crate::consent::domain::registry::ConsentRegistry;
use crate::consent::infrastructure::directory_monitor::{load_directory, DirectoryMonitor};
use crate::detection::domain::face_detector::FaceDetector;
use crate::pipeline::audio_worker::AudioWorker;
use crate::pipeline::demux_worker::DemuxWorker;
use crate::pipeline::health_monitor::{HealthMonitor, DEFAULT_STALE_AFTER};
use crate::pipeline::heartbeat::Heartbeat;
use crate::pipeline::mux_worker::MuxWorker;
use crate::pipeline::speech_worker::SpeechWorker;
use crate::pipeline::vad_worker::VadWorker;
use crate::pipeline::video_worker::VideoWorker;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::shared::settings::{ConfigError, PipelineSettings};
use crate::video::domain::stream_sink::StreamSink;
use crate::video::domain::stream_source::StreamSource;

/// Join deadline for CPU-light workers.
const JOIN_DEADLINE: Duration = Duration::from_secs(1);

/// Join deadline for workers that may be mid-inference.
const JOIN_DEADLINE_ASR: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to load consent captures: {0}")]
    RegistryLoad(String),
    #[error("failed to start capture monitor: {0}")]
    Monitor(String),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Everything the pipeline runs on, injected so tests (and alternative
/// backends) can swap any seam.
pub struct PipelineComponents {
    pub source: Box<dyn StreamSource>,
    pub sink: Box<dyn StreamSink>,
    pub detector: Box<dyn FaceDetector>,
    pub embedder: Arc<dyn FaceEmbedder>,
    pub blurrer: Box<dyn FrameBlurrer>,
    pub vad: Box<dyn VoiceActivityDetector>,
    /// One recognizer/classifier pair per speech worker.
    pub speech_pool: Vec<(Box<dyn SpeechRecognizer>, Box<dyn ConsentClassifier>)>,
}

/// Builds the channel graph, starts every worker, and coordinates shutdown.
///
/// Worker graph:
/// ```text
/// demux ──► video worker ─────────────► mux
///   │   └─► audio worker (opus) ──────►  │
///   └──► vad ──► speech workers (xN)     │
///                     │ (latch)          ▼
///                     └────────► video worker     egress
/// ```
///
/// On stop, workers are joined in reverse dependency order with per-worker
/// deadlines; a worker that overruns its deadline is logged as a hard abort
/// and abandoned rather than blocking shutdown.
pub struct Supervisor {
    settings: PipelineSettings,
    registry: Arc<ConsentRegistry>,
    latch: Arc<CaptureLatch>,
}

impl Supervisor {
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            settings,
            registry: Arc::new(ConsentRegistry::new()),
            latch: Arc::new(CaptureLatch::new()),
        }
    }

    pub fn registry(&self) -> Arc<ConsentRegistry> {
        self.registry.clone()
    }

    /// Run the pipeline until `stop` is set. Blocks the calling thread.
    pub fn run(
        &self,
        components: PipelineComponents,
        stop: Arc<AtomicBool>,
    ) -> Result<(), PipelineError> {
        self.settings.validate()?;

        // Registry first: the video worker must see existing consents from
        // its very first frame
        std::fs::create_dir_all(&self.settings.capture_dir)
            .map_err(|e| PipelineError::RegistryLoad(e.to_string()))?;
        let loaded = load_directory(
            &self.settings.capture_dir,
            &*components.embedder,
            &self.registry,
        )
        .map_err(|e| PipelineError::RegistryLoad(e.to_string()))?;
        log::info!(
            "registry: {loaded} capture(s) loaded, {} name(s) consented",
            self.registry.names().len()
        );

        let monitor = DirectoryMonitor::start(
            &self.settings.capture_dir,
            components.embedder.clone(),
            self.registry.clone(),
        )
        .map_err(|e| PipelineError::Monitor(e.to_string()))?;

        // Bounded edges, capacities from settings
        let (video_tx, video_rx) = crossbeam_channel::bounded(self.settings.video_queue_capacity);
        let (audio_tx, audio_rx) = crossbeam_channel::bounded(self.settings.audio_queue_capacity);
        let (vad_tx, vad_rx) = crossbeam_channel::bounded(self.settings.audio_queue_capacity);
        let (segment_tx, segment_rx) =
            crossbeam_channel::bounded(self.settings.segment_queue_capacity);
        let (video_out_tx, video_out_rx) =
            crossbeam_channel::bounded(self.settings.output_queue_capacity);
        let (audio_out_tx, audio_out_rx) =
            crossbeam_channel::bounded(self.settings.output_queue_capacity);

        let mut heartbeats = Vec::new();
        let mut workers: Vec<(String, Duration, std::thread::JoinHandle<()>)> = Vec::new();

        let mut spawn = |name: String,
                         deadline: Duration,
                         heartbeat: Arc<Heartbeat>,
                         body: Box<dyn FnOnce() + Send>|
         -> Result<(), PipelineError> {
            heartbeats.push(heartbeat);
            let handle = std::thread::Builder::new().name(name.clone()).spawn(body)?;
            workers.push((name, deadline, handle));
            Ok(())
        };

        // Mux first so the terminal edge is consuming before producers start
        let hb = Heartbeat::new("mux");
        let mux = MuxWorker {
            sink: components.sink,
            egress_url: self.settings.egress_url.clone(),
            video_rx: video_out_rx,
            audio_rx: audio_out_rx,
            heartbeat: hb.clone(),
            stop: stop.clone(),
        };
        spawn("mux".into(), JOIN_DEADLINE, hb, Box::new(move || mux.run()))?;

        let hb = Heartbeat::new("video");
        let video = VideoWorker {
            detector: components.detector,
            embedder: components.embedder.clone(),
            blurrer: components.blurrer,
            registry: self.registry.clone(),
            latch: self.latch.clone(),
            capture_dir: self.settings.capture_dir.clone(),
            match_threshold: self.settings.match_threshold,
            recognition_confidence: self.settings.detection_confidence,
            in_rx: video_rx,
            out_tx: video_out_tx,
            heartbeat: hb.clone(),
            stop: stop.clone(),
        };
        spawn("video".into(), JOIN_DEADLINE, hb, Box::new(move || video.run()))?;

        for (i, (recognizer, classifier)) in components.speech_pool.into_iter().enumerate() {
            let name = format!("speech-{i}");
            let hb = Heartbeat::new(name.clone());
            let worker = SpeechWorker {
                recognizer,
                classifier,
                latch: self.latch.clone(),
                segment_rx: segment_rx.clone(),
                heartbeat: hb.clone(),
                stop: stop.clone(),
            };
            spawn(name, JOIN_DEADLINE_ASR, hb, Box::new(move || worker.run()))?;
        }

        let hb = Heartbeat::new("audio");
        let audio = AudioWorker {
            audio_bitrate: self.settings.audio_bitrate,
            audio_channels: self.settings.audio_channels,
            in_rx: audio_rx,
            out_tx: audio_out_tx,
            heartbeat: hb.clone(),
            stop: stop.clone(),
        };
        spawn("audio".into(), JOIN_DEADLINE, hb, Box::new(move || audio.run()))?;

        let hb = Heartbeat::new("vad");
        let vad = VadWorker {
            segmenter: SpeechSegmenter::new(
                components.vad,
                self.settings.vad_trailing_silence_ms,
            ),
            in_rx: vad_rx,
            segment_tx,
            segment_rx,
            heartbeat: hb.clone(),
            stop: stop.clone(),
        };
        spawn("vad".into(), JOIN_DEADLINE, hb, Box::new(move || vad.run()))?;

        let hb = Heartbeat::new("demux");
        let demux = DemuxWorker {
            source: components.source,
            ingress_url: self.settings.ingress_url.clone(),
            video_tx,
            audio_tx,
            vad_tx,
            heartbeat: hb.clone(),
            stop: stop.clone(),
        };
        spawn("demux".into(), JOIN_DEADLINE, hb, Box::new(move || demux.run()))?;

        let health = HealthMonitor {
            heartbeats,
            stale_after: DEFAULT_STALE_AFTER,
            stop: stop.clone(),
        };
        let health_handle = std::thread::Builder::new()
            .name("health".to_string())
            .spawn(move || health.run())?;

        log::info!("pipeline running ({} workers)", workers.len());

        // Park until asked to stop
        while !stop.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(100));
        }
        log::info!("pipeline stopping");

        // Reverse dependency order: input first, egress last
        workers.reverse();
        for (name, deadline, handle) in workers {
            join_with_deadline(&name, deadline, handle);
        }
        join_with_deadline("health", Duration::from_secs(2), health_handle);

        monitor.stop();
        log::info!("pipeline stopped");
        Ok(())
    }
}

/// Join a worker, giving up after its grace period. An overrun is a hard
/// abort: logged, and the thread is abandoned to die with the process.
fn join_with_deadline(name: &str, deadline: Duration, handle: std::thread::JoinHandle<()>) {
    let give_up_at = Instant::now() + deadline;
    while !handle.is_finished() {
        if Instant::now() >= give_up_at {
            log::error!("{name}: did not stop within {deadline:?}, hard abort");
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    if handle.join().is_err() {
        log::error!("{name}: worker panicked");
    }
}
