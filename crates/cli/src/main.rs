use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use streamguard_core::audio::domain::consent_classifier::ConsentClassifier;
use streamguard_core::audio::domain::speech_recognizer::SpeechRecognizer;
use streamguard_core::audio::infrastructure::earshot_vad::WebRtcVad;
use streamguard_core::audio::infrastructure::llama_consent_classifier::LlamaConsentClassifier;
use streamguard_core::audio::infrastructure::whisper_recognizer::WhisperRecognizer;
use streamguard_core::blurring::infrastructure::cpu_blurrer::CpuRegionBlurrer;
use streamguard_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use streamguard_core::pipeline::supervisor::{PipelineComponents, Supervisor};
use streamguard_core::recognition::infrastructure::onnx_arcface_embedder::OnnxArcFaceEmbedder;
use streamguard_core::shared::constants::{
    CLASSIFIER_MODEL_NAME, CLASSIFIER_MODEL_URL, DETECTOR_MODEL_NAME, DETECTOR_MODEL_URL,
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, WHISPER_MODEL_NAME, WHISPER_MODEL_URL,
};
use streamguard_core::shared::model_resolver;
use streamguard_core::shared::settings::PipelineSettings;
use streamguard_core::video::infrastructure::ffmpeg_sink::FfmpegSink;
use streamguard_core::video::infrastructure::ffmpeg_source::FfmpegSource;

/// Consent-aware face anonymization for live wearable-camera streams.
#[derive(Parser)]
#[command(name = "streamguard")]
struct Cli {
    /// Ingress URL, opened in listen mode (the media server publishes here).
    #[arg(long, default_value = "rtmp://127.0.0.1:1935/live/ingest")]
    ingress: String,

    /// Egress URL the filtered stream is published to.
    #[arg(long, default_value = "rtsp://127.0.0.1:8554/filtered")]
    egress: String,

    /// Directory for consent capture JPEGs.
    #[arg(long, default_value = "captures")]
    capture_dir: PathBuf,

    /// Decoded video queue capacity (decode → video worker).
    #[arg(long, default_value = "8")]
    video_queue: usize,

    /// Decoded audio queue capacity (each fan-out leg).
    #[arg(long, default_value = "32")]
    audio_queue: usize,

    /// Speech segment queue capacity (drop-oldest boundary).
    #[arg(long, default_value = "4")]
    segment_queue: usize,

    /// Parallel ASR + consent classifier workers.
    #[arg(long, default_value = "2")]
    speech_workers: usize,

    /// Trailing silence that closes an utterance, in milliseconds.
    #[arg(long, default_value = "500")]
    vad_silence_ms: u64,

    /// Face recognition similarity threshold (0.0-1.0).
    #[arg(long, default_value = "0.4")]
    match_threshold: f64,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    confidence: f64,

    /// Egress Opus bitrate in bits per second.
    #[arg(long, default_value = "64000")]
    audio_bitrate: usize,

    /// Egress audio channels (1 or 2).
    #[arg(long, default_value = "1")]
    audio_channels: u16,

    /// Log level: error, warn, info, debug, trace.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let settings = PipelineSettings {
        ingress_url: cli.ingress,
        egress_url: cli.egress,
        capture_dir: cli.capture_dir,
        video_queue_capacity: cli.video_queue,
        audio_queue_capacity: cli.audio_queue,
        segment_queue_capacity: cli.segment_queue,
        output_queue_capacity: cli.video_queue.max(16),
        speech_worker_count: cli.speech_workers,
        vad_trailing_silence_ms: cli.vad_silence_ms,
        match_threshold: cli.match_threshold,
        detection_confidence: cli.confidence,
        audio_bitrate: cli.audio_bitrate,
        audio_channels: cli.audio_channels,
    };
    settings.validate()?;

    let components = build_components(&settings)?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, shutting down");
        stop_signal.store(true, Ordering::Relaxed);
    })?;

    let supervisor = Supervisor::new(settings);
    supervisor.run(components, stop)?;
    Ok(())
}

fn build_components(
    settings: &PipelineSettings,
) -> Result<PipelineComponents, Box<dyn std::error::Error>> {
    let detector_path = resolve_model(DETECTOR_MODEL_NAME, DETECTOR_MODEL_URL)?;
    let embedder_path = resolve_model(EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL)?;
    let whisper_path = resolve_model(WHISPER_MODEL_NAME, WHISPER_MODEL_URL)?;
    let classifier_path = resolve_model(CLASSIFIER_MODEL_NAME, CLASSIFIER_MODEL_URL)?;

    let detector = OnnxYoloDetector::new(&detector_path, settings.detection_confidence)?;
    let embedder = OnnxArcFaceEmbedder::new(&embedder_path)?;

    let mut speech_pool: Vec<(Box<dyn SpeechRecognizer>, Box<dyn ConsentClassifier>)> = Vec::new();
    for _ in 0..settings.speech_worker_count {
        speech_pool.push((
            Box::new(WhisperRecognizer::new(&whisper_path)?),
            Box::new(LlamaConsentClassifier::new(&classifier_path)?),
        ));
    }

    Ok(PipelineComponents {
        source: Box::new(FfmpegSource::new()),
        sink: Box::new(FfmpegSink::new(
            settings.audio_bitrate,
            settings.audio_channels,
        )),
        detector: Box::new(detector),
        embedder: Arc::new(embedder),
        blurrer: Box::new(CpuRegionBlurrer::new()),
        vad: Box::new(WebRtcVad::new()),
        speech_pool,
    })
}

fn resolve_model(name: &'static str, url: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {name}");
    let path = model_resolver::resolve(
        name,
        url,
        None,
        Some(Box::new(move |downloaded, total| {
            if total > 0 {
                let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
                eprint!("\rDownloading {name}... {pct}%");
            } else {
                eprint!("\rDownloading {name}... {downloaded} bytes");
            }
        })),
    )?;
    eprintln!();
    Ok(path)
}
