pub const DETECTOR_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const DETECTOR_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard-ml-models/releases/download/models-v1/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard-ml-models/releases/download/models-v1/w600k_r50.onnx";

pub const WHISPER_MODEL_NAME: &str = "ggml-tiny.en.bin";
pub const WHISPER_MODEL_URL: &str =
    "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny.en.bin";

pub const CLASSIFIER_MODEL_NAME: &str = "qwen2.5-0.5b-instruct-q5_k_m.gguf";
pub const CLASSIFIER_MODEL_URL: &str =
    "https://huggingface.co/Qwen/Qwen2.5-0.5B-Instruct-GGUF/resolve/main/qwen2.5-0.5b-instruct-q5_k_m.gguf";

/// Sample rate expected by both the VAD and Whisper.
pub const SPEECH_SAMPLE_RATE: u32 = 16_000;

/// Opus only encodes at 48 kHz.
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
