pub mod earshot_vad;
pub mod llama_consent_classifier;
pub mod opus_transcoder;
pub mod whisper_recognizer;
