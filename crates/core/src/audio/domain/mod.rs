pub mod consent_classifier;
pub mod speech_recognizer;
pub mod speech_segment;
pub mod speech_segmenter;
pub mod transcript;
pub mod voice_activity;
