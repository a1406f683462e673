/// Samples per VAD window: 30 ms at 16 kHz.
pub const VAD_WINDOW: usize = 480;

/// Domain interface for speech/non-speech decisions on one 16 kHz mono
/// window of [`VAD_WINDOW`] samples.
pub trait VoiceActivityDetector: Send {
    fn is_speech(&mut self, window: &[f32]) -> Result<bool, Box<dyn std::error::Error>>;
}
