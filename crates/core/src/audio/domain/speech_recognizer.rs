use crate::audio::domain::speech_segment::SpeechSegment;
use crate::audio::domain::transcript::Transcript;

/// Domain interface for automatic speech recognition.
///
/// `&mut self` because real backends keep per-call decoding state. An error
/// means "no transcript", never a fabricated one.
pub trait SpeechRecognizer: Send {
    fn transcribe(&mut self, segment: &SpeechSegment) -> Result<Transcript, Box<dyn std::error::Error>>;
}
