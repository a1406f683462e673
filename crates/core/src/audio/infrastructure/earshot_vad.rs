use earshot::{VoiceActivityDetector as EarshotDetector, VoiceActivityProfile};

use crate::audio::domain::voice_activity::{VoiceActivityDetector, VAD_WINDOW};

/// WebRTC-style GMM voice activity detection via `earshot`.
///
/// Rule-based and microseconds-per-window fast, so it can sit on the audio
/// hot path without threatening real-time ingestion. earshot consumes i16
/// PCM in multiples of 240 samples at 16 kHz; our 480-sample window is two
/// of its frames, combined with OR so clipped speech onsets still register.
pub struct WebRtcVad {
    detector: EarshotDetector,
}

impl WebRtcVad {
    pub fn new() -> Self {
        Self {
            detector: EarshotDetector::new(VoiceActivityProfile::VERY_AGGRESSIVE),
        }
    }
}

impl Default for WebRtcVad {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceActivityDetector for WebRtcVad {
    fn is_speech(&mut self, window: &[f32]) -> Result<bool, Box<dyn std::error::Error>> {
        if window.len() != VAD_WINDOW {
            return Err(format!(
                "vad window must be {VAD_WINDOW} samples, got {}",
                window.len()
            )
            .into());
        }

        let pcm: Vec<i16> = window
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect();

        for chunk in pcm.chunks_exact(240) {
            let speech = self
                .detector
                .predict_16khz(chunk)
                .map_err(|e| format!("earshot prediction failed: {e:?}"))?;
            if speech {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
