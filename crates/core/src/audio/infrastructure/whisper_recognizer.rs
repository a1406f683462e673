use std::path::Path;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::domain::speech_recognizer::SpeechRecognizer;
use crate::audio::domain::speech_segment::SpeechSegment;
use crate::audio::domain::transcript::Transcript;

/// Whisper refuses inputs under ~1000 ms; pad to 1050 ms of 16 kHz audio to
/// clear its internal rounding.
const MIN_SAMPLES: usize = 16_800;

/// Local speech recognition with whisper.cpp via whisper-rs.
///
/// One context per instance; each `transcribe` call runs on a fresh decoding
/// state, so speech workers can each own a recognizer without sharing.
pub struct WhisperRecognizer {
    ctx: WhisperContext,
    threads: i32,
}

impl WhisperRecognizer {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let path_str = model_path
            .to_str()
            .ok_or("whisper model path is not valid UTF-8")?;
        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| format!("failed to load whisper model: {e}"))?;

        let threads = std::thread::available_parallelism()
            .map(|n| n.get().min(4))
            .unwrap_or(1) as i32;

        Ok(Self { ctx, threads })
    }
}

impl SpeechRecognizer for WhisperRecognizer {
    fn transcribe(&mut self, segment: &SpeechSegment) -> Result<Transcript, Box<dyn std::error::Error>> {
        let mut samples = segment.samples().to_vec();
        if samples.is_empty() {
            return Err("empty speech segment".into());
        }
        if samples.len() < MIN_SAMPLES {
            samples.resize(MIN_SAMPLES, 0.0);
        }

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some("en"));
        params.set_n_threads(self.threads);
        params.set_translate(false);
        params.set_no_context(true);
        params.set_single_segment(false);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| format!("failed to create whisper state: {e}"))?;

        state
            .full(params, &samples)
            .map_err(|e| format!("whisper inference failed: {e}"))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| format!("failed to read segment count: {e}"))?;

        let mut text = String::new();
        for i in 0..num_segments {
            let piece = state
                .full_get_segment_text(i)
                .map_err(|e| format!("failed to read segment {i}: {e}"))?;
            if !text.is_empty() && !piece.starts_with(' ') {
                text.push(' ');
            }
            text.push_str(&piece);
        }

        Ok(Transcript {
            text: text.trim().to_string(),
            start_time: segment.start_time(),
            end_time: segment.end_time(),
        })
    }
}
