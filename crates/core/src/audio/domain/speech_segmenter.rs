use crate::audio::domain::speech_segment::SpeechSegment;
use crate::audio::domain::voice_activity::{VoiceActivityDetector, VAD_WINDOW};
use crate::shared::audio_frame::AudioFrame;
use crate::shared::constants::SPEECH_SAMPLE_RATE;

/// Utterances shorter than this are noise, not speech worth transcribing.
const MIN_SPEECH_MS: u64 = 300;

const WINDOW_MS: u64 = 30;

/// Turns the live audio stream into discrete speech segments.
///
/// Incoming frames are downmixed and resampled to 16 kHz mono, then fed to
/// the VAD in 30 ms windows. A segment opens on the first speech window and
/// closes after `trailing_silence_ms` of continuous silence; segments with
/// less than [`MIN_SPEECH_MS`] of detected speech are discarded. Times are
/// on the stream clock (seconds of audio consumed since the last reset).
pub struct SpeechSegmenter {
    vad: Box<dyn VoiceActivityDetector>,
    trailing_silence_windows: usize,
    min_speech_windows: usize,
    pending: Vec<f32>,
    current: Option<ActiveSegment>,
    clock_samples: u64,
}

struct ActiveSegment {
    samples: Vec<f32>,
    start_time: f64,
    silence_run: usize,
    speech_windows: usize,
}

impl SpeechSegmenter {
    pub fn new(vad: Box<dyn VoiceActivityDetector>, trailing_silence_ms: u64) -> Self {
        Self {
            vad,
            trailing_silence_windows: (trailing_silence_ms / WINDOW_MS).max(1) as usize,
            min_speech_windows: (MIN_SPEECH_MS / WINDOW_MS).max(1) as usize,
            pending: Vec::new(),
            current: None,
            clock_samples: 0,
        }
    }

    /// Feed one decoded frame; returns any segments that closed.
    pub fn push(&mut self, frame: &AudioFrame) -> Vec<SpeechSegment> {
        let mono = frame.to_mono();
        self.pending
            .extend(resample_linear(&mono, frame.sample_rate(), SPEECH_SAMPLE_RATE));

        let mut closed = Vec::new();
        let mut offset = 0;
        while self.pending.len() - offset >= VAD_WINDOW {
            let window: Vec<f32> = self.pending[offset..offset + VAD_WINDOW].to_vec();
            offset += VAD_WINDOW;

            // A VAD failure counts as silence: it can end a segment early but
            // never opens one on garbage.
            let is_speech = match self.vad.is_speech(&window) {
                Ok(v) => v,
                Err(e) => {
                    log::debug!("vad failure, treating window as silence: {e}");
                    false
                }
            };

            let window_start = self.clock_samples as f64 / SPEECH_SAMPLE_RATE as f64;
            self.clock_samples += VAD_WINDOW as u64;

            match self.current.as_mut() {
                Some(segment) => {
                    segment.samples.extend_from_slice(&window);
                    if is_speech {
                        segment.silence_run = 0;
                        segment.speech_windows += 1;
                    } else {
                        segment.silence_run += 1;
                        if segment.silence_run >= self.trailing_silence_windows {
                            if let Some(seg) = self.close_current() {
                                closed.push(seg);
                            }
                        }
                    }
                }
                None => {
                    if is_speech {
                        self.current = Some(ActiveSegment {
                            samples: window,
                            start_time: window_start,
                            silence_run: 0,
                            speech_windows: 1,
                        });
                    }
                }
            }
        }
        self.pending.drain(..offset);

        closed
    }

    /// Close any in-flight segment (stream end or reconnect).
    pub fn flush(&mut self) -> Option<SpeechSegment> {
        self.close_current()
    }

    /// Forget all buffered audio and restart the stream clock.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.current = None;
        self.clock_samples = 0;
    }

    pub fn clock_seconds(&self) -> f64 {
        self.clock_samples as f64 / SPEECH_SAMPLE_RATE as f64
    }

    fn close_current(&mut self) -> Option<SpeechSegment> {
        let segment = self.current.take()?;
        if segment.speech_windows < self.min_speech_windows {
            return None;
        }
        let end_time = segment.start_time + segment.samples.len() as f64 / SPEECH_SAMPLE_RATE as f64;
        Some(SpeechSegment::new(
            segment.samples,
            segment.start_time,
            end_time,
        ))
    }
}

/// Linear-interpolation resampler. Quality is plenty for VAD + ASR input;
/// the transcoder path uses swresample instead.
pub fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || input.is_empty() || from_rate == 0 {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src = i as f64 * ratio;
        let i0 = src.floor() as usize;
        let i1 = (i0 + 1).min(input.len() - 1);
        let frac = (src - i0 as f64) as f32;
        out.push(input[i0] * (1.0 - frac) + input[i1] * frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Calls a window speech iff its mean magnitude clears a threshold.
    struct LevelVad;

    impl VoiceActivityDetector for LevelVad {
        fn is_speech(&mut self, window: &[f32]) -> Result<bool, Box<dyn std::error::Error>> {
            let level = window.iter().map(|s| s.abs()).sum::<f32>() / window.len() as f32;
            Ok(level > 0.1)
        }
    }

    struct FailingVad;

    impl VoiceActivityDetector for FailingVad {
        fn is_speech(&mut self, _window: &[f32]) -> Result<bool, Box<dyn std::error::Error>> {
            Err("inference failed".into())
        }
    }

    fn frame_16k(samples: Vec<f32>) -> AudioFrame {
        AudioFrame::new(samples, SPEECH_SAMPLE_RATE, 1, 0)
    }

    fn speech(ms: u64) -> Vec<f32> {
        vec![0.5; (ms * SPEECH_SAMPLE_RATE as u64 / 1000) as usize]
    }

    fn silence(ms: u64) -> Vec<f32> {
        vec![0.0; (ms * SPEECH_SAMPLE_RATE as u64 / 1000) as usize]
    }

    fn segmenter() -> SpeechSegmenter {
        SpeechSegmenter::new(Box::new(LevelVad), 500)
    }

    #[test]
    fn test_no_segment_from_silence() {
        let mut seg = segmenter();
        let closed = seg.push(&frame_16k(silence(2000)));
        assert!(closed.is_empty());
        assert!(seg.flush().is_none());
    }

    #[test]
    fn test_segment_closes_after_trailing_silence() {
        let mut seg = segmenter();
        let mut audio = speech(600);
        audio.extend(silence(600));
        let closed = seg.push(&frame_16k(audio));
        assert_eq!(closed.len(), 1);
        // Segment covers the speech plus the trailing silence that closed it
        assert!(closed[0].duration() >= 0.6);
    }

    #[test]
    fn test_segment_not_closed_before_trailing_silence() {
        let mut seg = segmenter();
        let mut audio = speech(600);
        audio.extend(silence(300)); // less than the 500 ms threshold
        let closed = seg.push(&frame_16k(audio));
        assert!(closed.is_empty());

        // More silence pushes it over
        let closed = seg.push(&frame_16k(silence(300)));
        assert_eq!(closed.len(), 1);
    }

    #[test]
    fn test_short_blip_discarded() {
        let mut seg = segmenter();
        let mut audio = speech(60); // under MIN_SPEECH_MS
        audio.extend(silence(1000));
        let closed = seg.push(&frame_16k(audio));
        assert!(closed.is_empty());
    }

    #[test]
    fn test_silence_gap_inside_utterance_does_not_split() {
        let mut seg = segmenter();
        let mut audio = speech(400);
        audio.extend(silence(200)); // pause shorter than threshold
        audio.extend(speech(400));
        audio.extend(silence(600));
        let closed = seg.push(&frame_16k(audio));
        assert_eq!(closed.len(), 1);
        assert!(closed[0].duration() >= 1.0);
    }

    #[test]
    fn test_two_utterances_two_segments() {
        let mut seg = segmenter();
        let mut audio = speech(400);
        audio.extend(silence(700));
        audio.extend(speech(400));
        audio.extend(silence(700));
        let closed = seg.push(&frame_16k(audio));
        assert_eq!(closed.len(), 2);
        assert!(closed[1].start_time() > closed[0].end_time() - 1e-9);
    }

    #[test]
    fn test_start_time_on_stream_clock() {
        let mut seg = segmenter();
        let mut audio = silence(1000);
        audio.extend(speech(600));
        audio.extend(silence(600));
        let closed = seg.push(&frame_16k(audio));
        assert_eq!(closed.len(), 1);
        // Speech starts at the 1 s mark, window-quantized
        assert_relative_eq!(closed[0].start_time(), 1.0, epsilon = 0.04);
    }

    #[test]
    fn test_flush_closes_open_segment() {
        let mut seg = segmenter();
        let closed = seg.push(&frame_16k(speech(600)));
        assert!(closed.is_empty());
        let flushed = seg.flush().unwrap();
        assert!(flushed.duration() >= 0.5);
    }

    #[test]
    fn test_reset_clears_clock_and_state() {
        let mut seg = segmenter();
        seg.push(&frame_16k(speech(600)));
        seg.reset();
        assert_relative_eq!(seg.clock_seconds(), 0.0);
        assert!(seg.flush().is_none());
    }

    #[test]
    fn test_vad_failure_is_silence() {
        let mut seg = SpeechSegmenter::new(Box::new(FailingVad), 500);
        let closed = seg.push(&frame_16k(speech(2000)));
        assert!(closed.is_empty());
        assert!(seg.flush().is_none());
    }

    #[test]
    fn test_stereo_input_downmixed() {
        let mut seg = segmenter();
        // Stereo 16 kHz: L loud, R silent → mono level 0.25, still speech
        let samples: Vec<f32> = (0..16_000).flat_map(|_| [0.5, 0.0]).collect();
        let frame = AudioFrame::new(samples, SPEECH_SAMPLE_RATE, 2, 0);
        seg.push(&frame);
        let flushed = seg.flush().unwrap();
        assert!(flushed.duration() > 0.9);
    }

    // ── resample_linear ──────────────────────────────────────────────

    #[test]
    fn test_resample_same_rate_passthrough() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&input, 16_000, 16_000), input);
    }

    #[test]
    fn test_resample_halves_length() {
        let input = vec![0.0; 960];
        let out = resample_linear(&input, 48_000, 16_000);
        assert_eq!(out.len(), 320);
    }

    #[test]
    fn test_resample_preserves_constant_signal() {
        let input = vec![0.7; 480];
        let out = resample_linear(&input, 48_000, 16_000);
        assert!(out.iter().all(|&s| (s - 0.7).abs() < 1e-6));
    }

    #[test]
    fn test_resample_empty() {
        assert!(resample_linear(&[], 48_000, 16_000).is_empty());
    }
}
