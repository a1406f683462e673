use crate::shared::constants::SPEECH_SAMPLE_RATE;

/// One detected utterance: contiguous 16 kHz mono samples plus its position
/// on the stream clock (seconds since the current connection started).
#[derive(Clone, Debug)]
pub struct SpeechSegment {
    samples: Vec<f32>,
    start_time: f64,
    end_time: f64,
}

impl SpeechSegment {
    pub fn new(samples: Vec<f32>, start_time: f64, end_time: f64) -> Self {
        Self {
            samples,
            start_time,
            end_time,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / SPEECH_SAMPLE_RATE as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fields() {
        let seg = SpeechSegment::new(vec![0.0; 16_000], 2.0, 3.0);
        assert_eq!(seg.samples().len(), 16_000);
        assert_relative_eq!(seg.start_time(), 2.0);
        assert_relative_eq!(seg.end_time(), 3.0);
    }

    #[test]
    fn test_duration_from_sample_count() {
        let seg = SpeechSegment::new(vec![0.0; 8_000], 0.0, 0.5);
        assert_relative_eq!(seg.duration(), 0.5);
    }

    #[test]
    fn test_into_samples() {
        let seg = SpeechSegment::new(vec![0.25; 4], 0.0, 0.0);
        assert_eq!(seg.into_samples(), vec![0.25; 4]);
    }
}
