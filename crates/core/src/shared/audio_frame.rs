/// A decoded audio frame: interleaved PCM samples normalized to [-1.0, 1.0].
///
/// `pts` is in the ingress audio time base. The demuxer clones one frame per
/// downstream consumer (transcoder, voice activity), so both see the same
/// sample sequence.
#[derive(Clone, Debug)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    pts: i64,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16, pts: i64) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
            pts,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }

    /// Number of samples per channel.
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Average the channels down to mono.
    pub fn to_mono(&self) -> Vec<f32> {
        let ch = self.channels as usize;
        if ch <= 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect()
    }
}
