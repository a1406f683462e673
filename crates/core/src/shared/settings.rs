use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("ingress URL must not be empty")]
    EmptyIngressUrl,
    #[error("egress URL must not be empty")]
    EmptyEgressUrl,
    #[error("capture directory must not be empty")]
    EmptyCaptureDir,
    #[error("{name} capacity must be at least 1, got {value}")]
    ZeroCapacity { name: &'static str, value: usize },
    #[error("speech worker count must be at least 1, got {0}")]
    ZeroWorkers(usize),
    #[error("match threshold must be between 0.0 and 1.0, got {0}")]
    BadThreshold(f64),
    #[error("audio channels must be 1 or 2, got {0}")]
    BadChannels(u16),
    #[error("audio bitrate must be between 6000 and 510000 bps, got {0}")]
    BadBitrate(usize),
}

/// Everything the pipeline needs to run, resolved before startup.
///
/// Construction is infallible; `validate` is called once by the supervisor
/// (and by the CLI before that) and any error is fatal, per the policy that
/// only configuration errors terminate the process at start.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    /// URL the external media server publishes into (opened in listen mode).
    pub ingress_url: String,
    /// URL the filtered output is published to.
    pub egress_url: String,
    /// Directory holding consent capture JPEGs.
    pub capture_dir: std::path::PathBuf,

    /// Decoded-frame queue between demuxer and video worker.
    pub video_queue_capacity: usize,
    /// Audio fan-out queues (transcoder and VAD each get one this size).
    pub audio_queue_capacity: usize,
    /// Speech segment queue; the drop-oldest boundary.
    pub segment_queue_capacity: usize,
    /// Processed-frame and encoded-audio queues into the muxer.
    pub output_queue_capacity: usize,

    /// Parallel ASR + classifier workers.
    pub speech_worker_count: usize,
    /// Silence run that closes an utterance, in milliseconds.
    pub vad_trailing_silence_ms: u64,
    /// Cosine similarity cutoff for a face to count as consented.
    pub match_threshold: f64,
    /// Detections below this confidence are ignored entirely.
    pub detection_confidence: f64,

    /// Egress Opus bitrate in bits per second.
    pub audio_bitrate: usize,
    /// Egress audio channel count.
    pub audio_channels: u16,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            ingress_url: "rtmp://127.0.0.1:1935/live/ingest".to_string(),
            egress_url: "rtsp://127.0.0.1:8554/filtered".to_string(),
            capture_dir: std::path::PathBuf::from("captures"),
            video_queue_capacity: 8,
            audio_queue_capacity: 32,
            segment_queue_capacity: 4,
            output_queue_capacity: 16,
            speech_worker_count: 2,
            vad_trailing_silence_ms: 500,
            match_threshold: 0.4,
            detection_confidence: 0.5,
            audio_bitrate: 64_000,
            audio_channels: 1,
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingress_url.trim().is_empty() {
            return Err(ConfigError::EmptyIngressUrl);
        }
        if self.egress_url.trim().is_empty() {
            return Err(ConfigError::EmptyEgressUrl);
        }
        if self.capture_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyCaptureDir);
        }
        for (name, value) in [
            ("video queue", self.video_queue_capacity),
            ("audio queue", self.audio_queue_capacity),
            ("segment queue", self.segment_queue_capacity),
            ("output queue", self.output_queue_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroCapacity { name, value });
            }
        }
        if self.speech_worker_count == 0 {
            return Err(ConfigError::ZeroWorkers(self.speech_worker_count));
        }
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(ConfigError::BadThreshold(self.match_threshold));
        }
        if !(0.0..=1.0).contains(&self.detection_confidence) {
            return Err(ConfigError::BadThreshold(self.detection_confidence));
        }
        if self.audio_channels != 1 && self.audio_channels != 2 {
            return Err(ConfigError::BadChannels(self.audio_channels));
        }
        if !(6_000..=510_000).contains(&self.audio_bitrate) {
            return Err(ConfigError::BadBitrate(self.audio_bitrate));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PipelineSettings::default().validate().is_ok());
    }

    #[test]
    fn test_empty_ingress_rejected() {
        let s = PipelineSettings {
            ingress_url: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(s.validate(), Err(ConfigError::EmptyIngressUrl)));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let s = PipelineSettings {
            segment_queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(s.validate(), Err(ConfigError::ZeroCapacity { .. })));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let s = PipelineSettings {
            speech_worker_count: 0,
            ..Default::default()
        };
        assert!(matches!(s.validate(), Err(ConfigError::ZeroWorkers(0))));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let s = PipelineSettings {
            match_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(s.validate(), Err(ConfigError::BadThreshold(_))));
    }

    #[test]
    fn test_bad_channels_rejected() {
        let s = PipelineSettings {
            audio_channels: 6,
            ..Default::default()
        };
        assert!(matches!(s.validate(), Err(ConfigError::BadChannels(6))));
    }

    #[test]
    fn test_bitrate_bounds() {
        let s = PipelineSettings {
            audio_bitrate: 1000,
            ..Default::default()
        };
        assert!(matches!(s.validate(), Err(ConfigError::BadBitrate(1000))));
        let s = PipelineSettings {
            audio_bitrate: 510_000,
            ..Default::default()
        };
        assert!(s.validate().is_ok());
    }
}
