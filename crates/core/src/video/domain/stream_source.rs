use crate::shared::audio_frame::AudioFrame;
use crate::shared::frame::VideoFrame;
use crate::shared::time_base::TimeBase;

/// Stream-level properties discovered when the ingress connects.
#[derive(Clone, Debug)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub video_time_base: TimeBase,
    pub audio_time_base: TimeBase,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
}

/// One decoded unit from the ingress, in stream order.
#[derive(Debug)]
pub enum MediaEvent {
    Video(VideoFrame),
    Audio(AudioFrame),
}

/// Abstracts the ingress demuxer + decoders so the pipeline can pull decoded
/// media without depending on a specific transport or codec library.
///
/// `open` blocks for at most a short per-attempt window (the caller retries);
/// `read` returns `Ok(None)` on clean stream end.
pub trait StreamSource: Send {
    fn open(&mut self, url: &str) -> Result<StreamInfo, Box<dyn std::error::Error>>;

    fn read(&mut self) -> Result<Option<MediaEvent>, Box<dyn std::error::Error>>;

    fn close(&mut self);
}
