use crate::shared::encoded_packet::EncodedPacket;
use crate::shared::frame::VideoFrame;
use crate::video::domain::stream_source::StreamInfo;

/// Abstracts the egress encoder + muxer.
///
/// Video arrives as composed raw frames (the sink owns the H.264 encoder);
/// audio arrives pre-encoded from the transcoder. Both carry PTS in their
/// declared upstream time bases and the sink rescales into its own streams,
/// which is what keeps A/V sync across the pipeline.
pub trait StreamSink: Send {
    fn open(&mut self, url: &str, info: &StreamInfo) -> Result<(), Box<dyn std::error::Error>>;

    fn write_video(&mut self, frame: &VideoFrame) -> Result<(), Box<dyn std::error::Error>>;

    fn write_audio(&mut self, packet: &EncodedPacket) -> Result<(), Box<dyn std::error::Error>>;

    fn is_open(&self) -> bool;

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}
