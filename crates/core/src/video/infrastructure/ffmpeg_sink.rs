use std::path::Path;

use crate::shared::constants::OPUS_SAMPLE_RATE;
use crate::shared::encoded_packet::EncodedPacket;
use crate::shared::frame::VideoFrame;
use crate::video::domain::stream_sink::StreamSink;
use crate::video::domain::stream_source::StreamInfo;

/// Egress encoder + muxer via ffmpeg-next.
///
/// Publishes one H.264 stream (encoded here, zerolatency) and one Opus
/// stream (already encoded by the transcoder). Video frames keep their
/// ingress PTS: the encoder runs in the ingress video time base and packets
/// are rescaled into the output stream base, so A/V sync is carried by PTS
/// end to end rather than by arrival order.
pub struct FfmpegSink {
    audio_bitrate: usize,
    audio_channels: u16,
    octx: Option<ffmpeg_next::format::context::Output>,
    encoder: Option<ffmpeg_next::codec::encoder::video::Encoder>,
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    width: u32,
    height: u32,
    video_time_base: ffmpeg_next::Rational,
    video_stream_index: usize,
    audio_stream_index: Option<usize>,
}

// Safety: FfmpegSink is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegSink {}

impl FfmpegSink {
    pub fn new(audio_bitrate: usize, audio_channels: u16) -> Self {
        Self {
            audio_bitrate,
            audio_channels,
            octx: None,
            encoder: None,
            scaler: None,
            width: 0,
            height: 0,
            video_time_base: ffmpeg_next::Rational(1, 90_000),
            video_stream_index: 0,
            audio_stream_index: None,
        }
    }

    /// Opus extradata only exists on an opened encoder, so the sink opens a
    /// twin of the transcoder's encoder purely to stamp stream parameters.
    fn add_audio_stream(
        octx: &mut ffmpeg_next::format::context::Output,
        bitrate: usize,
        channels: u16,
    ) -> Result<usize, Box<dyn std::error::Error>> {
        let codec = ffmpeg_next::encoder::find_by_name("libopus")
            .or_else(|| ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::OPUS))
            .ok_or("Opus encoder not found")?;

        let layout = match channels {
            1 => ffmpeg_next::ChannelLayout::MONO,
            2 => ffmpeg_next::ChannelLayout::STEREO,
            n => return Err(format!("unsupported channel count: {n}").into()),
        };

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()?;
        encoder_ctx.set_rate(OPUS_SAMPLE_RATE as i32);
        encoder_ctx.set_channel_layout(layout);
        encoder_ctx.set_format(ffmpeg_next::format::Sample::F32(
            ffmpeg_next::format::sample::Type::Packed,
        ));
        encoder_ctx.set_bit_rate(bitrate);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, OPUS_SAMPLE_RATE as i32));
        let encoder = encoder_ctx.open_as(codec)?;

        let mut ost = octx.add_stream(Some(codec))?;
        ost.set_parameters(&encoder);
        Ok(ost.index())
    }
}

impl StreamSink for FfmpegSink {
    fn open(&mut self, url: &str, info: &StreamInfo) -> Result<(), Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let mut octx = if url.starts_with("rtsp://") {
            ffmpeg_next::format::output_as(&Path::new(url), "rtsp")?
        } else if url.starts_with("rtmp://") {
            ffmpeg_next::format::output_as(&Path::new(url), "flv")?
        } else {
            ffmpeg_next::format::output(&Path::new(url))?
        };

        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find_by_name("libx264")
            .or_else(|| ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::H264))
            .ok_or("H.264 encoder not found")?;

        let mut ost = octx.add_stream(Some(codec))?;

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;

        encoder_ctx.set_width(info.width);
        encoder_ctx.set_height(info.height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);

        let video_tb = ffmpeg_next::Rational(info.video_time_base.num, info.video_time_base.den);
        encoder_ctx.set_time_base(video_tb);
        let fps_i = info.fps.round() as i32;
        if fps_i > 0 {
            encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps_i, 1)));
        }

        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let mut x264_opts = ffmpeg_next::Dictionary::new();
        x264_opts.set("preset", "veryfast");
        x264_opts.set("tune", "zerolatency");
        let encoder = encoder_ctx.open_with(x264_opts)?;
        ost.set_parameters(&encoder);
        let video_stream_index = ost.index();

        let audio_stream_index = if info.audio_sample_rate > 0 {
            Some(Self::add_audio_stream(
                &mut octx,
                self.audio_bitrate,
                self.audio_channels,
            )?)
        } else {
            None
        };

        octx.write_header()?;

        let scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            info.width,
            info.height,
            ffmpeg_next::format::Pixel::YUV420P,
            info.width,
            info.height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        self.width = info.width;
        self.height = info.height;
        self.video_time_base = video_tb;
        self.video_stream_index = video_stream_index;
        self.audio_stream_index = audio_stream_index;
        self.octx = Some(octx);
        self.encoder = Some(encoder);
        self.scaler = Some(scaler);

        Ok(())
    }

    fn write_video(&mut self, frame: &VideoFrame) -> Result<(), Box<dyn std::error::Error>> {
        let encoder = self.encoder.as_mut().ok_or("sink is not open")?;
        let scaler = self.scaler.as_mut().unwrap();
        let octx = self.octx.as_mut().unwrap();

        if frame.width() != self.width || frame.height() != self.height {
            return Err(format!(
                "frame size changed mid-stream: {}x{} (expected {}x{})",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )
            .into());
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            self.width,
            self.height,
        );

        let stride = rgb_frame.stride(0);
        let data = rgb_frame.data_mut(0);
        let src = frame.data();
        let row_bytes = self.width as usize * 3;
        for row in 0..self.height as usize {
            let src_start = row * row_bytes;
            let dst_start = row * stride;
            data[dst_start..dst_start + row_bytes]
                .copy_from_slice(&src[src_start..src_start + row_bytes]);
        }

        let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
        scaler.run(&rgb_frame, &mut yuv_frame)?;
        yuv_frame.set_pts(Some(frame.pts()));

        encoder.send_frame(&yuv_frame)?;

        let ost_time_base = octx.stream(self.video_stream_index).unwrap().time_base();
        let mut encoded = ffmpeg_next::Packet::empty();
        while encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(self.video_stream_index);
            encoded.rescale_ts(self.video_time_base, ost_time_base);
            encoded.write_interleaved(octx)?;
        }

        Ok(())
    }

    fn write_audio(&mut self, packet: &EncodedPacket) -> Result<(), Box<dyn std::error::Error>> {
        let octx = self.octx.as_mut().ok_or("sink is not open")?;
        let Some(stream_index) = self.audio_stream_index else {
            return Ok(()); // video-only ingress: nothing to mux
        };

        let ost_time_base = octx.stream(stream_index).unwrap().time_base();
        let src_tb = ffmpeg_next::Rational(packet.time_base.num, packet.time_base.den);

        let mut out = ffmpeg_next::Packet::copy(&packet.data);
        out.set_pts(Some(packet.pts));
        out.set_dts(Some(packet.pts));
        if packet.key {
            out.set_flags(ffmpeg_next::packet::Flags::KEY);
        }
        out.set_stream(stream_index);
        out.rescale_ts(src_tb, ost_time_base);
        out.write_interleaved(octx)?;

        Ok(())
    }

    fn is_open(&self) -> bool {
        self.octx.is_some()
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let (Some(mut encoder), Some(mut octx)) = (self.encoder.take(), self.octx.take()) {
            let ost_time_base = octx.stream(self.video_stream_index).unwrap().time_base();
            encoder.send_eof()?;
            let mut encoded = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut encoded).is_ok() {
                encoded.set_stream(self.video_stream_index);
                encoded.rescale_ts(self.video_time_base, ost_time_base);
                encoded.write_interleaved(&mut octx)?;
            }
            octx.write_trailer()?;
        }

        self.encoder = None;
        self.scaler = None;
        self.octx = None;
        self.audio_stream_index = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::time_base::TimeBase;

    fn info(w: u32, h: u32, fps: f64) -> StreamInfo {
        StreamInfo {
            width: w,
            height: h,
            fps,
            video_time_base: TimeBase::new(1, 30),
            audio_time_base: TimeBase::new(1, 48_000),
            audio_sample_rate: 0, // video-only for file tests
            audio_channels: 0,
        }
    }

    fn solid_frame(w: u32, h: u32, pts: i64, value: u8) -> VideoFrame {
        VideoFrame::new(vec![value; (w * h * 3) as usize], w, h, 3, pts, pts as u64)
    }

    #[test]
    fn test_write_without_open_returns_error() {
        let mut sink = FfmpegSink::new(64_000, 1);
        assert!(sink.write_video(&solid_frame(160, 120, 0, 128)).is_err());
        assert!(!sink.is_open());
    }

    #[test]
    fn test_file_output_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let url = path.to_str().unwrap().to_string();

        let mut sink = FfmpegSink::new(64_000, 1);
        sink.open(&url, &info(160, 120, 30.0)).unwrap();
        assert!(sink.is_open());
        for i in 0..5 {
            sink.write_video(&solid_frame(160, 120, i, 128)).unwrap();
        }
        sink.close().unwrap();
        assert!(!sink.is_open());

        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);

        // Read back and verify the resolution survived
        ffmpeg_next::init().unwrap();
        let ictx = ffmpeg_next::format::input(&path).unwrap();
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .unwrap();
        let codec_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(stream.parameters()).unwrap();
        let decoder = codec_ctx.decoder().video().unwrap();
        assert_eq!(decoder.width(), 160);
        assert_eq!(decoder.height(), 120);
    }

    #[test]
    fn test_frame_size_change_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");

        let mut sink = FfmpegSink::new(64_000, 1);
        sink.open(path.to_str().unwrap(), &info(160, 120, 30.0)).unwrap();
        assert!(sink.write_video(&solid_frame(320, 240, 0, 128)).is_err());
        let _ = sink.close();
    }

    #[test]
    fn test_close_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");

        let mut sink = FfmpegSink::new(64_000, 1);
        sink.open(path.to_str().unwrap(), &info(160, 120, 30.0)).unwrap();
        sink.write_video(&solid_frame(160, 120, 0, 128)).unwrap();
        sink.close().unwrap();
        let _ = sink.close();
    }

    #[test]
    fn test_reopen_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.mp4");
        let path_b = dir.path().join("b.mp4");

        let mut sink = FfmpegSink::new(64_000, 1);
        sink.open(path_a.to_str().unwrap(), &info(160, 120, 30.0)).unwrap();
        sink.write_video(&solid_frame(160, 120, 0, 128)).unwrap();
        sink.close().unwrap();

        sink.open(path_b.to_str().unwrap(), &info(160, 120, 30.0)).unwrap();
        sink.write_video(&solid_frame(160, 120, 0, 64)).unwrap();
        sink.close().unwrap();

        assert!(path_a.exists());
        assert!(path_b.exists());
    }
}
