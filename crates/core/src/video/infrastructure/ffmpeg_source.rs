use std::collections::VecDeque;
use std::path::Path;

use crate::shared::audio_frame::AudioFrame;
use crate::shared::frame::VideoFrame;
use crate::shared::time_base::TimeBase;
use crate::video::domain::stream_source::{MediaEvent, StreamInfo, StreamSource};

/// Ingress demuxer + decoders via ffmpeg-next (libavformat + libavcodec).
///
/// Opens the ingress URL in listen mode — the external media server connects
/// and publishes to us — with a ~1 s accept window per attempt so the demux
/// worker can interleave retries with heartbeats and stop checks. Video
/// decodes to RGB24 through swscale; audio decodes to interleaved f32 at the
/// native rate through swresample. PTS pass through untouched.
pub struct FfmpegSource {
    input_ctx: Option<ffmpeg_next::format::context::Input>,
    video_stream_index: usize,
    audio_stream_index: Option<usize>,
    video_decoder: Option<ffmpeg_next::decoder::Video>,
    audio_decoder: Option<ffmpeg_next::decoder::Audio>,
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    resampler: Option<ffmpeg_next::software::resampling::Context>,
    width: u32,
    height: u32,
    audio_rate: u32,
    audio_channels: u16,
    queued: VecDeque<MediaEvent>,
    seq: u64,
    last_video_pts: i64,
    last_audio_pts: i64,
    flushing: bool,
}

// Safety: FfmpegSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegSource {}

/// Seconds ffmpeg waits for the publisher before an open attempt fails.
const LISTEN_TIMEOUT_SECS: &str = "1";

impl FfmpegSource {
    pub fn new() -> Self {
        Self {
            input_ctx: None,
            video_stream_index: 0,
            audio_stream_index: None,
            video_decoder: None,
            audio_decoder: None,
            scaler: None,
            resampler: None,
            width: 0,
            height: 0,
            audio_rate: 0,
            audio_channels: 0,
            queued: VecDeque::new(),
            seq: 0,
            last_video_pts: -1,
            last_audio_pts: -1,
            flushing: false,
        }
    }

    fn decode_video_packet(
        &mut self,
        packet: Option<&ffmpeg_next::Packet>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let decoder = self.video_decoder.as_mut().ok_or("no video decoder")?;
        let scaler = self.scaler.as_mut().ok_or("no scaler")?;

        match packet {
            Some(p) => decoder.send_packet(p)?,
            None => decoder.send_eof()?,
        }

        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        while decoder.receive_frame(&mut decoded).is_ok() {
            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
            scaler.run(&decoded, &mut rgb_frame)?;

            let stride = rgb_frame.stride(0);
            let data = rgb_frame.data(0);
            let width = self.width as usize;
            let height = self.height as usize;

            let mut pixels = Vec::with_capacity(width * height * 3);
            for row in 0..height {
                let row_start = row * stride;
                pixels.extend_from_slice(&data[row_start..row_start + width * 3]);
            }

            let pts = decoded.pts().unwrap_or(self.last_video_pts + 1);
            self.last_video_pts = pts;
            let frame = VideoFrame::new(pixels, self.width, self.height, 3, pts, self.seq);
            self.seq += 1;
            self.queued.push_back(MediaEvent::Video(frame));
        }
        Ok(())
    }

    fn decode_audio_packet(
        &mut self,
        packet: Option<&ffmpeg_next::Packet>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let Some(decoder) = self.audio_decoder.as_mut() else {
            return Ok(());
        };
        let resampler = self.resampler.as_mut().ok_or("no resampler")?;

        match packet {
            Some(p) => decoder.send_packet(p)?,
            None => decoder.send_eof()?,
        }

        let mut decoded = ffmpeg_next::util::frame::audio::Audio::empty();
        let mut converted = ffmpeg_next::util::frame::audio::Audio::empty();
        while decoder.receive_frame(&mut decoded).is_ok() {
            resampler.run(&decoded, &mut converted)?;

            let count = converted.samples() * self.audio_channels as usize;
            if count == 0 {
                continue;
            }
            let data = converted.data(0);
            let samples =
                unsafe { std::slice::from_raw_parts(data.as_ptr() as *const f32, count) };

            let pts = decoded.pts().unwrap_or(self.last_audio_pts + 1);
            self.last_audio_pts = pts;
            self.queued.push_back(MediaEvent::Audio(AudioFrame::new(
                samples.to_vec(),
                self.audio_rate,
                self.audio_channels,
                pts,
            )));
        }
        Ok(())
    }
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSource for FfmpegSource {
    fn open(&mut self, url: &str) -> Result<StreamInfo, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        self.close();

        let mut options = ffmpeg_next::Dictionary::new();
        options.set("listen", "1");
        options.set("timeout", LISTEN_TIMEOUT_SECS);

        let ictx = ffmpeg_next::format::input_with_dictionary(&Path::new(url), options)?;

        let video_stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("no video stream in ingress")?;
        let video_stream_index = video_stream.index();
        let video_time_base = video_stream.time_base();

        let rate = video_stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let codec_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())?;
        let video_decoder = codec_ctx.decoder().video()?;
        let width = video_decoder.width();
        let height = video_decoder.height();

        let scaler = ffmpeg_next::software::scaling::Context::get(
            video_decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        let audio_stream = ictx.streams().best(ffmpeg_next::media::Type::Audio);
        let (audio_stream_index, audio_time_base, audio_decoder, resampler, audio_rate, audio_channels) =
            match audio_stream {
                Some(stream) => {
                    let index = stream.index();
                    let time_base = stream.time_base();
                    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(
                        stream.parameters(),
                    )?;
                    let decoder = codec_ctx.decoder().audio()?;
                    let rate = decoder.rate();
                    let channels = decoder.channels() as u16;
                    let resampler = ffmpeg_next::software::resampling::Context::get(
                        decoder.format(),
                        decoder.channel_layout(),
                        rate,
                        ffmpeg_next::format::Sample::F32(
                            ffmpeg_next::format::sample::Type::Packed,
                        ),
                        decoder.channel_layout(),
                        rate,
                    )?;
                    (
                        Some(index),
                        TimeBase::new(time_base.numerator(), time_base.denominator()),
                        Some(decoder),
                        Some(resampler),
                        rate,
                        channels,
                    )
                }
                None => (None, TimeBase::default(), None, None, 0, 0),
            };

        let info = StreamInfo {
            width,
            height,
            fps,
            video_time_base: TimeBase::new(
                video_time_base.numerator(),
                video_time_base.denominator(),
            ),
            audio_time_base,
            audio_sample_rate: audio_rate,
            audio_channels,
        };

        self.video_stream_index = video_stream_index;
        self.audio_stream_index = audio_stream_index;
        self.video_decoder = Some(video_decoder);
        self.audio_decoder = audio_decoder;
        self.scaler = Some(scaler);
        self.resampler = resampler;
        self.width = width;
        self.height = height;
        self.audio_rate = audio_rate;
        self.audio_channels = audio_channels;
        self.input_ctx = Some(ictx);
        self.seq = 0;
        self.last_video_pts = -1;
        self.last_audio_pts = -1;
        self.flushing = false;

        Ok(info)
    }

    fn read(&mut self) -> Result<Option<MediaEvent>, Box<dyn std::error::Error>> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Ok(Some(event));
            }
            if self.flushing {
                return Ok(None);
            }
            if self.input_ctx.is_none() {
                return Err("source is not open".into());
            }

            let next = {
                let ictx = self.input_ctx.as_mut().unwrap();
                ictx.packets().next().map(|(stream, packet)| (stream.index(), packet))
            };

            match next {
                Some((index, packet)) if index == self.video_stream_index => {
                    self.decode_video_packet(Some(&packet))?;
                }
                Some((index, packet)) if Some(index) == self.audio_stream_index => {
                    self.decode_audio_packet(Some(&packet))?;
                }
                Some(_) => {}
                None => {
                    // Publisher hung up: flush both decoders, then EOF
                    self.flushing = true;
                    self.decode_video_packet(None)?;
                    self.decode_audio_packet(None)?;
                }
            }
        }
    }

    fn close(&mut self) {
        self.input_ctx = None;
        self.video_decoder = None;
        self.audio_decoder = None;
        self.scaler = None;
        self.resampler = None;
        self.queued.clear();
        self.flushing = false;
    }
}
