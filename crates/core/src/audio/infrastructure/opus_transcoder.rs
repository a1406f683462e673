use crate::shared::audio_frame::AudioFrame;
use crate::shared::constants::OPUS_SAMPLE_RATE;
use crate::shared::encoded_packet::{EncodedPacket, StreamKind};
use crate::shared::time_base::TimeBase;

/// Re-encodes decoded ingress audio to Opus for the egress mux.
///
/// Does nothing beyond format conversion: swresample to 48 kHz (the only
/// rate Opus encodes), FIFO up to the encoder frame size, encode, stamp PTS.
/// The ingress-to-egress PTS mapping happens exactly once, on the first
/// frame after construction or `reset`; from there PTS advances by encoded
/// sample count so the egress stream stays gapless.
pub struct OpusTranscoder {
    encoder: ffmpeg_next::codec::encoder::audio::Encoder,
    resampler: ffmpeg_next::software::resampling::Context,
    input_time_base: TimeBase,
    input_rate: u32,
    input_channels: u16,
    out_channels: u16,
    frame_size: usize,
    fifo: Vec<f32>,
    next_pts: Option<i64>,
}

// Safety: OpusTranscoder is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for OpusTranscoder {}

/// The egress audio time base: one tick per 48 kHz sample.
pub const OPUS_TIME_BASE: TimeBase = TimeBase::new(1, OPUS_SAMPLE_RATE as i32);

impl OpusTranscoder {
    pub fn new(
        input_time_base: TimeBase,
        input_rate: u32,
        input_channels: u16,
        out_channels: u16,
        bitrate: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let codec = ffmpeg_next::encoder::find_by_name("libopus")
            .or_else(|| ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::OPUS))
            .ok_or("Opus encoder not found")?;

        let out_layout = channel_layout(out_channels)?;

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()?;
        encoder_ctx.set_rate(OPUS_SAMPLE_RATE as i32);
        encoder_ctx.set_channel_layout(out_layout);
        encoder_ctx.set_format(ffmpeg_next::format::Sample::F32(
            ffmpeg_next::format::sample::Type::Packed,
        ));
        encoder_ctx.set_bit_rate(bitrate);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, OPUS_SAMPLE_RATE as i32));

        let encoder = encoder_ctx.open_as(codec)?;

        let frame_size = match encoder.frame_size() as usize {
            0 => 960, // 20 ms at 48 kHz
            n => n,
        };

        let resampler = ffmpeg_next::software::resampling::Context::get(
            ffmpeg_next::format::Sample::F32(ffmpeg_next::format::sample::Type::Packed),
            channel_layout(input_channels)?,
            input_rate,
            ffmpeg_next::format::Sample::F32(ffmpeg_next::format::sample::Type::Packed),
            out_layout,
            OPUS_SAMPLE_RATE,
        )?;

        Ok(Self {
            encoder,
            resampler,
            input_time_base,
            input_rate,
            input_channels,
            out_channels,
            frame_size,
            fifo: Vec::new(),
            next_pts: None,
        })
    }

    pub fn out_channels(&self) -> u16 {
        self.out_channels
    }

    /// Encode one decoded frame; returns zero or more Opus packets.
    pub fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<EncodedPacket>, Box<dyn std::error::Error>> {
        if frame.sample_rate() != self.input_rate || frame.channels() != self.input_channels {
            return Err(format!(
                "audio format changed mid-stream: {} Hz x{} (expected {} Hz x{})",
                frame.sample_rate(),
                frame.channels(),
                self.input_rate,
                self.input_channels
            )
            .into());
        }

        if self.next_pts.is_none() {
            self.next_pts = Some(self.input_time_base.rescale(frame.pts(), OPUS_TIME_BASE));
        }

        self.resample_into_fifo(frame)?;
        self.drain_fifo()
    }

    /// Flush buffered samples and the encoder (stream end).
    pub fn finish(&mut self) -> Result<Vec<EncodedPacket>, Box<dyn std::error::Error>> {
        // Pad the tail to a full encoder frame
        let needed = self.frame_size * self.out_channels as usize;
        if !self.fifo.is_empty() {
            self.fifo.resize(needed, 0.0);
        }
        let mut packets = self.drain_fifo()?;

        self.encoder.send_eof()?;
        self.receive_packets(&mut packets)?;
        Ok(packets)
    }

    /// Drop buffered state and re-arm the PTS base mapping (reconnect).
    pub fn reset(&mut self) {
        self.fifo.clear();
        self.next_pts = None;
    }

    fn resample_into_fifo(&mut self, frame: &AudioFrame) -> Result<(), Box<dyn std::error::Error>> {
        let in_count = frame.frame_count();
        if in_count == 0 {
            return Ok(());
        }

        let mut in_frame = ffmpeg_next::util::frame::audio::Audio::new(
            ffmpeg_next::format::Sample::F32(ffmpeg_next::format::sample::Type::Packed),
            in_count,
            channel_layout(self.input_channels)?,
        );
        in_frame.set_rate(self.input_rate);
        {
            let src = frame.samples();
            let dst = in_frame.data_mut(0);
            let src_bytes = unsafe {
                std::slice::from_raw_parts(src.as_ptr() as *const u8, src.len() * 4)
            };
            dst[..src_bytes.len()].copy_from_slice(src_bytes);
        }

        let mut out_frame = ffmpeg_next::util::frame::audio::Audio::empty();
        self.resampler.run(&in_frame, &mut out_frame)?;
        self.extend_fifo(&out_frame);
        Ok(())
    }

    fn extend_fifo(&mut self, out_frame: &ffmpeg_next::util::frame::audio::Audio) {
        let samples = out_frame.samples();
        if samples == 0 {
            return;
        }
        let values = samples * self.out_channels as usize;
        let data = out_frame.data(0);
        let floats =
            unsafe { std::slice::from_raw_parts(data.as_ptr() as *const f32, values) };
        self.fifo.extend_from_slice(floats);
    }

    fn drain_fifo(&mut self) -> Result<Vec<EncodedPacket>, Box<dyn std::error::Error>> {
        let mut packets = Vec::new();
        let chunk_values = self.frame_size * self.out_channels as usize;

        while self.fifo.len() >= chunk_values {
            let chunk: Vec<f32> = self.fifo.drain(..chunk_values).collect();

            let mut enc_frame = ffmpeg_next::util::frame::audio::Audio::new(
                ffmpeg_next::format::Sample::F32(ffmpeg_next::format::sample::Type::Packed),
                self.frame_size,
                channel_layout(self.out_channels)?,
            );
            enc_frame.set_rate(OPUS_SAMPLE_RATE);
            let pts = self.next_pts.unwrap_or(0);
            enc_frame.set_pts(Some(pts));
            {
                let dst = enc_frame.data_mut(0);
                let src_bytes = unsafe {
                    std::slice::from_raw_parts(chunk.as_ptr() as *const u8, chunk.len() * 4)
                };
                dst[..src_bytes.len()].copy_from_slice(src_bytes);
            }

            self.encoder.send_frame(&enc_frame)?;
            self.next_pts = Some(pts + self.frame_size as i64);
            self.receive_packets(&mut packets)?;
        }

        Ok(packets)
    }

    fn receive_packets(&mut self, out: &mut Vec<EncodedPacket>) -> Result<(), Box<dyn std::error::Error>> {
        let mut encoded = ffmpeg_next::Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            let data = encoded.data().map(|d| d.to_vec()).unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            out.push(EncodedPacket {
                kind: StreamKind::Audio,
                pts: encoded.pts().unwrap_or_else(|| self.next_pts.unwrap_or(0)),
                time_base: OPUS_TIME_BASE,
                data,
                key: encoded.is_key(),
            });
        }
        Ok(())
    }
}

fn channel_layout(channels: u16) -> Result<ffmpeg_next::ChannelLayout, Box<dyn std::error::Error>> {
    match channels {
        1 => Ok(ffmpeg_next::ChannelLayout::MONO),
        2 => Ok(ffmpeg_next::ChannelLayout::STEREO),
        n => Err(format!("unsupported channel count: {n}").into()),
    }
}
