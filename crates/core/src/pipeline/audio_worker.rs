use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::audio::infrastructure::opus_transcoder::OpusTranscoder;
use crate::pipeline::heartbeat::Heartbeat;
use crate::pipeline::messages::{send_or_stop, AudioMsg};
use crate::shared::encoded_packet::EncodedPacket;

const RECV_TIMEOUT: Duration = Duration::from_millis(200);

/// The transcoding leg of the audio fan-out: decoded ingress frames in,
/// Opus packets out. A fresh transcoder is built per connection so the
/// ingress-to-egress PTS mapping happens exactly once per stream.
pub struct AudioWorker {
    pub audio_bitrate: usize,
    pub audio_channels: u16,
    pub in_rx: Receiver<AudioMsg>,
    pub out_tx: Sender<EncodedPacket>,
    pub heartbeat: Arc<Heartbeat>,
    pub stop: Arc<AtomicBool>,
}

impl AudioWorker {
    pub fn run(self) {
        let mut transcoder: Option<OpusTranscoder> = None;

        loop {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            self.heartbeat.beat();

            let msg = match self.in_rx.recv_timeout(RECV_TIMEOUT) {
                Ok(msg) => msg,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            };

            match msg {
                AudioMsg::Connected(info) => {
                    if info.audio_sample_rate == 0 {
                        log::warn!("audio: ingress has no audio stream, transcoder idle");
                        transcoder = None;
                        continue;
                    }
                    match OpusTranscoder::new(
                        info.audio_time_base,
                        info.audio_sample_rate,
                        info.audio_channels,
                        self.audio_channels,
                        self.audio_bitrate,
                    ) {
                        Ok(t) => transcoder = Some(t),
                        Err(e) => {
                            log::error!("audio: failed to build transcoder: {e}");
                            transcoder = None;
                        }
                    }
                }
                AudioMsg::Frame(frame) => {
                    let Some(t) = transcoder.as_mut() else {
                        continue;
                    };
                    match t.encode(&frame) {
                        Ok(packets) => {
                            if !self.forward(packets) {
                                break;
                            }
                        }
                        Err(e) => {
                            // Format error: skip this unit, keep the stream alive
                            log::warn!("audio: skipping frame: {e}");
                        }
                    }
                }
                AudioMsg::Disconnected => {
                    if let Some(mut t) = transcoder.take() {
                        match t.finish() {
                            Ok(packets) => {
                                let _ = self.forward(packets);
                            }
                            Err(e) => log::warn!("audio: flush failed: {e}"),
                        }
                    }
                }
            }
        }
        log::debug!("audio: stopped");
    }

    fn forward(&self, packets: Vec<EncodedPacket>) -> bool {
        for packet in packets {
            if !send_or_stop(&self.out_tx, packet, &self.stop) {
                return false;
            }
        }
        true
    }
}
