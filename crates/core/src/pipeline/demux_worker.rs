use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::pipeline::heartbeat::Heartbeat;
use crate::pipeline::messages::{send_or_stop, AudioMsg, VideoMsg};
use crate::video::domain::stream_source::{MediaEvent, StreamSource};

/// Delay between failed connect attempts. The per-attempt listen timeout is
/// short, so retry cadence stays close to one attempt per second.
const RECONNECT_BACKOFF: Duration = Duration::from_millis(500);

/// Ingress worker: connect, decode, fan out, reconnect forever.
///
/// Decoded video goes to the video edge; each decoded audio frame is cloned
/// onto the transcoder and VAD edges so both consumers see the same sequence.
/// Connection markers bracket every session so downstream stages can reset
/// their per-connection state, and no stale media crosses a reconnect.
pub struct DemuxWorker {
    pub source: Box<dyn StreamSource>,
    pub ingress_url: String,
    pub video_tx: Sender<VideoMsg>,
    pub audio_tx: Sender<AudioMsg>,
    pub vad_tx: Sender<AudioMsg>,
    pub heartbeat: Arc<Heartbeat>,
    pub stop: Arc<AtomicBool>,
}

impl DemuxWorker {
    pub fn run(mut self) {
        log::info!("demux: waiting for publisher at {}", self.ingress_url);

        while !self.stop.load(Ordering::Relaxed) {
            self.heartbeat.beat();

            let info = match self.source.open(&self.ingress_url) {
                Ok(info) => info,
                Err(e) => {
                    log::debug!("demux: connect attempt failed: {e}");
                    self.sleep_with_heartbeat(RECONNECT_BACKOFF);
                    continue;
                }
            };

            log::info!(
                "demux: publisher connected ({}x{} @ {:.1} fps, audio {} Hz x{})",
                info.width,
                info.height,
                info.fps,
                info.audio_sample_rate,
                info.audio_channels
            );

            let boxed = Box::new(info);
            if !send_or_stop(&self.video_tx, VideoMsg::Connected(boxed.clone()), &self.stop)
                || !send_or_stop(&self.audio_tx, AudioMsg::Connected(boxed.clone()), &self.stop)
                || !send_or_stop(&self.vad_tx, AudioMsg::Connected(boxed), &self.stop)
            {
                break;
            }

            self.stream_until_eof();

            self.source.close();
            // Markers flush stale per-connection state downstream
            let _ = send_or_stop(&self.video_tx, VideoMsg::Disconnected, &self.stop);
            let _ = send_or_stop(&self.audio_tx, AudioMsg::Disconnected, &self.stop);
            let _ = send_or_stop(&self.vad_tx, AudioMsg::Disconnected, &self.stop);
            log::info!("demux: publisher disconnected");
        }

        self.source.close();
        log::debug!("demux: stopped");
    }

    fn stream_until_eof(&mut self) {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return;
            }
            self.heartbeat.beat();

            match self.source.read() {
                Ok(Some(MediaEvent::Video(frame))) => {
                    if !send_or_stop(&self.video_tx, VideoMsg::Frame(frame), &self.stop) {
                        return;
                    }
                }
                Ok(Some(MediaEvent::Audio(frame))) => {
                    // Fan-out: independent copies, same order on both edges
                    if !send_or_stop(&self.audio_tx, AudioMsg::Frame(frame.clone()), &self.stop) {
                        return;
                    }
                    if !send_or_stop(&self.vad_tx, AudioMsg::Frame(frame), &self.stop) {
                        return;
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    log::warn!("demux: stream error, reconnecting: {e}");
                    return;
                }
            }
        }
    }

    fn sleep_with_heartbeat(&self, total: Duration) {
        let slice = Duration::from_millis(100);
        let mut remaining = total;
        while remaining > Duration::ZERO && !self.stop.load(Ordering::Relaxed) {
            self.heartbeat.beat();
            let nap = remaining.min(slice);
            std::thread::sleep(nap);
            remaining -= nap;
        }
    }
}
