use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use crate::pipeline::heartbeat::Heartbeat;
use crate::pipeline::messages::VideoMsg;
use crate::shared::encoded_packet::EncodedPacket;
use crate::shared::frame::VideoFrame;
use crate::video::domain::stream_sink::StreamSink;
use crate::video::domain::stream_source::StreamInfo;

const RECV_TIMEOUT: Duration = Duration::from_millis(200);

/// How long the muxer waits for the emptier stream before writing what it
/// has. Keeps cross-stream PTS order without ever stalling on a quiet side.
const CROSS_STREAM_WAIT: Duration = Duration::from_millis(100);

/// Drain window after a write error or disconnect, so in-flight packets from
/// the dying connection don't leak into the next one.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Delay between egress reopen attempts after a write error.
const REOPEN_BACKOFF: Duration = Duration::from_millis(500);

/// Terminal stage: merges the processed-video and encoded-audio edges into
/// the egress publish.
///
/// Cross-stream ordering is by PTS, not arrival: whichever pending unit has
/// the earlier presentation time is written first, with a short timed wait
/// before giving up on an empty side. Within each stream FIFO is preserved
/// by construction.
pub struct MuxWorker {
    pub sink: Box<dyn StreamSink>,
    pub egress_url: String,
    pub video_rx: Receiver<VideoMsg>,
    pub audio_rx: Receiver<EncodedPacket>,
    pub heartbeat: Arc<Heartbeat>,
    pub stop: Arc<AtomicBool>,
}

impl MuxWorker {
    pub fn run(mut self) {
        let mut info: Option<StreamInfo> = None;
        let mut pending_video: Option<VideoFrame> = None;
        let mut pending_audio: Option<EncodedPacket> = None;
        let mut last_open_attempt: Option<Instant> = None;

        loop {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            self.heartbeat.beat();

            // Keep trying to open the egress while a connection is live
            if info.is_some() && !self.sink.is_open() {
                let due = last_open_attempt
                    .map(|t| t.elapsed() >= REOPEN_BACKOFF)
                    .unwrap_or(true);
                if due {
                    last_open_attempt = Some(Instant::now());
                    let stream_info = info.as_ref().unwrap();
                    match self.sink.open(&self.egress_url, stream_info) {
                        Ok(()) => log::info!("mux: egress open at {}", self.egress_url),
                        Err(e) => log::warn!("mux: egress open failed, will retry: {e}"),
                    }
                }
            }

            // Fill both pendings without blocking
            if pending_video.is_none() {
                match self.video_rx.try_recv() {
                    Ok(msg) => {
                        self.on_video_msg(msg, &mut info, &mut pending_video, &mut pending_audio);
                        continue;
                    }
                    Err(crossbeam_channel::TryRecvError::Empty) => {}
                    Err(crossbeam_channel::TryRecvError::Disconnected) => break,
                }
            }
            if pending_audio.is_none() {
                if let Ok(packet) = self.audio_rx.try_recv() {
                    pending_audio = Some(packet);
                }
            }

            if !self.sink.is_open() {
                if info.is_none() {
                    // Between connections: whatever is pending is stale
                    pending_video = None;
                    pending_audio = None;
                    match self.video_rx.recv_timeout(RECV_TIMEOUT) {
                        Ok(msg) => {
                            self.on_video_msg(msg, &mut info, &mut pending_video, &mut pending_audio)
                        }
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    }
                } else {
                    // Open is failing; don't spin
                    std::thread::sleep(Duration::from_millis(50));
                }
                continue;
            }

            let wrote = if pending_video.is_some() && pending_audio.is_some() {
                let video_secs = match (&info, &pending_video) {
                    (Some(i), Some(frame)) => i.video_time_base.to_seconds(frame.pts()),
                    _ => 0.0,
                };
                let audio_secs = pending_audio.as_ref().map(|p| p.pts_seconds()).unwrap_or(0.0);
                if video_secs <= audio_secs {
                    let frame = pending_video.take().unwrap();
                    self.write_video(frame, &mut info, &mut pending_video, &mut pending_audio)
                } else {
                    let packet = pending_audio.take().unwrap();
                    self.write_audio(packet, &mut info, &mut pending_video, &mut pending_audio)
                }
            } else if pending_video.is_some() {
                let no_audio_stream = info
                    .as_ref()
                    .map(|i| i.audio_sample_rate == 0)
                    .unwrap_or(true);
                if no_audio_stream {
                    // Video-only ingress: nothing to wait for
                    let frame = pending_video.take().unwrap();
                    self.write_video(frame, &mut info, &mut pending_video, &mut pending_audio)
                } else {
                    // Give the audio side a short chance to catch up
                    match self.audio_rx.recv_timeout(CROSS_STREAM_WAIT) {
                        Ok(packet) => {
                            pending_audio = Some(packet);
                            true
                        }
                        Err(_) => {
                            let frame = pending_video.take().unwrap();
                            self.write_video(frame, &mut info, &mut pending_video, &mut pending_audio)
                        }
                    }
                }
            } else if pending_audio.is_some() {
                match self.video_rx.recv_timeout(CROSS_STREAM_WAIT) {
                    Ok(msg) => {
                        self.on_video_msg(msg, &mut info, &mut pending_video, &mut pending_audio);
                        true
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                        let packet = pending_audio.take().unwrap();
                        self.write_audio(packet, &mut info, &mut pending_video, &mut pending_audio)
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match self.video_rx.recv_timeout(RECV_TIMEOUT) {
                    Ok(msg) => {
                        self.on_video_msg(msg, &mut info, &mut pending_video, &mut pending_audio);
                        true
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => true,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            };

            if !wrote {
                // Write error already handled (sink closed + drained); the
                // open-retry at the top of the loop takes it from here
                last_open_attempt = None;
            }
        }

        if let Err(e) = self.sink.close() {
            log::warn!("mux: close failed: {e}");
        }
        log::debug!("mux: stopped");
    }

    fn on_video_msg(
        &mut self,
        msg: VideoMsg,
        info: &mut Option<StreamInfo>,
        pending_video: &mut Option<VideoFrame>,
        pending_audio: &mut Option<EncodedPacket>,
    ) {
        match msg {
            VideoMsg::Connected(new_info) => {
                if self.sink.is_open() {
                    let _ = self.sink.close();
                }
                *pending_video = None;
                *pending_audio = None;
                *info = Some(*new_info);
            }
            VideoMsg::Frame(frame) => {
                *pending_video = Some(frame);
            }
            VideoMsg::Disconnected => {
                // Let straggling audio out, then stop publishing
                self.drain_audio_writing();
                if let Err(e) = self.sink.close() {
                    log::warn!("mux: close on disconnect failed: {e}");
                }
                *pending_video = None;
                *pending_audio = None;
                *info = None;
                log::info!("mux: egress closed (ingress disconnected)");
            }
        }
    }

    fn write_video(
        &mut self,
        frame: VideoFrame,
        info: &mut Option<StreamInfo>,
        pending_video: &mut Option<VideoFrame>,
        pending_audio: &mut Option<EncodedPacket>,
    ) -> bool {
        if let Err(e) = self.sink.write_video(&frame) {
            log::error!("mux: video write failed: {e}");
            self.recover(info, pending_video, pending_audio);
            return false;
        }
        true
    }

    fn write_audio(
        &mut self,
        packet: EncodedPacket,
        info: &mut Option<StreamInfo>,
        pending_video: &mut Option<VideoFrame>,
        pending_audio: &mut Option<EncodedPacket>,
    ) -> bool {
        if let Err(e) = self.sink.write_audio(&packet) {
            log::error!("mux: audio write failed: {e}");
            self.recover(info, pending_video, pending_audio);
            return false;
        }
        true
    }

    /// Write error path: close, drain both edges for a grace period so
    /// upstream stages unblock, then let the reopen retry take over.
    fn recover(
        &mut self,
        info: &mut Option<StreamInfo>,
        pending_video: &mut Option<VideoFrame>,
        pending_audio: &mut Option<EncodedPacket>,
    ) {
        let _ = self.sink.close();
        *pending_video = None;
        *pending_audio = None;

        let deadline = Instant::now() + DRAIN_GRACE;
        while Instant::now() < deadline {
            let mut idle = true;
            if let Ok(msg) = self.video_rx.try_recv() {
                idle = false;
                if let VideoMsg::Connected(new_info) = msg {
                    *info = Some(*new_info);
                } else if let VideoMsg::Disconnected = msg {
                    *info = None;
                }
            }
            if self.audio_rx.try_recv().is_ok() {
                idle = false;
            }
            if idle {
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }

    /// On ingress disconnect, flush whatever audio the transcoder already
    /// emitted for this connection.
    fn drain_audio_writing(&mut self) {
        let deadline = Instant::now() + DRAIN_GRACE;
        while Instant::now() < deadline {
            match self.audio_rx.try_recv() {
                Ok(packet) => {
                    if self.sink.is_open() {
                        if let Err(e) = self.sink.write_audio(&packet) {
                            log::warn!("mux: tail audio write failed: {e}");
                            return;
                        }
                    }
                }
                Err(_) => return,
            }
        }
    }
}
