use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::audio::domain::speech_segment::SpeechSegment;
use crate::audio::domain::speech_segmenter::SpeechSegmenter;
use crate::pipeline::heartbeat::Heartbeat;
use crate::pipeline::messages::{send_drop_oldest, AudioMsg};

const RECV_TIMEOUT: Duration = Duration::from_millis(200);

/// The voice-activity leg of the audio fan-out.
///
/// Never blocks on the speech workers: closed segments go out with
/// drop-oldest semantics, so a slow ASR pool costs old utterances, not
/// real-time audio ingestion.
pub struct VadWorker {
    pub segmenter: SpeechSegmenter,
    pub in_rx: Receiver<AudioMsg>,
    pub segment_tx: Sender<SpeechSegment>,
    /// Receiver clone of the segment channel, used only to pop the head
    /// when the channel is full.
    pub segment_rx: Receiver<SpeechSegment>,
    pub heartbeat: Arc<Heartbeat>,
    pub stop: Arc<AtomicBool>,
}

impl VadWorker {
    pub fn run(mut self) {
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
                AudioMsg::Connected(_) => {
                    self.segmenter.reset();
                }
                AudioMsg::Frame(frame) => {
                    for segment in self.segmenter.push(&frame) {
                        self.emit(segment);
                    }
                }
                AudioMsg::Disconnected => {
                    if let Some(segment) = self.segmenter.flush() {
                        self.emit(segment);
                    }
                    self.segmenter.reset();
                }
            }
        }
        log::debug!("vad: stopped");
    }

    fn emit(&self, segment: SpeechSegment) {
        log::debug!(
            "vad: utterance {:.2}s-{:.2}s ({:.2}s)",
            segment.start_time(),
            segment.end_time(),
            segment.duration()
        );
        let dropped = send_drop_oldest(&self.segment_tx, &self.segment_rx, segment);
        if dropped > 0 {
            log::warn!("vad: speech workers behind, dropped {dropped} queued segment(s)");
        }
    }
}
