use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::blurring::domain::frame_blurrer::FrameBlurrer;
use crate::blurring::infrastructure::label_renderer;
use crate::consent::domain::capture_latch::CaptureLatch;
use crate::consent::domain::registry::ConsentRegistry;
use crate::consent::infrastructure::capture_writer;
use crate::detection::domain::face_detection::FaceDetection;
use crate::detection::domain::face_detector::FaceDetector;
use crate::pipeline::heartbeat::Heartbeat;
use crate::pipeline::messages::{send_or_stop, VideoMsg};
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::head_crop::head_crop;
use crate::shared::frame::VideoFrame;

const RECV_TIMEOUT: Duration = Duration::from_millis(200);

const LABEL_SCALE: usize = 2;

/// The video path: detect, recognize, blur, label, forward.
///
/// The privacy guarantee lives here. Every face that does not match a
/// consented embedding is blurred; a frame whose detection fails outright is
/// blurred whole before it is forwarded. Frames leave in arrival order with
/// their ingress PTS untouched.
pub struct VideoWorker {
    pub detector: Box<dyn FaceDetector>,
    pub embedder: Arc<dyn FaceEmbedder>,
    pub blurrer: Box<dyn FrameBlurrer>,
    pub registry: Arc<ConsentRegistry>,
    pub latch: Arc<CaptureLatch>,
    pub capture_dir: PathBuf,
    pub match_threshold: f64,
    pub recognition_confidence: f64,
    pub in_rx: Receiver<VideoMsg>,
    pub out_tx: Sender<VideoMsg>,
    pub heartbeat: Arc<Heartbeat>,
    pub stop: Arc<AtomicBool>,
}

impl VideoWorker {
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
                VideoMsg::Frame(frame) => {
                    let composed = self.process_frame(frame);
                    if !send_or_stop(&self.out_tx, VideoMsg::Frame(composed), &self.stop) {
                        break;
                    }
                }
                passthrough => {
                    if !send_or_stop(&self.out_tx, passthrough, &self.stop) {
                        break;
                    }
                }
            }
        }
        log::debug!("video: stopped");
    }

    fn process_frame(&mut self, mut frame: VideoFrame) -> VideoFrame {
        let capture_request = self.latch.take();

        let detections = match self.detector.detect(&frame) {
            Ok(detections) => detections,
            Err(e) => {
                // Fail closed: consent status unknowable, nothing may pass
                log::warn!("video: detection failed, blurring full frame: {e}");
                if let Err(e) = self.blurrer.blur_full_frame(&mut frame) {
                    log::error!("video: full-frame blur failed: {e}");
                }
                return frame;
            }
        };

        // One embedding per confident detection, then one registry snapshot
        // for the whole frame
        let embeddings: Vec<_> = detections
            .iter()
            .map(|det| {
                if det.confidence < self.recognition_confidence {
                    return None;
                }
                let (crop, w, h) = head_crop(&frame, det)?;
                match self.embedder.embed(&crop, w, h) {
                    Ok(embedding) => Some(embedding),
                    Err(e) => {
                        log::warn!("video: embedding failed, treating face as unknown: {e}");
                        None
                    }
                }
            })
            .collect();
        let names = self.registry.match_all(&embeddings, self.match_threshold);

        if let Some(requested_name) = capture_request {
            self.save_capture(&frame, &detections, requested_name.as_deref());
        }

        // Blur everything unmatched, label everything matched
        let blur_targets: Vec<FaceDetection> = detections
            .iter()
            .zip(names.iter())
            .filter(|(_, name)| name.is_none())
            .map(|(det, _)| det.clone())
            .collect();
        if let Err(e) = self.blurrer.blur_regions(&mut frame, &blur_targets) {
            log::error!("video: region blur failed, blurring full frame: {e}");
            if let Err(e) = self.blurrer.blur_full_frame(&mut frame) {
                log::error!("video: full-frame blur failed: {e}");
            }
            return frame;
        }

        for (det, name) in detections.iter().zip(names.iter()) {
            if let Some(name) = name {
                label_renderer::draw_label(&mut frame, det.x, det.y, name, LABEL_SCALE);
            }
        }

        frame
    }

    /// Write the consent capture for the largest detected face. A request
    /// arriving on a faceless frame is discarded; the next utterance can
    /// re-arm the latch.
    fn save_capture(
        &self,
        frame: &VideoFrame,
        detections: &[FaceDetection],
        name: Option<&str>,
    ) {
        let Some(largest) = FaceDetection::largest(detections) else {
            log::info!("video: consent capture requested but no face visible, discarding");
            return;
        };
        let Some((crop, w, h)) = head_crop(frame, largest) else {
            log::warn!("video: capture face lies outside the frame, discarding");
            return;
        };
        match capture_writer::write_capture(&self.capture_dir, name, &crop, w, h) {
            Ok(path) => {
                log::info!("video: consent capture written: {}", path.display());
            }
            Err(e) => {
                // Capture failure never stalls the video path; the latch
                // stays cleared so the next utterance can retry
                log::error!("video: failed to write consent capture: {e}");
            }
        }
    }
}
