use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::audio::domain::consent_classifier::ConsentClassifier;
use crate::audio::domain::speech_recognizer::SpeechRecognizer;
use crate::audio::domain::speech_segment::SpeechSegment;
use crate::consent::domain::capture_latch::CaptureLatch;
use crate::pipeline::heartbeat::Heartbeat;

const RECV_TIMEOUT: Duration = Duration::from_millis(200);

/// One member of the speech pool: ASR, then consent classification.
///
/// All members share one segment receiver, so each utterance is handled by
/// exactly one worker. Failures are swallowed — a missing verdict is always
/// safer than a wrong one — and only a positive verdict touches the latch.
pub struct SpeechWorker {
    pub recognizer: Box<dyn SpeechRecognizer>,
    pub classifier: Box<dyn ConsentClassifier>,
    pub latch: Arc<CaptureLatch>,
    pub segment_rx: Receiver<SpeechSegment>,
    pub heartbeat: Arc<Heartbeat>,
    pub stop: Arc<AtomicBool>,
}

impl SpeechWorker {
    pub fn run(mut self) {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            self.heartbeat.beat();

            let segment = match self.segment_rx.recv_timeout(RECV_TIMEOUT) {
                Ok(segment) => segment,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            };

            self.handle_segment(&segment);
        }
        log::debug!("{}: stopped", self.heartbeat.name());
    }

    fn handle_segment(&mut self, segment: &SpeechSegment) {
        let transcript = match self.recognizer.transcribe(segment) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("{}: transcription failed: {e}", self.heartbeat.name());
                return;
            }
        };
        if transcript.is_empty() {
            return;
        }
        log::debug!(
            "{}: heard {:.2}s-{:.2}s: {:?}",
            self.heartbeat.name(),
            transcript.start_time,
            transcript.end_time,
            transcript.text
        );

        let verdict = match self.classifier.classify(&transcript.text) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("{}: classification failed: {e}", self.heartbeat.name());
                return;
            }
        };

        if !verdict.consented {
            return;
        }

        let armed = self.latch.arm(verdict.name.clone());
        if armed {
            log::info!(
                "{}: consent detected (name: {}), capture armed",
                self.heartbeat.name(),
                verdict.name.as_deref().unwrap_or("unknown")
            );
        } else {
            log::debug!(
                "{}: consent detected but a capture is already pending, coalesced",
                self.heartbeat.name()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::domain::transcript::Transcript;
    use crate::consent::domain::verdict::ConsentVerdict;

    struct FixedRecognizer {
        text: &'static str,
        fail: bool,
    }

    impl SpeechRecognizer for FixedRecognizer {
        fn transcribe(
            &mut self,
            segment: &SpeechSegment,
        ) -> Result<Transcript, Box<dyn std::error::Error>> {
            if self.fail {
                return Err("asr failed".into());
            }
            Ok(Transcript {
                text: self.text.to_string(),
                start_time: segment.start_time(),
                end_time: segment.end_time(),
            })
        }
    }

    /// Marks utterances containing "i consent" as positive; name after
    /// "my name is". Fails on demand.
    struct KeywordClassifier {
        fail: bool,
    }

    impl ConsentClassifier for KeywordClassifier {
        fn classify(
            &mut self,
            utterance: &str,
        ) -> Result<ConsentVerdict, Box<dyn std::error::Error>> {
            if self.fail {
                return Err("llm failed".into());
            }
            let lower = utterance.to_lowercase();
            let consented = lower.contains("i consent");
            let name = lower
                .split_once("my name is ")
                .map(|(_, rest)| rest.trim().to_string());
            Ok(ConsentVerdict { consented, name }.normalized())
        }
    }

    fn run_one(text: &'static str, asr_fail: bool, llm_fail: bool) -> Arc<CaptureLatch> {
        let latch = Arc::new(CaptureLatch::new());
        let (_tx, rx) = crossbeam_channel::bounded(1);
        let mut worker = SpeechWorker {
            recognizer: Box::new(FixedRecognizer {
                text,
                fail: asr_fail,
            }),
            classifier: Box::new(KeywordClassifier { fail: llm_fail }),
            latch: latch.clone(),
            segment_rx: rx,
            heartbeat: Heartbeat::new("speech-0"),
            stop: Arc::new(AtomicBool::new(false)),
        };
        let segment = SpeechSegment::new(vec![0.0; 16_000], 1.0, 2.0);
        worker.handle_segment(&segment);
        latch
    }

    #[test]
    fn test_positive_verdict_arms_latch_with_name() {
        let latch = run_one("I consent to be recorded, my name is Alice", false, false);
        assert_eq!(latch.take(), Some(Some("alice".to_string())));
    }

    #[test]
    fn test_positive_verdict_without_name() {
        let latch = run_one("yes I consent", false, false);
        assert_eq!(latch.take(), Some(None));
    }

    #[test]
    fn test_negative_verdict_leaves_latch_alone() {
        let latch = run_one("nice weather today", false, false);
        assert!(!latch.is_armed());
    }

    #[test]
    fn test_asr_failure_produces_no_verdict() {
        let latch = run_one("I consent", true, false);
        assert!(!latch.is_armed());
    }

    #[test]
    fn test_classifier_failure_produces_no_verdict() {
        let latch = run_one("I consent", false, true);
        assert!(!latch.is_armed());
    }

    #[test]
    fn test_pool_shares_one_receiver() {
        // Two workers, one channel: each segment lands on exactly one worker
        let latch = Arc::new(CaptureLatch::new());
        let (tx, rx) = crossbeam_channel::bounded::<SpeechSegment>(8);
        let stop = Arc::new(AtomicBool::new(false));
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        struct CountingRecognizer(Arc<std::sync::atomic::AtomicUsize>);
        impl SpeechRecognizer for CountingRecognizer {
            fn transcribe(
                &mut self,
                segment: &SpeechSegment,
            ) -> Result<Transcript, Box<dyn std::error::Error>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(Transcript {
                    text: String::new(),
                    start_time: segment.start_time(),
                    end_time: segment.end_time(),
                })
            }
        }

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let worker = SpeechWorker {
                    recognizer: Box::new(CountingRecognizer(counter.clone())),
                    classifier: Box::new(KeywordClassifier { fail: false }),
                    latch: latch.clone(),
                    segment_rx: rx.clone(),
                    heartbeat: Heartbeat::new(format!("speech-{i}")),
                    stop: stop.clone(),
                };
                std::thread::spawn(move || worker.run())
            })
            .collect();

        for _ in 0..6 {
            tx.send(SpeechSegment::new(vec![0.0; 16_000], 0.0, 1.0)).unwrap();
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) < 6 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        stop.store(true, Ordering::Relaxed);
        for h in handles {
            h.join().unwrap();
        }

        // Every segment transcribed exactly once across the pool
        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }
}
