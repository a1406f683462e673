use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender};

use crate::shared::audio_frame::AudioFrame;
use crate::shared::frame::VideoFrame;
use crate::video::domain::stream_source::StreamInfo;

/// Messages on the decoded-video edges. Connection markers travel in-band so
/// every stage observes connect/disconnect in stream order relative to the
/// frames around them.
pub enum VideoMsg {
    Connected(Box<StreamInfo>),
    Frame(VideoFrame),
    Disconnected,
}

/// Messages on the decoded-audio edges (transcoder and VAD fan-out legs).
pub enum AudioMsg {
    Connected(Box<StreamInfo>),
    Frame(AudioFrame),
    Disconnected,
}

/// Blocking bounded send that stays responsive to the stop flag.
///
/// Returns `false` when the pipeline is stopping or the consumer is gone —
/// callers treat both as "stop producing".
pub fn send_or_stop<T>(tx: &Sender<T>, mut value: T, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        match tx.send_timeout(value, Duration::from_millis(100)) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(v)) => value = v,
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// Drop-oldest send: never blocks the producer. When the channel is full the
/// oldest queued item is discarded to make room. Requires a receiver clone of
/// the same channel. Returns the number of items dropped (0 or 1).
pub fn send_drop_oldest<T>(tx: &Sender<T>, rx: &Receiver<T>, value: T) -> usize {
    match tx.try_send(value) {
        Ok(()) => 0,
        Err(crossbeam_channel::TrySendError::Full(value)) => {
            let dropped = usize::from(rx.try_recv().is_ok());
            // A consumer may have raced us and made room; if the channel
            // filled again instead, give up on this item rather than block.
            match tx.try_send(value) {
                Ok(()) => dropped,
                Err(_) => dropped + 1,
            }
        }
        Err(crossbeam_channel::TrySendError::Disconnected(_)) => 0,
    }
}
