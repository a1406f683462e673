use parking_lot::Mutex;

/// One-shot signal from the speech workers to the video worker.
///
/// A positive consent verdict arms the latch with the normalized name (or
/// `None` for an unnamed consent); the video worker consumes it on the very
/// next frame it processes. Arming while a request is already pending
/// coalesces — the first name wins and later ones are dropped.
#[derive(Debug, Default)]
pub struct CaptureLatch {
    pending: Mutex<Option<Option<String>>>,
}

impl CaptureLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the latch. Returns `true` if this call armed it, `false` if a
    /// request was already pending (the new one is coalesced away).
    pub fn arm(&self, name: Option<String>) -> bool {
        let mut slot = self.pending.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(name);
        true
    }

    /// Consume the pending request, clearing the latch. Exactly one caller
    /// observes each arming event.
    pub fn take(&self) -> Option<Option<String>> {
        self.pending.lock().take()
    }

    pub fn is_armed(&self) -> bool {
        self.pending.lock().is_some()
    }
}
