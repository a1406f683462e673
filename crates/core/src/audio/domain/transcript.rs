/// Recognized text for one speech segment, carrying the segment's position
/// on the stream clock.
#[derive(Clone, Debug, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
}

impl Transcript {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
