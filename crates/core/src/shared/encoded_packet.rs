use crate::shared::time_base::TimeBase;

/// Which output stream a packet belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

/// A compressed packet bound for the output muxer.
///
/// `pts` is already in the producer's declared `time_base` (the egress base
/// for audio); the muxer rescales into its own stream base at write time.
#[derive(Clone, Debug)]
pub struct EncodedPacket {
    pub kind: StreamKind,
    pub pts: i64,
    pub time_base: TimeBase,
    pub data: Vec<u8>,
    pub key: bool,
}

impl EncodedPacket {
    pub fn pts_seconds(&self) -> f64 {
        self.time_base.to_seconds(self.pts)
    }
}
