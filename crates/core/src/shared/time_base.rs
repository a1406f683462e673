/// A rational time base (`num / den` seconds per PTS tick).
///
/// Domain types carry PTS values plus one of these instead of naming ffmpeg
/// types; the ffmpeg boundary converts to `Rational` on its side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// PTS tick count → seconds.
    pub fn to_seconds(&self, pts: i64) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        pts as f64 * self.num as f64 / self.den as f64
    }

    /// Rescale a PTS from this base into `target`, rounding to nearest.
    pub fn rescale(&self, pts: i64, target: TimeBase) -> i64 {
        if self.den == 0 || target.num == 0 {
            return 0;
        }
        let seconds = self.to_seconds(pts);
        (seconds * target.den as f64 / target.num as f64).round() as i64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        // Microsecond ticks, a safe neutral base
        Self::new(1, 1_000_000)
    }
}
