// Song-position clock. The audio source reports positions at its own cadence;
// between reports we interpolate against a monotonic instant so every frame
// sees a smooth, strictly usable time.

use log::debug;
use std::time::Instant;

/// A reported position further than this from the prediction is treated as a
/// discontinuity and re-anchors the clock instead of being smoothed over.
const RESNAP_THRESHOLD_MS: f64 = 150.0;

pub struct SongClock {
    anchor_ms: f64,
    anchor_at: Instant,
    rate: f64,
    playing: bool,
}

impl SongClock {
    pub fn new(rate: f64) -> Self {
        Self {
            anchor_ms: 0.0,
            anchor_at: Instant::now(),
            rate: if rate > 0.0 { rate } else { 1.0 },
            playing: false,
        }
    }

    #[inline(always)]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    #[inline(always)]
    pub fn playing(&self) -> bool {
        self.playing
    }

    pub fn now_ms(&self) -> f64 {
        self.now_ms_at(Instant::now())
    }

    fn now_ms_at(&self, at: Instant) -> f64 {
        if !self.playing {
            return self.anchor_ms;
        }
        let elapsed = at.saturating_duration_since(self.anchor_at).as_secs_f64();
        elapsed.mul_add(1000.0 * self.rate, self.anchor_ms)
    }

    /// Fold in an audio-reported position. Within the threshold the
    /// interpolated clock keeps authority; a jump or any backwards movement
    /// re-anchors.
    pub fn report(&mut self, position_ms: f64) {
        self.report_at(position_ms, Instant::now());
    }

    fn report_at(&mut self, position_ms: f64, at: Instant) {
        let predicted = self.now_ms_at(at);
        let drift = position_ms - predicted;
        if drift < 0.0 || drift.abs() > RESNAP_THRESHOLD_MS {
            debug!("clock resnap: predicted {predicted:.1} ms, reported {position_ms:.1} ms");
            self.anchor_ms = position_ms;
            self.anchor_at = at;
        }
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.set_playing_at(playing, Instant::now());
    }

    fn set_playing_at(&mut self, playing: bool, at: Instant) {
        if self.playing == playing {
            return;
        }
        self.anchor_ms = self.now_ms_at(at);
        self.anchor_at = at;
        self.playing = playing;
    }

    /// Relative seek; the clock never goes before zero.
    pub fn seek(&mut self, delta_ms: f64) {
        self.seek_at(delta_ms, Instant::now());
    }

    fn seek_at(&mut self, delta_ms: f64, at: Instant) {
        self.anchor_ms = (self.now_ms_at(at) + delta_ms).max(0.0);
        self.anchor_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn later(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn paused_clock_stands_still() {
        let c = SongClock::new(1.0);
        let base = c.anchor_at;
        assert_eq!(c.now_ms_at(later(base, 500)), 0.0);
    }

    #[test]
    fn playing_clock_advances_at_rate() {
        let mut c = SongClock::new(1.5);
        let base = c.anchor_at;
        c.set_playing_at(true, base);
        assert!((c.now_ms_at(later(base, 1000)) - 1500.0).abs() < 1e-6);
    }

    #[test]
    fn small_drift_does_not_resnap() {
        let mut c = SongClock::new(1.0);
        let base = c.anchor_at;
        c.set_playing_at(true, base);
        c.report_at(1100.0, later(base, 1000)); // 100 ms ahead, under threshold
        assert!((c.now_ms_at(later(base, 1000)) - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn large_jump_resnaps() {
        let mut c = SongClock::new(1.0);
        let base = c.anchor_at;
        c.set_playing_at(true, base);
        c.report_at(5000.0, later(base, 1000));
        assert!((c.now_ms_at(later(base, 1000)) - 5000.0).abs() < 1e-6);
    }

    #[test]
    fn backwards_report_always_resnaps() {
        let mut c = SongClock::new(1.0);
        let base = c.anchor_at;
        c.set_playing_at(true, base);
        c.report_at(950.0, later(base, 1000)); // only 50 ms, but backwards
        assert!((c.now_ms_at(later(base, 1000)) - 950.0).abs() < 1e-6);
    }

    #[test]
    fn seek_is_relative_and_floored_at_zero() {
        let mut c = SongClock::new(1.0);
        let base = c.anchor_at;
        c.set_playing_at(true, base);
        c.seek_at(-5000.0, later(base, 1000));
        assert_eq!(c.now_ms_at(later(base, 1000)), 0.0);
        c.seek_at(5000.0, later(base, 1000));
        assert!((c.now_ms_at(later(base, 2000)) - 6000.0).abs() < 1e-6);
    }

    #[test]
    fn pause_freezes_and_resume_continues() {
        let mut c = SongClock::new(1.0);
        let base = c.anchor_at;
        c.set_playing_at(true, base);
        c.set_playing_at(false, later(base, 1000));
        assert!((c.now_ms_at(later(base, 3000)) - 1000.0).abs() < 1e-6);
        c.set_playing_at(true, later(base, 3000));
        assert!((c.now_ms_at(later(base, 4000)) - 2000.0).abs() < 1e-6);
    }
}
