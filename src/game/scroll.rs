// Scroll-velocity mapping: chart time -> scroll position. Position is the
// running integral of the velocity multiplier, so notes spread apart under
// fast sections and bunch up under slow ones while hitting the receptor on
// time.

use log::info;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VelocityPoint {
    pub time_ms: f64,
    pub multiplier: f32,
}

/// Immutable after load. `cumulative[i]` is the scroll position at
/// `points[i].time_ms`; the multiplier before the first point is 1.0 and the
/// last point's multiplier extends forever.
pub struct ScrollMap {
    points: Vec<VelocityPoint>,
    cumulative: Vec<f64>,
}

impl ScrollMap {
    /// `points` must already be sorted ascending by time; the beatmap payload
    /// delivers them that way.
    pub fn new(points: Vec<VelocityPoint>) -> Self {
        let mut cumulative = Vec::with_capacity(points.len());
        let mut pos = 0.0f64;
        let mut prev_time = 0.0f64;
        let mut prev_mult = 1.0f64;
        for p in &points {
            pos += (p.time_ms - prev_time) * prev_mult;
            cumulative.push(pos);
            prev_time = p.time_ms;
            prev_mult = f64::from(p.multiplier);
        }
        info!("scroll map: {} velocity points", points.len());
        Self { points, cumulative }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index of the segment governing `time_ms`: the last point at or before
    /// it, or `None` when `time_ms` precedes every point.
    #[inline(always)]
    fn segment_index(&self, time_ms: f64) -> Option<usize> {
        let n = self.points.partition_point(|p| p.time_ms <= time_ms);
        n.checked_sub(1)
    }

    #[inline(always)]
    fn position_in_segment(&self, seg: Option<usize>, time_ms: f64) -> f32 {
        match seg {
            None => time_ms as f32,
            Some(i) => {
                let p = &self.points[i];
                (self.cumulative[i] + (time_ms - p.time_ms) * f64::from(p.multiplier)) as f32
            }
        }
    }

    /// Scroll position at `time_ms`, O(log n). Use a [`ScrollCursor`] for the
    /// per-frame advancing case.
    pub fn position(&self, time_ms: f64) -> f32 {
        self.position_in_segment(self.segment_index(time_ms), time_ms)
    }
}

/// Amortized-O(1) position lookup for a monotonically advancing playhead.
/// Seeking backwards just re-bisects; the cursor never goes stale.
pub struct ScrollCursor {
    seg: usize, // number of points at or before the last queried time
    last_time_ms: f64,
}

impl ScrollCursor {
    pub fn new() -> Self {
        Self {
            seg: 0,
            last_time_ms: f64::NEG_INFINITY,
        }
    }

    pub fn position(&mut self, map: &ScrollMap, time_ms: f64) -> f32 {
        if time_ms < self.last_time_ms {
            self.seg = map.points.partition_point(|p| p.time_ms <= time_ms);
        } else {
            while self.seg < map.points.len() && map.points[self.seg].time_ms <= time_ms {
                self.seg += 1;
            }
        }
        self.last_time_ms = time_ms;
        map.position_in_segment(self.seg.checked_sub(1), time_ms)
    }
}

impl Default for ScrollCursor {
    fn default() -> Self {
        Self::new()
    }
}
