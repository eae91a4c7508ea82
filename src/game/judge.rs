// Hit windows and the score/combo/accuracy fold. Windows come from the
// chart's Overall Difficulty; scoring follows the classic 1M-cap mania
// formula with its bonus meter.

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Judgement {
    Perfect,
    Great,
    Good,
    Ok,
    Meh,
    Miss,
}

pub const JUDGEMENT_COUNT: usize = 6;

impl Judgement {
    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    /// The less favorable of the two (holds are judged by their worst half).
    #[inline(always)]
    pub fn worse(a: Self, b: Self) -> Self {
        a.max(b)
    }

    #[inline(always)]
    fn hit_value(self) -> f64 {
        match self {
            Self::Perfect => 320.0,
            Self::Great => 300.0,
            Self::Good => 200.0,
            Self::Ok => 100.0,
            Self::Meh => 50.0,
            Self::Miss => 0.0,
        }
    }

    #[inline(always)]
    fn bonus_value(self) -> f64 {
        match self {
            Self::Perfect | Self::Great => 32.0,
            Self::Good => 16.0,
            Self::Ok => 8.0,
            Self::Meh => 4.0,
            Self::Miss => 0.0,
        }
    }

    /// Accuracy weight out of 300 per note.
    #[inline(always)]
    fn accuracy_weight(self) -> f64 {
        match self {
            Self::Perfect | Self::Great => 300.0,
            Self::Good => 200.0,
            Self::Ok => 100.0,
            Self::Meh => 50.0,
            Self::Miss => 0.0,
        }
    }
}

/// Absolute hit-error thresholds in ms. Perfect is fixed; the rest shrink
/// linearly with OD and are floored to whole milliseconds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HitWindows {
    pub perfect: f64,
    pub great: f64,
    pub good: f64,
    pub ok: f64,
    pub meh: f64,
    pub miss: f64,
}

impl HitWindows {
    pub fn from_od(od: f32) -> Self {
        let od = f64::from(od);
        let window = |base: f64| (base - 3.0 * od).floor();
        Self {
            perfect: 16.0,
            great: window(64.0),
            good: window(97.0),
            ok: window(127.0),
            meh: window(151.0),
            miss: window(188.0),
        }
    }

    /// Classify a signed hit error. `None` means the press was too far off
    /// to count as an attempt on the note at all.
    #[inline(always)]
    pub fn classify(&self, diff_ms: f64) -> Option<Judgement> {
        let d = diff_ms.abs();
        if d <= self.perfect {
            Some(Judgement::Perfect)
        } else if d <= self.great {
            Some(Judgement::Great)
        } else if d <= self.good {
            Some(Judgement::Good)
        } else if d <= self.ok {
            Some(Judgement::Ok)
        } else if d <= self.meh {
            Some(Judgement::Meh)
        } else if d <= self.miss {
            Some(Judgement::Miss)
        } else {
            None
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Grade {
    SS,
    S,
    A,
    B,
    C,
    D,
}

/// Running score/combo/accuracy state, folded one judgement at a time.
/// Judgements are never revisited after being recorded.
#[derive(Clone, Debug)]
pub struct ScoreState {
    total_notes: u32,
    score: f64,
    bonus: f64,
    pub combo: u32,
    pub max_combo: u32,
    pub counts: [u32; JUDGEMENT_COUNT],
    pub last: Option<Judgement>,
}

impl ScoreState {
    pub fn new(total_notes: u32) -> Self {
        Self {
            total_notes: total_notes.max(1),
            score: 0.0,
            // The bonus meter starts full; a flawless run keeps it there and
            // lands exactly on the 1,000,000 cap.
            bonus: 100.0,
            combo: 0,
            max_combo: 0,
            counts: [0; JUDGEMENT_COUNT],
            last: None,
        }
    }

    pub fn record(&mut self, judgement: Judgement) {
        self.counts[judgement.index()] += 1;
        self.last = Some(judgement);

        if judgement == Judgement::Miss {
            self.combo = 0;
        } else {
            self.combo += 1;
            self.max_combo = self.max_combo.max(self.combo);
        }

        self.bonus = match judgement {
            Judgement::Perfect => (self.bonus + 2.0).min(100.0),
            Judgement::Great => (self.bonus + 1.0).min(100.0),
            Judgement::Good => (self.bonus - 8.0).max(0.0),
            Judgement::Ok => (self.bonus - 24.0).max(0.0),
            Judgement::Meh => (self.bonus - 44.0).max(0.0),
            Judgement::Miss => 0.0,
        };

        let per_note = 500_000.0 / f64::from(self.total_notes);
        self.score += per_note * judgement.hit_value() / 320.0;
        self.score += per_note * judgement.bonus_value() * self.bonus.sqrt() / 320.0;
    }

    #[inline(always)]
    pub fn score(&self) -> u32 {
        self.score.round() as u32
    }

    #[inline(always)]
    pub fn judged_notes(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// Accuracy in [0,1] over the notes judged so far (1.0 before any).
    pub fn accuracy(&self) -> f64 {
        let judged = self.judged_notes();
        if judged == 0 {
            return 1.0;
        }
        let mut weighted = 0.0;
        for (i, &n) in self.counts.iter().enumerate() {
            let j = match i {
                0 => Judgement::Perfect,
                1 => Judgement::Great,
                2 => Judgement::Good,
                3 => Judgement::Ok,
                4 => Judgement::Meh,
                _ => Judgement::Miss,
            };
            weighted += f64::from(n) * j.accuracy_weight();
        }
        weighted / (300.0 * f64::from(judged))
    }

    pub fn grade(&self) -> Grade {
        let acc = self.accuracy();
        if acc >= 1.0 {
            Grade::SS
        } else if acc >= 0.95 {
            Grade::S
        } else if acc >= 0.90 {
            Grade::A
        } else if acc >= 0.80 {
            Grade::B
        } else if acc >= 0.70 {
            Grade::C
        } else {
            Grade::D
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn od8_windows() {
        let w = HitWindows::from_od(8.0);
        assert_eq!(w.perfect, 16.0);
        assert_eq!(w.great, 40.0);
        assert_eq!(w.good, 73.0);
        assert_eq!(w.ok, 103.0);
        assert_eq!(w.meh, 127.0);
        assert_eq!(w.miss, 164.0);
    }

    #[test]
    fn windows_are_floored() {
        // OD 8.5: 64 - 25.5 = 38.5 -> 38.
        let w = HitWindows::from_od(8.5);
        assert_eq!(w.great, 38.0);
        assert_eq!(w.miss, 162.0);
    }

    #[test]
    fn classify_widest_fit() {
        let w = HitWindows::from_od(8.0);
        assert_eq!(w.classify(0.0), Some(Judgement::Perfect));
        assert_eq!(w.classify(-16.0), Some(Judgement::Perfect));
        assert_eq!(w.classify(17.0), Some(Judgement::Great));
        assert_eq!(w.classify(-73.0), Some(Judgement::Good));
        assert_eq!(w.classify(100.0), Some(Judgement::Ok));
        assert_eq!(w.classify(110.0), Some(Judgement::Meh));
        assert_eq!(w.classify(150.0), Some(Judgement::Miss));
        assert_eq!(w.classify(165.0), None);
    }

    #[test]
    fn worse_prefers_the_lower_judgement() {
        assert_eq!(
            Judgement::worse(Judgement::Perfect, Judgement::Miss),
            Judgement::Miss
        );
        assert_eq!(
            Judgement::worse(Judgement::Good, Judgement::Great),
            Judgement::Good
        );
    }

    #[test]
    fn combo_sequence() {
        let mut s = ScoreState::new(4);
        let mut combos = Vec::new();
        for j in [
            Judgement::Great,
            Judgement::Great,
            Judgement::Miss,
            Judgement::Perfect,
        ] {
            s.record(j);
            combos.push(s.combo);
        }
        assert_eq!(combos, vec![1, 2, 0, 1]);
        assert_eq!(s.max_combo, 2);
    }

    #[test]
    fn all_perfect_hits_the_million_cap() {
        let mut s = ScoreState::new(100);
        for _ in 0..100 {
            s.record(Judgement::Perfect);
        }
        assert_eq!(s.score(), 1_000_000);
        assert_eq!(s.accuracy(), 1.0);
        assert_eq!(s.grade(), Grade::SS);
    }

    #[test]
    fn misses_score_nothing() {
        let mut s = ScoreState::new(10);
        s.record(Judgement::Miss);
        assert_eq!(s.score(), 0);
        assert_eq!(s.accuracy(), 0.0);
    }

    #[test]
    fn accuracy_weighting() {
        let mut s = ScoreState::new(4);
        s.record(Judgement::Perfect);
        s.record(Judgement::Great);
        s.record(Judgement::Good);
        s.record(Judgement::Miss);
        // (300 + 300 + 200 + 0) / 1200
        assert!((s.accuracy() - 800.0 / 1200.0).abs() < 1e-9);
        assert_eq!(s.grade(), Grade::D);
    }

    #[test]
    fn grade_thresholds() {
        let grade_for = |accs: &[Judgement]| {
            let mut s = ScoreState::new(accs.len() as u32);
            for &j in accs {
                s.record(j);
            }
            s.grade()
        };
        assert_eq!(grade_for(&[Judgement::Perfect; 20]), Grade::SS);
        let mut v = vec![Judgement::Great; 19];
        v.push(Judgement::Good);
        // 19*300 + 200 over 6000 = 98.3% -> S
        assert_eq!(grade_for(&v), Grade::S);
    }
}
