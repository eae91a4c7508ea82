// Note matching and hold resolution. Input events arrive as (column, time)
// pairs; everything here is pure chart logic with no windowing or audio
// concerns.

use crate::game::judge::{HitWindows, Judgement, ScoreState};
use log::debug;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum NoteKind {
    Tap,
    Hold { end_ms: f64 },
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Note {
    pub column: u8,
    pub time_ms: f64,
    pub kind: NoteKind,
}

impl Note {
    /// The last timestamp at which this note still needs input.
    #[inline(always)]
    pub fn final_ms(&self) -> f64 {
        match self.kind {
            NoteKind::Tap => self.time_ms,
            NoteKind::Hold { end_ms } => end_ms.max(self.time_ms),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum NoteState {
    /// Awaiting a press.
    Idle,
    /// Hold pressed, awaiting release.
    Held { press: Judgement },
    Judged,
}

/// Per-column note matching state plus the running score fold. Notes are
/// judged exactly once; the sweep catches everything the player never
/// touched.
pub struct Playfield {
    notes: Vec<Note>,
    states: Vec<NoteState>,
    // Per-column note indices in ascending time order, with a cursor past
    // the fully-judged prefix so matching never rescans the whole chart.
    columns: Vec<Vec<usize>>,
    cursors: Vec<usize>,
    windows: HitWindows,
    pub score: ScoreState,
}

impl Playfield {
    pub fn new(notes: Vec<Note>, column_count: u8, od: f32) -> Self {
        let mut columns: Vec<Vec<usize>> = vec![Vec::new(); usize::from(column_count)];
        for (i, n) in notes.iter().enumerate() {
            if let Some(col) = columns.get_mut(usize::from(n.column)) {
                col.push(i);
            }
        }
        for col in &mut columns {
            col.sort_by(|&a, &b| {
                notes[a]
                    .time_ms
                    .partial_cmp(&notes[b].time_ms)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        let total = notes.len() as u32;
        Self {
            states: vec![NoteState::Idle; notes.len()],
            cursors: vec![0; columns.len()],
            columns,
            windows: HitWindows::from_od(od),
            score: ScoreState::new(total),
            notes,
        }
    }

    #[inline(always)]
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    #[inline(always)]
    pub fn column_count(&self) -> u8 {
        self.columns.len() as u8
    }

    #[inline(always)]
    pub fn windows(&self) -> &HitWindows {
        &self.windows
    }

    #[inline(always)]
    pub fn is_judged(&self, note_index: usize) -> bool {
        matches!(self.states[note_index], NoteState::Judged)
    }

    /// True while a hold in this column is pressed and unresolved.
    pub fn holding(&self, column: u8) -> bool {
        self.columns
            .get(usize::from(column))
            .is_some_and(|col| {
                col.iter()
                    .any(|&i| matches!(self.states[i], NoteState::Held { .. }))
            })
    }

    /// All notes judged, nothing left to play.
    pub fn finished(&self) -> bool {
        self.states.iter().all(|s| matches!(s, NoteState::Judged))
    }

    /// Match a key press against the closest idle note in the column within
    /// the miss window. Equidistant candidates resolve to the earlier note.
    pub fn key_down(&mut self, column: u8, time_ms: f64) -> Option<Judgement> {
        let col = self.columns.get(usize::from(column))?;
        let mut best: Option<(usize, f64)> = None;
        for &i in &col[self.cursors[usize::from(column)]..] {
            if !matches!(self.states[i], NoteState::Idle) {
                continue;
            }
            let diff = (time_ms - self.notes[i].time_ms).abs();
            if self.notes[i].time_ms - time_ms > self.windows.miss {
                break; // column is time-sorted, nothing closer ahead
            }
            if diff > self.windows.miss {
                continue;
            }
            // Strict < keeps the earlier note on an exact tie.
            if best.is_none_or(|(_, d)| diff < d) {
                best = Some((i, diff));
            }
        }
        let (idx, _) = best?;

        let diff = time_ms - self.notes[idx].time_ms;
        let judgement = self.windows.classify(diff)?;
        match self.notes[idx].kind {
            NoteKind::Tap => {
                self.resolve(idx, judgement);
                Some(judgement)
            }
            NoteKind::Hold { .. } => {
                if judgement == Judgement::Miss {
                    // A press that barely grazes the window cannot be saved
                    // by the release.
                    self.resolve(idx, Judgement::Miss);
                    Some(Judgement::Miss)
                } else {
                    self.states[idx] = NoteState::Held { press: judgement };
                    None
                }
            }
        }
    }

    /// Resolve the held note in this column, if any. Release earlier than
    /// `end - miss_window` voids the hold regardless of the press.
    pub fn key_up(&mut self, column: u8, time_ms: f64) -> Option<Judgement> {
        let col = self.columns.get(usize::from(column))?;
        let held = col
            .iter()
            .copied()
            .find(|&i| matches!(self.states[i], NoteState::Held { .. }))?;
        let NoteState::Held { press } = self.states[held] else {
            return None;
        };
        let NoteKind::Hold { end_ms } = self.notes[held].kind else {
            return None;
        };

        let diff = time_ms - end_ms;
        let judgement = if diff < -self.windows.miss {
            Judgement::Miss
        } else {
            // A release after the window (overhold) still counts, at the
            // bottom of the scale.
            let release = self.windows.classify(diff).unwrap_or(Judgement::Meh);
            Judgement::worse(press, release)
        };
        self.resolve(held, judgement);
        Some(judgement)
    }

    /// Miss everything whose input deadline has passed. Held notes swept past
    /// their tail resolve as if released at the window's edge.
    pub fn sweep(&mut self, time_ms: f64) -> u32 {
        let mut resolved = 0;
        for i in 0..self.notes.len() {
            match self.states[i] {
                NoteState::Idle => {
                    // Input deadline: head time for taps, tail time for
                    // untouched holds.
                    if time_ms - self.notes[i].final_ms() > self.windows.miss {
                        self.resolve(i, Judgement::Miss);
                        resolved += 1;
                    }
                }
                NoteState::Held { press } => {
                    if time_ms - self.notes[i].final_ms() > self.windows.miss {
                        self.resolve(i, Judgement::worse(press, Judgement::Meh));
                        resolved += 1;
                    }
                }
                NoteState::Judged => {}
            }
        }
        resolved
    }

    /// Feed perfect inputs up to `time_ms`. Holds resolve once their tail
    /// has passed.
    pub fn autoplay(&mut self, time_ms: f64) {
        for i in 0..self.notes.len() {
            if matches!(self.states[i], NoteState::Judged) {
                continue;
            }
            match self.notes[i].kind {
                NoteKind::Tap => {
                    if time_ms >= self.notes[i].time_ms {
                        self.resolve(i, Judgement::Perfect);
                    }
                }
                NoteKind::Hold { end_ms } => {
                    if matches!(self.states[i], NoteState::Idle)
                        && time_ms >= self.notes[i].time_ms
                    {
                        self.states[i] = NoteState::Held {
                            press: Judgement::Perfect,
                        };
                    }
                    if matches!(self.states[i], NoteState::Held { .. }) && time_ms >= end_ms {
                        self.resolve(i, Judgement::Perfect);
                    }
                }
            }
        }
    }

    fn resolve(&mut self, note_index: usize, judgement: Judgement) {
        self.states[note_index] = NoteState::Judged;
        self.score.record(judgement);
        debug!(
            "note {note_index} (col {}): {judgement:?}, combo {}",
            self.notes[note_index].column, self.score.combo
        );
        let column = usize::from(self.notes[note_index].column);
        if let Some(col) = self.columns.get(column) {
            let cur = &mut self.cursors[column];
            while *cur < col.len() && matches!(self.states[col[*cur]], NoteState::Judged) {
                *cur += 1;
            }
        }
    }
}
