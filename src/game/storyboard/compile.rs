// Expands raw command streams (plain commands, loops, triggers) into flat,
// absolute-time, per-sprite timelines. Runs once at load; the per-frame
// evaluator only ever sees the compiled output.

use super::{BasicTemplate, Command, RawCommand, SpriteTimeline};
use log::debug;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;

/// Trigger family honored during expansion. Anything else ("Failing",
/// "Passing", ...) expands to nothing; that is a documented limitation of
/// the chart format we preview, not an error.
const HIT_SOUND_TRIGGER_PREFIX: &str = "HitSound";

/// Compile every sprite's raw command stream against the chart's hit-event
/// timestamps. Sprites whose stream compiles to zero commands are dropped
/// from the renderable set entirely.
pub fn compile(
    raw: &FxHashMap<u32, Vec<RawCommand>>,
    hit_times_ms: &[f64],
) -> FxHashMap<u32, SpriteTimeline> {
    let mut out = FxHashMap::default();
    for (&sprite_id, commands) in raw {
        let timeline = compile_sprite(commands, hit_times_ms);
        if timeline.commands.is_empty() {
            debug!("sprite {sprite_id}: no compiled commands, dropping");
            continue;
        }
        out.insert(sprite_id, timeline);
    }
    out
}

fn compile_sprite(raw: &[RawCommand], hit_times_ms: &[f64]) -> SpriteTimeline {
    let mut commands: Vec<Command> = Vec::new();
    // Emission counter preserves declaration order across expansion; the
    // (start, seq) sort below is a correctness requirement, not an
    // optimization: equal-start commands must apply in declaration order.
    let mut seq: u32 = 0;

    for cmd in raw {
        match cmd {
            RawCommand::Basic {
                kind,
                easing,
                start_ms,
                end_ms,
            } => {
                commands.push(Command {
                    kind: *kind,
                    easing: *easing,
                    start_ms: *start_ms,
                    end_ms: *end_ms,
                    seq,
                });
                seq += 1;
            }
            RawCommand::Loop {
                start_ms,
                count,
                commands: subs,
            } => {
                seq = expand_loop(*start_ms, *count, subs, seq, &mut commands);
            }
            RawCommand::Trigger {
                name,
                start_ms,
                end_ms,
                commands: subs,
            } => {
                seq = expand_trigger(name, *start_ms, *end_ms, subs, hit_times_ms, seq, &mut commands);
            }
        }
    }

    commands.sort_by(|a, b| {
        a.start_ms
            .partial_cmp(&b.start_ms)
            .unwrap_or(Ordering::Equal)
            .then(a.seq.cmp(&b.seq))
    });

    let mut start_ms = f64::INFINITY;
    let mut end_ms = f64::NEG_INFINITY;
    for c in &commands {
        if c.start_ms < start_ms {
            start_ms = c.start_ms;
        }
        let e = c.clamped_end();
        if e > end_ms {
            end_ms = e;
        }
    }
    if commands.is_empty() {
        start_ms = 0.0;
        end_ms = 0.0;
    }

    SpriteTimeline {
        commands,
        start_ms,
        end_ms,
    }
}

/// Iteration duration is (max sub end) - (min sub start); iteration n shifts
/// every sub-command by `start + n * duration`. An empty sub-list or a zero
/// repeat count produces nothing.
fn expand_loop(
    start_ms: f64,
    count: u32,
    subs: &[BasicTemplate],
    mut seq: u32,
    out: &mut Vec<Command>,
) -> u32 {
    if subs.is_empty() || count == 0 {
        return seq;
    }

    let mut min_start = f64::INFINITY;
    let mut max_end = f64::NEG_INFINITY;
    for s in subs {
        if s.start_ms < min_start {
            min_start = s.start_ms;
        }
        if s.end_ms > max_end {
            max_end = s.end_ms;
        }
    }
    let duration = (max_end - min_start).max(0.0);

    for n in 0..count {
        let shift = start_ms + f64::from(n) * duration;
        for s in subs {
            out.push(Command {
                kind: s.kind,
                easing: s.easing,
                start_ms: s.start_ms + shift,
                end_ms: s.end_ms + shift,
                seq,
            });
            seq += 1;
        }
    }
    seq
}

/// One expansion per hit-event timestamp inside the trigger's active window.
/// Only the "HitSound*" trigger family is honored; other names yield zero
/// instances.
fn expand_trigger(
    name: &str,
    window_start_ms: f64,
    window_end_ms: f64,
    subs: &[BasicTemplate],
    hit_times_ms: &[f64],
    mut seq: u32,
    out: &mut Vec<Command>,
) -> u32 {
    if subs.is_empty() || !name.starts_with(HIT_SOUND_TRIGGER_PREFIX) {
        return seq;
    }

    for &hit in hit_times_ms {
        if hit < window_start_ms || hit > window_end_ms {
            continue;
        }
        for s in subs {
            out.push(Command {
                kind: s.kind,
                easing: s.easing,
                start_ms: s.start_ms + hit,
                end_ms: s.end_ms + hit,
                seq,
            });
            seq += 1;
        }
    }
    seq
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::storyboard::CommandKind;
    use smallvec::smallvec;

    fn fade(from: f32, to: f32, start: f64, end: f64) -> RawCommand {
        RawCommand::Basic {
            kind: CommandKind::Fade { from, to },
            easing: 0,
            start_ms: start,
            end_ms: end,
        }
    }

    fn fade_template(start: f64, end: f64) -> BasicTemplate {
        BasicTemplate {
            kind: CommandKind::Fade { from: 0.0, to: 1.0 },
            easing: 0,
            start_ms: start,
            end_ms: end,
        }
    }

    fn compile_one(raw: Vec<RawCommand>, hits: &[f64]) -> SpriteTimeline {
        let mut map = FxHashMap::default();
        map.insert(0u32, raw);
        compile(&map, hits).remove(&0).unwrap_or_default()
    }

    #[test]
    fn loop_expansion_shifts_by_iteration_duration() {
        let raw = vec![RawCommand::Loop {
            start_ms: 1000.0,
            count: 3,
            commands: smallvec![fade_template(0.0, 100.0)],
        }];
        let tl = compile_one(raw, &[]);
        let starts: Vec<f64> = tl.commands.iter().map(|c| c.start_ms).collect();
        assert_eq!(starts, vec![1000.0, 1100.0, 1200.0]);
        assert_eq!(tl.start_ms, 1000.0);
        assert_eq!(tl.end_ms, 1300.0);
    }

    #[test]
    fn empty_loop_produces_nothing() {
        let raw = vec![RawCommand::Loop {
            start_ms: 1000.0,
            count: 5,
            commands: smallvec![],
        }];
        let mut map = FxHashMap::default();
        map.insert(7u32, raw);
        // A sprite whose commands all expand to nothing is dropped.
        assert!(compile(&map, &[]).is_empty());
    }

    #[test]
    fn zero_count_loop_produces_nothing() {
        let raw = vec![RawCommand::Loop {
            start_ms: 0.0,
            count: 0,
            commands: smallvec![fade_template(0.0, 100.0)],
        }];
        let mut map = FxHashMap::default();
        map.insert(0u32, raw);
        assert!(compile(&map, &[]).is_empty());
    }

    #[test]
    fn trigger_expands_only_inside_window() {
        let raw = vec![RawCommand::Trigger {
            name: "HitSoundClap".into(),
            start_ms: 2000.0,
            end_ms: 5000.0,
            commands: smallvec![fade_template(0.0, 50.0)],
        }];
        let tl = compile_one(raw, &[1000.0, 2500.0, 4800.0, 6000.0]);
        let starts: Vec<f64> = tl.commands.iter().map(|c| c.start_ms).collect();
        assert_eq!(starts, vec![2500.0, 4800.0]);
    }

    #[test]
    fn unknown_trigger_name_expands_to_nothing() {
        let raw = vec![RawCommand::Trigger {
            name: "Failing".into(),
            start_ms: 0.0,
            end_ms: 10_000.0,
            commands: smallvec![fade_template(0.0, 50.0)],
        }];
        let mut map = FxHashMap::default();
        map.insert(0u32, raw);
        assert!(compile(&map, &[5000.0]).is_empty());
    }

    #[test]
    fn equal_start_times_keep_declaration_order() {
        let raw = vec![
            fade(0.0, 0.2, 500.0, 500.0),
            fade(0.0, 0.9, 500.0, 500.0),
        ];
        let tl = compile_one(raw, &[]);
        assert_eq!(tl.commands.len(), 2);
        assert!(tl.commands[0].seq < tl.commands[1].seq);
        assert!(matches!(
            tl.commands[1].kind,
            CommandKind::Fade { to, .. } if (to - 0.9).abs() < f32::EPSILON
        ));
    }

    #[test]
    fn active_window_spans_all_commands() {
        let raw = vec![fade(0.0, 1.0, 300.0, 700.0), fade(1.0, 0.0, 900.0, 1500.0)];
        let tl = compile_one(raw, &[]);
        assert_eq!(tl.start_ms, 300.0);
        assert_eq!(tl.end_ms, 1500.0);
    }

    #[test]
    fn end_before_start_clamps_to_zero_duration() {
        let raw = vec![fade(0.0, 1.0, 800.0, 400.0)];
        let tl = compile_one(raw, &[]);
        assert_eq!(tl.commands[0].clamped_end(), 800.0);
        assert_eq!(tl.end_ms, 800.0);
    }
}
