// Per-frame resolution of a sprite's compiled timeline into a concrete
// visual state. Pure over (sprite, timeline, time); no caches, no
// allocation.

use super::{Command, CommandKind, ParameterKind, Sprite, SpriteTimeline};
use crate::game::easing;

/// Everything the compositor needs to draw one sprite for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpriteState {
    pub pos: [f32; 2],
    pub scale: [f32; 2],
    pub rotation: f32,
    pub color: [f32; 3],
    pub alpha: f32,
    pub flip_h: bool,
    pub flip_v: bool,
    pub additive: bool,
    pub frame: usize,
}

impl SpriteState {
    fn initial(sprite: &Sprite) -> Self {
        Self {
            pos: sprite.base_pos,
            scale: [1.0, 1.0],
            rotation: 0.0,
            color: [1.0, 1.0, 1.0],
            alpha: 1.0,
            flip_h: false,
            flip_v: false,
            additive: false,
            frame: 0,
        }
    }
}

// Property-slot init flags. A property's first command in (start, seq) order
// supplies its value *before* that command starts; without the flags a later
// not-yet-started command would clobber an earlier one's resolved value.
const SLOT_X: u8 = 1 << 0;
const SLOT_Y: u8 = 1 << 1;
const SLOT_SCALE: u8 = 1 << 2;
const SLOT_ROT: u8 = 1 << 3;
const SLOT_COLOR: u8 = 1 << 4;
const SLOT_ALPHA: u8 = 1 << 5;

#[inline(always)]
fn progress(cmd: &Command, time_ms: f64) -> f32 {
    let duration = cmd.clamped_end() - cmd.start_ms;
    if duration <= 0.0 {
        // Zero-duration commands snap straight to their end value.
        1.0
    } else {
        (((time_ms - cmd.start_ms) / duration) as f32).clamp(0.0, 1.0)
    }
}

/// Resolve the sprite's visual state at `time_ms`, including pre-roll: before
/// a property's first command starts, the property already holds that
/// command's start value. Window gating is the caller's business; this runs
/// for any time.
pub fn resolve_state(sprite: &Sprite, timeline: &SpriteTimeline, time_ms: f64) -> SpriteState {
    let mut state = SpriteState::initial(sprite);
    let mut seen: u8 = 0;

    for cmd in &timeline.commands {
        let started = time_ms >= cmd.start_ms;
        match cmd.kind {
            CommandKind::Fade { from, to } => {
                if seen & SLOT_ALPHA == 0 {
                    state.alpha = from;
                    seen |= SLOT_ALPHA;
                }
                if started {
                    state.alpha = easing::lerp(from, to, progress(cmd, time_ms), cmd.easing);
                }
            }
            CommandKind::Move { from, to } => {
                if seen & SLOT_X == 0 {
                    state.pos[0] = from[0];
                }
                if seen & SLOT_Y == 0 {
                    state.pos[1] = from[1];
                }
                seen |= SLOT_X | SLOT_Y;
                if started {
                    let t = progress(cmd, time_ms);
                    state.pos[0] = easing::lerp(from[0], to[0], t, cmd.easing);
                    state.pos[1] = easing::lerp(from[1], to[1], t, cmd.easing);
                }
            }
            CommandKind::MoveX { from, to } => {
                if seen & SLOT_X == 0 {
                    state.pos[0] = from;
                    seen |= SLOT_X;
                }
                if started {
                    state.pos[0] = easing::lerp(from, to, progress(cmd, time_ms), cmd.easing);
                }
            }
            CommandKind::MoveY { from, to } => {
                if seen & SLOT_Y == 0 {
                    state.pos[1] = from;
                    seen |= SLOT_Y;
                }
                if started {
                    state.pos[1] = easing::lerp(from, to, progress(cmd, time_ms), cmd.easing);
                }
            }
            CommandKind::Scale { from, to } => {
                if seen & SLOT_SCALE == 0 {
                    state.scale = [from, from];
                    seen |= SLOT_SCALE;
                }
                if started {
                    let v = easing::lerp(from, to, progress(cmd, time_ms), cmd.easing);
                    state.scale = [v, v];
                }
            }
            CommandKind::VectorScale { from, to } => {
                if seen & SLOT_SCALE == 0 {
                    state.scale = from;
                    seen |= SLOT_SCALE;
                }
                if started {
                    let t = progress(cmd, time_ms);
                    state.scale = [
                        easing::lerp(from[0], to[0], t, cmd.easing),
                        easing::lerp(from[1], to[1], t, cmd.easing),
                    ];
                }
            }
            CommandKind::Rotate { from, to } => {
                if seen & SLOT_ROT == 0 {
                    state.rotation = from;
                    seen |= SLOT_ROT;
                }
                if started {
                    state.rotation = easing::lerp(from, to, progress(cmd, time_ms), cmd.easing);
                }
            }
            CommandKind::Color { from, to } => {
                if seen & SLOT_COLOR == 0 {
                    state.color = from;
                    seen |= SLOT_COLOR;
                }
                if started {
                    let t = progress(cmd, time_ms);
                    state.color = [
                        easing::lerp(from[0], to[0], t, cmd.easing),
                        easing::lerp(from[1], to[1], t, cmd.easing),
                        easing::lerp(from[2], to[2], t, cmd.easing),
                    ];
                }
            }
            CommandKind::Parameter(kind) => {
                // Boolean latch: active within the command's span. A
                // zero-duration parameter latches from its start onward.
                let end = cmd.clamped_end();
                let active = if end > cmd.start_ms {
                    started && time_ms <= end
                } else {
                    started
                };
                if active {
                    match kind {
                        ParameterKind::FlipH => state.flip_h = true,
                        ParameterKind::FlipV => state.flip_v = true,
                        ParameterKind::Additive => state.additive = true,
                    }
                }
            }
        }
    }

    state.frame = select_frame(sprite, timeline, time_ms);
    state
}

/// Animation frame at `time_ms`, counted from the sprite's active-window
/// start. Loop-once clamps to the last frame; loop-forever wraps.
fn select_frame(sprite: &Sprite, timeline: &SpriteTimeline, time_ms: f64) -> usize {
    let Some(anim) = &sprite.animation else {
        return 0;
    };
    if anim.frame_count == 0 || anim.frame_delay_ms <= 0.0 {
        return 0;
    }
    let elapsed = (time_ms - timeline.start_ms).max(0.0);
    let raw = (elapsed / anim.frame_delay_ms) as usize;
    if anim.loop_forever {
        raw % anim.frame_count
    } else {
        raw.min(anim.frame_count - 1)
    }
}

/// `None` when the sprite draws nothing at `time_ms`: outside its active
/// window, or fully transparent.
pub fn evaluate(sprite: &Sprite, timeline: &SpriteTimeline, time_ms: f64) -> Option<SpriteState> {
    if time_ms < timeline.start_ms || time_ms > timeline.end_ms {
        return None;
    }
    let state = resolve_state(sprite, timeline, time_ms);
    if state.alpha <= 0.0 {
        return None;
    }
    Some(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::storyboard::{Layer, Origin, RawCommand, SpriteAnimation, compile};
    use rustc_hash::FxHashMap;

    fn sprite() -> Sprite {
        Sprite {
            id: 0,
            layer: Layer::Background,
            origin: Origin::Centre,
            base_pos: [320.0, 240.0],
            texture: "sb/test.png".into(),
            animation: None,
        }
    }

    fn timeline(raw: Vec<RawCommand>) -> SpriteTimeline {
        let mut map = FxHashMap::default();
        map.insert(0u32, raw);
        compile::compile(&map, &[]).remove(&0).expect("commands compiled")
    }

    fn basic(kind: CommandKind, start: f64, end: f64) -> RawCommand {
        RawCommand::Basic {
            kind,
            easing: 0,
            start_ms: start,
            end_ms: end,
        }
    }

    #[test]
    fn linear_fade_and_move_midpoint() {
        let tl = timeline(vec![
            basic(CommandKind::Fade { from: 0.0, to: 1.0 }, 0.0, 1000.0),
            basic(
                CommandKind::Move {
                    from: [0.0, 0.0],
                    to: [100.0, 0.0],
                },
                0.0,
                1000.0,
            ),
        ]);
        let s = evaluate(&sprite(), &tl, 500.0).expect("active");
        assert!((s.alpha - 0.5).abs() < 1e-6);
        assert!((s.pos[0] - 50.0).abs() < 1e-4);
    }

    #[test]
    fn pre_roll_adopts_first_command_start_value() {
        let tl = timeline(vec![basic(
            CommandKind::Fade { from: 0.3, to: 1.0 },
            1000.0,
            1000.0,
        )]);
        let s = resolve_state(&sprite(), &tl, 500.0);
        assert!((s.alpha - 0.3).abs() < 1e-6);
    }

    #[test]
    fn outside_active_window_is_none() {
        let tl = timeline(vec![basic(
            CommandKind::Fade { from: 1.0, to: 0.5 },
            1000.0,
            2000.0,
        )]);
        assert!(evaluate(&sprite(), &tl, 999.0).is_none());
        assert!(evaluate(&sprite(), &tl, 2001.0).is_none());
        assert!(evaluate(&sprite(), &tl, 1500.0).is_some());
    }

    #[test]
    fn zero_alpha_is_none() {
        let tl = timeline(vec![basic(
            CommandKind::Fade { from: 0.0, to: 0.0 },
            0.0,
            1000.0,
        )]);
        assert!(evaluate(&sprite(), &tl, 500.0).is_none());
    }

    #[test]
    fn last_writer_wins_on_overlap() {
        let tl = timeline(vec![
            basic(CommandKind::MoveX { from: 0.0, to: 100.0 }, 0.0, 1000.0),
            basic(CommandKind::MoveX { from: 200.0, to: 300.0 }, 400.0, 600.0),
        ]);
        // Both commands are active at t=500; the later-declared one wins.
        let s = resolve_state(&sprite(), &tl, 500.0);
        assert!((s.pos[0] - 250.0).abs() < 1e-4);
    }

    #[test]
    fn not_yet_started_command_does_not_clobber() {
        let tl = timeline(vec![
            basic(CommandKind::MoveX { from: 0.0, to: 100.0 }, 0.0, 1000.0),
            basic(CommandKind::MoveX { from: 999.0, to: 0.0 }, 5000.0, 6000.0),
        ]);
        let s = resolve_state(&sprite(), &tl, 1000.0);
        assert!((s.pos[0] - 100.0).abs() < 1e-4);
    }

    #[test]
    fn past_command_holds_end_value() {
        let tl = timeline(vec![basic(
            CommandKind::Scale { from: 1.0, to: 2.0 },
            0.0,
            100.0,
        )]);
        let s = resolve_state(&sprite(), &tl, 5000.0);
        assert_eq!(s.scale, [2.0, 2.0]);
    }

    #[test]
    fn defaults_without_commands_for_a_property() {
        let tl = timeline(vec![basic(
            CommandKind::Fade { from: 1.0, to: 1.0 },
            0.0,
            100.0,
        )]);
        let s = resolve_state(&sprite(), &tl, 50.0);
        assert_eq!(s.pos, [320.0, 240.0]);
        assert_eq!(s.scale, [1.0, 1.0]);
        assert_eq!(s.rotation, 0.0);
        assert_eq!(s.color, [1.0, 1.0, 1.0]);
        assert!(!s.flip_h && !s.flip_v && !s.additive);
    }

    #[test]
    fn parameter_latch_is_active_only_inside_span() {
        let tl = timeline(vec![
            basic(CommandKind::Fade { from: 1.0, to: 1.0 }, 0.0, 2000.0),
            basic(
                CommandKind::Parameter(ParameterKind::Additive),
                500.0,
                1000.0,
            ),
        ]);
        assert!(!resolve_state(&sprite(), &tl, 400.0).additive);
        assert!(resolve_state(&sprite(), &tl, 700.0).additive);
        assert!(!resolve_state(&sprite(), &tl, 1500.0).additive);
    }

    #[test]
    fn zero_duration_parameter_latches_forever() {
        let tl = timeline(vec![
            basic(CommandKind::Fade { from: 1.0, to: 1.0 }, 0.0, 2000.0),
            basic(CommandKind::Parameter(ParameterKind::FlipH), 500.0, 500.0),
        ]);
        assert!(!resolve_state(&sprite(), &tl, 400.0).flip_h);
        assert!(resolve_state(&sprite(), &tl, 1900.0).flip_h);
    }

    #[test]
    fn animation_frames_clamp_and_wrap() {
        let mut sp = sprite();
        sp.animation = Some(SpriteAnimation {
            frame_count: 4,
            frame_delay_ms: 100.0,
            loop_forever: false,
            frame_paths: vec![
                "sb/test0.png".into(),
                "sb/test1.png".into(),
                "sb/test2.png".into(),
                "sb/test3.png".into(),
            ],
        });
        let tl = timeline(vec![basic(
            CommandKind::Fade { from: 1.0, to: 1.0 },
            0.0,
            10_000.0,
        )]);
        assert_eq!(resolve_state(&sp, &tl, 0.0).frame, 0);
        assert_eq!(resolve_state(&sp, &tl, 250.0).frame, 2);
        // Loop-once clamps to the final frame.
        assert_eq!(resolve_state(&sp, &tl, 9000.0).frame, 3);

        if let Some(a) = sp.animation.as_mut() {
            a.loop_forever = true;
        }
        assert_eq!(resolve_state(&sp, &tl, 450.0).frame, 0);
        assert_eq!(resolve_state(&sp, &tl, 550.0).frame, 1);
    }
}
