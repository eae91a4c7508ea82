// Beatmap payload loading. The previewer consumes a pre-fetched JSON
// payload; an undecodable payload is the one hard load failure in the whole
// pipeline.

use crate::game::play::{Note, NoteKind};
use crate::game::scroll::VelocityPoint;
use crate::game::storyboard::{
    BasicTemplate, CommandKind, Layer, Origin, ParameterKind, RawCommand, Sprite, SpriteAnimation,
};
use log::{info, warn};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use smallvec::SmallVec;
use std::error::Error;
use std::path::Path;

#[derive(Deserialize)]
struct NoteDto {
    column: u8,
    time: f64,
    #[serde(default)]
    end: Option<f64>,
}

#[derive(Deserialize)]
struct VelocityDto {
    time: f64,
    multiplier: f32,
}

#[derive(Deserialize)]
struct AnimationDto {
    frames: usize,
    delay: f64,
    #[serde(default, rename = "loop")]
    loop_forever: bool,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BasicDto {
    Fade {
        #[serde(default)]
        easing: u8,
        start: f64,
        end: f64,
        from: f32,
        to: f32,
    },
    Move {
        #[serde(default)]
        easing: u8,
        start: f64,
        end: f64,
        from: [f32; 2],
        to: [f32; 2],
    },
    MoveX {
        #[serde(default)]
        easing: u8,
        start: f64,
        end: f64,
        from: f32,
        to: f32,
    },
    MoveY {
        #[serde(default)]
        easing: u8,
        start: f64,
        end: f64,
        from: f32,
        to: f32,
    },
    Scale {
        #[serde(default)]
        easing: u8,
        start: f64,
        end: f64,
        from: f32,
        to: f32,
    },
    VectorScale {
        #[serde(default)]
        easing: u8,
        start: f64,
        end: f64,
        from: [f32; 2],
        to: [f32; 2],
    },
    Rotate {
        #[serde(default)]
        easing: u8,
        start: f64,
        end: f64,
        from: f32,
        to: f32,
    },
    Color {
        #[serde(default)]
        easing: u8,
        start: f64,
        end: f64,
        from: [f32; 3],
        to: [f32; 3],
    },
    Parameter {
        start: f64,
        end: f64,
        kind: String,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CommandDto {
    Loop {
        start: f64,
        count: u32,
        commands: Vec<BasicDto>,
    },
    Trigger {
        name: String,
        start: f64,
        end: f64,
        commands: Vec<BasicDto>,
    },
    #[serde(untagged)]
    Basic(BasicDto),
}

#[derive(Deserialize)]
struct SpriteDto {
    #[serde(default)]
    layer: u8,
    #[serde(default)]
    origin: u8,
    x: f32,
    y: f32,
    texture: String,
    #[serde(default)]
    animation: Option<AnimationDto>,
    #[serde(default)]
    commands: Vec<CommandDto>,
}

#[derive(Deserialize, Default)]
struct StoryboardDto {
    #[serde(default)]
    widescreen: bool,
    #[serde(default)]
    sprites: Vec<SpriteDto>,
}

#[derive(Deserialize)]
struct BeatmapDto {
    #[serde(default)]
    title: String,
    od: f32,
    columns: u8,
    notes: Vec<NoteDto>,
    #[serde(default)]
    velocities: Vec<VelocityDto>,
    #[serde(default)]
    storyboard: StoryboardDto,
}

/// Loaded chart, runtime-typed. Read-only after load.
pub struct Beatmap {
    pub title: String,
    pub od: f32,
    pub columns: u8,
    pub notes: Vec<Note>,
    pub velocities: Vec<VelocityPoint>,
    pub widescreen: bool,
    pub sprites: Vec<Sprite>,
    pub raw_commands: FxHashMap<u32, Vec<RawCommand>>,
}

impl Beatmap {
    /// Hit-event timestamps for trigger expansion: every note's head time.
    pub fn hit_times(&self) -> Vec<f64> {
        self.notes.iter().map(|n| n.time_ms).collect()
    }
}

pub fn load(path: &Path) -> Result<Beatmap, Box<dyn Error>> {
    let text = std::fs::read_to_string(path)?;
    let dto: BeatmapDto = serde_json::from_str(&text)?;
    let map = from_dto(dto);
    info!(
        "beatmap '{}': {} notes, {}K, OD {}, {} sprites",
        map.title,
        map.notes.len(),
        map.columns,
        map.od,
        map.sprites.len()
    );
    Ok(map)
}

fn from_dto(dto: BeatmapDto) -> Beatmap {
    let mut notes: Vec<Note> = dto
        .notes
        .iter()
        .map(|n| Note {
            column: n.column,
            time_ms: n.time,
            kind: match n.end {
                Some(end_ms) => NoteKind::Hold { end_ms },
                None => NoteKind::Tap,
            },
        })
        .collect();
    notes.sort_by(|a, b| {
        a.time_ms
            .partial_cmp(&b.time_ms)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let velocities = dto
        .velocities
        .iter()
        .map(|v| VelocityPoint {
            time_ms: v.time,
            multiplier: v.multiplier,
        })
        .collect();

    let mut sprites = Vec::with_capacity(dto.storyboard.sprites.len());
    let mut raw_commands = FxHashMap::default();
    for (i, s) in dto.storyboard.sprites.into_iter().enumerate() {
        let id = i as u32;
        let animation = s.animation.map(|a| SpriteAnimation {
            frame_count: a.frames,
            frame_delay_ms: a.delay,
            loop_forever: a.loop_forever,
            frame_paths: frame_paths(&s.texture, a.frames),
        });
        sprites.push(Sprite {
            id,
            layer: Layer::from_id(s.layer),
            origin: Origin::from_id(s.origin),
            base_pos: [s.x, s.y],
            texture: s.texture,
            animation,
        });
        let commands: Vec<RawCommand> = s.commands.into_iter().filter_map(raw_command).collect();
        raw_commands.insert(id, commands);
    }

    Beatmap {
        title: dto.title,
        od: dto.od,
        columns: dto.columns,
        notes,
        velocities,
        widescreen: dto.storyboard.widescreen,
        sprites,
        raw_commands,
    }
}

/// "sb/fire.png" -> ["sb/fire0.png", "sb/fire1.png", ...].
fn frame_paths(texture: &str, frames: usize) -> Vec<String> {
    let (stem, ext) = match texture.rfind('.') {
        Some(dot) => (&texture[..dot], &texture[dot..]),
        None => (texture, ""),
    };
    (0..frames).map(|i| format!("{stem}{i}{ext}")).collect()
}

fn raw_command(dto: CommandDto) -> Option<RawCommand> {
    match dto {
        CommandDto::Basic(b) => {
            let (kind, easing, start_ms, end_ms) = basic_parts(b)?;
            Some(RawCommand::Basic {
                kind,
                easing,
                start_ms,
                end_ms,
            })
        }
        CommandDto::Loop {
            start,
            count,
            commands,
        } => Some(RawCommand::Loop {
            start_ms: start,
            count,
            commands: templates(commands),
        }),
        CommandDto::Trigger {
            name,
            start,
            end,
            commands,
        } => Some(RawCommand::Trigger {
            name,
            start_ms: start,
            end_ms: end,
            commands: templates(commands),
        }),
    }
}

fn templates(dtos: Vec<BasicDto>) -> SmallVec<[BasicTemplate; 4]> {
    dtos.into_iter()
        .filter_map(|b| {
            let (kind, easing, start_ms, end_ms) = basic_parts(b)?;
            Some(BasicTemplate {
                kind,
                easing,
                start_ms,
                end_ms,
            })
        })
        .collect()
}

fn basic_parts(dto: BasicDto) -> Option<(CommandKind, u8, f64, f64)> {
    Some(match dto {
        BasicDto::Fade {
            easing,
            start,
            end,
            from,
            to,
        } => (CommandKind::Fade { from, to }, easing, start, end),
        BasicDto::Move {
            easing,
            start,
            end,
            from,
            to,
        } => (CommandKind::Move { from, to }, easing, start, end),
        BasicDto::MoveX {
            easing,
            start,
            end,
            from,
            to,
        } => (CommandKind::MoveX { from, to }, easing, start, end),
        BasicDto::MoveY {
            easing,
            start,
            end,
            from,
            to,
        } => (CommandKind::MoveY { from, to }, easing, start, end),
        BasicDto::Scale {
            easing,
            start,
            end,
            from,
            to,
        } => (CommandKind::Scale { from, to }, easing, start, end),
        BasicDto::VectorScale {
            easing,
            start,
            end,
            from,
            to,
        } => (CommandKind::VectorScale { from, to }, easing, start, end),
        BasicDto::Rotate {
            easing,
            start,
            end,
            from,
            to,
        } => (CommandKind::Rotate { from, to }, easing, start, end),
        BasicDto::Color {
            easing,
            start,
            end,
            from,
            to,
        } => (CommandKind::Color { from, to }, easing, start, end),
        BasicDto::Parameter { start, end, kind } => {
            let p = match kind.as_str() {
                "h" | "H" => ParameterKind::FlipH,
                "v" | "V" => ParameterKind::FlipV,
                "a" | "A" => ParameterKind::Additive,
                other => {
                    warn!("unknown parameter kind '{other}', skipping");
                    return None;
                }
            };
            (CommandKind::Parameter(p), 0, start, end)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "title": "Test",
        "od": 8.0,
        "columns": 4,
        "notes": [
            {"column": 1, "time": 2000.0, "end": 2600.0},
            {"column": 0, "time": 1000.0}
        ],
        "velocities": [{"time": 500.0, "multiplier": 1.5}],
        "storyboard": {
            "widescreen": true,
            "sprites": [{
                "layer": 0,
                "origin": 1,
                "x": 320.0,
                "y": 240.0,
                "texture": "sb/bg.png",
                "commands": [
                    {"type": "fade", "start": 0.0, "end": 1000.0, "from": 0.0, "to": 1.0},
                    {"type": "loop", "start": 1000.0, "count": 2, "commands": [
                        {"type": "scale", "start": 0.0, "end": 100.0, "from": 1.0, "to": 1.2}
                    ]}
                ]
            }]
        }
    }"#;

    fn parsed() -> Beatmap {
        let dto: BeatmapDto = serde_json::from_str(PAYLOAD).expect("payload parses");
        from_dto(dto)
    }

    #[test]
    fn payload_round_trips_into_runtime_types() {
        let map = parsed();
        assert_eq!(map.od, 8.0);
        assert_eq!(map.columns, 4);
        assert!(map.widescreen);
        // Notes come out time-sorted regardless of payload order.
        assert_eq!(map.notes[0].time_ms, 1000.0);
        assert_eq!(map.notes[0].kind, NoteKind::Tap);
        assert_eq!(
            map.notes[1].kind,
            NoteKind::Hold { end_ms: 2600.0 }
        );
        assert_eq!(map.velocities.len(), 1);
        assert_eq!(map.sprites.len(), 1);
        assert_eq!(map.raw_commands[&0].len(), 2);
    }

    #[test]
    fn hit_times_are_note_heads() {
        assert_eq!(parsed().hit_times(), vec![1000.0, 2000.0]);
    }

    #[test]
    fn animation_frame_paths() {
        assert_eq!(
            frame_paths("sb/fire.png", 3),
            vec!["sb/fire0.png", "sb/fire1.png", "sb/fire2.png"]
        );
        assert_eq!(frame_paths("noext", 2), vec!["noext0", "noext1"]);
    }

    #[test]
    fn garbage_payload_is_a_hard_error() {
        assert!(serde_json::from_str::<BeatmapDto>("{\"od\": \"eight\"}").is_err());
    }

    #[test]
    fn unknown_parameter_kind_is_skipped() {
        let dto: BasicDto = serde_json::from_str(
            r#"{"type": "parameter", "start": 0.0, "end": 1.0, "kind": "x"}"#,
        )
        .unwrap();
        assert!(basic_parts(dto).is_none());
    }
}
