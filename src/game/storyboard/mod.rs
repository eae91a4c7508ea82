pub mod compile;
pub mod evaluate;

use smallvec::SmallVec;

/// Storyboards draw in exactly two layers relative to the playfield.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Layer {
    Background,
    Foreground,
}

impl Layer {
    #[inline(always)]
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => Self::Foreground,
            _ => Self::Background,
        }
    }
}

/// Sprite origin anchor, as a fraction of the texture rect.
/// The numeric ids match the order they appear in storyboard data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    TopLeft,
    Centre,
    CentreLeft,
    TopRight,
    BottomCentre,
    TopCentre,
    // Custom is documented but behaves as TopLeft in practice.
    Custom,
    CentreRight,
    BottomLeft,
    BottomRight,
}

impl Origin {
    #[inline(always)]
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => Self::Centre,
            2 => Self::CentreLeft,
            3 => Self::TopRight,
            4 => Self::BottomCentre,
            5 => Self::TopCentre,
            6 => Self::Custom,
            7 => Self::CentreRight,
            8 => Self::BottomLeft,
            9 => Self::BottomRight,
            _ => Self::TopLeft,
        }
    }

    /// Anchor point inside the texture rect, in [0,1] x [0,1], y-down.
    #[inline(always)]
    pub fn anchor(self) -> [f32; 2] {
        match self {
            Self::TopLeft | Self::Custom => [0.0, 0.0],
            Self::Centre => [0.5, 0.5],
            Self::CentreLeft => [0.0, 0.5],
            Self::TopRight => [1.0, 0.0],
            Self::BottomCentre => [0.5, 1.0],
            Self::TopCentre => [0.5, 0.0],
            Self::CentreRight => [1.0, 0.5],
            Self::BottomLeft => [0.0, 1.0],
            Self::BottomRight => [1.0, 1.0],
        }
    }
}

/// Frame sequence for animated sprites. `frame_paths` are resolved at load
/// time from the base texture path ("sb/fire.png" -> "sb/fire0.png", ...).
#[derive(Clone, Debug)]
pub struct SpriteAnimation {
    pub frame_count: usize,
    pub frame_delay_ms: f64,
    pub loop_forever: bool,
    pub frame_paths: Vec<String>,
}

/// One animatable storyboard object. Immutable after load; the active time
/// window lives on the compiled timeline, derived from its commands.
#[derive(Clone, Debug)]
pub struct Sprite {
    pub id: u32,
    pub layer: Layer,
    pub origin: Origin,
    pub base_pos: [f32; 2],
    pub texture: String,
    pub animation: Option<SpriteAnimation>,
}

impl Sprite {
    /// Texture path for a given animation frame (the base path for static
    /// sprites).
    #[inline(always)]
    pub fn frame_texture(&self, frame: usize) -> &str {
        match &self.animation {
            Some(anim) => anim
                .frame_paths
                .get(frame)
                .map_or(self.texture.as_str(), String::as_str),
            None => &self.texture,
        }
    }
}

/// Parameter commands are boolean latches, not interpolated values.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParameterKind {
    FlipH,
    FlipV,
    Additive,
}

/// The closed set of animatable properties. Matched exhaustively so a new
/// command kind is a compile-time decision, not a silently ignored tag.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum CommandKind {
    Fade { from: f32, to: f32 },
    Move { from: [f32; 2], to: [f32; 2] },
    MoveX { from: f32, to: f32 },
    MoveY { from: f32, to: f32 },
    Scale { from: f32, to: f32 },
    VectorScale { from: [f32; 2], to: [f32; 2] },
    Rotate { from: f32, to: f32 },
    Color { from: [f32; 3], to: [f32; 3] },
    Parameter(ParameterKind),
}

/// A compiled, absolute-time command. `seq` is the original declaration
/// index; the (start, seq) stable order is load-bearing for first-command
/// pre-roll resolution and last-writer-wins overlap semantics.
#[derive(Clone, Debug)]
pub struct Command {
    pub kind: CommandKind,
    pub easing: u8,
    pub start_ms: f64,
    pub end_ms: f64,
    pub seq: u32,
}

impl Command {
    /// end < start degrades to a zero-duration command instead of an error.
    #[inline(always)]
    pub fn clamped_end(&self) -> f64 {
        self.end_ms.max(self.start_ms)
    }
}

/// Raw per-sprite command stream as it comes out of the beatmap payload,
/// before loop/trigger expansion.
#[derive(Clone, Debug)]
pub enum RawCommand {
    Basic {
        kind: CommandKind,
        easing: u8,
        start_ms: f64,
        end_ms: f64,
    },
    Loop {
        start_ms: f64,
        count: u32,
        commands: SmallVec<[BasicTemplate; 4]>,
    },
    Trigger {
        name: String,
        start_ms: f64,
        end_ms: f64,
        commands: SmallVec<[BasicTemplate; 4]>,
    },
}

/// Sub-command template inside a loop/trigger; times are relative to the
/// loop iteration / triggering event.
#[derive(Clone, Debug)]
pub struct BasicTemplate {
    pub kind: CommandKind,
    pub easing: u8,
    pub start_ms: f64,
    pub end_ms: f64,
}

/// Compiled per-sprite timeline: sorted commands plus the derived active
/// window. Read-only after load.
#[derive(Clone, Debug, Default)]
pub struct SpriteTimeline {
    pub commands: Vec<Command>,
    pub start_ms: f64,
    pub end_ms: f64,
}
