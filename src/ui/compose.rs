// Frame assembly: evaluated storyboard states, playfield quads and HUD bars
// become one ordered draw list. Order within a storyboard layer is fixed at
// load (ascending sprite id); nothing here re-sorts per frame.

use crate::core::gfx::{BlendMode, ObjectType, RenderList, RenderObject, Texture};
use crate::game::play::{NoteKind, Playfield};
use crate::game::scroll::ScrollMap;
use crate::game::storyboard::{Layer, Sprite, SpriteTimeline, evaluate};
use glam::{Mat4, Vec3};
use rustc_hash::{FxHashMap, FxHashSet};
use std::borrow::Cow;

pub const CANVAS_WIDE: (f32, f32) = (854.0, 480.0);
pub const CANVAS_NARROW: (f32, f32) = (640.0, 480.0);

const RECEPTOR_Y: f32 = 420.0;
const COLUMN_W: f32 = 48.0;
const NOTE_H: f32 = 14.0;
const SCROLL_PX_PER_MS: f32 = 0.6;

const CAMERA_CANVAS: u8 = 0;
const CAMERA_WINDOW: u8 = 1;

#[inline(always)]
pub fn canvas_size(widescreen: bool) -> (f32, f32) {
    if widescreen { CANVAS_WIDE } else { CANVAS_NARROW }
}

/// Per-layer draw order, fixed once at load: ascending sprite id within each
/// layer, restricted to sprites that survived command compilation.
pub struct SceneOrder {
    pub background: Vec<usize>,
    pub foreground: Vec<usize>,
}

impl SceneOrder {
    pub fn new(sprites: &[Sprite], timelines: &FxHashMap<u32, SpriteTimeline>) -> Self {
        let mut background = Vec::new();
        let mut foreground = Vec::new();
        for (idx, s) in sprites.iter().enumerate() {
            if !timelines.contains_key(&s.id) {
                continue;
            }
            match s.layer {
                Layer::Background => background.push(idx),
                Layer::Foreground => foreground.push(idx),
            }
        }
        background.sort_by_key(|&i| sprites[i].id);
        foreground.sort_by_key(|&i| sprites[i].id);
        Self {
            background,
            foreground,
        }
    }
}

/// How the logical canvas sits inside the physical window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

pub fn fit_canvas(window_w: f32, window_h: f32, canvas_w: f32, canvas_h: f32) -> Viewport {
    let scale = (window_w / canvas_w).min(window_h / canvas_h);
    Viewport {
        scale,
        offset_x: (window_w - canvas_w * scale) * 0.5,
        offset_y: (window_h - canvas_h * scale) * 0.5,
    }
}

/// Window-space ortho, y-down.
fn window_camera(window_w: f32, window_h: f32) -> Mat4 {
    Mat4::orthographic_rh(0.0, window_w, window_h, 0.0, -1.0, 1.0)
}

/// Canvas-space camera: canvas coordinates, centered and letterboxed in the
/// window.
fn canvas_camera(window_w: f32, window_h: f32, vp: Viewport) -> Mat4 {
    window_camera(window_w, window_h)
        * Mat4::from_translation(Vec3::new(vp.offset_x, vp.offset_y, 0.0))
        * Mat4::from_scale(Vec3::new(vp.scale, vp.scale, 1.0))
}

/// Unit-quad transform for an evaluated sprite: translate to position, rotate,
/// scale by texture size (flips as sign flips), then shift the quad so the
/// origin anchor lands on the position.
pub fn sprite_transform(
    pos: [f32; 2],
    rotation: f32,
    scale: [f32; 2],
    flip_h: bool,
    flip_v: bool,
    anchor: [f32; 2],
    tex_w: f32,
    tex_h: f32,
) -> Mat4 {
    let sx = tex_w * scale[0] * if flip_h { -1.0 } else { 1.0 };
    let sy = tex_h * scale[1] * if flip_v { -1.0 } else { 1.0 };
    Mat4::from_translation(Vec3::new(pos[0], pos[1], 0.0))
        * Mat4::from_rotation_z(rotation)
        * Mat4::from_scale(Vec3::new(sx, sy, 1.0))
        * Mat4::from_translation(Vec3::new(0.5 - anchor[0], 0.5 - anchor[1], 0.0))
}

/// Axis-aligned quad in canvas/window space, top-left + size.
fn quad_transform(x: f32, y: f32, w: f32, h: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(x + w * 0.5, y + h * 0.5, 0.0))
        * Mat4::from_scale(Vec3::new(w, h, 1.0))
}

pub struct FrameInput<'a> {
    pub time_ms: f64,
    pub window_w: f32,
    pub window_h: f32,
    pub widescreen: bool,
    pub sprites: &'a [Sprite],
    pub timelines: &'a FxHashMap<u32, SpriteTimeline>,
    pub order: &'a SceneOrder,
    pub textures: &'a FxHashMap<String, Texture>,
    pub playfield: &'a Playfield,
    pub scroll: &'a ScrollMap,
}

/// Build the frame's draw list: storyboard background, playfield, storyboard
/// foreground, HUD, letterbox bars. Sprites with missing textures are skipped
/// and recorded.
pub fn build_frame<'a>(
    input: &FrameInput<'a>,
    missing: &mut FxHashSet<String>,
) -> RenderList<'a> {
    let (canvas_w, canvas_h) = canvas_size(input.widescreen);
    let vp = fit_canvas(input.window_w, input.window_h, canvas_w, canvas_h);

    let cameras = vec![
        canvas_camera(input.window_w, input.window_h, vp),
        window_camera(input.window_w, input.window_h),
    ];

    let mut objects = Vec::new();
    push_storyboard_layer(input, &input.order.background, missing, &mut objects);
    push_playfield(input, canvas_w, &mut objects);
    push_storyboard_layer(input, &input.order.foreground, missing, &mut objects);
    push_hud(input, canvas_h, &mut objects);
    push_letterbox(input, vp, canvas_w, canvas_h, &mut objects);

    RenderList {
        clear_color: [0.0, 0.0, 0.0, 1.0],
        cameras,
        objects,
    }
}

fn push_storyboard_layer<'a>(
    input: &FrameInput<'a>,
    layer_order: &[usize],
    missing: &mut FxHashSet<String>,
    out: &mut Vec<RenderObject<'a>>,
) {
    for &idx in layer_order {
        let sprite = &input.sprites[idx];
        let Some(timeline) = input.timelines.get(&sprite.id) else {
            continue;
        };
        let Some(state) = evaluate::evaluate(sprite, timeline, input.time_ms) else {
            continue;
        };
        let texture_id = sprite.frame_texture(state.frame);
        let Some(tex) = input.textures.get(texture_id) else {
            // contains-check first so a permanently absent texture does not
            // allocate a fresh key every frame.
            if !missing.contains(texture_id) {
                missing.insert(texture_id.to_string());
            }
            continue;
        };
        let transform = sprite_transform(
            state.pos,
            state.rotation,
            state.scale,
            state.flip_h,
            state.flip_v,
            sprite.origin.anchor(),
            tex.image.width() as f32,
            tex.image.height() as f32,
        );
        out.push(RenderObject {
            object_type: ObjectType::Sprite {
                texture_id: Cow::Borrowed(texture_id),
                tint: [state.color[0], state.color[1], state.color[2], state.alpha],
            },
            transform,
            blend: if state.additive {
                BlendMode::Add
            } else {
                BlendMode::Alpha
            },
            camera: CAMERA_CANVAS,
        });
    }
}

fn push_playfield<'a>(input: &FrameInput<'a>, canvas_w: f32, out: &mut Vec<RenderObject<'a>>) {
    let column_count = input.playfield.column_count();
    if column_count == 0 {
        return;
    }
    let field_w = COLUMN_W * f32::from(column_count);
    let field_x = (canvas_w - field_w) * 0.5;

    // Field backdrop and receptor line.
    out.push(RenderObject {
        object_type: ObjectType::Quad {
            color: [0.0, 0.0, 0.0, 0.55],
        },
        transform: quad_transform(field_x, 0.0, field_w, 480.0),
        blend: BlendMode::Alpha,
        camera: CAMERA_CANVAS,
    });
    out.push(RenderObject {
        object_type: ObjectType::Quad {
            color: [0.85, 0.85, 0.85, 0.9],
        },
        transform: quad_transform(field_x, RECEPTOR_Y - 2.0, field_w, 4.0),
        blend: BlendMode::Alpha,
        camera: CAMERA_CANVAS,
    });

    let now_pos = input.scroll.position(input.time_ms);
    for (i, note) in input.playfield.notes().iter().enumerate() {
        if input.playfield.is_judged(i) {
            continue;
        }
        let x = field_x + COLUMN_W * f32::from(note.column) + 2.0;
        let head_y = RECEPTOR_Y - (input.scroll.position(note.time_ms) - now_pos) * SCROLL_PX_PER_MS;
        match note.kind {
            NoteKind::Tap => {
                if !(-NOTE_H..=480.0 + NOTE_H).contains(&head_y) {
                    continue;
                }
                out.push(RenderObject {
                    object_type: ObjectType::Quad {
                        color: [0.95, 0.95, 1.0, 1.0],
                    },
                    transform: quad_transform(x, head_y - NOTE_H * 0.5, COLUMN_W - 4.0, NOTE_H),
                    blend: BlendMode::Alpha,
                    camera: CAMERA_CANVAS,
                });
            }
            NoteKind::Hold { end_ms } => {
                let tail_y =
                    RECEPTOR_Y - (input.scroll.position(end_ms) - now_pos) * SCROLL_PX_PER_MS;
                if (head_y < -NOTE_H && tail_y < -NOTE_H)
                    || (head_y > 480.0 + NOTE_H && tail_y > 480.0 + NOTE_H)
                {
                    continue;
                }
                let top = tail_y.min(head_y);
                out.push(RenderObject {
                    object_type: ObjectType::Quad {
                        color: [0.6, 0.8, 1.0, 0.8],
                    },
                    transform: quad_transform(
                        x + 6.0,
                        top,
                        COLUMN_W - 16.0,
                        (head_y - tail_y).abs().max(NOTE_H),
                    ),
                    blend: BlendMode::Alpha,
                    camera: CAMERA_CANVAS,
                });
                out.push(RenderObject {
                    object_type: ObjectType::Quad {
                        color: [0.95, 0.95, 1.0, 1.0],
                    },
                    transform: quad_transform(x, head_y - NOTE_H * 0.5, COLUMN_W - 4.0, NOTE_H),
                    blend: BlendMode::Alpha,
                    camera: CAMERA_CANVAS,
                });
            }
        }
    }
}

/// Meter-bar HUD: combo, accuracy and score as plain quads, last judgement as
/// a colored marker. The judgement stream itself goes to the log.
fn push_hud<'a>(input: &FrameInput<'a>, canvas_h: f32, out: &mut Vec<RenderObject<'a>>) {
    let score = &input.playfield.score;

    let bar = |out: &mut Vec<RenderObject<'a>>, y: f32, frac: f32, color: [f32; 4]| {
        out.push(RenderObject {
            object_type: ObjectType::Quad {
                color: [0.1, 0.1, 0.1, 0.7],
            },
            transform: quad_transform(8.0, y, 120.0, 8.0),
            blend: BlendMode::Alpha,
            camera: CAMERA_CANVAS,
        });
        out.push(RenderObject {
            object_type: ObjectType::Quad { color },
            transform: quad_transform(8.0, y, 120.0 * frac.clamp(0.0, 1.0), 8.0),
            blend: BlendMode::Alpha,
            camera: CAMERA_CANVAS,
        });
    };

    bar(
        out,
        canvas_h - 44.0,
        score.score() as f32 / 1_000_000.0,
        [1.0, 0.85, 0.3, 0.9],
    );
    bar(
        out,
        canvas_h - 32.0,
        score.accuracy() as f32,
        [0.4, 1.0, 0.5, 0.9],
    );
    bar(
        out,
        canvas_h - 20.0,
        score.combo as f32 / score.max_combo.max(10) as f32,
        [0.4, 0.7, 1.0, 0.9],
    );

    if let Some(last) = score.last {
        use crate::game::judge::Judgement;
        let color = match last {
            Judgement::Perfect => [0.6, 0.9, 1.0, 1.0],
            Judgement::Great => [1.0, 0.85, 0.3, 1.0],
            Judgement::Good => [0.4, 0.9, 0.4, 1.0],
            Judgement::Ok => [0.3, 0.5, 0.9, 1.0],
            Judgement::Meh => [0.6, 0.6, 0.6, 1.0],
            Judgement::Miss => [0.9, 0.2, 0.2, 1.0],
        };
        out.push(RenderObject {
            object_type: ObjectType::Quad { color },
            transform: quad_transform(8.0, canvas_h - 60.0, 12.0, 12.0),
            blend: BlendMode::Alpha,
            camera: CAMERA_CANVAS,
        });
    }
}

/// Opaque bars covering the window area outside the scaled canvas.
fn push_letterbox<'a>(
    input: &FrameInput<'a>,
    vp: Viewport,
    canvas_w: f32,
    canvas_h: f32,
    out: &mut Vec<RenderObject<'a>>,
) {
    const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
    let scaled_w = canvas_w * vp.scale;
    let scaled_h = canvas_h * vp.scale;

    let mut bar = |x: f32, y: f32, w: f32, h: f32| {
        if w < 0.5 || h < 0.5 {
            return;
        }
        out.push(RenderObject {
            object_type: ObjectType::Quad { color: BLACK },
            transform: quad_transform(x, y, w, h),
            blend: BlendMode::Alpha,
            camera: CAMERA_WINDOW,
        });
    };

    bar(0.0, 0.0, vp.offset_x, input.window_h);
    bar(
        vp.offset_x + scaled_w,
        0.0,
        input.window_w - vp.offset_x - scaled_w,
        input.window_h,
    );
    bar(0.0, 0.0, input.window_w, vp.offset_y);
    bar(
        0.0,
        vp.offset_y + scaled_h,
        input.window_w,
        input.window_h - vp.offset_y - scaled_h,
    );
}
