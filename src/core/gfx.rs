// CPU rasterizer on a softbuffer surface. The draw list arrives already
// ordered (layer order is fixed at load), so drawing is a single pass;
// texture/blend state is tracked only to report how often it changes.

use glam::{Mat4, Vec4};
use image::RgbaImage;
use log::info;
use rustc_hash::FxHashMap;
use std::borrow::Cow;
use std::error::Error;
use std::num::NonZeroU32;
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::window::Window;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendMode {
    /// src*a + dst*(1-a)
    Alpha,
    /// src*a + dst
    Add,
}

#[derive(Clone)]
pub enum ObjectType<'a> {
    Sprite {
        texture_id: Cow<'a, str>,
        tint: [f32; 4],
    },
    Quad {
        color: [f32; 4],
    },
}

#[derive(Clone)]
pub struct RenderObject<'a> {
    pub object_type: ObjectType<'a>,
    pub transform: Mat4,
    pub blend: BlendMode,
    pub camera: u8,
}

#[derive(Clone)]
pub struct RenderList<'a> {
    pub clear_color: [f32; 4],
    pub cameras: Vec<Mat4>,
    pub objects: Vec<RenderObject<'a>>,
}

pub struct Texture {
    pub image: RgbaImage,
}

/// Per-frame draw accounting, surfaced in the debug log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub objects: u32,
    pub texture_binds: u32,
    pub blend_switches: u32,
}

pub struct State {
    _context: softbuffer::Context<Arc<Window>>,
    surface: softbuffer::Surface<Arc<Window>, Arc<Window>>,
    window_size: PhysicalSize<u32>,
}

pub fn init(window: Arc<Window>) -> Result<State, Box<dyn Error>> {
    info!("initializing software renderer (softbuffer)");
    let window_size = window.inner_size();
    let context = softbuffer::Context::new(window.clone())?;
    let surface = softbuffer::Surface::new(&context, window)?;
    Ok(State {
        _context: context,
        surface,
        window_size,
    })
}

pub fn create_texture(image: RgbaImage) -> Texture {
    Texture { image }
}

pub fn resize(state: &mut State, width: u32, height: u32) {
    if width == 0 || height == 0 {
        return;
    }
    state.window_size = PhysicalSize::new(width, height);
}

pub fn cleanup(_state: &mut State) {
    info!("software renderer cleanup");
}

/// Synchronous rasterizer; dropping the map is the whole disposal.
pub fn dispose_textures(textures: &mut FxHashMap<String, Texture>) {
    let count = textures.len();
    textures.clear();
    info!("disposed {count} textures");
}

/// State-change accounting over an ordered draw list: a texture bind happens
/// only when the bound texture actually differs from the previous sprite's,
/// a blend switch only when the mode differs. The list is never reordered to
/// improve these numbers.
pub fn count_state_changes(objects: &[RenderObject<'_>]) -> (u32, u32) {
    let mut texture_binds = 0;
    let mut blend_switches = 0;
    let mut bound: Option<&str> = None;
    let mut blend: Option<BlendMode> = None;
    for obj in objects {
        if let ObjectType::Sprite { texture_id, .. } = &obj.object_type {
            if bound != Some(texture_id.as_ref()) {
                texture_binds += 1;
                bound = Some(texture_id.as_ref());
            }
        }
        if blend != Some(obj.blend) {
            blend_switches += 1;
            blend = Some(obj.blend);
        }
    }
    (texture_binds, blend_switches)
}

pub fn draw(
    state: &mut State,
    render_list: &RenderList<'_>,
    textures: &FxHashMap<String, Texture>,
) -> Result<DrawStats, Box<dyn Error>> {
    let PhysicalSize { width, height } = state.window_size;
    let (Some(nz_w), Some(nz_h)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
        return Ok(DrawStats::default());
    };
    let w = width as usize;
    let h = height as usize;

    state.surface.resize(nz_w, nz_h)?;
    let mut buffer = state.surface.buffer_mut()?;

    let clear = pack_rgba(render_list.clear_color);
    for pixel in buffer.iter_mut() {
        *pixel = clear;
    }

    let mut drawn = 0u32;
    for obj in &render_list.objects {
        let Some(proj) = render_list.cameras.get(usize::from(obj.camera)) else {
            continue;
        };
        match &obj.object_type {
            ObjectType::Sprite { texture_id, tint } => {
                let Some(tex) = textures.get(texture_id.as_ref()) else {
                    // Missing textures are skipped upstream; this is a
                    // belt-and-braces guard, not a warning path.
                    continue;
                };
                drawn += rasterize_quad(
                    proj,
                    &obj.transform,
                    *tint,
                    Some(&tex.image),
                    obj.blend,
                    w,
                    h,
                    &mut buffer,
                );
            }
            ObjectType::Quad { color } => {
                drawn += rasterize_quad(
                    proj,
                    &obj.transform,
                    *color,
                    None,
                    obj.blend,
                    w,
                    h,
                    &mut buffer,
                );
            }
        }
    }

    buffer.present()?;

    let (texture_binds, blend_switches) = count_state_changes(&render_list.objects);
    Ok(DrawStats {
        objects: drawn,
        texture_binds,
        blend_switches,
    })
}

#[inline(always)]
fn pack_rgba(c: [f32; 4]) -> u32 {
    let ch = |x: f32| (x.clamp(0.0, 1.0).mul_add(255.0, 0.5)) as u32;
    (ch(c[3]) << 24) | (ch(c[0]) << 16) | (ch(c[1]) << 8) | ch(c[2])
}

#[derive(Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    u: f32,
    v: f32,
}

/// Transform the unit centered quad by `proj * transform` and rasterize it as
/// two triangles. `image: None` draws a flat-color quad.
#[inline(always)]
fn rasterize_quad(
    proj: &Mat4,
    transform: &Mat4,
    tint: [f32; 4],
    image: Option<&RgbaImage>,
    blend: BlendMode,
    width: usize,
    height: usize,
    buffer: &mut [u32],
) -> u32 {
    if tint[3] <= 0.0 || width == 0 || height == 0 {
        return 0;
    }

    let mvp = *proj * *transform;

    const POS: [(f32, f32); 4] = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];
    const UV: [(f32, f32); 4] = [(0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)];

    let mut v = [ScreenVertex {
        x: 0.0,
        y: 0.0,
        u: 0.0,
        v: 0.0,
    }; 4];
    for i in 0..4 {
        let (lx, ly) = POS[i];
        let clip = mvp * Vec4::new(lx, ly, 0.0, 1.0);
        if clip.w == 0.0 {
            return 0;
        }
        let ndc_x = clip.x / clip.w;
        let ndc_y = clip.y / clip.w;
        if !ndc_x.is_finite() || !ndc_y.is_finite() {
            return 0;
        }
        v[i] = ScreenVertex {
            x: (ndc_x + 1.0) * 0.5 * width as f32,
            y: (1.0 - ndc_y) * 0.5 * height as f32,
            u: UV[i].0,
            v: UV[i].1,
        };
    }

    rasterize_triangle(&v[0], &v[1], &v[2], tint, image, blend, width, height, buffer);
    rasterize_triangle(&v[0], &v[2], &v[3], tint, image, blend, width, height, buffer);
    1
}

#[inline(always)]
fn rasterize_triangle(
    v0: &ScreenVertex,
    v1: &ScreenVertex,
    v2: &ScreenVertex,
    tint: [f32; 4],
    image: Option<&RgbaImage>,
    blend: BlendMode,
    width: usize,
    height: usize,
    buffer: &mut [u32],
) {
    let min_x = v0.x.min(v1.x).min(v2.x).floor().max(0.0) as i32;
    let max_x = v0.x.max(v1.x).max(v2.x).ceil().min((width - 1) as f32) as i32;
    let min_y = v0.y.min(v1.y).min(v2.y).floor().max(0.0) as i32;
    let max_y = v0.y.max(v1.y).max(v2.y).ceil().min((height - 1) as f32) as i32;
    if min_x > max_x || min_y > max_y {
        return;
    }

    let denom = edge_function(v0.x, v0.y, v1.x, v1.y, v2.x, v2.y);
    if denom == 0.0 {
        return;
    }
    let inv_denom = 1.0 / denom;

    for y in min_y..=max_y {
        let py = y as f32 + 0.5;
        for x in min_x..=max_x {
            let px = x as f32 + 0.5;

            let w0 = edge_function(v1.x, v1.y, v2.x, v2.y, px, py) * inv_denom;
            let w1 = edge_function(v2.x, v2.y, v0.x, v0.y, px, py) * inv_denom;
            let w2 = 1.0 - w0 - w1;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }

            let (mut sr, mut sg, mut sb, mut sa) = match image {
                Some(img) => {
                    let u = v0.u.mul_add(w0, v1.u * w1) + v2.u * w2;
                    let v = v0.v.mul_add(w0, v1.v * w1) + v2.v * w2;
                    sample_bilinear(img, u, v)
                }
                None => (1.0, 1.0, 1.0, 1.0),
            };

            sr = (sr * tint[0]).clamp(0.0, 1.0);
            sg = (sg * tint[1]).clamp(0.0, 1.0);
            sb = (sb * tint[2]).clamp(0.0, 1.0);
            sa = (sa * tint[3]).clamp(0.0, 1.0);
            if sa <= 0.0 {
                continue;
            }

            let dst_idx = y as usize * width + x as usize;
            let dst = buffer[dst_idx];
            let dr = ((dst >> 16) & 0xFF) as f32 / 255.0;
            let dg = ((dst >> 8) & 0xFF) as f32 / 255.0;
            let db = (dst & 0xFF) as f32 / 255.0;
            let da = ((dst >> 24) & 0xFF) as f32 / 255.0;

            let (out_r, out_g, out_b, out_a) = match blend {
                BlendMode::Add => (
                    sr.mul_add(sa, dr).min(1.0),
                    sg.mul_add(sa, dg).min(1.0),
                    sb.mul_add(sa, db).min(1.0),
                    (da + sa).min(1.0),
                ),
                BlendMode::Alpha => {
                    let inv = 1.0 - sa;
                    (
                        sr.mul_add(sa, dr * inv),
                        sg.mul_add(sa, dg * inv),
                        sb.mul_add(sa, db * inv),
                        sa + da * inv,
                    )
                }
            };

            buffer[dst_idx] = pack_rgba([out_r, out_g, out_b, out_a]);
        }
    }
}

/// Bilinear sample with clamp-to-edge addressing, normalized UV in.
#[inline(always)]
fn sample_bilinear(image: &RgbaImage, u: f32, v: f32) -> (f32, f32, f32, f32) {
    let tex_w = image.width().max(1) as usize;
    let tex_h = image.height().max(1) as usize;
    let data = image.as_raw();

    let clamp_idx = |i: i32, max: usize| i.clamp(0, max.saturating_sub(1) as i32) as usize;

    let x = u.clamp(0.0, 1.0) * tex_w as f32 - 0.5;
    let y = v.clamp(0.0, 1.0) * tex_h as f32 - 0.5;
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = (x - x0 as f32).clamp(0.0, 1.0);
    let fy = (y - y0 as f32).clamp(0.0, 1.0);

    let ix0 = clamp_idx(x0, tex_w);
    let ix1 = clamp_idx(x0 + 1, tex_w);
    let iy0 = clamp_idx(y0, tex_h);
    let iy1 = clamp_idx(y0 + 1, tex_h);

    let texel = |ix: usize, iy: usize| -> [f32; 4] {
        let idx = (iy * tex_w + ix) * 4;
        if idx + 3 >= data.len() {
            return [0.0; 4];
        }
        [
            f32::from(data[idx]) / 255.0,
            f32::from(data[idx + 1]) / 255.0,
            f32::from(data[idx + 2]) / 255.0,
            f32::from(data[idx + 3]) / 255.0,
        ]
    };

    let c00 = texel(ix0, iy0);
    let c10 = texel(ix1, iy0);
    let c01 = texel(ix0, iy1);
    let c11 = texel(ix1, iy1);

    let lerp = |a: f32, b: f32, t: f32| (b - a).mul_add(t, a);
    let mut out = [0.0f32; 4];
    for (i, o) in out.iter_mut().enumerate() {
        let top = lerp(c00[i], c10[i], fx);
        let bottom = lerp(c01[i], c11[i], fx);
        *o = lerp(top, bottom, fy);
    }
    (out[0], out[1], out[2], out[3])
}

#[inline(always)]
fn edge_function(x0: f32, y0: f32, x1: f32, y1: f32, px: f32, py: f32) -> f32 {
    (px - x0).mul_add(y1 - y0, -((py - y0) * (x1 - x0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sprite(texture: &'static str, blend: BlendMode) -> RenderObject<'static> {
        RenderObject {
            object_type: ObjectType::Sprite {
                texture_id: Cow::Borrowed(texture),
                tint: [1.0; 4],
            },
            transform: Mat4::IDENTITY,
            blend,
            camera: 0,
        }
    }

    #[test]
    fn state_changes_only_on_actual_change() {
        let objects = vec![
            sprite("a.png", BlendMode::Alpha),
            sprite("a.png", BlendMode::Alpha),
            sprite("b.png", BlendMode::Alpha),
            sprite("b.png", BlendMode::Add),
            sprite("b.png", BlendMode::Add),
            sprite("a.png", BlendMode::Alpha),
        ];
        let (binds, switches) = count_state_changes(&objects);
        assert_eq!(binds, 3); // a, b, a
        assert_eq!(switches, 3); // alpha, add, alpha
    }

    #[test]
    fn quads_do_not_bind_textures() {
        let objects = vec![RenderObject {
            object_type: ObjectType::Quad { color: [1.0; 4] },
            transform: Mat4::IDENTITY,
            blend: BlendMode::Alpha,
            camera: 0,
        }];
        let (binds, switches) = count_state_changes(&objects);
        assert_eq!(binds, 0);
        assert_eq!(switches, 1);
    }

    #[test]
    fn pack_rgba_is_argb_ordered() {
        assert_eq!(pack_rgba([1.0, 0.0, 0.0, 1.0]), 0xFF_FF_00_00);
        assert_eq!(pack_rgba([0.0, 0.0, 1.0, 0.0]), 0x00_00_00_FF);
        // Out-of-range channels clamp instead of wrapping.
        assert_eq!(pack_rgba([2.0, -1.0, 0.0, 1.0]), 0xFF_FF_00_00);
    }

    #[test]
    fn bilinear_sampling_clamps_at_edges() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 0, image::Rgba([255, 255, 255, 255]));
        let (r, ..) = sample_bilinear(&img, 0.0, 0.5);
        assert!(r < 0.01);
        let (r, ..) = sample_bilinear(&img, 1.0, 0.5);
        assert!(r > 0.99);
        let (r, ..) = sample_bilinear(&img, 0.5, 0.5);
        assert!((r - 0.5).abs() < 0.01);
    }

    #[test]
    fn blend_math_matches_the_fixed_functions() {
        // Normal: src*a + dst*(1-a); additive: src*a + dst.
        let sa = 0.5f32;
        let src = 1.0f32;
        let dst = 0.4f32;
        assert!((src.mul_add(sa, dst * (1.0 - sa)) - 0.7).abs() < 1e-6);
        assert!((src.mul_add(sa, dst) - 0.9).abs() < 1e-6);
    }
}
