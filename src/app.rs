use crate::assets;
use crate::core::clock::SongClock;
use crate::core::gfx::{self, Texture};
use crate::game::beatmap::{self, Beatmap};
use crate::game::play::Playfield;
use crate::game::scroll::ScrollMap;
use crate::game::storyboard::{Sprite, SpriteTimeline, compile};
use crate::ui::compose::{self, FrameInput, SceneOrder};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

use log::{debug, error, info, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::{error::Error, sync::Arc, time::Instant};

const SEEK_STEP_MS: f64 = 5000.0;

/// Everything a loaded beatmap session needs per frame. Read-only after load
/// except for the playfield, the clock and the missing-texture set.
pub struct Session {
    title: String,
    widescreen: bool,
    sprites: Vec<Sprite>,
    timelines: FxHashMap<u32, SpriteTimeline>,
    order: SceneOrder,
    scroll: ScrollMap,
    playfield: Playfield,
    clock: SongClock,
    textures: FxHashMap<String, Texture>,
    missing: FxHashSet<String>,
    end_ms: f64,
    autoplay: bool,
    results_logged: bool,
}

impl Session {
    fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let config = crate::config::get();
        let map: Beatmap = beatmap::load(path)?;

        let timelines = compile::compile(&map.raw_commands, &map.hit_times());
        let order = SceneOrder::new(&map.sprites, &timelines);
        let scroll = ScrollMap::new(map.velocities);

        let notes_end = map
            .notes
            .iter()
            .map(|n| n.final_ms())
            .fold(0.0f64, f64::max);
        let sprites_end = timelines
            .values()
            .map(|t| t.end_ms)
            .fold(0.0f64, f64::max);

        let playfield = Playfield::new(map.notes, map.columns, map.od);

        // Decode every referenced image before the first frame.
        let root = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let rx = assets::spawn_loader(root, assets::texture_paths(&map.sprites));
        let assets = assets::wait_for_assets(&rx, |loaded, total| {
            info!("loading textures {loaded}/{total}");
        });

        Ok(Self {
            title: map.title,
            widescreen: map.widescreen,
            sprites: map.sprites,
            timelines,
            order,
            scroll,
            playfield,
            clock: SongClock::new(f64::from(config.music_rate)),
            textures: assets.textures,
            missing: assets.missing,
            end_ms: notes_end.max(sprites_end),
            autoplay: config.autoplay,
            results_logged: false,
        })
    }

    fn step(&mut self, time_ms: f64) {
        if self.autoplay {
            self.playfield.autoplay(time_ms);
        } else {
            let missed = self.playfield.sweep(time_ms);
            if missed > 0 {
                debug!("{missed} note(s) swept past the miss window");
            }
        }

        if !self.results_logged && self.playfield.finished() && time_ms >= self.end_ms {
            let score = &self.playfield.score;
            info!(
                "session complete: score {} | accuracy {:.2}% | max combo {} | grade {:?}",
                score.score(),
                score.accuracy() * 100.0,
                score.max_combo,
                score.grade()
            );
            self.results_logged = true;
        }
    }

    fn press(&mut self, column: u8, time_ms: f64) {
        if let Some(j) = self.playfield.key_down(column, time_ms) {
            info!(
                "column {column}: {j:?} (combo {})",
                self.playfield.score.combo
            );
        }
    }

    fn release(&mut self, column: u8, time_ms: f64) {
        if let Some(j) = self.playfield.key_up(column, time_ms) {
            info!("column {column} release: {j:?}");
        }
    }
}

/// Keyboard layout per column count. 7K keeps space free for the pause
/// toggle, so its middle column sits on G.
fn column_for_key(code: KeyCode, columns: u8) -> Option<u8> {
    let keys: &[KeyCode] = match columns {
        4 => &[KeyCode::KeyD, KeyCode::KeyF, KeyCode::KeyJ, KeyCode::KeyK],
        7 => &[
            KeyCode::KeyS,
            KeyCode::KeyD,
            KeyCode::KeyF,
            KeyCode::KeyG,
            KeyCode::KeyJ,
            KeyCode::KeyK,
            KeyCode::KeyL,
        ],
        _ => return None,
    };
    keys.iter().position(|&k| k == code).map(|i| i as u8)
}

pub struct App {
    window: Option<Arc<Window>>,
    gfx: Option<gfx::State>,
    session: Session,
    window_size: PhysicalSize<u32>,
    show_stats: bool,
    frame_count: u32,
    last_title_update: Instant,
}

impl App {
    fn new(session: Session) -> Self {
        let config = crate::config::get();
        Self {
            window: None,
            gfx: None,
            session,
            window_size: PhysicalSize::new(config.display_width, config.display_height),
            show_stats: config.show_stats,
            frame_count: 0,
            last_title_update: Instant::now(),
        }
    }

    fn init_graphics(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Box<dyn Error>> {
        let window_attributes = Window::default_attributes()
            .with_title(format!("StorySync - {}", self.session.title))
            .with_inner_size(self.window_size)
            .with_resizable(true);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        self.window_size = window.inner_size();
        self.gfx = Some(gfx::init(window.clone())?);
        self.window = Some(window);

        // Assets are in, graphics are up: roll the song.
        self.session.clock.set_playing(true);
        info!("Starting event loop...");
        Ok(())
    }

    #[inline(always)]
    fn handle_key_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        key_event: winit::event::KeyEvent,
    ) {
        let PhysicalKey::Code(code) = key_event.physical_key else {
            return;
        };
        if key_event.repeat {
            return;
        }
        let pressed = key_event.state == ElementState::Pressed;
        let time_ms = self.session.clock.now_ms();

        if let Some(column) = column_for_key(code, self.session.playfield.column_count()) {
            if self.session.autoplay {
                return;
            }
            if pressed {
                self.session.press(column, time_ms);
            } else {
                self.session.release(column, time_ms);
            }
            return;
        }

        if !pressed {
            return;
        }
        match code {
            KeyCode::Space => {
                let playing = !self.session.clock.playing();
                self.session.clock.set_playing(playing);
                info!("{}", if playing { "resumed" } else { "paused" });
            }
            KeyCode::ArrowLeft => {
                self.session.clock.seek(-SEEK_STEP_MS);
                info!("seek to {:.0} ms", self.session.clock.now_ms());
            }
            KeyCode::ArrowRight => {
                self.session.clock.seek(SEEK_STEP_MS);
                info!("seek to {:.0} ms", self.session.clock.now_ms());
            }
            KeyCode::Escape => {
                info!("Escape pressed. Shutting down.");
                event_loop.exit();
            }
            _ => {}
        }
    }

    #[inline(always)]
    fn update_fps_title(&mut self, window: &Window, now: Instant, time_ms: f64) {
        self.frame_count += 1;
        let elapsed = now.duration_since(self.last_title_update);
        if elapsed.as_secs_f32() >= 1.0 {
            let fps = self.frame_count as f32 / elapsed.as_secs_f32();
            window.set_title(&format!(
                "StorySync - {} | {:.1}s | {:.2} FPS",
                self.session.title,
                time_ms / 1000.0,
                fps
            ));
            self.frame_count = 0;
            self.last_title_update = now;
        }
    }

    fn draw_frame(&mut self, event_loop: &ActiveEventLoop) {
        let time_ms = self.session.clock.now_ms();
        self.session.step(time_ms);

        let missing_before = self.session.missing.len();
        let input = FrameInput {
            time_ms,
            window_w: self.window_size.width as f32,
            window_h: self.window_size.height as f32,
            widescreen: self.session.widescreen,
            sprites: &self.session.sprites,
            timelines: &self.session.timelines,
            order: &self.session.order,
            textures: &self.session.textures,
            playfield: &self.session.playfield,
            scroll: &self.session.scroll,
        };
        let list = compose::build_frame(&input, &mut self.session.missing);
        if self.session.missing.len() > missing_before {
            warn!(
                "{} texture(s) referenced but unavailable",
                self.session.missing.len()
            );
        }

        if let Some(gfx_state) = &mut self.gfx {
            match gfx::draw(gfx_state, &list, &self.session.textures) {
                Ok(stats) => {
                    if self.show_stats {
                        debug!(
                            "frame @ {time_ms:.0} ms: {} objects, {} binds, {} blend switches",
                            stats.objects, stats.texture_binds, stats.blend_switches
                        );
                    }
                }
                Err(e) => {
                    error!("Failed to draw frame: {e}");
                    event_loop.exit();
                }
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.init_graphics(event_loop)
        {
            error!("Failed to initialize graphics: {e}");
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref().cloned() else {
            return;
        };
        if window_id != window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested. Shutting down.");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if new_size.width > 0 && new_size.height > 0 {
                    self.window_size = new_size;
                    if let Some(gfx_state) = &mut self.gfx {
                        gfx::resize(gfx_state, new_size.width, new_size.height);
                    }
                }
            }
            WindowEvent::KeyboardInput {
                event: key_event, ..
            } => {
                self.handle_key_event(event_loop, key_event);
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                self.draw_frame(event_loop);
                let time_ms = self.session.clock.now_ms();
                self.update_fps_title(&window, now, time_ms);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gfx_state) = &mut self.gfx {
            gfx::dispose_textures(&mut self.session.textures);
            gfx::cleanup(gfx_state);
        }
    }
}

pub fn run(beatmap_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::load(&beatmap_path)?;
    let event_loop = EventLoop::new()?;
    let mut app = App::new(session);
    event_loop.run_app(&mut app)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_key_layout_maps_dfjk() {
        assert_eq!(column_for_key(KeyCode::KeyD, 4), Some(0));
        assert_eq!(column_for_key(KeyCode::KeyF, 4), Some(1));
        assert_eq!(column_for_key(KeyCode::KeyJ, 4), Some(2));
        assert_eq!(column_for_key(KeyCode::KeyK, 4), Some(3));
        assert_eq!(column_for_key(KeyCode::KeyS, 4), None);
    }

    #[test]
    fn seven_key_layout_keeps_space_free() {
        assert_eq!(column_for_key(KeyCode::KeyS, 7), Some(0));
        assert_eq!(column_for_key(KeyCode::KeyG, 7), Some(3));
        assert_eq!(column_for_key(KeyCode::KeyL, 7), Some(6));
        assert_eq!(column_for_key(KeyCode::Space, 7), None);
    }

    #[test]
    fn unsupported_column_counts_map_nothing() {
        assert_eq!(column_for_key(KeyCode::KeyD, 5), None);
        assert_eq!(column_for_key(KeyCode::KeyD, 0), None);
    }
}
