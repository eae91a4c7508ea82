// Up-front texture loading. A loader thread decodes every storyboard image
// and reports progress over a channel; the render loop does not start until
// the whole set is in.

use crate::core::gfx::{self, Texture};
use crate::game::storyboard::Sprite;
use image::ImageReader;
use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Instant;

pub enum LoadEvent {
    Progress { loaded: usize, total: usize },
    Done(LoadedAssets),
}

pub struct LoadedAssets {
    pub textures: FxHashMap<String, Texture>,
    pub missing: FxHashSet<String>,
}

/// Every texture path the storyboard can reference: base textures plus all
/// animation frames, deduplicated in first-seen order.
pub fn texture_paths(sprites: &[Sprite]) -> Vec<String> {
    let mut seen = FxHashSet::default();
    let mut paths = Vec::new();
    let mut push = |p: &str| {
        if seen.insert(p.to_string()) {
            paths.push(p.to_string());
        }
    };
    for s in sprites {
        match &s.animation {
            Some(anim) => {
                for frame in &anim.frame_paths {
                    push(frame);
                }
            }
            None => push(&s.texture),
        }
    }
    paths
}

/// Decode `paths` (relative to `root`) on a worker thread. The receiver gets
/// a `Progress` event per file and a final `Done` with the texture table and
/// the missing-resource set.
pub fn spawn_loader(root: PathBuf, paths: Vec<String>) -> Receiver<LoadEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let started = Instant::now();
        let total = paths.len();
        let mut textures = FxHashMap::default();
        let mut missing = FxHashSet::default();

        for (i, rel) in paths.iter().enumerate() {
            let path = root.join(rel);
            match ImageReader::open(&path).and_then(|r| {
                r.decode()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            }) {
                Ok(img) => {
                    textures.insert(rel.clone(), gfx::create_texture(img.to_rgba8()));
                }
                Err(e) => {
                    warn!("texture '{rel}' unavailable: {e}");
                    missing.insert(rel.clone());
                }
            }
            if tx
                .send(LoadEvent::Progress {
                    loaded: i + 1,
                    total,
                })
                .is_err()
            {
                return; // receiver gone, session was torn down mid-load
            }
        }

        info!(
            "loaded {}/{} textures in {:.0} ms ({} missing)",
            textures.len(),
            total,
            started.elapsed().as_secs_f64() * 1000.0,
            missing.len()
        );
        let _ = tx.send(LoadEvent::Done(LoadedAssets { textures, missing }));
    });
    rx
}

/// Block until the loader finishes, invoking `on_progress` per file.
pub fn wait_for_assets(
    rx: &Receiver<LoadEvent>,
    mut on_progress: impl FnMut(usize, usize),
) -> LoadedAssets {
    loop {
        match rx.recv() {
            Ok(LoadEvent::Progress { loaded, total }) => on_progress(loaded, total),
            Ok(LoadEvent::Done(assets)) => return assets,
            Err(_) => {
                warn!("asset loader thread dropped without completing");
                return LoadedAssets {
                    textures: FxHashMap::default(),
                    missing: FxHashSet::default(),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::storyboard::{Layer, Origin, SpriteAnimation};
    use image::RgbaImage;

    fn sprite(texture: &str, animation: Option<SpriteAnimation>) -> Sprite {
        Sprite {
            id: 0,
            layer: Layer::Background,
            origin: Origin::TopLeft,
            base_pos: [0.0, 0.0],
            texture: texture.to_string(),
            animation,
        }
    }

    #[test]
    fn texture_paths_dedupe_and_expand_animations() {
        let sprites = vec![
            sprite("sb/bg.png", None),
            sprite("sb/bg.png", None),
            sprite(
                "sb/fire.png",
                Some(SpriteAnimation {
                    frame_count: 2,
                    frame_delay_ms: 100.0,
                    loop_forever: true,
                    frame_paths: vec!["sb/fire0.png".into(), "sb/fire1.png".into()],
                }),
            ),
        ];
        assert_eq!(
            texture_paths(&sprites),
            vec!["sb/bg.png", "sb/fire0.png", "sb/fire1.png"]
        );
    }

    #[test]
    fn loader_reports_progress_and_missing_files() {
        let dir = std::env::temp_dir().join(format!("storysync-assets-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        RgbaImage::new(2, 2)
            .save(dir.join("ok.png"))
            .expect("test image saved");

        let rx = spawn_loader(dir.clone(), vec!["ok.png".into(), "nope.png".into()]);
        let mut events = Vec::new();
        let assets = wait_for_assets(&rx, |loaded, total| events.push((loaded, total)));

        assert_eq!(events, vec![(1, 2), (2, 2)]);
        assert!(assets.textures.contains_key("ok.png"));
        assert!(assets.missing.contains("nope.png"));

        let _ = std::fs::remove_dir_all(dir);
    }
}
