use anyhow::{Context, Result};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tiny_skia::{Color, Paint, Pixmap, Rect, Transform};
use tracing::{debug, info};

use crate::analysis::Verdict;

/// Decorative bars drawn while a clip is being analyzed
pub const BUSY_BAR_COUNT: usize = 64;

/// Live bars never exceed this share of the canvas height
pub const MAX_HEIGHT_RATIO: f32 = 0.8;

/// Thickness of the idle baseline in pixels
pub const BASELINE_THICKNESS: f32 = 2.0;

fn truth() -> Color {
    Color::from_rgba8(0x4A, 0xDE, 0x80, 255)
}

fn lie() -> Color {
    Color::from_rgba8(0xFF, 0x5A, 0x5A, 255)
}

fn neutral() -> Color {
    Color::from_rgba8(0x60, 0xA5, 0xFA, 255)
}

/// Bar color for a verdict; neutral until one is known
pub fn verdict_color(verdict: Option<Verdict>) -> Color {
    match verdict {
        Some(Verdict::Truth) => truth(),
        Some(Verdict::Lie) => lie(),
        Some(Verdict::Neutral) | None => neutral(),
    }
}

/// One filled rectangle, in canvas pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// What a single paint draws
#[derive(Debug, Clone, PartialEq)]
pub enum Scene {
    /// One bar per frequency bin
    Live(Vec<Bar>),
    /// Time-driven animation while analysis runs
    Busy(Vec<Bar>),
    /// Flat centred line
    Baseline(Bar),
}

impl Scene {
    /// Lay out a frame
    ///
    /// A frequency buffer wins over the busy flag; with neither the scene is
    /// the baseline. `t_ms` only affects the busy animation.
    pub fn layout(buffer: Option<&[u8]>, busy: bool, width: u32, height: u32, t_ms: f64) -> Self {
        let w = width as f32;
        let h = height as f32;

        match buffer {
            Some(buffer) if !buffer.is_empty() => {
                let bar_width = w / buffer.len() as f32;
                let max_height = h * MAX_HEIGHT_RATIO;
                let bars = buffer
                    .iter()
                    .enumerate()
                    .map(|(i, &v)| {
                        let bar_height = (v as f32 / 255.0 * max_height).round();
                        Bar {
                            x: i as f32 * bar_width,
                            y: (h - bar_height) / 2.0,
                            width: bar_width - 1.0,
                            height: bar_height,
                        }
                    })
                    .collect();
                Scene::Live(bars)
            }
            _ if busy => {
                let bar_width = w / BUSY_BAR_COUNT as f32;
                let bars = (0..BUSY_BAR_COUNT)
                    .map(|i| {
                        let bar_height = ((t_ms / 200.0 + i as f64 * 0.3).sin() * 20.0 + 30.0) as f32;
                        Bar {
                            x: i as f32 * bar_width,
                            y: (h - bar_height) / 2.0,
                            width: bar_width - 1.0,
                            height: bar_height,
                        }
                    })
                    .collect();
                Scene::Busy(bars)
            }
            _ => Scene::Baseline(Bar {
                x: 0.0,
                y: h / 2.0 - BASELINE_THICKNESS / 2.0,
                width: w,
                height: BASELINE_THICKNESS,
            }),
        }
    }

    pub fn bars(&self) -> &[Bar] {
        match self {
            Scene::Live(bars) | Scene::Busy(bars) => bars,
            Scene::Baseline(bar) => std::slice::from_ref(bar),
        }
    }
}

/// Paints the waveform into an RGBA canvas
pub struct WaveformRenderer {
    pixmap: Pixmap,
}

impl WaveformRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixmap = Pixmap::new(width, height)
            .with_context(|| format!("Invalid canvas size {}x{}", width, height))?;

        info!("Waveform canvas {}x{}", width, height);
        Ok(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Match the canvas to a new viewport; takes effect on the next paint
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == self.width() && height == self.height() {
            return Ok(());
        }

        self.pixmap = Pixmap::new(width, height)
            .with_context(|| format!("Invalid canvas size {}x{}", width, height))?;

        debug!("Waveform canvas resized to {}x{}", width, height);
        Ok(())
    }

    /// Paint a frame at the current wall-clock time
    pub fn paint(&mut self, buffer: Option<&[u8]>, busy: bool, verdict: Option<Verdict>) -> Scene {
        let t_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
            * 1000.0;
        self.paint_at(buffer, busy, verdict, t_ms)
    }

    /// Paint a frame as of `t_ms` milliseconds since the epoch
    pub fn paint_at(
        &mut self,
        buffer: Option<&[u8]>,
        busy: bool,
        verdict: Option<Verdict>,
        t_ms: f64,
    ) -> Scene {
        let scene = Scene::layout(buffer, busy, self.width(), self.height(), t_ms);

        // Analysis in progress is always drawn neutral
        let color = match scene {
            Scene::Busy(_) => neutral(),
            _ => verdict_color(verdict),
        };

        let mut paint = Paint::default();
        paint.set_color(color);
        paint.anti_alias = false;

        self.pixmap.fill(Color::TRANSPARENT);
        for bar in scene.bars() {
            if bar.width <= 0.0 || bar.height <= 0.0 {
                continue;
            }
            let Some(rect) = Rect::from_xywh(bar.x, bar.y, bar.width, bar.height) else {
                continue;
            };
            self.pixmap
                .fill_rect(rect, &paint, Transform::identity(), None);
        }

        scene
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        self.pixmap.encode_png().context("Failed to encode waveform PNG")
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.pixmap
            .save_png(path)
            .with_context(|| format!("Failed to write waveform PNG: {:?}", path))?;

        info!("Waveform snapshot saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(renderer: &WaveformRenderer, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let p = renderer.pixmap().pixel(x, y).unwrap();
        (p.red(), p.green(), p.blue(), p.alpha())
    }

    #[test]
    fn test_bar_height_scales_to_eighty_percent() {
        let scene = Scene::layout(Some(&[0, 51, 128, 255]), false, 400, 100, 0.0);
        let heights: Vec<f32> = scene.bars().iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![0.0, 16.0, 40.0, 80.0]);

        let top = scene.bars()[3];
        assert_eq!(top.y, 10.0);
        assert_eq!(top.width, 99.0);
    }

    #[test]
    fn test_buffer_wins_over_busy() {
        let scene = Scene::layout(Some(&[10; 128]), true, 256, 100, 0.0);
        assert!(matches!(scene, Scene::Live(ref bars) if bars.len() == 128));
    }

    #[test]
    fn test_busy_animation() {
        let scene = Scene::layout(None, true, 640, 100, 0.0);
        let Scene::Busy(bars) = scene else {
            panic!("expected busy scene");
        };
        assert_eq!(bars.len(), BUSY_BAR_COUNT);
        assert_eq!(bars[0].height, 30.0);
        assert!(bars.iter().all(|b| (10.0..=50.0).contains(&b.height)));
        assert_eq!(bars[1].x, 10.0);

        let later = Scene::layout(None, true, 640, 100, 314.159);
        assert_ne!(later.bars()[0].height, 30.0);
    }

    #[test]
    fn test_baseline_when_idle() {
        let scene = Scene::layout(None, false, 300, 100, 0.0);
        assert_eq!(
            scene,
            Scene::Baseline(Bar {
                x: 0.0,
                y: 49.0,
                width: 300.0,
                height: 2.0
            })
        );
    }

    #[test]
    fn test_paint_uses_verdict_color() {
        let mut renderer = WaveformRenderer::new(40, 100).unwrap();
        renderer.paint_at(Some(&[255; 4]), false, Some(Verdict::Truth), 0.0);

        assert_eq!(rgb(&renderer, 5, 50), (0x4A, 0xDE, 0x80, 255));
        assert_eq!(rgb(&renderer, 5, 5).3, 0);

        renderer.paint_at(Some(&[255; 4]), false, Some(Verdict::Lie), 0.0);
        assert_eq!(rgb(&renderer, 5, 50), (0xFF, 0x5A, 0x5A, 255));
    }

    #[test]
    fn test_repaint_clears_previous_frame() {
        let mut renderer = WaveformRenderer::new(40, 100).unwrap();
        renderer.paint_at(Some(&[255; 4]), false, None, 0.0);
        renderer.paint_at(None, false, None, 0.0);

        assert_eq!(rgb(&renderer, 5, 20).3, 0);
        assert_eq!(rgb(&renderer, 5, 49), (0x60, 0xA5, 0xFA, 255));
    }

    #[test]
    fn test_resize_recomputes_bar_width() {
        let mut renderer = WaveformRenderer::new(256, 100).unwrap();
        let before = renderer.paint_at(Some(&[100; 128]), false, None, 0.0);
        assert_eq!(before.bars()[0].width, 1.0);

        renderer.resize(512, 100).unwrap();
        assert_eq!(renderer.width(), 512);
        let after = renderer.paint_at(Some(&[100; 128]), false, None, 0.0);
        assert_eq!(after.bars()[0].width, 3.0);
        assert_eq!(after.bars()[1].x, 4.0);
    }

    #[test]
    fn test_zero_sized_canvas_is_rejected() {
        assert!(WaveformRenderer::new(0, 100).is_err());
        let mut renderer = WaveformRenderer::new(10, 10).unwrap();
        assert!(renderer.resize(10, 0).is_err());
        assert_eq!(renderer.height(), 10);
    }

    #[test]
    fn test_png_encoding() {
        let mut renderer = WaveformRenderer::new(64, 32).unwrap();
        renderer.paint_at(None, true, None, 0.0);
        let png = renderer.encode_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
