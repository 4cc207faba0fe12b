//! メモリ上のお絵描きキャンバス
//!
//! 白背景に黒の丸ブラシでストロークを描く。ストロークは座標列として保持し、
//! 書き出し時にラスタ化する。

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use super::DrawingSurface;
use crate::error::SnapshotError;
use crate::types::RasterSnapshot;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// 線分上でブラシを置く間隔（ピクセル）
const STAMP_STEP: f32 = 0.5;

/// キャンバス設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// 論理解像度（正方形の一辺）
    pub size: u32,
    /// ブラシの太さ
    pub stroke_width: f32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            size: 256,
            stroke_width: 12.0,
        }
    }
}

/// 1本のストローク（ペンを下ろしてから上げるまで）
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub points: Vec<(f32, f32)>,
    pub width: f32,
}

#[derive(Debug, Default)]
pub struct SketchCanvas {
    config: CanvasConfig,
    strokes: Mutex<Vec<Stroke>>,
}

impl SketchCanvas {
    pub fn new(config: CanvasConfig) -> Self {
        Self {
            config,
            strokes: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    /// 既定の太さでストロークを追加。点が無い場合は無視する
    pub fn add_stroke(&self, points: Vec<(f32, f32)>) {
        self.push_stroke(Stroke {
            points,
            width: self.config.stroke_width,
        });
    }

    pub fn push_stroke(&self, stroke: Stroke) {
        if stroke.points.is_empty() {
            return;
        }
        self.lock().push(stroke);
    }

    pub fn stroke_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 現在のストロークをラスタ化
    pub fn render(&self) -> RgbaImage {
        let size = self.config.size;
        let mut image = RgbaImage::from_pixel(size, size, BACKGROUND);
        for stroke in self.lock().iter() {
            draw_stroke(&mut image, stroke);
        }
        image
    }

    /// `data:image/png;base64,...` 形式で書き出す
    pub fn export_data_url(&self) -> Result<String, SnapshotError> {
        Ok(RasterSnapshot::from_rgba(&self.render())?.to_data_url())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Stroke>> {
        self.strokes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DrawingSurface for SketchCanvas {
    fn reset_all(&self) {
        self.lock().clear();
    }

    fn undo_last_stroke(&self) {
        self.lock().pop();
    }

    fn export_raster(&self) -> impl Future<Output = Result<RasterSnapshot, SnapshotError>> + Send {
        let snapshot = RasterSnapshot::from_rgba(&self.render());
        async move { snapshot }
    }
}

fn draw_stroke(image: &mut RgbaImage, stroke: &Stroke) {
    let radius = (stroke.width / 2.0).max(0.5);
    // 中心がこの範囲外のブラシは画像に届かない
    let (width, height) = image.dimensions();
    let lo = (-radius, -radius);
    let hi = (width as f32 + radius, height as f32 + radius);
    let spacing = STAMP_STEP.max(radius / 8.0);

    let Some(&first) = stroke.points.first() else {
        return;
    };
    stamp(image, first, radius);

    for pair in stroke.points.windows(2) {
        let Some(((x0, y0), (x1, y1))) = clip_segment(pair[0], pair[1], lo, hi) else {
            continue;
        };
        let length = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
        let steps = (length / spacing).ceil().max(1.0) as usize;
        stamp(image, (x0, y0), radius);
        for step in 1..=steps {
            let t = step as f32 / steps as f32;
            stamp(image, (x0 + (x1 - x0) * t, y0 + (y1 - y0) * t), radius);
        }
    }
}

type Point = (f32, f32);

/// 線分を矩形 `[lo, hi]` に切り詰める（Liang–Barsky）。範囲外なら `None`
fn clip_segment(p0: Point, p1: Point, lo: Point, hi: Point) -> Option<(Point, Point)> {
    let (x0, y0) = p0;
    let (x1, y1) = p1;
    if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
        return None;
    }

    let dx = x1 - x0;
    let dy = y1 - y0;
    let mut t0 = 0.0f32;
    let mut t1 = 1.0f32;
    for (p, q) in [(-dx, x0 - lo.0), (dx, hi.0 - x0), (-dy, y0 - lo.1), (dy, hi.1 - y0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    Some((
        (x0 + dx * t0, y0 + dy * t0),
        (x0 + dx * t1, y0 + dy * t1),
    ))
}

/// 中心 `center`、半径 `radius` の円を塗る（画素中心で判定）
fn stamp(image: &mut RgbaImage, center: (f32, f32), radius: f32) {
    let (cx, cy) = center;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let x_start = (cx - radius).floor().max(0.0) as u32;
    let y_start = (cy - radius).floor().max(0.0) as u32;
    let x_end = (cx + radius).ceil().min((width - 1) as f32);
    let y_end = (cy + radius).ceil().min((height - 1) as f32);
    if x_end < 0.0 || y_end < 0.0 {
        return;
    }

    for y in y_start..=y_end as u32 {
        for x in x_start..=x_end as u32 {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            if dx * dx + dy * dy <= radius * radius {
                image.put_pixel(x, y, INK);
            }
        }
    }
}
