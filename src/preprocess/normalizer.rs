//! 描画スナップショットをモデル入力（28x28x1）へ変換する
//!
//! 1. 白背景の作業面（既定 256x256）へ引き伸ばして描画
//! 2. インク画素（RGB平均 < 250）の外接矩形を検出
//! 3. 矩形に余白を付けて作業面内にクランプ
//! 4. 矩形領域を 28x28 へ平滑化リサンプル
//! 5. グレースケール化 → 反転 → [0, 1] に正規化（インク ≈ 1, 背景 ≈ 0）

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::types::{NormalizedGrid, RasterSnapshot, GRID_SIDE};

/// 作業面の一辺（ピクセル）
pub const WORK_SIZE: u32 = 256;

/// これより暗い画素をインクとみなす（RGB平均, 0..255）
pub const INK_THRESHOLD: f32 = 250.0;

/// 外接矩形の周囲に付ける余白（ピクセル）
pub const PADDING: u32 = 10;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// 切り出し方法
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropMode {
    /// インクの外接矩形（+余白）だけを切り出す
    #[default]
    BoundingBox,
    /// 作業面全体をそのまま縮小する
    WholeCanvas,
}

/// 前処理設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// 作業面の一辺
    pub working_size: u32,
    /// インク判定のしきい値
    pub ink_threshold: f32,
    /// 外接矩形の余白
    pub padding: u32,
    /// 切り出し方法
    pub crop_mode: CropMode,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            working_size: WORK_SIZE,
            ink_threshold: INK_THRESHOLD,
            padding: PADDING,
            crop_mode: CropMode::BoundingBox,
        }
    }
}

/// インク画素の外接矩形（両端を含む）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InkBounds {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl InkBounds {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// 余白を付けて `[0, size - 1]` にクランプ
    pub fn padded(&self, padding: u32, size: u32) -> Self {
        let last = size.saturating_sub(1);
        Self {
            min_x: self.min_x.saturating_sub(padding),
            min_y: self.min_y.saturating_sub(padding),
            max_x: self.max_x.saturating_add(padding).min(last),
            max_y: self.max_y.saturating_add(padding).min(last),
        }
    }
}

/// 画像正規化器
#[derive(Debug, Clone, Default)]
pub struct ImageNormalizer {
    config: NormalizerConfig,
}

impl ImageNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// エンコード済みスナップショットを正規化
    pub fn normalize(&self, snapshot: &RasterSnapshot) -> Result<NormalizedGrid, SnapshotError> {
        let image = snapshot.decode()?;
        self.normalize_image(&image)
    }

    /// デコード済みRGBA画像を正規化
    ///
    /// インクが1画素も無い場合は全要素 0.0 のグリッドを返す。
    pub fn normalize_image(&self, image: &RgbaImage) -> Result<NormalizedGrid, SnapshotError> {
        let size = self.config.working_size;
        if image.width() == 0 || image.height() == 0 || size == 0 {
            return Err(SnapshotError::EmptyImage {
                width: image.width(),
                height: image.height(),
            });
        }

        let surface = rasterize(image, size);

        let Some(bounds) = find_ink_bounds(&surface, self.config.ink_threshold) else {
            tracing::debug!("インクが検出されませんでした（空キャンバス）");
            return Ok(NormalizedGrid::zeros());
        };

        let region = match self.config.crop_mode {
            CropMode::BoundingBox => bounds.padded(self.config.padding, size),
            CropMode::WholeCanvas => InkBounds {
                min_x: 0,
                min_y: 0,
                max_x: size - 1,
                max_y: size - 1,
            },
        };
        tracing::debug!(?bounds, ?region, "切り出し範囲を決定しました");

        let resampled = resample(&surface, &region);
        Ok(grid_from_image(&resampled))
    }

    /// 作業面座標でのインク外接矩形（余白なし）
    pub fn ink_bounds(&self, image: &RgbaImage) -> Option<InkBounds> {
        if image.width() == 0 || image.height() == 0 || self.config.working_size == 0 {
            return None;
        }
        let surface = rasterize(image, self.config.working_size);
        find_ink_bounds(&surface, self.config.ink_threshold)
    }
}

/// 透過部分を白で合成し、作業面サイズへ引き伸ばす
fn rasterize(image: &RgbaImage, size: u32) -> RgbImage {
    let mut flattened = RgbImage::from_pixel(image.width(), image.height(), WHITE);
    for (x, y, pixel) in image.enumerate_pixels() {
        let alpha = pixel[3] as f32 / 255.0;
        let blend = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }

    if flattened.dimensions() == (size, size) {
        flattened
    } else {
        imageops::resize(&flattened, size, size, FilterType::Triangle)
    }
}

/// 画素の明るさ（RGBの単純平均）
fn brightness(pixel: &Rgb<u8>) -> f32 {
    (pixel[0] as f32 + pixel[1] as f32 + pixel[2] as f32) / 3.0
}

/// インク画素の外接矩形を求める。インクが無ければ `None`
pub fn find_ink_bounds(surface: &RgbImage, threshold: f32) -> Option<InkBounds> {
    let mut bounds: Option<InkBounds> = None;

    for (x, y, pixel) in surface.enumerate_pixels() {
        if brightness(pixel) >= threshold {
            continue;
        }
        bounds = Some(match bounds {
            None => InkBounds {
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
            },
            Some(b) => InkBounds {
                min_x: b.min_x.min(x),
                min_y: b.min_y.min(y),
                max_x: b.max_x.max(x),
                max_y: b.max_y.max(y),
            },
        });
    }

    bounds
}

/// 指定範囲を 28x28 へ平滑化リサンプル
fn resample(surface: &RgbImage, region: &InkBounds) -> RgbImage {
    let side = GRID_SIDE as u32;
    let cropped = imageops::crop_imm(
        surface,
        region.min_x,
        region.min_y,
        region.width(),
        region.height(),
    )
    .to_image();

    let scaled = imageops::resize(&cropped, side, side, FilterType::Triangle);

    // 白背景の上に重ねる（余白が残っても背景色になる）
    let mut canvas = RgbImage::from_pixel(side, side, WHITE);
    imageops::overlay(&mut canvas, &scaled, 0, 0);
    canvas
}

/// グレースケール化して反転・正規化
fn grid_from_image(image: &RgbImage) -> NormalizedGrid {
    NormalizedGrid::from_fn(|x, y| {
        let gray = brightness(image.get_pixel(x as u32, y as u32));
        (255.0 - gray) / 255.0
    })
}
