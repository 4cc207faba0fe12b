use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use crate::error::SnapshotError;

/// 正規化グリッドの一辺（モデル入力は 28x28x1）
pub const GRID_SIDE: usize = 28;

/// 正規化グリッドの要素数
pub const GRID_LEN: usize = GRID_SIDE * GRID_SIDE;

/// モデルへ渡すバッチ形状 [batch, height, width, channels]
pub const BATCH_SHAPE: [usize; 4] = [1, GRID_SIDE, GRID_SIDE, 1];

/// 描画面から書き出したエンコード済みラスタ画像（通常はPNG）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterSnapshot {
    bytes: Vec<u8>,
}

impl RasterSnapshot {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// `data:image/png;base64,...` 形式の文字列から読み込む
    pub fn from_data_url(data_url: &str) -> Result<Self, SnapshotError> {
        let rest = data_url
            .strip_prefix("data:")
            .ok_or_else(|| SnapshotError::DataUrl("data: で始まっていません".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| SnapshotError::DataUrl("カンマ区切りがありません".to_string()))?;
        if !header.ends_with(";base64") {
            return Err(SnapshotError::DataUrl(format!(
                "base64エンコードではありません: {}",
                header
            )));
        }

        let bytes = STANDARD.decode(payload.trim())?;
        Ok(Self { bytes })
    }

    /// メモリ上のRGBA画像をPNGにエンコードしてスナップショット化
    pub fn from_rgba(image: &RgbaImage) -> Result<Self, SnapshotError> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image.clone())
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// data URL 形式に変換（ブラウザのcanvas書き出しと同じ形式）
    pub fn to_data_url(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.bytes))
    }

    /// RGBA画像としてデコード
    pub fn decode(&self) -> Result<RgbaImage, SnapshotError> {
        let image = image::load_from_memory(&self.bytes)?.to_rgba8();
        if image.width() == 0 || image.height() == 0 {
            return Err(SnapshotError::EmptyImage {
                width: image.width(),
                height: image.height(),
            });
        }
        Ok(image)
    }
}

/// 28x28x1 の正規化済み入力。値は常に [0.0, 1.0]（0 = 背景, 1 = インク）
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedGrid {
    values: Vec<f32>,
}

impl NormalizedGrid {
    /// 全要素 0.0 のグリッド（空キャンバス）
    pub fn zeros() -> Self {
        Self {
            values: vec![0.0; GRID_LEN],
        }
    }

    /// 座標 (x, y) ごとの値からグリッドを作成。範囲外の値は [0, 1] に丸める
    pub fn from_fn(mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut values = Vec::with_capacity(GRID_LEN);
        for y in 0..GRID_SIDE {
            for x in 0..GRID_SIDE {
                values.push(clamp_unit(f(x, y)));
            }
        }
        Self { values }
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= GRID_SIDE || y >= GRID_SIDE {
            return None;
        }
        Some(self.values[y * GRID_SIDE + x])
    }

    /// 行優先 (HWC, C=1) の値
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn mean(&self) -> f32 {
        self.values.iter().sum::<f32>() / GRID_LEN as f32
    }

    pub fn is_blank(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }

    /// 1件バッチ [1, 28, 28, 1] に包んだ平坦化データ
    pub fn to_batch(&self) -> Vec<f32> {
        self.values.clone()
    }

    /// 濃淡をASCII文字で表現（確認用）
    pub fn to_ascii(&self) -> String {
        const SHADES: [char; 5] = [' ', '.', ':', '*', '#'];
        let mut out = String::with_capacity((GRID_SIDE + 1) * GRID_SIDE);
        for row in self.values.chunks(GRID_SIDE) {
            for &v in row {
                let idx = ((v * (SHADES.len() - 1) as f32).round() as usize).min(SHADES.len() - 1);
                out.push(SHADES[idx]);
            }
            out.push('\n');
        }
        out
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// 分類器の生出力。インデックスはラベル表の順序と一致する
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities(Vec<f32>);

impl ClassProbabilities {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.0.get(index).copied()
    }
}

/// 直近の推論結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub label: String,
    pub confidence: f32,
    pub raw: ClassProbabilities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundReason {
    /// キャンバスに何も描かれていない
    NoDrawing,
}

/// 1回の予測試行の結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundResult {
    pub success: bool,
    pub target: String,
    pub predicted: Option<String>,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RoundReason>,
}

impl RoundResult {
    pub fn no_drawing(target: impl Into<String>) -> Self {
        Self {
            success: false,
            target: target.into(),
            predicted: None,
            confidence: 0.0,
            reason: Some(RoundReason::NoDrawing),
        }
    }

    pub fn from_prediction(target: impl Into<String>, prediction: &PredictionResult) -> Self {
        let target = target.into();
        Self {
            success: prediction.label == target,
            target,
            predicted: Some(prediction.label.clone()),
            confidence: prediction.confidence,
            reason: None,
        }
    }
}

/// 画面に表示するゲーム状態のスナップショット
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub target_label: Option<String>,
    pub score: u32,
    pub is_predicting: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_data_url_roundtrip() {
        let image = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]));
        let snapshot = RasterSnapshot::from_rgba(&image).unwrap();
        let url = snapshot.to_data_url();
        assert!(url.starts_with("data:image/png;base64,"));

        let decoded = RasterSnapshot::from_data_url(&url).unwrap().decode().unwrap();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(2, 1), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_invalid_data_url() {
        assert!(matches!(
            RasterSnapshot::from_data_url("image/png;base64,AAAA"),
            Err(SnapshotError::DataUrl(_))
        ));
        assert!(matches!(
            RasterSnapshot::from_data_url("data:image/png,AAAA"),
            Err(SnapshotError::DataUrl(_))
        ));
        assert!(matches!(
            RasterSnapshot::from_data_url("data:image/png;base64,@@@"),
            Err(SnapshotError::Base64(_))
        ));
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let snapshot = RasterSnapshot::from_bytes(vec![1, 2, 3, 4]);
        assert!(matches!(snapshot.decode(), Err(SnapshotError::Image(_))));
    }

    #[test]
    fn test_grid_values_are_clamped() {
        let grid = NormalizedGrid::from_fn(|x, _| if x == 0 { 2.0 } else if x == 1 { -1.0 } else { f32::NAN });
        assert_eq!(grid.get(0, 0), Some(1.0));
        assert_eq!(grid.get(1, 5), Some(0.0));
        assert_eq!(grid.get(2, 5), Some(0.0));
        assert_eq!(grid.get(GRID_SIDE, 0), None);
        assert_eq!(grid.as_slice().len(), GRID_LEN);
    }

    #[test]
    fn test_round_result_from_prediction() {
        let prediction = PredictionResult {
            label: "dog".to_string(),
            confidence: 0.7,
            raw: ClassProbabilities::new(vec![0.1, 0.7, 0.2]),
        };
        let result = RoundResult::from_prediction("dog", &prediction);
        assert!(result.success);
        assert_eq!(result.predicted.as_deref(), Some("dog"));
        assert_eq!(result.reason, None);

        let miss = RoundResult::from_prediction("cat", &prediction);
        assert!(!miss.success);
    }

    #[test]
    fn test_no_drawing_serializes_reason() {
        let json = serde_json::to_value(RoundResult::no_drawing("cat")).unwrap();
        assert_eq!(json["reason"], "no_drawing");
        assert_eq!(json["predicted"], serde_json::Value::Null);
        assert_eq!(json["confidence"], 0.0);
    }
}
