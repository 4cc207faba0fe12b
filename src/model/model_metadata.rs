//! モデルメタデータの定義
//!
//! tar.gz形式のモデルファイルに同梱され、推論時にラベル表・入力形状の
//! 整合性確認に使います。

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::LabelTable;
use crate::types::GRID_SIDE;

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// 出力順のクラスラベル
    /// 例: ["airplane", "apple", "bicycle", ...]
    pub class_labels: Vec<String>,

    /// モデル入力の一辺（通常28）
    pub input_size: u32,

    /// モデル入力のチャンネル数（グレースケールなので1）
    #[serde(default = "default_input_channels")]
    pub input_channels: u32,

    /// 学習エポック数
    pub num_epochs: u32,

    /// モデルの学習時刻（RFC3339形式）
    pub trained_at: String,
}

fn default_input_channels() -> u32 {
    1
}

impl ModelMetadata {
    /// 新しいメタデータを作成（学習時刻は現在時刻）
    pub fn new(class_labels: Vec<String>, num_epochs: u32) -> Self {
        Self {
            class_labels,
            input_size: GRID_SIDE as u32,
            input_channels: 1,
            num_epochs,
            trained_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }

    /// 入力形状とラベル表が実行時の設定と一致するか確認
    pub fn validate(&self, labels: &LabelTable) -> Result<()> {
        ensure!(
            self.input_size as usize == GRID_SIDE && self.input_channels == 1,
            "モデル入力形状が対応していません: {}x{}x{} (期待: {}x{}x1)",
            self.input_size,
            self.input_size,
            self.input_channels,
            GRID_SIDE,
            GRID_SIDE
        );
        ensure!(
            self.class_labels.as_slice() == labels.labels(),
            "モデルのクラスラベルが設定と一致しません: モデル={:?}, 設定={:?}",
            self.class_labels,
            labels.labels()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_roundtrip_and_defaults() {
        let metadata = ModelMetadata::new(vec!["cat".to_string(), "dog".to_string()], 10);
        assert!(chrono::DateTime::parse_from_rfc3339(&metadata.trained_at).is_ok());

        let parsed = ModelMetadata::from_json_string(&metadata.to_json_string().unwrap()).unwrap();
        assert_eq!(parsed, metadata);

        let legacy = r#"{"class_labels":["cat"],"input_size":28,"num_epochs":3,"trained_at":"2024-01-01T00:00:00+09:00"}"#;
        assert_eq!(ModelMetadata::from_json_string(legacy).unwrap().input_channels, 1);
    }

    #[test]
    fn test_validate_against_label_table() {
        let labels = LabelTable::all_promptable(["cat", "dog"]).unwrap();
        let metadata = ModelMetadata::new(vec!["cat".to_string(), "dog".to_string()], 1);
        assert!(metadata.validate(&labels).is_ok());

        let reordered = ModelMetadata::new(vec!["dog".to_string(), "cat".to_string()], 1);
        assert!(reordered.validate(&labels).is_err());

        let mut wrong_size = metadata.clone();
        wrong_size.input_size = 48;
        assert!(wrong_size.validate(&labels).is_err());
    }
}
