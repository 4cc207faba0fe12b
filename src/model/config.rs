//! アプリケーション設定管理モジュール
//!
//! 計算デバイス、モデルファイル、ラベル表、前処理などをJSON形式で保存・読み込みします。

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::canvas::CanvasConfig;
use crate::error::LabelTableError;
use crate::model::label_table::{LabelTable, CLASS_NAMES, DISABLED_PROMPTS};
use crate::preprocess::NormalizerConfig;
use crate::round::RoundSettings;

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    #[default]
    Wgpu,
    /// NdArray (CPU) バックエンド
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// モデル設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// 使用するモデルファイル（tar.gz）のパス
    pub model_path: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: "models/doodle_classifier.tar.gz".to_string(),
        }
    }
}

/// ラベル設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSettings {
    /// 分類器の出力順のクラス名
    pub class_names: Vec<String>,
    /// お題に出さないクラス
    #[serde(default)]
    pub disabled_prompts: Vec<String>,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self {
            class_names: CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            disabled_prompts: DISABLED_PROMPTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl LabelSettings {
    pub fn to_table(&self) -> Result<LabelTable, LabelTableError> {
        LabelTable::new(self.class_names.clone(), &self.disabled_prompts)
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// 計算デバイスの種類
    #[serde(default)]
    pub device_type: DeviceType,
    /// モデル設定
    #[serde(default)]
    pub model: ModelSettings,
    /// ラベル設定
    #[serde(default)]
    pub labels: LabelSettings,
    /// 前処理設定
    #[serde(default)]
    pub preprocess: NormalizerConfig,
    /// キャンバス設定
    #[serde(default)]
    pub canvas: CanvasConfig,
    /// ラウンド設定
    #[serde(default)]
    pub round: RoundSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("設定ファイルを開けません: {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("設定ファイルの形式が不正です: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// 設定を読み込む。存在しない・読み込めない場合はデフォルト設定を返す
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "設定ファイルが存在しません。デフォルト設定を使用します");
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => {
                info!(path = %path.display(), "設定ファイルを読み込みました");
                config
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %format!("{:#}", e),
                    "設定ファイルの読み込みに失敗しました。デフォルト設定を使用します"
                );
                Self::default()
            }
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("設定ファイルを保存できません: {}", path.display()))?;
        Ok(())
    }

    /// 値の範囲を検証
    pub fn validate(&self) -> anyhow::Result<()> {
        self.labels.to_table().context("ラベル設定が不正です")?;

        let preprocess = &self.preprocess;
        ensure!(preprocess.working_size > 0, "preprocess.working_size は1以上にしてください");
        ensure!(
            preprocess.ink_threshold > 0.0 && preprocess.ink_threshold <= 255.0,
            "preprocess.ink_threshold は (0, 255] の範囲にしてください: {}",
            preprocess.ink_threshold
        );

        ensure!(self.canvas.size > 0, "canvas.size は1以上にしてください");
        ensure!(
            self.canvas.stroke_width > 0.0,
            "canvas.stroke_width は正の値にしてください: {}",
            self.canvas.stroke_width
        );

        ensure!(
            (0.0..=1.0).contains(&self.round.empty_threshold),
            "round.empty_threshold は [0, 1] の範囲にしてください: {}",
            self.round.empty_threshold
        );
        Ok(())
    }

    /// 設定内容をログに出力
    pub fn log_summary(&self) {
        info!(
            device = %self.device_type,
            model_path = %self.model.model_path,
            classes = self.labels.class_names.len(),
            disabled = ?self.labels.disabled_prompts,
            crop_mode = ?self.preprocess.crop_mode,
            empty_threshold = self.round.empty_threshold,
            "アプリケーション設定"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::CropMode;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.device_type, DeviceType::Wgpu);
        assert_eq!(config.model.model_path, "models/doodle_classifier.tar.gz");
        assert_eq!(config.labels.class_names.len(), 15);
        assert_eq!(config.labels.disabled_prompts, vec!["spider".to_string()]);
        assert_eq!(config.preprocess.crop_mode, CropMode::BoundingBox);
        assert_eq!(config.canvas.size, 256);
        assert_eq!(config.round.empty_threshold, 0.01);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialize_deserialize() {
        let mut config = AppConfig::default();
        config.device_type = DeviceType::Cpu;
        config.round.prompt_seed = Some(12);
        config.preprocess.crop_mode = CropMode::WholeCanvas;

        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "device_type": "Cpu", "round": { "empty_threshold": 0.05 } }"#)
                .unwrap();
        assert_eq!(config.device_type, DeviceType::Cpu);
        assert_eq!(config.round.empty_threshold, 0.05);
        assert_eq!(config.round.prompt_seed, None);
        assert_eq!(config.labels, LabelSettings::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "round": { "prompt_seed": 3 }, "preprocess": { "padding": 4 }, "canvas": { "size": 128 } }"#,
        )
        .unwrap();
        assert_eq!(config.round.prompt_seed, Some(3));
        assert_eq!(config.round.empty_threshold, 0.01);
        assert_eq!(config.preprocess.padding, 4);
        assert_eq!(config.preprocess.working_size, 256);
        assert_eq!(config.canvas.size, 128);
        assert_eq!(config.canvas.stroke_width, 12.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.labels.disabled_prompts.push("unicorn".to_string());
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.round.empty_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.canvas.stroke_width = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("doodle_guess_config_{}.json", std::process::id()));
        let mut config = AppConfig::default();
        config.model.model_path = "other/model.tar.gz".to_string();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(AppConfig::load_or_default(&path), AppConfig::default());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(format!("{}", DeviceType::Wgpu), "WGPU (GPU)");
        assert_eq!(format!("{}", DeviceType::Cpu), "CPU (NdArray)");
    }
}
