//! モデル推論機能

use anyhow::{ensure, Context, Result};
use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor},
};
use burn_ndarray::{NdArray, NdArrayDevice};
use burn_wgpu::{Wgpu, WgpuDevice};
use std::path::Path;
use tracing::info;

use crate::ml::{DoodleClassifier, ModelConfig};
use crate::model::{load_model_with_metadata, log_metadata_info, AppConfig, DeviceType, LabelTable, ModelMetadata};
use crate::model_slot::InferenceBackend;
use crate::types::{GRID_LEN, GRID_SIDE};

/// 推論エンジン
pub struct InferenceEngine<B: Backend> {
    model: DoodleClassifier<B>,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// モデルファイル（tar.gz）を読み込んで推論エンジンを初期化
    ///
    /// モデルのクラスラベルが `labels` と一致しない場合はエラー。
    pub fn load(model_path: &Path, labels: &LabelTable, device: B::Device) -> Result<Self> {
        let (metadata, model_binary) = load_model_with_metadata(model_path)?;
        log_metadata_info(&metadata);
        metadata.validate(labels)?;

        let model = ModelConfig::new(metadata.class_labels.len()).init::<B>(&device);

        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let record = recorder
            .load(model_binary, &device)
            .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;

        Ok(Self {
            model: model.load_record(record),
            metadata,
            device,
        })
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// 1件バッチ（28x28x1 を平坦化したもの）を分類して確率を返す
    pub fn classify_batch(&self, batch: &[f32]) -> Result<Vec<f32>> {
        ensure!(
            batch.len() == GRID_LEN,
            "入力サイズが不正です: {} (期待: {})",
            batch.len(),
            GRID_LEN
        );

        // HWC (C=1) と NCHW は同じ並びなのでそのまま reshape できる
        let tensor = Tensor::<B, 1>::from_floats(batch, &self.device).reshape([1, 1, GRID_SIDE, GRID_SIDE]);

        self.model
            .probabilities(tensor)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("推論結果の取得エラー: {:?}", e))
    }
}

/// 設定で選択されたバックエンドの推論エンジン
pub enum DoodleEngine {
    Wgpu(InferenceEngine<Wgpu>),
    Cpu(InferenceEngine<NdArray>),
}

impl DoodleEngine {
    pub fn metadata(&self) -> &ModelMetadata {
        match self {
            DoodleEngine::Wgpu(engine) => engine.metadata(),
            DoodleEngine::Cpu(engine) => engine.metadata(),
        }
    }
}

impl InferenceBackend for DoodleEngine {
    fn infer(&mut self, batch: &[f32]) -> Result<Vec<f32>> {
        match self {
            DoodleEngine::Wgpu(engine) => engine.classify_batch(batch),
            DoodleEngine::Cpu(engine) => engine.classify_batch(batch),
        }
    }
}

/// 設定に従ってモデルを読み込む（ブロッキング）
pub fn load_engine(config: &AppConfig, labels: &LabelTable) -> Result<DoodleEngine> {
    let path = Path::new(&config.model.model_path);
    info!(path = %path.display(), device = %config.device_type, "推論エンジンを初期化します");

    let engine = match config.device_type {
        DeviceType::Wgpu => DoodleEngine::Wgpu(InferenceEngine::load(path, labels, WgpuDevice::default())?),
        DeviceType::Cpu => DoodleEngine::Cpu(InferenceEngine::load(path, labels, NdArrayDevice::Cpu)?),
    };
    Ok(engine)
}

/// 学習済みモデルをメタデータと共に保存する
pub fn save_classifier<B: Backend>(
    output_path: &Path,
    model: DoodleClassifier<B>,
    metadata: &ModelMetadata,
) -> Result<std::path::PathBuf> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let model_binary = recorder
        .record(model.into_record(), ())
        .map_err(|e| anyhow::anyhow!("モデル重みの書き出しエラー: {:?}", e))?;
    crate::model::save_model_with_metadata(output_path, metadata, &model_binary)
        .context("モデルファイルの保存に失敗しました")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("doodle_guess_engine_{}_{}.tar.gz", std::process::id(), name))
    }

    fn saved_model(name: &str, labels: &[&str]) -> std::path::PathBuf {
        let device = NdArrayDevice::Cpu;
        let model = ModelConfig::new(labels.len()).init::<NdArray>(&device);
        let metadata = ModelMetadata::new(labels.iter().map(|s| s.to_string()).collect(), 1);
        save_classifier(&temp_path(name), model, &metadata).unwrap()
    }

    #[test]
    fn test_load_and_classify() {
        let path = saved_model("classify", &["cat", "dog", "fish"]);
        let labels = LabelTable::all_promptable(["cat", "dog", "fish"]).unwrap();
        let engine = InferenceEngine::<NdArray>::load(&path, &labels, NdArrayDevice::Cpu).unwrap();
        assert_eq!(engine.metadata().class_labels.len(), 3);

        let probs = engine.classify_batch(&vec![0.0; GRID_LEN]).unwrap();
        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));

        assert!(engine.classify_batch(&[0.0; 10]).is_err());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_label_mismatch_is_rejected() {
        let path = saved_model("mismatch", &["cat", "dog"]);
        let labels = LabelTable::all_promptable(["cat", "dog", "fish"]).unwrap();
        let err = InferenceEngine::<NdArray>::load(&path, &labels, NdArrayDevice::Cpu)
            .err()
            .unwrap();
        assert!(err.to_string().contains("クラスラベル"));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_load_engine_on_cpu() {
        let path = saved_model("cpu", &["cat", "dog"]);
        let labels = LabelTable::all_promptable(["cat", "dog"]).unwrap();
        let mut config = AppConfig::default();
        config.device_type = DeviceType::Cpu;
        config.model.model_path = path.to_string_lossy().to_string();

        let mut engine = load_engine(&config, &labels).unwrap();
        assert!(matches!(engine, DoodleEngine::Cpu(_)));
        assert_eq!(engine.infer(&vec![0.5; GRID_LEN]).unwrap().len(), 2);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_model_file() {
        let mut config = AppConfig::default();
        config.device_type = DeviceType::Cpu;
        config.model.model_path = temp_path("missing").to_string_lossy().to_string();
        assert!(load_engine(&config, &LabelTable::default()).is_err());
    }
}
