//! 分類器ポート
//!
//! 読み込み済みの推論モデルを包む境界インターフェース。内部構造には関知せず、
//! 入出力の契約だけを定める。
//! - 入力: 28x28x1 のグリッドを1件バッチとして渡す
//! - 出力: ラベル表と同じ長さ・同じ順序の確率列

use serde::Serialize;
use std::future::Future;

use crate::error::InferenceError;
use crate::model::LabelTable;
use crate::types::{ClassProbabilities, NormalizedGrid, PredictionResult};

/// モデルの読み込み状態
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum ModelStatus {
    Loading,
    Ready,
    #[serde(rename = "error")]
    Failed(String),
}

impl ModelStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ModelStatus::Ready)
    }
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelStatus::Loading => write!(f, "loading"),
            ModelStatus::Ready => write!(f, "ready"),
            ModelStatus::Failed(message) => write!(f, "error: {}", message),
        }
    }
}

/// 推論モデルの能力
pub trait Classifier: Send + Sync {
    /// 現在の読み込み状態
    fn status(&self) -> ModelStatus;

    /// グリッドを分類してクラスごとの確率を返す
    ///
    /// 失敗は確信度0の結果ではなくエラーとして返すこと。
    fn infer(
        &self,
        grid: NormalizedGrid,
    ) -> impl Future<Output = Result<ClassProbabilities, InferenceError>> + Send;
}

/// 最大値のインデックス。同値の場合は小さいインデックスを優先し、NaNは無視する
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index)
}

impl PredictionResult {
    /// 分類器の出力から予測ラベルを選ぶ
    pub fn select(labels: &LabelTable, raw: ClassProbabilities) -> Result<Self, InferenceError> {
        if raw.len() != labels.len() {
            return Err(InferenceError::LabelMismatch {
                expected: labels.len(),
                actual: raw.len(),
            });
        }

        let index = argmax(raw.as_slice()).ok_or(InferenceError::NoValidOutput)?;
        let label = labels
            .label(index)
            .ok_or(InferenceError::NoValidOutput)?
            .to_string();
        let confidence = raw.get(index).unwrap_or(0.0).clamp(0.0, 1.0);

        Ok(Self {
            label,
            confidence,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LabelTable {
        LabelTable::all_promptable(["cat", "dog", "fish"]).unwrap()
    }

    #[test]
    fn test_argmax_picks_largest() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[-3.0, -1.0, -2.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_argmax_ties_prefer_lowest_index() {
        for len in 2..6 {
            for first in 0..len {
                for second in (first + 1)..len {
                    let mut values = vec![0.1f32; len];
                    values[first] = 0.5;
                    values[second] = 0.5;
                    assert_eq!(argmax(&values), Some(first), "tie at {} and {}", first, second);
                }
            }
        }
        assert_eq!(argmax(&[0.25; 4]), Some(0));
    }

    #[test]
    fn test_argmax_skips_nan() {
        assert_eq!(argmax(&[f32::NAN, 0.2, 0.1]), Some(1));
        assert_eq!(argmax(&[f32::NAN, f32::NAN]), None);
    }

    #[test]
    fn test_select_maps_index_to_label() {
        let result = PredictionResult::select(
            &table(),
            ClassProbabilities::new(vec![0.1, 0.7, 0.2]),
        )
        .unwrap();
        assert_eq!(result.label, "dog");
        assert_eq!(result.confidence, 0.7);
        assert_eq!(result.raw, ClassProbabilities::new(vec![0.1, 0.7, 0.2]));
    }

    #[test]
    fn test_select_rejects_length_mismatch() {
        let err = PredictionResult::select(&table(), ClassProbabilities::new(vec![0.5, 0.5]))
            .unwrap_err();
        assert_eq!(
            err,
            InferenceError::LabelMismatch {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_select_rejects_all_nan() {
        let err = PredictionResult::select(
            &table(),
            ClassProbabilities::new(vec![f32::NAN; 3]),
        )
        .unwrap_err();
        assert_eq!(err, InferenceError::NoValidOutput);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ModelStatus::Loading.to_string(), "loading");
        assert_eq!(ModelStatus::Ready.to_string(), "ready");
        assert_eq!(
            ModelStatus::Failed("not found".to_string()).to_string(),
            "error: not found"
        );
        assert!(ModelStatus::Ready.is_ready());
        assert!(!ModelStatus::Loading.is_ready());
    }
}
