//! エラー種別の定義
//!
//! 空キャンバスはエラーではなく `RoundResult` の結果として扱う。

use crate::classifier::ModelStatus;

/// スナップショットの書き出し・デコードの失敗
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("描画面の書き出しに失敗しました: {0}")]
    Export(String),

    #[error("data URLの形式が不正です: {0}")]
    DataUrl(String),

    #[error("base64デコードエラー: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("画像の変換エラー: {0}")]
    Image(#[from] image::ImageError),

    #[error("画像サイズが不正です: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },
}

/// 分類器の呼び出し失敗
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferenceError {
    #[error("分類器が準備できていません ({0})")]
    NotReady(ModelStatus),

    #[error("出力クラス数がラベル表と一致しません: {actual} (期待: {expected})")]
    LabelMismatch { expected: usize, actual: usize },

    #[error("分類器の出力に有効な値がありません")]
    NoValidOutput,

    #[error("推論エラー: {0}")]
    Backend(String),
}

/// ラベル表の設定エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelTableError {
    #[error("ラベル表が空です")]
    Empty,

    #[error("ラベルが重複しています: {0}")]
    Duplicate(String),

    #[error("無効化対象のラベルがラベル表にありません: {0}")]
    UnknownDisabled(String),

    #[error("お題に使えるラベルがありません")]
    NoPromptableLabels,
}

/// ラウンド制御の境界で呼び出し元へ返すエラー
#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    #[error("モデルが利用できません ({0})")]
    ModelUnavailable(ModelStatus),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("予測処理中のため新しいラウンドを開始できません")]
    PredictionInFlight,

    #[error("セッションは終了しています")]
    SessionClosed,

    #[error(transparent)]
    Labels(#[from] LabelTableError),
}

impl RoundError {
    /// 同じ操作を再試行してよいエラーか
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RoundError::ModelUnavailable(_)
                | RoundError::Snapshot(_)
                | RoundError::Inference(_)
                | RoundError::PredictionInFlight
        )
    }
}
