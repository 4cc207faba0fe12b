#![recursion_limit = "256"]

pub mod types;
pub mod error;

// お絵描き当てゲームの中核
pub mod canvas;
pub mod preprocess;
pub mod classifier;
pub mod model_slot;
pub mod prompt;
pub mod round;
pub mod model;
#[cfg(feature = "ml")]
pub mod ml;

pub use canvas::{DrawingSurface, SketchCanvas, StaticSurface};
pub use classifier::{Classifier, ModelStatus};
pub use error::{InferenceError, LabelTableError, RoundError, SnapshotError};
pub use model::{AppConfig, LabelTable};
pub use model_slot::{InferenceBackend, ModelSlot};
pub use preprocess::ImageNormalizer;
pub use prompt::PromptSampler;
pub use round::{PredictOutcome, RoundController, RoundPhase, RoundSettings};
pub use types::{
    ClassProbabilities, GameState, NormalizedGrid, PredictionResult, RasterSnapshot, RoundResult,
};

/// ログ出力を初期化（`RUST_LOG` 未指定時は info）
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // 二重初期化（テストなど）は無視する
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
