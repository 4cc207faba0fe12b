pub mod inference;
pub mod ml_model;

pub use inference::{load_engine, save_classifier, DoodleEngine, InferenceEngine};
pub use ml_model::{DoodleClassifier, ModelConfig};
