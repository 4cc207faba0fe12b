pub mod config;
pub mod label_table;
pub mod model_metadata;
pub mod model_storage;

pub use config::{AppConfig, DeviceType, LabelSettings, ModelSettings};
pub use label_table::{LabelTable, CLASS_NAMES, DISABLED_PROMPTS};
pub use model_metadata::ModelMetadata;
pub use model_storage::{
    load_metadata, load_model_binary, load_model_with_metadata, log_metadata_info,
    save_model_with_metadata,
};
