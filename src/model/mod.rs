pub mod model_metadata;
pub mod model_storage;
pub mod label_map;
pub mod config;

pub use model_metadata::ModelMetadata;
pub use model_storage::{
    archive_path, class_indices_path, load_metadata, load_model_with_metadata, log_metadata_info,
    save_model_with_metadata,
};
pub use label_map::{is_unknown_label, LabelMap, UNKNOWN_LABEL};
pub use config::{AppConfig, CONFIG_PATH_ENV, DeviceType, ModelSettings, ServerSettings, TrainingSettings};
