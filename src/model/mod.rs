pub mod model_metadata;
pub mod model_storage;
pub mod config;

pub use model_metadata::ModelMetadata;
pub use model_storage::{
    load_metadata, load_model_with_metadata, print_metadata_info, read_model_bundle,
    save_model_with_metadata, write_model_bundle,
};
pub use config::{
    AppConfig, DeviceType, InferenceSettings, LoggingSettings, ModelSettings, DEFAULT_MODEL_PATH,
};
