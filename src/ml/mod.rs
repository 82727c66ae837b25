pub mod ml_model;
pub mod inference;

pub use ml_model::{make_divisible, InvertedResidual, ModelConfig, PhotoClassifierNet};
pub use inference::{export_model, record_weights, ModelRunner};
