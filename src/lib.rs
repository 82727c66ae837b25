//! 端末内で写真を分類するコアライブラリ
//!
//! 画像の正規化、テンソルからの画像復元、モデル推論、ラベル解決を提供します。
//! 画面やネットワーク取得は呼び出し側（モバイルアプリやCLI）の責務です。

pub mod error;
pub mod labels;
pub mod logging;
pub mod model;
pub mod source;
pub mod tensor;

#[cfg(feature = "ml")]
pub mod classifier;
#[cfg(feature = "ml")]
pub mod ml;
#[cfg(feature = "ml")]
pub mod worker;

pub use error::{ClassifierError, Result};
pub use labels::{LabelTable, RankedLabel};
pub use source::ImageSource;

#[cfg(feature = "ml")]
pub use classifier::{Classifier, Prediction};
#[cfg(feature = "ml")]
pub use ml::ModelRunner;
#[cfg(feature = "ml")]
pub use worker::InferenceWorker;

/// CPUバックエンド
#[cfg(feature = "ml")]
pub type CpuBackend = burn_ndarray::NdArray<f32>;

/// GPUバックエンド
#[cfg(feature = "ml")]
pub type GpuBackend = burn_wgpu::Wgpu;
