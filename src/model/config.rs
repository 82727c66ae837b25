//! アプリケーション設定管理モジュール
//!
//! 計算デバイスやモデル設定などをJSON形式で保存・読み込みします。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ClassifierError, Result};

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    Wgpu,
    /// NdArray (CPU) バックエンド
    Cpu,
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Cpu
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// 同梱モデルアーカイブの既定パス
///
/// リポジトリには含めていない。`photo-classifier init-model` で作成するか、
/// 学習済みモデルを同じ形式で置く。
pub const DEFAULT_MODEL_PATH: &str = "assets/mobilenet_v2.tar.gz";

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// 使用するモデルアーカイブ（tar.gz）のパス
    pub model_path: String,
    /// モデル入力サイズ（正方形の一辺）
    pub input_size: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: DEFAULT_MODEL_PATH.to_string(),
            input_size: 224,
        }
    }
}

/// 推論設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSettings {
    /// モデル入力を画像に戻したプレビューを作るか
    pub preview_enabled: bool,
    /// 結果に含める上位候補数
    pub top_k: usize,
    /// 推論ワーカーの待ち行列の長さ
    pub queue_capacity: usize,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            preview_enabled: true,
            top_k: 5,
            queue_capacity: 4,
        }
    }
}

/// ログ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// ログレベル（trace / debug / info / warn / error）
    pub level: String,
    /// ANSIカラーを使うか
    pub ansi_colors: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi_colors: true,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 計算デバイスの種類
    #[serde(default)]
    pub device_type: DeviceType,
    /// モデル設定
    #[serde(default)]
    pub model: ModelSettings,
    /// 推論設定
    #[serde(default)]
    pub inference: InferenceSettings,
    /// ログ設定
    #[serde(default)]
    pub logging: LoggingSettings,
    /// 最後に分類した画像のパス
    #[serde(default)]
    pub last_image_path: Option<String>,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ClassifierError::Config(format!("{} を読み込めません: {}", path.display(), e))
        })?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 指定パスから設定を読み込む、存在しない・壊れている場合はデフォルト設定を返す
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    tracing::info!("設定ファイルを読み込みました: {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "設定ファイルの読み込みに失敗しました ({}): {}。デフォルト設定を使用します",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::info!("設定ファイルが存在しません。デフォルト設定を使用します");
            Self::default()
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 計算デバイスを設定
    pub fn set_device_type(&mut self, device_type: DeviceType) {
        self.device_type = device_type;
    }

    /// モデルパスを設定
    pub fn set_model_path(&mut self, path: String) {
        self.model.model_path = path;
    }

    /// 最後に分類した画像のパスを更新
    pub fn update_last_image_path<P: AsRef<Path>>(&mut self, path: P) {
        self.last_image_path = Some(path.as_ref().to_string_lossy().to_string());
    }
}
