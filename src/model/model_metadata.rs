//! モデルメタデータの定義
//!
//! モデルアーカイブ（tar.gz）内の `metadata.json` に保存される情報です。

use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, Result};

/// 受け付ける最大クラス数
pub const MAX_NUM_CLASSES: usize = 100_000;

/// 受け付ける最大入力サイズ（一辺）
pub const MAX_INPUT_SIZE: u32 = 4096;

/// 受け付ける最大の幅係数
pub const MAX_WIDTH_MULTIPLIER: f64 = 4.0;

/// 分類層の重み数の上限（f32で約256MB）
const MAX_HEAD_WEIGHTS: f64 = (1u64 << 26) as f64;

/// 幅係数1.0のときの最終特徴チャンネル数
const BASE_HEAD_CHANNELS: f64 = 1280.0;

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// モデル名（例: "mobilenet_v2_1.0_224"）
    pub model_name: String,

    /// 出力クラス数（同梱ラベル表と同じ1001）
    pub num_classes: usize,

    /// モデル入力サイズ（正方形の一辺、通常224）
    pub input_size: u32,

    /// チャンネル幅の係数
    #[serde(default = "default_width_multiplier")]
    pub width_multiplier: f64,

    /// エクスポート時刻（ISO8601形式）
    pub exported_at: String,
}

fn default_width_multiplier() -> f64 {
    1.0
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(
        model_name: impl Into<String>,
        num_classes: usize,
        input_size: u32,
        width_multiplier: f64,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            num_classes,
            input_size,
            width_multiplier,
            exported_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// モデル構築前に値を検証する
    ///
    /// モデル構築時の確保量はメタデータで決まるため、重みを読む前に上限も確認する。
    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 || self.num_classes > MAX_NUM_CLASSES {
            return Err(ClassifierError::ModelLoad(format!(
                "クラス数が範囲外です: {} (1〜{})",
                self.num_classes, MAX_NUM_CLASSES
            )));
        }
        if self.input_size == 0 || self.input_size > MAX_INPUT_SIZE {
            return Err(ClassifierError::ModelLoad(format!(
                "入力サイズが範囲外です: {} (1〜{})",
                self.input_size, MAX_INPUT_SIZE
            )));
        }
        if !(self.width_multiplier.is_finite()
            && self.width_multiplier > 0.0
            && self.width_multiplier <= MAX_WIDTH_MULTIPLIER)
        {
            return Err(ClassifierError::ModelLoad(format!(
                "幅係数が範囲外です: {} (0〜{})",
                self.width_multiplier, MAX_WIDTH_MULTIPLIER
            )));
        }

        let head_weights =
            (BASE_HEAD_CHANNELS * self.width_multiplier).ceil() * self.num_classes as f64;
        if head_weights > MAX_HEAD_WEIGHTS {
            return Err(ClassifierError::ModelLoad(format!(
                "分類層が大きすぎます: クラス数 {} × 幅係数 {}",
                self.num_classes, self.width_multiplier
            )));
        }
        Ok(())
    }

    /// 入力テンソルの要素数（3 × size × size）
    pub fn input_len(&self) -> usize {
        crate::tensor::tensor_len(self.input_size)
    }

    /// メタデータに対応するモデル設定
    #[cfg(feature = "ml")]
    pub fn model_config(&self) -> crate::ml::ModelConfig {
        crate::ml::ModelConfig::new(self.num_classes)
            .with_image_size(self.input_size as usize)
            .with_width_multiplier(self.width_multiplier)
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ClassifierError::ModelLoad(format!("metadata.jsonの解析エラー: {}", e)))
    }
}
