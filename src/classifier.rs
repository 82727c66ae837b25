//! 写真分類パイプライン
//!
//! 任意サイズの画像 → 中央切り出し・縮小 → 正規化 → 推論 → ラベル解決。
//! 必要に応じてモデルに渡した入力そのものをプレビュー画像として復元します。

use std::time::Instant;

use burn::tensor::backend::Backend;
use image::RgbaImage;
use serde::Serialize;

use crate::error::{ClassifierError, Result};
use crate::labels::{argmax, resolve, top_k, LabelTable, RankedLabel};
use crate::ml::ModelRunner;
use crate::tensor::{normalize, prepare_square, reconstruct};

/// 分類結果
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// 予測ラベル
    pub label: String,
    /// 予測クラスのインデックス
    pub index: usize,
    /// 予測クラスの確率（正規化し直さない生の値）
    pub confidence: f32,
    /// 上位候補
    pub top_k: Vec<RankedLabel>,
    /// モデルに渡した入力を画像に戻したもの
    #[serde(skip)]
    pub preview: Option<RgbaImage>,
    /// 前処理から結果までの所要時間
    pub elapsed_ms: f64,
}

impl Prediction {
    /// 表示用の文字列（"ラベル\nProbability: 確率"）
    pub fn summary(&self) -> String {
        format!("{}\nProbability: {}", self.label, self.confidence)
    }
}

/// モデルとラベル表をまとめた分類器
pub struct Classifier<B: Backend> {
    runner: ModelRunner<B>,
    labels: LabelTable,
    preview_enabled: bool,
    top_k: usize,
}

impl<B: Backend> Classifier<B> {
    /// 分類器を作成
    ///
    /// モデルの出力クラス数とラベル数が一致しない場合は `ModelLoad`。
    pub fn new(runner: ModelRunner<B>, labels: LabelTable) -> Result<Self> {
        if runner.num_classes() != labels.len() {
            return Err(ClassifierError::ModelLoad(format!(
                "モデルの出力クラス数 {} とラベル数 {} が一致しません",
                runner.num_classes(),
                labels.len()
            )));
        }

        Ok(Self {
            runner,
            labels,
            preview_enabled: true,
            top_k: 5,
        })
    }

    /// 同梱のMobileNetラベル表で作成
    pub fn with_mobilenet_labels(runner: ModelRunner<B>) -> Result<Self> {
        Self::new(runner, LabelTable::mobilenet().clone())
    }

    pub fn with_preview(mut self, enabled: bool) -> Self {
        self.preview_enabled = enabled;
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    /// 画像を分類
    pub fn classify(&self, image: &RgbaImage) -> Result<Prediction> {
        let started = Instant::now();
        let side = self.runner.input_size();

        let square = prepare_square(image, side)?;
        let input = normalize(&square, side)?;
        let probabilities = self.runner.infer(&input)?;

        // ラベルとインデックスは同じ argmax から取る
        let (label, confidence) = resolve(&probabilities, &self.labels)?;
        let index = argmax(&probabilities).ok_or(ClassifierError::EmptyInput)?;
        let ranked = top_k(&probabilities, &self.labels, self.top_k)?;

        let preview = if self.preview_enabled {
            Some(reconstruct(&input, side)?)
        } else {
            None
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        tracing::info!("分類結果: {} ({:.4}, {:.1}ms)", label, confidence, elapsed_ms);

        Ok(Prediction {
            label,
            index,
            confidence,
            top_k: ranked,
            preview,
            elapsed_ms,
        })
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }
}
