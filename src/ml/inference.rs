//! モデル推論機能
//!
//! モデルアーカイブのバイト列からネットワークを復元し、単発の推論を実行します。
//! ランナーは読み込んだモデルを専有し、破棄時に解放します。
//! 複数スレッドからの同時推論は想定していません（呼び出し側で直列化する）。

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor},
};

use crate::error::{ClassifierError, Result};
use crate::ml::PhotoClassifierNet;
use crate::model::{
    load_model_with_metadata, read_model_bundle, save_model_with_metadata, ModelMetadata,
};

type WeightsRecorder = BinBytesRecorder<FullPrecisionSettings>;

/// 推論エンジン
pub struct ModelRunner<B: Backend> {
    model: PhotoClassifierNet<B>,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> ModelRunner<B> {
    /// モデルアーカイブ（tar.gz）のバイト列からランナーを作成
    ///
    /// 壊れた・途中で切れたアーカイブや、メタデータと重みの不一致は `ModelLoad`。
    pub fn load(artifact: &[u8], device: &B::Device) -> Result<Self> {
        let (metadata, model_binary) = read_model_bundle(artifact)?;
        Self::from_parts(metadata, model_binary, device)
    }

    /// モデルアーカイブのファイルから読み込む
    pub fn load_file<P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Self> {
        let (metadata, model_binary) = load_model_with_metadata(path.as_ref())?;
        Self::from_parts(metadata, model_binary, device)
    }

    fn from_parts(metadata: ModelMetadata, model_binary: Vec<u8>, device: &B::Device) -> Result<Self> {
        let started = Instant::now();
        metadata.validate()?;

        // メタデータからモデルを構築して重みを復元
        let model = metadata.model_config().init::<B>(device);
        let expected_params = model.num_params();
        let model = restore_weights(model, model_binary, device)?;

        if model.num_params() != expected_params {
            return Err(ClassifierError::ModelLoad(format!(
                "重みの形状がメタデータと一致しません (パラメータ数 {} / 期待 {})",
                model.num_params(),
                expected_params
            )));
        }

        tracing::info!(
            "モデルを読み込みました: {} ({}クラス, 入力 {}x{}, {:.1}ms)",
            metadata.model_name,
            metadata.num_classes,
            metadata.input_size,
            metadata.input_size,
            started.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            model,
            metadata,
            device: device.clone(),
        })
    }

    /// 1回だけ順伝播を実行して確率ベクトルを返す
    ///
    /// 入力長が `3 × size × size` でなければ `Inference`（パニックしない）。
    pub fn infer(&self, input: &[f32]) -> Result<Vec<f32>> {
        let expected = self.expected_input_len();
        if input.len() != expected {
            return Err(ClassifierError::Inference(format!(
                "入力テンソル長 {} (期待: {})",
                input.len(),
                expected
            )));
        }

        let started = Instant::now();
        let side = self.metadata.input_size as usize;

        // [R,G,B,...] の行優先 → [1, size, size, 3] → [1, 3, size, size]
        let tensor = Tensor::<B, 1>::from_floats(input, &self.device)
            .reshape([1, side, side, 3])
            .permute([0, 3, 1, 2]);

        let output = self.model.forward_probabilities(tensor);
        let probabilities = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| ClassifierError::Inference(format!("推論結果の取得エラー: {:?}", e)))?;

        if probabilities.len() != self.metadata.num_classes {
            return Err(ClassifierError::Inference(format!(
                "出力長 {} (期待: {})",
                probabilities.len(),
                self.metadata.num_classes
            )));
        }

        tracing::debug!(
            "推論完了: {:.1}ms",
            started.elapsed().as_secs_f64() * 1000.0
        );

        Ok(probabilities)
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn input_size(&self) -> u32 {
        self.metadata.input_size
    }

    pub fn num_classes(&self) -> usize {
        self.metadata.num_classes
    }

    /// 入力テンソルの要素数
    pub fn expected_input_len(&self) -> usize {
        self.metadata.input_len()
    }
}

/// 重みのバイト列をモデルに読み込む
///
/// バイナリレコーダーは壊れた入力でパニックするため、ここで `ModelLoad` に変換する。
fn restore_weights<B: Backend>(
    model: PhotoClassifierNet<B>,
    model_binary: Vec<u8>,
    device: &B::Device,
) -> Result<PhotoClassifierNet<B>> {
    let restored = panic::catch_unwind(AssertUnwindSafe(|| {
        let recorder = WeightsRecorder::default();
        Recorder::<B>::load(&recorder, model_binary, device).map(|record| model.load_record(record))
    }));

    match restored {
        Ok(Ok(model)) => Ok(model),
        Ok(Err(e)) => Err(ClassifierError::ModelLoad(format!("モデル重みの読み込みエラー: {:?}", e))),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<String>()
                .map(String::as_str)
                .or_else(|| payload.downcast_ref::<&str>().copied())
                .unwrap_or("不明なエラー");
            Err(ClassifierError::ModelLoad(format!("モデル重みが壊れています: {}", reason)))
        }
    }
}

/// モデルの重みをバイト列にする（アーカイブ内の model.bin）
pub fn record_weights<B: Backend>(model: &PhotoClassifierNet<B>) -> Result<Vec<u8>> {
    let recorder = WeightsRecorder::default();
    Recorder::<B>::record(&recorder, model.clone().into_record(), ())
        .map_err(|e| ClassifierError::ModelLoad(format!("モデル重みの書き出しエラー: {:?}", e)))
}

/// モデルをメタデータと共にアーカイブファイルへ書き出す
///
/// 戻り値は実際に書き込んだパス（拡張子は `.tar.gz` に揃える）。
pub fn export_model<B: Backend>(
    model: &PhotoClassifierNet<B>,
    metadata: &ModelMetadata,
    output_path: &Path,
) -> Result<PathBuf> {
    metadata.validate()?;
    let model_binary = record_weights(model)?;
    save_model_with_metadata(output_path, metadata, &model_binary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_support::{tiny_artifact, TestBackend};
    use crate::model::write_model_bundle;

    #[test]
    fn test_load_and_infer() {
        let device = Default::default();
        let artifact = tiny_artifact(6, 16);
        let runner = ModelRunner::<TestBackend>::load(&artifact, &device).unwrap();

        assert_eq!(runner.num_classes(), 6);
        assert_eq!(runner.input_size(), 16);
        assert_eq!(runner.expected_input_len(), 3 * 16 * 16);

        let input = vec![0.5f32; runner.expected_input_len()];
        let probs = runner.infer(&input).unwrap();
        assert_eq!(probs.len(), 6);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);

        // 同じハンドルを繰り返し使える
        let again = runner.infer(&input).unwrap();
        for (a, b) in probs.iter().zip(again.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_weights_survive_export() {
        let device = Default::default();
        let metadata = ModelMetadata::new("tiny", 4, 8, 0.25);
        let model = metadata.model_config().init::<TestBackend>(&device);
        let dir = std::env::temp_dir().join(format!("photo_classifier_export_{}", std::process::id()));
        let path = export_model(&model, &metadata, &dir.join("tiny")).unwrap();
        assert!(path.to_string_lossy().ends_with("tiny.tar.gz"));

        let runner = ModelRunner::<TestBackend>::load_file(&path, &device).unwrap();
        std::fs::remove_dir_all(&dir).ok();
        let input: Vec<f32> = (0..runner.expected_input_len())
            .map(|i| (i % 255) as f32 / 255.0)
            .collect();

        let side = 8;
        let tensor = Tensor::<TestBackend, 1>::from_floats(input.as_slice(), &device)
            .reshape([1, side, side, 3])
            .permute([0, 3, 1, 2]);
        let expected = model
            .forward_probabilities(tensor)
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        let probs = runner.infer(&input).unwrap();
        for (a, b) in probs.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_infer_wrong_length() {
        let device = Default::default();
        let runner = ModelRunner::<TestBackend>::load(&tiny_artifact(3, 8), &device).unwrap();

        for len in [0, 3 * 8 * 8 - 1, 3 * 8 * 8 + 3, 3 * 224 * 224] {
            let err = runner.infer(&vec![0.0; len]).unwrap_err();
            assert!(matches!(err, ClassifierError::Inference(_)));
        }
    }

    #[test]
    fn test_load_truncated_artifact() {
        let device = Default::default();
        let artifact = tiny_artifact(3, 8);

        for len in [0, 10, artifact.len() / 2] {
            let result = ModelRunner::<TestBackend>::load(&artifact[..len], &device);
            assert!(matches!(result, Err(ClassifierError::ModelLoad(_))));
        }
    }

    #[test]
    fn test_load_corrupted_weights() {
        let device = Default::default();
        let metadata = ModelMetadata::new("broken", 3, 8, 0.25);
        let artifact = write_model_bundle(&metadata, b"not a burn record").unwrap();

        let result = ModelRunner::<TestBackend>::load(&artifact, &device);
        assert!(matches!(result, Err(ClassifierError::ModelLoad(_))));
    }

    #[test]
    fn test_load_truncated_weights() {
        let device = Default::default();
        let metadata = ModelMetadata::new("tiny", 3, 8, 0.25);
        let model = metadata.model_config().init::<TestBackend>(&device);
        let weights = record_weights(&model).unwrap();

        // アーカイブ自体は正常で、model.bin だけが途中で切れている
        for len in [0, 1, weights.len() / 2, weights.len() - 1] {
            let artifact = write_model_bundle(&metadata, &weights[..len]).unwrap();
            let result = ModelRunner::<TestBackend>::load(&artifact, &device);
            assert!(matches!(result, Err(ClassifierError::ModelLoad(_))), "len = {}", len);
        }

        // 切れていなければ読み込める
        let artifact = write_model_bundle(&metadata, &weights).unwrap();
        assert!(ModelRunner::<TestBackend>::load(&artifact, &device).is_ok());
    }

    #[test]
    fn test_load_oversized_metadata() {
        let device = Default::default();
        for metadata in [
            ModelMetadata::new("huge_head", 1 << 40, 8, 0.25),
            ModelMetadata::new("huge_width", 3, 8, 1.0e6),
            ModelMetadata::new("huge_input", 3, u32::MAX, 0.25),
        ] {
            let artifact = write_model_bundle(&metadata, b"junk").unwrap();
            let result = ModelRunner::<TestBackend>::load(&artifact, &device);
            assert!(matches!(result, Err(ClassifierError::ModelLoad(_))));
        }
    }

    #[test]
    fn test_load_file_missing() {
        let device = Default::default();
        let result = ModelRunner::<TestBackend>::load_file("no/such/model.tar.gz", &device);
        assert!(matches!(result, Err(ClassifierError::ModelLoad(_))));
    }
}
