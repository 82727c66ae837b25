//! 画像分類モデルの定義
//!
//! MobileNetV2系の軽量CNN。端末上での推論を想定しています。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};

/// 反転残差ブロックの構成 (拡張率 t, 出力チャンネル c, 繰り返し n, 最初のストライド s)
const INVERTED_RESIDUAL_SETTINGS: [(usize, usize, usize, usize); 7] = [
    (1, 16, 1, 1),
    (6, 24, 2, 2),
    (6, 32, 3, 2),
    (6, 64, 4, 2),
    (6, 96, 3, 1),
    (6, 160, 3, 2),
    (6, 320, 1, 1),
];

/// ステム畳み込みの出力チャンネル（幅係数1.0のとき）
const STEM_CHANNELS: usize = 32;

/// 最終1x1畳み込みの出力チャンネル（幅係数1.0のとき）
const HEAD_CHANNELS: usize = 1280;

/// チャンネル数を8の倍数に丸める（元の値の90%を下回らないようにする）
pub fn make_divisible(value: f64) -> usize {
    let divisor = 8.0;
    let rounded = ((value + divisor / 2.0) / divisor).floor() * divisor;
    let mut rounded = rounded.max(divisor);
    if rounded < 0.9 * value {
        rounded += divisor;
    }
    rounded as usize
}

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// 入力画像サイズ（正方形）
    #[config(default = 224)]
    pub image_size: usize,
    /// チャンネル幅の係数
    #[config(default = 1.0)]
    pub width_multiplier: f64,
}

impl ModelConfig {
    fn channels(&self, base: usize) -> usize {
        make_divisible(base as f64 * self.width_multiplier)
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> PhotoClassifierNet<B> {
        let stem_channels = self.channels(STEM_CHANNELS);
        let head_channels = self.channels(HEAD_CHANNELS);

        let mut blocks = Vec::new();
        let mut in_channels = stem_channels;
        for (expansion, base_channels, repeats, first_stride) in INVERTED_RESIDUAL_SETTINGS {
            let out_channels = self.channels(base_channels);
            for i in 0..repeats {
                let stride = if i == 0 { first_stride } else { 1 };
                blocks.push(InvertedResidual::new(in_channels, out_channels, stride, expansion, device));
                in_channels = out_channels;
            }
        }

        tracing::debug!(
            "[Model] 入力: {}x{}, ステム: {}ch, ブロック数: {}, ヘッド: {}ch, クラス数: {}",
            self.image_size,
            self.image_size,
            stem_channels,
            blocks.len(),
            head_channels,
            self.num_classes
        );

        PhotoClassifierNet {
            // 3x3 stride 2
            stem: Conv2dConfig::new([3, stem_channels], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            blocks,
            head: Conv2dConfig::new([in_channels, head_channels], [1, 1]).init(device),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            classifier: LinearConfig::new(head_channels, self.num_classes).init(device),
        }
    }
}

/// ReLU6
fn relu6<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    x.clamp(0.0, 6.0)
}

/// 反転残差ブロック
///
/// 1x1 拡張 + ReLU6 → 3x3 depthwise + ReLU6 → 1x1 線形射影。
/// 入出力の形状が一致する場合のみ恒等ショートカットを足す。
#[derive(Module, Debug)]
pub struct InvertedResidual<B: Backend> {
    expand: Option<Conv2d<B>>,
    depthwise: Conv2d<B>,
    project: Conv2d<B>,
}

impl<B: Backend> InvertedResidual<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        expansion: usize,
        device: &B::Device,
    ) -> Self {
        let hidden = in_channels * expansion;
        let expand = (expansion != 1)
            .then(|| Conv2dConfig::new([in_channels, hidden], [1, 1]).init(device));

        Self {
            expand,
            depthwise: Conv2dConfig::new([hidden, hidden], [3, 3])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_groups(hidden)
                .init(device),
            project: Conv2dConfig::new([hidden, out_channels], [1, 1]).init(device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.expand {
            Some(expand) => relu6(expand.forward(input.clone())),
            None => input.clone(),
        };
        let x = relu6(self.depthwise.forward(x));
        let x = self.project.forward(x);

        if x.dims() == input.dims() {
            x + input
        } else {
            x
        }
    }
}

/// 写真分類用CNNモデル
///
/// # アーキテクチャ
/// - Conv 3x3 stride 2 + ReLU6
/// - 反転残差ブロック x 17
/// - Conv 1x1 + ReLU6
/// - Global Average Pooling
/// - FC: head -> num_classes
/// - Softmax (確率出力時)
#[derive(Module, Debug)]
pub struct PhotoClassifierNet<B: Backend> {
    stem: Conv2d<B>,
    blocks: Vec<InvertedResidual<B>>,
    head: Conv2d<B>,
    pool: AdaptiveAvgPool2d,
    classifier: Linear<B>,
}

impl<B: Backend> PhotoClassifierNet<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, size, size]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = relu6(self.stem.forward(images));
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = relu6(self.head.forward(x));
        let x = self.pool.forward(x);

        // Flatten
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        self.classifier.forward(x)
    }

    /// クラスごとの確率 [batch_size, num_classes]
    pub fn forward_probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_make_divisible() {
        assert_eq!(make_divisible(32.0), 32);
        assert_eq!(make_divisible(16.0 * 0.25), 8);
        assert_eq!(make_divisible(24.0 * 0.5), 16);
        assert_eq!(make_divisible(1280.0), 1280);
    }

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let config = ModelConfig::new(7).with_image_size(32).with_width_multiplier(0.25);
        let model = config.init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let logits = model.forward(images.clone());
        assert_eq!(logits.dims(), [2, 7]);

        let probs = model.forward_probabilities(images);
        let values = probs.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values.len(), 14);
        for row in values.chunks(7) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-4);
            assert!(row.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }
}
