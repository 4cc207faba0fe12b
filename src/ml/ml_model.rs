//! 機械学習モデルの共通定義
//!
//! 手描きスケッチ分類用のCNNモデルと関連する設定を提供します。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};

/// 最終畳み込み層のチャンネル数
const FEATURE_CHANNELS: usize = 128;

/// モデル設定
///
/// 全体平均プーリングで空間サイズを畳むため、入力サイズは設定に含めない。
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
}

impl ModelConfig {
    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> DoodleClassifier<B> {
        tracing::debug!(classes = self.num_classes, "モデルを初期化します");

        DoodleClassifier {
            // 3x3 (same padding) で空間サイズを保つ
            conv1: Conv2dConfig::new([1, 32], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            pool1: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),

            conv2: Conv2dConfig::new([32, 64], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            pool2: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),

            conv3: Conv2dConfig::new([64, FEATURE_CHANNELS], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),

            fc1: LinearConfig::new(FEATURE_CHANNELS, FEATURE_CHANNELS).init(device),
            fc2: LinearConfig::new(FEATURE_CHANNELS, self.num_classes).init(device),

            activation: Relu::new(),
        }
    }
}

/// スケッチ分類用CNNモデル
///
/// # アーキテクチャ
/// - Conv 3x3 (1 -> 32) + ReLU + MaxPool 2x2
/// - Conv 3x3 (32 -> 64) + ReLU + MaxPool 2x2
/// - Conv 3x3 (64 -> 128) + ReLU
/// - Global Average Pooling
/// - FC: 128 -> 128 + ReLU
/// - FC: 128 -> num_classes
/// - Softmax (分類時)
#[derive(Module, Debug)]
pub struct DoodleClassifier<B: Backend> {
    conv1: Conv2d<B>,
    pool1: MaxPool2d,
    conv2: Conv2d<B>,
    pool2: MaxPool2d,
    conv3: Conv2d<B>,
    global_pool: AdaptiveAvgPool2d,

    fc1: Linear<B>,
    fc2: Linear<B>,

    activation: Relu,
}

impl<B: Backend> DoodleClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 1, 28, 28]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.conv1.forward(images);
        let x = self.activation.forward(x);
        let x = self.pool1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool2.forward(x);

        let x = self.conv3.forward(x);
        let x = self.activation.forward(x);

        // [batch, 128, 1, 1] -> [batch, 128]
        let x = self.global_pool.forward(x);
        let x = x.reshape([batch_size, FEATURE_CHANNELS]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);

        self.fc2.forward(x)
    }

    /// クラスごとの確率 [batch_size, num_classes]
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    use crate::types::GRID_SIDE;

    #[test]
    fn test_output_shape_follows_class_count() {
        let device = NdArrayDevice::default();
        let model = ModelConfig::new(3).init::<NdArray>(&device);

        let images = Tensor::<NdArray, 4>::zeros([2, 1, GRID_SIDE, GRID_SIDE], &device);
        assert_eq!(model.forward(images).dims(), [2, 3]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let device = NdArrayDevice::default();
        let model = ModelConfig::new(4).init::<NdArray>(&device);

        let images = Tensor::<NdArray, 4>::ones([1, 1, GRID_SIDE, GRID_SIDE], &device);
        let probs = model.probabilities(images).into_data().to_vec::<f32>().unwrap();
        assert_eq!(probs.len(), 4);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }
}
