//! 機械学習モデルの共通定義
//!
//! 葉の病害分類用のCNNモデルと関連する設定を提供します。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Int, Tensor},
    train::ClassificationOutput,
};

/// デフォルトの入力画像サイズ
pub const IMAGE_SIZE: usize = 128;

/// 全結合層の隠れユニット数
const HIDDEN_UNITS: usize = 128;

/// 最後の畳み込みのチャネル数
const FINAL_CHANNELS: usize = 128;

/// Conv(3x3, padding無し) + Pool(2x2) を3回通した後の特徴マップサイズ
///
/// 1段ごとに `(size - 2) / 2`（切り捨て）。
pub fn feature_map_size(image_size: usize) -> usize {
    (0..3).fold(image_size, |size, _| size.saturating_sub(2) / 2)
}

/// ネットワークが受け付ける最小の入力サイズ
pub fn min_image_size() -> usize {
    (1..).find(|&size| feature_map_size(size) > 0).unwrap_or(usize::MAX)
}

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// ドロップアウト率
    #[config(default = 0.5)]
    pub dropout: f64,
    /// 入力画像サイズ（正方形）
    #[config(default = 128)]
    pub image_size: usize,
}

impl ModelConfig {
    /// モデルを初期化
    ///
    /// 入力サイズ:
    /// - Conv1 (3x3): size -> size - 2, Pool1: -> (size - 2) / 2
    /// - Conv2, Pool2, Conv3, Pool3 も同様
    /// - 128px入力の場合 128 -> 63 -> 30 -> 14
    pub fn init<B: Backend>(&self, device: &B::Device) -> anyhow::Result<PlantDiseaseCnn<B>> {
        if self.num_classes == 0 {
            anyhow::bail!("クラス数が0です");
        }

        let feature_map = feature_map_size(self.image_size);
        if feature_map == 0 {
            anyhow::bail!(
                "入力サイズが小さすぎます: {} (最小{}x{}が必要)",
                self.image_size,
                min_image_size(),
                min_image_size()
            );
        }

        // 特徴次元 d = 128チャネル * feature_map * feature_map
        let d = FINAL_CHANNELS * feature_map * feature_map;

        tracing::debug!(
            image_size = self.image_size,
            feature_map,
            features = d,
            num_classes = self.num_classes,
            "CNNを構築します"
        );

        Ok(PlantDiseaseCnn {
            conv1: Conv2dConfig::new([3, 32], [3, 3]).init(device),
            conv2: Conv2dConfig::new([32, 64], [3, 3]).init(device),
            conv3: Conv2dConfig::new([64, FINAL_CHANNELS], [3, 3]).init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc1: LinearConfig::new(d, HIDDEN_UNITS).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc2: LinearConfig::new(HIDDEN_UNITS, self.num_classes).init(device),
            activation: Relu::new(),
        })
    }
}

/// 葉の病害分類用CNNモデル
///
/// # アーキテクチャ
/// - {Conv 3x3 (no padding) + ReLU + MaxPool 2x2} x 3層 (32, 64, 128ch)
/// - Flatten
/// - FC: d -> 128 + ReLU + Dropout
/// - FC: 128 -> num_classes
/// - Softmax (推論時)
#[derive(Module, Debug)]
pub struct PlantDiseaseCnn<B: Backend> {
    conv1: Conv2d<B>, // 3 -> 32
    conv2: Conv2d<B>, // 32 -> 64
    conv3: Conv2d<B>, // 64 -> 128
    pool: MaxPool2d,

    fc1: Linear<B>,
    dropout: Dropout,
    fc2: Linear<B>,

    activation: Relu,
}

impl<B: Backend> PlantDiseaseCnn<B> {
    /// 順伝播
    ///
    /// - `images`: バッチ画像 [batch_size, 3, size, size]
    /// - 戻り値: クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.pool.forward(self.activation.forward(self.conv1.forward(images)));
        let x = self.pool.forward(self.activation.forward(self.conv2.forward(x)));
        let x = self.pool.forward(self.activation.forward(self.conv3.forward(x)));

        let [_, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = self.activation.forward(self.fc1.forward(x));
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// 順伝播 + Softmax
    ///
    /// 戻り値: クラスごとの確率 [batch_size, num_classes]
    pub fn forward_probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// 順伝播と損失計算（学習用）
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_feature_map_size() {
        assert_eq!(feature_map_size(128), 14);
        assert_eq!(feature_map_size(32), 2);
        assert_eq!(feature_map_size(21), 0);
        assert_eq!(min_image_size(), 22);
    }

    #[test]
    fn test_forward_shapes() {
        let device = NdArrayDevice::default();
        let model = ModelConfig::new(4)
            .with_image_size(32)
            .init::<TestBackend>(&device)
            .unwrap();

        let images = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![0.5f32; 2 * 3 * 32 * 32], [2, 3, 32, 32]),
            &device,
        );
        let logits = model.forward(images.clone());
        assert_eq!(logits.dims(), [2, 4]);

        let probs = model
            .forward_probabilities(images)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .unwrap();
        for row in probs.chunks(4) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-4, "row sums to {sum}");
            assert!(row.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn test_init_rejects_bad_config() {
        let device = NdArrayDevice::default();
        assert!(ModelConfig::new(3)
            .with_image_size(16)
            .init::<TestBackend>(&device)
            .is_err());
        assert!(ModelConfig::new(0).init::<TestBackend>(&device).is_err());
    }
}
