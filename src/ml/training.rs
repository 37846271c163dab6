//! モデル学習
//!
//! ディレクトリ構造のデータセット（クラスごとのサブディレクトリ）を読み込み、
//! クラスごとに学習/検証へ分割して CNN を学習し、重みとラベル表を保存します。

use anyhow::{Context, Result};
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::{AutodiffModule, Module},
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor, TensorData,
    },
};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::ml::backend;
use crate::ml::inference::argmax;
use crate::ml::ml_model::{ModelConfig, PlantDiseaseCnn};
use crate::ml::preprocess::preprocess_image;
use crate::model::{
    class_indices_path, save_model_with_metadata, DeviceType, LabelMap, ModelMetadata, TrainingSettings,
};

/// 学習データとして読み込む拡張子
const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff", "webp"];

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                IMAGE_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false)
}

/// 学習データセット（パスのリストのみ保持）
#[derive(Debug, Clone)]
pub struct LeafDataset {
    samples: Vec<(PathBuf, usize)>, // (画像パス, クラスID)
    class_names: Vec<String>,
}

impl LeafDataset {
    /// ディレクトリから学習データを読み込む
    ///
    /// サブディレクトリ名がクラス名。クラスIDは名前順で割り当てる。
    pub fn from_directory(data_dir: &Path) -> Result<Self> {
        if !data_dir.is_dir() {
            anyhow::bail!("データセットディレクトリが存在しません: {}", data_dir.display());
        }

        let mut class_dirs = Vec::new();
        for entry in std::fs::read_dir(data_dir)
            .with_context(|| format!("Failed to read {}", data_dir.display()))?
        {
            let path = entry?.path();
            if path.is_dir() {
                let class_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| anyhow::anyhow!("Invalid directory name: {}", path.display()))?
                    .to_string();
                class_dirs.push((class_name, path));
            }
        }
        class_dirs.sort_by(|a, b| a.0.cmp(&b.0));

        if class_dirs.is_empty() {
            anyhow::bail!("クラスディレクトリが見つかりません: {}", data_dir.display());
        }

        let mut samples = Vec::new();
        let mut class_names = Vec::with_capacity(class_dirs.len());

        for (class_id, (class_name, class_dir)) in class_dirs.into_iter().enumerate() {
            let mut images: Vec<PathBuf> = std::fs::read_dir(&class_dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| is_image_file(path))
                .collect();
            images.sort();

            if images.is_empty() {
                tracing::warn!("クラス '{}' に画像がありません", class_name);
            }
            tracing::info!("  クラス {}: {} ({} 枚)", class_id, class_name, images.len());

            samples.extend(images.into_iter().map(|path| (path, class_id)));
            class_names.push(class_name);
        }

        if samples.is_empty() {
            anyhow::bail!("No training samples found in {}", data_dir.display());
        }

        tracing::info!(
            "{} クラスから {} 枚の画像を読み込みました",
            class_names.len(),
            samples.len()
        );

        Ok(Self {
            samples,
            class_names,
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// クラスごとのサンプル数
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.class_names.len()];
        for (_, label) in &self.samples {
            counts[*label] += 1;
        }
        counts
    }

    /// クラスごとに層化して学習用と検証用に分割
    ///
    /// 各クラスから ⌊n × validation_split⌋ 枚を検証用にする。2枚以上あるクラスは
    /// 最低1枚を検証用に、最低1枚を学習用に残す。
    pub fn split(self, validation_split: f32, seed: u64) -> (Self, Self) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut per_class: Vec<Vec<PathBuf>> = vec![Vec::new(); self.class_names.len()];
        for (path, label) in self.samples {
            per_class[label].push(path);
        }

        let mut train = Vec::new();
        let mut valid = Vec::new();

        for (label, mut paths) in per_class.into_iter().enumerate() {
            paths.shuffle(&mut rng);
            let n = paths.len();
            let mut n_val = (n as f32 * validation_split).floor() as usize;
            if validation_split > 0.0 && n >= 2 {
                n_val = n_val.clamp(1, n - 1);
            }

            for (i, path) in paths.into_iter().enumerate() {
                if i < n_val {
                    valid.push((path, label));
                } else {
                    train.push((path, label));
                }
            }
        }

        (
            Self {
                samples: train,
                class_names: self.class_names.clone(),
            },
            Self {
                samples: valid,
                class_names: self.class_names,
            },
        )
    }
}

/// データセットアイテム（画像パスのみ保持）
#[derive(Clone, Debug)]
pub struct LeafItem {
    pub path: PathBuf,
    pub label: usize,
}

impl Dataset<LeafItem> for LeafDataset {
    fn get(&self, index: usize) -> Option<LeafItem> {
        let (path, label) = self.samples.get(index)?;
        Some(LeafItem {
            path: path.clone(),
            label: *label,
        })
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// バッチャー
#[derive(Clone, Debug)]
pub struct LeafBatcher {
    image_size: usize,
    /// 左右反転の乱数（None ならデータ拡張なし）
    augment_rng: Option<Arc<Mutex<rand::rngs::StdRng>>>,
}

impl LeafBatcher {
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            augment_rng: None,
        }
    }

    /// シード付きの乱数で左右反転をランダムに適用する
    pub fn with_augmentation(mut self, seed: u64) -> Self {
        self.augment_rng = Some(Arc::new(Mutex::new(rand::rngs::StdRng::seed_from_u64(seed))));
        self
    }

    fn should_flip(&self) -> bool {
        match &self.augment_rng {
            Some(rng) => rng.lock().map(|mut rng| rng.gen_bool(0.5)).unwrap_or(false),
            None => false,
        }
    }

    fn load(&self, path: &Path) -> Option<Vec<f32>> {
        match image::open(path) {
            Ok(img) => {
                let img = if self.should_flip() { img.fliph() } else { img };
                Some(preprocess_image(&img, self.image_size))
            }
            Err(e) => {
                tracing::warn!("画像読み込み失敗 {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct LeafBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, LeafItem, LeafBatch<B>> for LeafBatcher {
    fn batch(&self, items: Vec<LeafItem>, device: &B::Device) -> LeafBatch<B> {
        let batch_size = items.len();
        let plane = 3 * self.image_size * self.image_size;
        let mut all_pixels = Vec::with_capacity(batch_size * plane);
        let mut targets_vec = Vec::with_capacity(batch_size);

        for item in items {
            match self.load(&item.path) {
                Some(data) => all_pixels.extend_from_slice(&data),
                // 読めない画像はゼロで埋める
                None => all_pixels.extend(std::iter::repeat(0.0f32).take(plane)),
            }
            targets_vec.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(all_pixels, [batch_size, 3, self.image_size, self.image_size]),
            device,
        );
        let targets = Tensor::<B, 1, Int>::from_ints(targets_vec.as_slice(), device);

        LeafBatch { images, targets }
    }
}

/// 1エポック分の指標
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub total_epochs: usize,
    pub train_loss: f64,
    /// 0.0〜1.0
    pub train_accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

/// 学習結果
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub model_path: PathBuf,
    pub class_indices_path: PathBuf,
    pub metadata: ModelMetadata,
    pub history: Vec<EpochMetrics>,
}

/// ロジットとターゲットから正解数を数える
fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Result<usize> {
    let [_, num_classes] = logits.dims();
    let logits = logits
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("出力の取得エラー: {:?}", e))?;
    let targets = targets
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| anyhow::anyhow!("ターゲットの取得エラー: {:?}", e))?;

    Ok(logits
        .chunks(num_classes)
        .zip(targets)
        .filter(|(row, target)| argmax(row).map(|(i, _)| i as i64) == Some(*target))
        .count())
}

/// 検証データで損失と精度を計算
fn evaluate<B: Backend>(
    model: &PlantDiseaseCnn<B>,
    dataset: &LeafDataset,
    batcher: &LeafBatcher,
    batch_size: usize,
    device: &B::Device,
) -> Result<Option<(f64, f64)>> {
    let len = dataset.len();
    if len == 0 {
        return Ok(None);
    }

    let mut loss_sum = 0.0f64;
    let mut correct = 0usize;

    for start in (0..len).step_by(batch_size) {
        let end = (start + batch_size).min(len);
        let items: Vec<_> = (start..end).filter_map(|i| dataset.get(i)).collect();
        let n = items.len();
        let batch: LeafBatch<B> = batcher.batch(items, device);

        let output = model.forward_classification(batch.images, batch.targets);
        let loss: f64 = output.loss.into_scalar().elem();
        loss_sum += loss * n as f64;
        correct += count_correct(output.output, output.targets)?;
    }

    Ok(Some((loss_sum / len as f64, correct as f64 / len as f64)))
}

/// モデル学習を実行
///
/// エポックごとに `progress_callback` を呼ぶ。`cancel_flag` が立つとバッチの区切りで中断する。
pub fn train_model<B, F>(
    settings: &TrainingSettings,
    device: B::Device,
    cancel_flag: Arc<AtomicBool>,
    mut progress_callback: F,
) -> Result<TrainingReport>
where
    B: AutodiffBackend,
    F: FnMut(&EpochMetrics),
{
    let dataset = LeafDataset::from_directory(Path::new(&settings.dataset_dir))?;
    let class_names = dataset.class_names().to_vec();
    let num_classes = class_names.len();
    if num_classes < 2 {
        anyhow::bail!("分類には2クラス以上が必要です（{} クラス）", num_classes);
    }

    let (dataset_train, dataset_val) = dataset.split(settings.validation_split, settings.seed);
    if dataset_train.len() == 0 {
        anyhow::bail!("学習データがありません");
    }

    tracing::info!("学習データ: {} 枚", dataset_train.len());
    tracing::info!("検証データ: {} 枚", dataset_val.len());

    let model_config = ModelConfig::new(num_classes)
        .with_dropout(settings.dropout)
        .with_image_size(settings.image_size);
    let mut model = model_config.init::<B>(&device)?;
    let mut optimizer = AdamConfig::new().init::<B, PlantDiseaseCnn<B>>();

    tracing::info!(
        "モデル設定: {} クラス, 入力サイズ: {}x{}, dropout={}",
        num_classes,
        settings.image_size,
        settings.image_size,
        settings.dropout
    );
    tracing::info!(
        "エポック数: {}, バッチサイズ: {}, 学習率: {}, デバイス: {:?}",
        settings.num_epochs,
        settings.batch_size,
        settings.learning_rate,
        device
    );

    let batcher_train = if settings.augment {
        // シャッフルとは別系列の乱数にする
        LeafBatcher::new(settings.image_size).with_augmentation(settings.seed.wrapping_add(1))
    } else {
        LeafBatcher::new(settings.image_size)
    };
    let batcher_val = LeafBatcher::new(settings.image_size);
    let mut shuffle_rng = rand::rngs::StdRng::seed_from_u64(settings.seed);
    let mut history = Vec::with_capacity(settings.num_epochs);

    for epoch in 1..=settings.num_epochs {
        let mut indices: Vec<usize> = (0..dataset_train.len()).collect();
        indices.shuffle(&mut shuffle_rng);

        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;
        let mut seen = 0usize;

        for chunk in indices.chunks(settings.batch_size) {
            if cancel_flag.load(Ordering::Relaxed) {
                anyhow::bail!("学習がキャンセルされました（エポック {}）", epoch);
            }

            let items: Vec<_> = chunk.iter().filter_map(|&i| dataset_train.get(i)).collect();
            let n = items.len();
            let batch: LeafBatch<B> = batcher_train.batch(items, &device);

            let output = model.forward_classification(batch.images, batch.targets);
            let loss_value: f64 = output.loss.clone().into_scalar().elem();
            loss_sum += loss_value * n as f64;
            correct += count_correct(output.output, output.targets)?;
            seen += n;

            let grads = output.loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(settings.learning_rate, model, grads);
        }

        let valid = evaluate::<B::InnerBackend>(
            &model.valid(),
            &dataset_val,
            &batcher_val,
            settings.batch_size,
            &device,
        )?;

        let metrics = EpochMetrics {
            epoch,
            total_epochs: settings.num_epochs,
            train_loss: loss_sum / seen.max(1) as f64,
            train_accuracy: correct as f64 / seen.max(1) as f64,
            val_loss: valid.map(|(loss, _)| loss),
            val_accuracy: valid.map(|(_, acc)| acc),
        };

        match (metrics.val_loss, metrics.val_accuracy) {
            (Some(val_loss), Some(val_acc)) => tracing::info!(
                "Epoch {}/{}: loss={:.4} acc={:.2}% | val_loss={:.4} val_acc={:.2}%",
                epoch,
                settings.num_epochs,
                metrics.train_loss,
                metrics.train_accuracy * 100.0,
                val_loss,
                val_acc * 100.0
            ),
            _ => tracing::info!(
                "Epoch {}/{}: loss={:.4} acc={:.2}%",
                epoch,
                settings.num_epochs,
                metrics.train_loss,
                metrics.train_accuracy * 100.0
            ),
        }

        progress_callback(&metrics);
        history.push(metrics);
    }

    // 推論側と同じく内部バックエンドの重みを保存する
    let trained = model.valid();
    let model_binary = BinBytesRecorder::<FullPrecisionSettings>::default()
        .record(trained.into_record(), ())
        .map_err(|e| anyhow::anyhow!("モデル重みの保存エラー: {:?}", e))?;

    let mut metadata = ModelMetadata::new(
        class_names.clone(),
        settings.image_size,
        settings.dropout,
        settings.num_epochs,
    );
    metadata.train_samples = dataset_train.len();
    metadata.validation_samples = dataset_val.len();
    metadata.validation_accuracy = history.last().and_then(|m| m.val_accuracy);

    let model_path = save_model_with_metadata(Path::new(&settings.output_path), &metadata, &model_binary)?;
    let labels_path = class_indices_path(&model_path);
    LabelMap::new(class_names).save(&labels_path)?;

    tracing::info!(
        "モデルを保存しました: {} ({:.2} MB)",
        model_path.display(),
        model_binary.len() as f64 / 1024.0 / 1024.0
    );
    tracing::info!("ラベル表を保存しました: {}", labels_path.display());

    Ok(TrainingReport {
        model_path,
        class_indices_path: labels_path,
        metadata,
        history,
    })
}

/// 設定されたデバイスで学習を実行
pub fn run_training<F>(
    settings: &TrainingSettings,
    device_type: DeviceType,
    cancel_flag: Arc<AtomicBool>,
    progress_callback: F,
) -> Result<TrainingReport>
where
    F: FnMut(&EpochMetrics),
{
    backend::ensure_available(device_type)?;
    match device_type {
        DeviceType::Cpu => train_model::<backend::CpuAutodiff, F>(
            settings,
            backend::cpu_device(),
            cancel_flag,
            progress_callback,
        ),
        #[cfg(feature = "wgpu")]
        DeviceType::Wgpu => train_model::<backend::GpuAutodiff, F>(
            settings,
            backend::gpu_device(),
            cancel_flag,
            progress_callback,
        ),
        #[cfg(not(feature = "wgpu"))]
        DeviceType::Wgpu => anyhow::bail!("WGPUバックエンドは無効です"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::backend::{cpu_device, CpuBackend};
    use crate::ml::inference::InferenceEngine;
    use crate::ml::preprocess::tests::solid_png;

    /// クラスごとに単色画像を置いたデータセットを作る
    fn make_dataset(root: &Path, classes: &[(&str, [u8; 3], usize)]) {
        for (name, color, count) in classes {
            let dir = root.join(name);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                std::fs::write(dir.join(format!("leaf_{i}.png")), solid_png(30, 30, *color)).unwrap();
            }
        }
    }

    #[test]
    fn test_from_directory_sorts_classes() {
        let dir = tempfile::tempdir().unwrap();
        make_dataset(
            dir.path(),
            &[("Tomato___healthy", [0, 200, 0], 3), ("Apple___Black_rot", [40, 20, 10], 2)],
        );
        std::fs::write(dir.path().join("Tomato___healthy/notes.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let dataset = LeafDataset::from_directory(dir.path()).unwrap();
        assert_eq!(dataset.class_names(), ["Apple___Black_rot", "Tomato___healthy"]);
        assert_eq!(dataset.class_counts(), vec![2, 3]);
        assert_eq!(dataset.len(), 5);
    }

    #[test]
    fn test_from_directory_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LeafDataset::from_directory(&dir.path().join("missing")).is_err());
        assert!(LeafDataset::from_directory(dir.path()).is_err());

        std::fs::create_dir_all(dir.path().join("empty_class")).unwrap();
        assert!(LeafDataset::from_directory(dir.path()).is_err());
    }

    #[test]
    fn test_split_is_stratified_and_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        make_dataset(dir.path(), &[("a", [1, 1, 1], 10), ("b", [2, 2, 2], 5), ("c", [3, 3, 3], 1)]);

        let dataset = LeafDataset::from_directory(dir.path()).unwrap();
        let (train, valid) = dataset.clone().split(0.2, 42);
        assert_eq!(valid.class_counts(), vec![2, 1, 0]);
        assert_eq!(train.class_counts(), vec![8, 4, 1]);

        let (train2, _) = dataset.split(0.2, 42);
        let paths: Vec<_> = (0..train.len()).map(|i| train.get(i).unwrap().path).collect();
        let paths2: Vec<_> = (0..train2.len()).map(|i| train2.get(i).unwrap().path).collect();
        assert_eq!(paths, paths2);
    }

    #[test]
    fn test_split_zero_keeps_everything_for_training() {
        let dir = tempfile::tempdir().unwrap();
        make_dataset(dir.path(), &[("a", [1, 1, 1], 4), ("b", [2, 2, 2], 4)]);
        let (train, valid) = LeafDataset::from_directory(dir.path()).unwrap().split(0.0, 1);
        assert_eq!(train.len(), 8);
        assert_eq!(valid.len(), 0);
    }

    #[test]
    fn test_batcher_shapes_and_unreadable_image() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        std::fs::write(&good, solid_png(30, 30, [255, 255, 255])).unwrap();
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"not a png").unwrap();

        let batcher = LeafBatcher::new(24).with_augmentation(3);
        let batch: LeafBatch<CpuBackend> = batcher.batch(
            vec![
                LeafItem { path: good, label: 1 },
                LeafItem { path: bad, label: 0 },
            ],
            &cpu_device(),
        );
        assert_eq!(batch.images.dims(), [2, 3, 24, 24]);
        assert_eq!(batch.targets.dims(), [2]);

        let pixels = batch.images.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        let plane = 3 * 24 * 24;
        assert!(pixels[..plane].iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert!(pixels[plane..].iter().all(|&v| v == 0.0));
    }

    /// 左半分が赤、右半分が黒の画像を各サンプルで左右反転されたか判定する
    fn flipped_samples(batcher: &LeafBatcher, path: &Path, count: usize) -> Vec<bool> {
        let items = (0..count)
            .map(|_| LeafItem {
                path: path.to_path_buf(),
                label: 0,
            })
            .collect();
        let batch: LeafBatch<CpuBackend> = batcher.batch(items, &cpu_device());
        let pixels = batch.images.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        let sample = 3 * 24 * 24;
        // 赤チャネルの左上画素が暗ければ反転している
        pixels.chunks(sample).map(|p| p[0] < 0.5).collect()
    }

    #[test]
    fn test_augmentation_is_reproducible_with_seed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("half.png");
        image::RgbImage::from_fn(30, 30, |x, _| {
            if x < 15 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 0])
            }
        })
        .save(&path)
        .unwrap();

        let first = flipped_samples(&LeafBatcher::new(24).with_augmentation(11), &path, 32);
        let second = flipped_samples(&LeafBatcher::new(24).with_augmentation(11), &path, 32);
        assert_eq!(first, second);
        assert!(first.iter().any(|&f| f));
        assert!(first.iter().any(|&f| !f));

        let plain = flipped_samples(&LeafBatcher::new(24), &path, 8);
        assert!(plain.iter().all(|&f| !f));
    }

    #[test]
    fn test_train_small_dataset_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("dataset");
        make_dataset(
            &data_dir,
            &[("Potato___Early_blight", [120, 80, 20], 4), ("Potato___healthy", [20, 160, 30], 4)],
        );

        let settings = TrainingSettings {
            dataset_dir: data_dir.to_string_lossy().into_owned(),
            output_path: dir.path().join("model/plant").to_string_lossy().into_owned(),
            image_size: 24,
            num_epochs: 2,
            batch_size: 4,
            learning_rate: 1e-3,
            validation_split: 0.25,
            dropout: 0.5,
            seed: 7,
            augment: true,
        };

        let mut epochs_seen = Vec::new();
        let report = run_training(&settings, DeviceType::Cpu, Arc::new(AtomicBool::new(false)), |m| {
            epochs_seen.push(m.epoch)
        })
        .unwrap();

        assert_eq!(epochs_seen, vec![1, 2]);
        assert_eq!(report.history.len(), 2);
        assert!(report.history.iter().all(|m| m.train_loss.is_finite()));
        assert_eq!(report.metadata.train_samples, 6);
        assert_eq!(report.metadata.validation_samples, 2);
        assert!(report.metadata.validation_accuracy.is_some());
        assert_eq!(report.model_path, dir.path().join("model/plant.tar.gz"));

        let labels = LabelMap::load(&report.class_indices_path).unwrap();
        assert_eq!(labels.labels(), ["Potato___Early_blight", "Potato___healthy"]);

        let engine = InferenceEngine::load(&report.model_path, DeviceType::Cpu).unwrap();
        assert_eq!(engine.num_classes(), 2);
        let prediction = engine
            .classify_path(&data_dir.join("Potato___healthy/leaf_0.png"))
            .unwrap();
        assert!(prediction.class_index < 2);
    }

    #[test]
    fn test_cancelled_training() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("dataset");
        make_dataset(&data_dir, &[("a", [1, 1, 1], 2), ("b", [200, 2, 2], 2)]);

        let settings = TrainingSettings {
            dataset_dir: data_dir.to_string_lossy().into_owned(),
            output_path: dir.path().join("out.tar.gz").to_string_lossy().into_owned(),
            image_size: 24,
            num_epochs: 1,
            batch_size: 2,
            ..TrainingSettings::default()
        };

        let result = run_training(&settings, DeviceType::Cpu, Arc::new(AtomicBool::new(true)), |_| {});
        assert!(result.is_err());
        assert!(!dir.path().join("out.tar.gz").exists());
    }
}
