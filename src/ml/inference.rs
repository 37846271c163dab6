//! モデル推論機能
//!
//! 画像 → 前処理 → 順伝播 → Softmax → argmax + 信頼度 → 閾値判定。

use anyhow::Context;
use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor, TensorData},
};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

use crate::ml::backend::{self, CpuBackend};
use crate::ml::ml_model::{ModelConfig, PlantDiseaseCnn};
use crate::ml::preprocess::{preprocess_bytes, preprocess_path, PreprocessError};
use crate::model::{is_unknown_label, load_model_with_metadata, DeviceType, LabelMap, ModelMetadata, UNKNOWN_LABEL};

/// 推論のエラー
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error("model produced class index {index} but only {num_classes} labels are known")]
    IndexOutOfRange { index: usize, num_classes: usize },
    #[error("model produced no output")]
    EmptyOutput,
    #[error("inference backend error: {0}")]
    Backend(String),
}

impl ClassifyError {
    /// 入力画像側の問題か（HTTPでは400にする）
    pub fn is_bad_input(&self) -> bool {
        matches!(
            self,
            ClassifyError::Preprocess(PreprocessError::Empty | PreprocessError::Decode(_))
        )
    }
}

/// 1枚の画像に対する予測
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// argmaxのクラスインデックス
    pub class_index: usize,
    /// クラスインデックスに対応するラベル
    pub label: String,
    /// 最大確率（パーセント、小数第2位で丸め）
    pub confidence: f64,
    /// 全クラスの確率
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// 確率ベクトルから予測を作る
    pub fn from_probabilities(probabilities: Vec<f32>, labels: &LabelMap) -> Result<Self, ClassifyError> {
        let (class_index, max_prob) = argmax(&probabilities).ok_or(ClassifyError::EmptyOutput)?;
        let label = labels
            .label(class_index)
            .ok_or(ClassifyError::IndexOutOfRange {
                index: class_index,
                num_classes: labels.len(),
            })?
            .to_string();

        Ok(Self {
            class_index,
            label,
            confidence: confidence_percent(max_prob),
            probabilities,
        })
    }
}

/// 閾値判定後の診断結果
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Diagnosis {
    /// 報告するクラス名（閾値未満なら "Unknown"）
    pub class: String,
    pub confidence: f64,
    pub class_index: usize,
    /// 閾値を満たし、既知のクラスとして認識されたか
    pub recognized: bool,
}

impl Diagnosis {
    /// 信頼度が閾値未満、またはラベル自体が "Unknown" の場合は "Unknown" として返す
    ///
    /// 閾値ちょうどは採用する。
    pub fn from_prediction(prediction: &Prediction, threshold: f64) -> Self {
        let recognized = prediction.confidence >= threshold && !is_unknown_label(&prediction.label);
        let class = if recognized {
            prediction.label.clone()
        } else {
            UNKNOWN_LABEL.to_string()
        };

        Self {
            class,
            confidence: prediction.confidence,
            class_index: prediction.class_index,
            recognized,
        }
    }
}

/// 最大値とそのインデックス（同値なら先頭、NaNは無視）
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

/// 確率をパーセントに変換し小数第2位で丸める
pub fn confidence_percent(probability: f32) -> f64 {
    (probability as f64 * 100.0 * 100.0).round() / 100.0
}

struct LoadedModel<B: Backend> {
    model: PlantDiseaseCnn<B>,
    device: B::Device,
}

impl<B: Backend> LoadedModel<B> {
    fn restore(metadata: &ModelMetadata, binary: Vec<u8>, device: B::Device) -> anyhow::Result<Self> {
        let model = ModelConfig::new(metadata.num_classes())
            .with_dropout(metadata.dropout)
            .with_image_size(metadata.image_size)
            .init::<B>(&device)?;

        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let record = recorder
            .load(binary, &device)
            .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;

        Ok(Self {
            model: model.load_record(record),
            device,
        })
    }

    /// [n, 3, size, size] の画素列を確率 [n * num_classes] に変換
    fn probabilities(&self, pixels: Vec<f32>, batch: usize, image_size: usize) -> Result<Vec<f32>, ClassifyError> {
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch, 3, image_size, image_size]),
            &self.device,
        );
        self.model
            .forward_probabilities(images)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| ClassifyError::Backend(format!("{e:?}")))
    }
}

enum EngineBackend {
    Cpu(LoadedModel<CpuBackend>),
    #[cfg(feature = "wgpu")]
    Gpu(LoadedModel<backend::GpuBackend>),
}

/// 推論エンジン
pub struct InferenceEngine {
    backend: EngineBackend,
    labels: LabelMap,
    image_size: usize,
    metadata: Option<ModelMetadata>,
}

impl InferenceEngine {
    /// モデルを読み込んで推論エンジンを初期化
    pub fn load(model_path: &Path, device_type: DeviceType) -> anyhow::Result<Self> {
        Self::load_with_labels(model_path, None, device_type)
    }

    /// ラベル表（class_indices.json）を上書きして読み込む
    pub fn load_with_labels(
        model_path: &Path,
        labels_path: Option<&Path>,
        device_type: DeviceType,
    ) -> anyhow::Result<Self> {
        backend::ensure_available(device_type)?;

        let (metadata, binary) = load_model_with_metadata(model_path)
            .with_context(|| format!("モデルを読み込めません: {}", model_path.display()))?;

        let labels = match labels_path {
            Some(path) => {
                let labels = LabelMap::load(path)?;
                if labels.len() != metadata.num_classes() {
                    anyhow::bail!(
                        "ラベル表のクラス数 ({}) がモデルのクラス数 ({}) と一致しません",
                        labels.len(),
                        metadata.num_classes()
                    );
                }
                labels
            }
            None => metadata.label_map(),
        };

        let backend = match device_type {
            DeviceType::Cpu => EngineBackend::Cpu(LoadedModel::restore(
                &metadata,
                binary,
                backend::cpu_device(),
            )?),
            #[cfg(feature = "wgpu")]
            DeviceType::Wgpu => EngineBackend::Gpu(LoadedModel::restore(
                &metadata,
                binary,
                backend::gpu_device(),
            )?),
            #[cfg(not(feature = "wgpu"))]
            DeviceType::Wgpu => anyhow::bail!("WGPUバックエンドは無効です"),
        };

        tracing::info!(
            classes = labels.len(),
            image_size = metadata.image_size,
            device = %device_type,
            "推論エンジンを初期化しました"
        );

        Ok(Self {
            backend,
            labels,
            image_size: metadata.image_size,
            metadata: Some(metadata),
        })
    }

    /// メモリ上のCPUモデルから作成（ツール・テスト用）
    pub fn from_cpu_model(model: PlantDiseaseCnn<CpuBackend>, labels: LabelMap, image_size: usize) -> Self {
        Self {
            backend: EngineBackend::Cpu(LoadedModel {
                model,
                device: backend::cpu_device(),
            }),
            labels,
            image_size,
            metadata: None,
        }
    }

    /// 正規化済み画素列（1枚または複数枚）から確率を計算
    fn probabilities(&self, pixels: Vec<f32>, batch: usize) -> Result<Vec<f32>, ClassifyError> {
        match &self.backend {
            EngineBackend::Cpu(m) => m.probabilities(pixels, batch, self.image_size),
            #[cfg(feature = "wgpu")]
            EngineBackend::Gpu(m) => m.probabilities(pixels, batch, self.image_size),
        }
    }

    /// 正規化済みの1枚分の画素列を分類
    pub fn classify_pixels(&self, pixels: Vec<f32>) -> Result<Prediction, ClassifyError> {
        let probabilities = self.probabilities(pixels, 1)?;
        Prediction::from_probabilities(probabilities, &self.labels)
    }

    /// アップロードされたバイト列を分類
    pub fn classify_bytes(&self, bytes: &[u8]) -> Result<Prediction, ClassifyError> {
        let pixels = preprocess_bytes(bytes, self.image_size)?;
        self.classify_pixels(pixels)
    }

    /// 単一画像ファイルを分類
    pub fn classify_path(&self, image_path: &Path) -> Result<Prediction, ClassifyError> {
        let pixels = preprocess_path(image_path, self.image_size)?;
        self.classify_pixels(pixels)
    }

    /// 複数画像を1回の順伝播でまとめて分類
    pub fn classify_batch<P: AsRef<Path>>(&self, image_paths: &[P]) -> Result<Vec<Prediction>, ClassifyError> {
        if image_paths.is_empty() {
            return Ok(Vec::new());
        }

        let mut pixels = Vec::with_capacity(image_paths.len() * 3 * self.image_size * self.image_size);
        for path in image_paths {
            pixels.extend(preprocess_path(path.as_ref(), self.image_size)?);
        }

        let num_classes = self.labels.len();
        let probabilities = self.probabilities(pixels, image_paths.len())?;
        if num_classes == 0 || probabilities.len() != image_paths.len() * num_classes {
            return Err(ClassifyError::Backend(format!(
                "unexpected output length {} for {} images",
                probabilities.len(),
                image_paths.len()
            )));
        }

        probabilities
            .chunks(num_classes)
            .map(|row| Prediction::from_probabilities(row.to_vec(), &self.labels))
            .collect()
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    /// アーカイブから読み込んだ場合のメタデータ
    pub fn metadata(&self) -> Option<&ModelMetadata> {
        self.metadata.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::preprocess::tests::solid_png;
    use crate::model::save_model_with_metadata;

    const SIZE: usize = 32;

    fn labels() -> LabelMap {
        LabelMap::new(vec![
            "Tomato___Early_blight".into(),
            "Tomato___Leaf_Mold".into(),
            "Tomato___healthy".into(),
        ])
    }

    fn cpu_model() -> PlantDiseaseCnn<CpuBackend> {
        ModelConfig::new(3)
            .with_image_size(SIZE)
            .init::<CpuBackend>(&backend::cpu_device())
            .unwrap()
    }

    fn prediction(label: &str, confidence: f64) -> Prediction {
        Prediction {
            class_index: 0,
            label: label.to_string(),
            confidence,
            probabilities: vec![],
        }
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(argmax(&[0.5, 0.5]), Some((0, 0.5)));
        assert_eq!(argmax(&[f32::NAN, 0.3]), Some((1, 0.3)));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_confidence_percent() {
        assert_eq!(confidence_percent(0.5), 50.0);
        assert_eq!(confidence_percent(0.123456), 12.35);
        assert_eq!(confidence_percent(1.0), 100.0);
    }

    #[test]
    fn test_threshold_policy() {
        let accepted = Diagnosis::from_prediction(&prediction("Tomato___Leaf_Mold", 91.2), 70.0);
        assert_eq!(accepted.class, "Tomato___Leaf_Mold");
        assert!(accepted.recognized);

        let rejected = Diagnosis::from_prediction(&prediction("Tomato___Leaf_Mold", 69.99), 70.0);
        assert_eq!(rejected.class, "Unknown");
        assert_eq!(rejected.confidence, 69.99);
        assert!(!rejected.recognized);

        let boundary = Diagnosis::from_prediction(&prediction("Tomato___Leaf_Mold", 70.0), 70.0);
        assert!(boundary.recognized);

        let unknown_label = Diagnosis::from_prediction(&prediction("Unknown", 99.0), 70.0);
        assert_eq!(unknown_label.class, "Unknown");
        assert!(!unknown_label.recognized);
    }

    #[test]
    fn test_prediction_index_out_of_range() {
        let short = LabelMap::new(vec!["a".into()]);
        let err = Prediction::from_probabilities(vec![0.1, 0.9], &short).unwrap_err();
        assert!(matches!(err, ClassifyError::IndexOutOfRange { index: 1, num_classes: 1 }));
    }

    #[test]
    fn test_classify_bytes_with_fresh_model() {
        let engine = InferenceEngine::from_cpu_model(cpu_model(), labels(), SIZE);
        let png = solid_png(40, 40, [30, 160, 40]);

        let prediction = engine.classify_bytes(&png).unwrap();
        assert!(prediction.class_index < 3);
        assert_eq!(prediction.probabilities.len(), 3);
        assert!((0.0..=100.0).contains(&prediction.confidence));
        assert_eq!(
            Some(prediction.label.as_str()),
            engine.labels().label(prediction.class_index)
        );
    }

    #[test]
    fn test_classify_bad_bytes() {
        let engine = InferenceEngine::from_cpu_model(cpu_model(), labels(), SIZE);
        let err = engine.classify_bytes(b"GIF89a broken").unwrap_err();
        assert!(err.is_bad_input());
    }

    #[test]
    fn test_batch_matches_single() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        std::fs::write(&a, solid_png(32, 32, [200, 10, 10])).unwrap();
        std::fs::write(&b, solid_png(32, 32, [10, 200, 10])).unwrap();

        let engine = InferenceEngine::from_cpu_model(cpu_model(), labels(), SIZE);
        let batch = engine.classify_batch(&[&a, &b]).unwrap();
        assert_eq!(batch.len(), 2);

        let single = engine.classify_path(&b).unwrap();
        assert_eq!(batch[1].class_index, single.class_index);
        for (x, y) in batch[1].probabilities.iter().zip(&single.probabilities) {
            assert!((x - y).abs() < 1e-4);
        }
    }

    #[test]
    fn test_load_from_archive() {
        let model = cpu_model();
        let png = solid_png(32, 32, [90, 90, 20]);
        let expected = InferenceEngine::from_cpu_model(model.clone(), labels(), SIZE)
            .classify_bytes(&png)
            .unwrap();

        let binary = BinBytesRecorder::<FullPrecisionSettings>::default()
            .record(model.into_record(), ())
            .unwrap();
        let metadata = ModelMetadata::new(labels().labels().to_vec(), SIZE, 0.5, 1);

        let dir = tempfile::tempdir().unwrap();
        let path = save_model_with_metadata(&dir.path().join("leaf.tar.gz"), &metadata, &binary).unwrap();

        let engine = InferenceEngine::load(&path, DeviceType::Cpu).unwrap();
        assert_eq!(engine.num_classes(), 3);
        assert_eq!(engine.image_size(), SIZE);
        assert!(engine.metadata().is_some());

        let restored = engine.classify_bytes(&png).unwrap();
        assert_eq!(restored.class_index, expected.class_index);
        assert!((restored.confidence - expected.confidence).abs() < 0.02);
    }

    #[test]
    fn test_label_override_must_match() {
        let model = cpu_model();
        let binary = BinBytesRecorder::<FullPrecisionSettings>::default()
            .record(model.into_record(), ())
            .unwrap();
        let metadata = ModelMetadata::new(labels().labels().to_vec(), SIZE, 0.5, 1);

        let dir = tempfile::tempdir().unwrap();
        let path = save_model_with_metadata(&dir.path().join("leaf.tar.gz"), &metadata, &binary).unwrap();
        let labels_path = dir.path().join("class_indices.json");
        LabelMap::new(vec!["only".into()]).save(&labels_path).unwrap();

        assert!(InferenceEngine::load_with_labels(&path, Some(&labels_path), DeviceType::Cpu).is_err());
    }
}
