//! モデルメタデータの定義
//!
//! tar.gz形式のモデルアーカイブに `metadata.json` として保存され、
//! 推論時にネットワークの再構築とラベル表の復元に使われます。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::label_map::LabelMap;

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    /// クラスラベル（出力ベクトルの順序）
    /// 例: ["Apple___Apple_scab", "Apple___Black_rot", ...]
    pub class_labels: Vec<String>,

    /// モデル入力サイズ（正方形、通常128）
    pub image_size: usize,

    /// 学習時のドロップアウト率
    pub dropout: f64,

    /// 学習エポック数
    pub num_epochs: usize,

    /// 学習に使ったサンプル数
    #[serde(default)]
    pub train_samples: usize,

    /// 検証に使ったサンプル数
    #[serde(default)]
    pub validation_samples: usize,

    /// 最終エポックの検証精度（0.0〜1.0、検証データが無い場合はNone）
    #[serde(default)]
    pub validation_accuracy: Option<f64>,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(class_labels: Vec<String>, image_size: usize, dropout: f64, num_epochs: usize) -> Self {
        Self {
            class_labels,
            image_size,
            dropout,
            num_epochs,
            train_samples: 0,
            validation_samples: 0,
            validation_accuracy: None,
            trained_at: chrono::Local::now().to_rfc3339(),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.class_labels.len()
    }

    /// ラベル表を取得
    pub fn label_map(&self) -> LabelMap {
        LabelMap::new(self.class_labels.clone())
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_keeps_label_order() {
        let labels = vec![
            "Tomato___healthy".to_string(),
            "Apple___Black_rot".to_string(),
        ];
        let mut metadata = ModelMetadata::new(labels.clone(), 128, 0.5, 6);
        metadata.validation_accuracy = Some(0.91);

        let json = metadata.to_json_string().unwrap();
        let restored = ModelMetadata::from_json_string(&json).unwrap();

        assert_eq!(restored.class_labels, labels);
        assert_eq!(restored, metadata);
        assert_eq!(restored.num_classes(), 2);
    }

    #[test]
    fn test_old_metadata_without_stats() {
        let json = r#"{
            "class_labels": ["a", "b"],
            "image_size": 64,
            "dropout": 0.5,
            "num_epochs": 3,
            "trained_at": "2024-01-01T00:00:00+00:00"
        }"#;
        let metadata = ModelMetadata::from_json_string(json).unwrap();
        assert_eq!(metadata.train_samples, 0);
        assert_eq!(metadata.validation_accuracy, None);
    }
}
