//! アプリケーション設定管理モジュール
//!
//! 計算デバイス、モデル、学習、HTTPサーバの設定をJSON形式で保存・読み込みします。
//! 読み込み後に環境変数（`.env` を含む）で上書きできます。

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ml::ml_model::{min_image_size, IMAGE_SIZE};

/// 設定ファイルパスを指定する環境変数
pub const CONFIG_PATH_ENV: &str = "LEAF_DOCTOR_CONFIG";

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// NdArray (CPU) バックエンド
    #[default]
    Cpu,
    /// WGPU (GPU) バックエンド
    Wgpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

impl std::str::FromStr for DeviceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" | "ndarray" => Ok(DeviceType::Cpu),
            "wgpu" | "gpu" => Ok(DeviceType::Wgpu),
            other => anyhow::bail!("unknown device type: {other} (expected cpu or wgpu)"),
        }
    }
}

/// モデル設定（推論側）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// 学習済みモデル（tar.gz）のパス
    pub model_path: String,
    /// ラベル表の上書き（class_indices.json）
    pub labels_path: Option<String>,
    /// 信頼度の閾値（パーセント）。これ未満は "Unknown" として返す
    pub confidence_threshold: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: "model/plant_disease_model.tar.gz".to_string(),
            labels_path: None,
            confidence_threshold: 70.0,
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// クラスごとのサブディレクトリを持つデータセット
    pub dataset_dir: String,
    /// 学習済みモデルの出力先
    pub output_path: String,
    /// 入力画像サイズ（正方形）
    pub image_size: usize,
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// 学習率
    pub learning_rate: f64,
    /// 検証データの割合
    pub validation_split: f32,
    /// ドロップアウト率
    pub dropout: f64,
    /// ランダムシード
    pub seed: u64,
    /// 左右反転によるデータ拡張
    pub augment: bool,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            dataset_dir: "dataset".to_string(),
            output_path: "model/plant_disease_model.tar.gz".to_string(),
            image_size: IMAGE_SIZE,
            num_epochs: 6,
            batch_size: 32,
            learning_rate: 1e-3,
            validation_split: 0.2,
            dropout: 0.5,
            seed: 42,
            augment: false,
        }
    }
}

/// HTTPサーバ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// アップロードの最大サイズ（バイト）
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 計算デバイスの種類
    #[serde(default)]
    pub device_type: DeviceType,
    /// モデル設定
    #[serde(default)]
    pub model: ModelSettings,
    /// トレーニング設定
    #[serde(default)]
    pub training: TrainingSettings,
    /// サーバ設定
    #[serde(default)]
    pub server: ServerSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.json"))
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// 設定ファイルが存在すれば読み込み、存在しなければデフォルト設定を返す
    ///
    /// ファイルが存在するのに壊れている場合はエラーにする。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let config = Self::load(path)?;
            tracing::info!("設定ファイルを読み込みました: {}", path.display());
            Ok(config)
        } else {
            tracing::info!(
                "設定ファイルが存在しません ({})。デフォルト設定を使用します",
                path.display()
            );
            Ok(Self::default())
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 環境変数で設定を上書きする
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// 任意の取得関数で上書きする（テストで環境変数を汚さないため分離）
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("invalid PORT: {port}"))?;
        }
        if let Some(model_path) = lookup("MODEL_PATH") {
            self.model.model_path = model_path;
        }
        if let Some(labels_path) = lookup("LABELS_PATH") {
            self.model.labels_path = Some(labels_path);
        }
        if let Some(threshold) = lookup("CONFIDENCE_THRESHOLD") {
            self.model.confidence_threshold = threshold
                .parse()
                .with_context(|| format!("invalid CONFIDENCE_THRESHOLD: {threshold}"))?;
        }
        if let Some(dataset_dir) = lookup("DATASET_DIR") {
            self.training.dataset_dir = dataset_dir;
        }
        if let Some(device) = lookup("LEAF_DOCTOR_DEVICE") {
            self.device_type = device.parse()?;
        }
        Ok(())
    }

    /// 値の範囲を検証する
    pub fn validate(&self) -> anyhow::Result<()> {
        let threshold = self.model.confidence_threshold;
        if !(0.0..=100.0).contains(&threshold) {
            anyhow::bail!("confidence_threshold must be within 0..=100, got {threshold}");
        }

        let training = &self.training;
        if !(0.0..1.0).contains(&training.validation_split) {
            anyhow::bail!(
                "validation_split must be within 0..1, got {}",
                training.validation_split
            );
        }
        if training.batch_size == 0 {
            anyhow::bail!("batch_size must be positive");
        }
        if training.num_epochs == 0 {
            anyhow::bail!("num_epochs must be positive");
        }
        if training.image_size < min_image_size() {
            anyhow::bail!(
                "image_size {} is too small (minimum {})",
                training.image_size,
                min_image_size()
            );
        }
        if !(0.0..1.0).contains(&training.dropout) {
            anyhow::bail!("dropout must be within 0..1, got {}", training.dropout);
        }
        if self.server.max_upload_bytes == 0 {
            anyhow::bail!("max_upload_bytes must be positive");
        }
        Ok(())
    }

    /// 設定情報をログに出力
    pub fn log_summary(&self) {
        tracing::info!("計算デバイス: {}", self.device_type);
        tracing::info!("モデルパス: {}", self.model.model_path);
        if let Some(labels) = &self.model.labels_path {
            tracing::info!("ラベル表: {}", labels);
        }
        tracing::info!("信頼度の閾値: {:.1}%", self.model.confidence_threshold);
        tracing::info!("待受: {}:{}", self.server.host, self.server.port);
    }
}
