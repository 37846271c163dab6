//! 病害診断HTTPサービス

#![recursion_limit = "256"]

use clap::Parser;
use std::path::PathBuf;

use leaf_doctor_lib::ml::InferenceEngine;
use leaf_doctor_lib::model::{AppConfig, DeviceType, CONFIG_PATH_ENV};
use leaf_doctor_lib::server::{self, AppState};

/// Plant leaf disease diagnosis server
#[derive(Parser, Debug)]
#[command(name = "leaf_doctor", version, about)]
struct Cli {
    /// 設定ファイル（JSON）
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// 待受ホスト
    #[arg(long)]
    host: Option<String>,

    /// 待受ポート
    #[arg(short, long)]
    port: Option<u16>,

    /// モデルアーカイブ（.tar.gz）
    #[arg(short, long)]
    model: Option<String>,

    /// ラベル表（class_indices.json）
    #[arg(long)]
    labels: Option<String>,

    /// 信頼度の閾値（パーセント）
    #[arg(long)]
    threshold: Option<f64>,

    /// 計算デバイス（cpu / wgpu）
    #[arg(long)]
    device: Option<DeviceType>,
}

impl Cli {
    fn apply(self, config: &mut AppConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(model) = self.model {
            config.model.model_path = model;
        }
        if let Some(labels) = self.labels {
            config.model.labels_path = Some(labels);
        }
        if let Some(threshold) = self.threshold {
            config.model.confidence_threshold = threshold;
        }
        if let Some(device) = self.device {
            config.device_type = device;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    leaf_doctor_lib::init_logging();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load_or_default(&config_path)?;
    config.apply_env()?;
    cli.apply(&mut config);
    config.validate()?;

    tracing::info!("Leaf Doctor v{}", env!("CARGO_PKG_VERSION"));
    config.log_summary();

    let model_path = PathBuf::from(&config.model.model_path);
    let labels_path = config.model.labels_path.clone().map(PathBuf::from);
    let device_type = config.device_type;

    let engine = tokio::task::spawn_blocking(move || {
        InferenceEngine::load_with_labels(&model_path, labels_path.as_deref(), device_type)
    })
    .await??;

    let state = AppState::new(engine, config.model.confidence_threshold);
    server::serve(state, &config.server).await
}
