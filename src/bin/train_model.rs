//! 病害分類モデルの学習

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use leaf_doctor_lib::ml::run_training;
use leaf_doctor_lib::model::{AppConfig, DeviceType, CONFIG_PATH_ENV};

/// Train the plant leaf disease classifier
#[derive(Parser, Debug)]
#[command(name = "train_model", version, about)]
struct Cli {
    /// 設定ファイル（JSON）
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// データセットディレクトリ（クラスごとのサブディレクトリ）
    #[arg(short, long)]
    dataset: Option<String>,

    /// 出力するモデルアーカイブ
    #[arg(short, long)]
    output: Option<String>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    /// 入力画像サイズ（正方形）
    #[arg(long)]
    image_size: Option<usize>,

    /// 検証データの割合
    #[arg(long)]
    validation_split: Option<f32>,

    #[arg(long)]
    seed: Option<u64>,

    /// 左右反転によるデータ拡張を有効にする
    #[arg(long)]
    augment: bool,

    /// 計算デバイス（cpu / wgpu）
    #[arg(long)]
    device: Option<DeviceType>,
}

impl Cli {
    fn apply(self, config: &mut AppConfig) {
        let training = &mut config.training;
        if let Some(dataset) = self.dataset {
            training.dataset_dir = dataset;
        }
        if let Some(output) = self.output {
            training.output_path = output;
        }
        if let Some(epochs) = self.epochs {
            training.num_epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            training.batch_size = batch_size;
        }
        if let Some(learning_rate) = self.learning_rate {
            training.learning_rate = learning_rate;
        }
        if let Some(image_size) = self.image_size {
            training.image_size = image_size;
        }
        if let Some(validation_split) = self.validation_split {
            training.validation_split = validation_split;
        }
        if let Some(seed) = self.seed {
            training.seed = seed;
        }
        if self.augment {
            training.augment = true;
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

    tracing::info!("=== 学習開始 ===");
    tracing::info!("データセット: {}", config.training.dataset_dir);
    tracing::info!("出力先: {}", config.training.output_path);
    tracing::info!("計算デバイス: {}", config.device_type);

    // Ctrl+C で次のバッチの前に中断する
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let flag = cancel_flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("中断要求を受け付けました。現在のバッチ終了後に停止します");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let settings = config.training.clone();
    let device_type = config.device_type;
    let report = tokio::task::spawn_blocking(move || {
        run_training(&settings, device_type, cancel_flag, |metrics| {
            let percent = metrics.epoch as f64 / metrics.total_epochs as f64 * 100.0;
            println!("進捗: {:.0}% ({}/{})", percent, metrics.epoch, metrics.total_epochs);
        })
    })
    .await??;

    println!("\n=== 学習完了 ===");
    println!("{:>6} {:>10} {:>10} {:>10} {:>10}", "epoch", "loss", "acc", "val_loss", "val_acc");
    for m in &report.history {
        println!(
            "{:>6} {:>10.4} {:>9.2}% {:>10} {:>10}",
            m.epoch,
            m.train_loss,
            m.train_accuracy * 100.0,
            m.val_loss.map(|v| format!("{v:.4}")).unwrap_or_else(|| "-".into()),
            m.val_accuracy
                .map(|v| format!("{:.2}%", v * 100.0))
                .unwrap_or_else(|| "-".into()),
        );
    }
    println!("モデル: {}", report.model_path.display());
    println!("ラベル表: {}", report.class_indices_path.display());

    Ok(())
}
