//! モデルアーカイブの確認と画像の試し分類

use clap::Parser;
use std::path::PathBuf;

use leaf_doctor_lib::disease_catalog::DiseaseCatalog;
use leaf_doctor_lib::ml::{Diagnosis, InferenceEngine};
use leaf_doctor_lib::model::{load_metadata, log_metadata_info, DeviceType};

/// Show model archive metadata and optionally classify images
#[derive(Parser, Debug)]
#[command(name = "inspect_model", version, about)]
struct Cli {
    /// モデルアーカイブ（.tar.gz）
    model: PathBuf,

    /// 分類する画像
    images: Vec<PathBuf>,

    /// ラベル表（class_indices.json）
    #[arg(long)]
    labels: Option<PathBuf>,

    /// 信頼度の閾値（パーセント）
    #[arg(long, default_value_t = 70.0)]
    threshold: f64,

    /// 計算デバイス（cpu / wgpu）
    #[arg(long, default_value = "cpu")]
    device: DeviceType,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    leaf_doctor_lib::init_logging();

    let cli = Cli::parse();

    let metadata = load_metadata(&cli.model)?;
    println!("=== {} ===", cli.model.display());
    log_metadata_info(&metadata);
    for (index, label) in metadata.class_labels.iter().enumerate() {
        println!("  {index:>3}: {label}");
    }

    if cli.images.is_empty() {
        return Ok(());
    }

    let engine = InferenceEngine::load_with_labels(&cli.model, cli.labels.as_deref(), cli.device)?;
    let catalog = DiseaseCatalog::builtin();

    println!();
    for path in &cli.images {
        match engine.classify_path(path) {
            Ok(prediction) => {
                let diagnosis = Diagnosis::from_prediction(&prediction, cli.threshold);
                println!(
                    "{}: {} ({:.2}%){}",
                    path.display(),
                    diagnosis.class,
                    diagnosis.confidence,
                    if diagnosis.recognized {
                        String::new()
                    } else {
                        format!(" [最有力候補: {}]", prediction.label)
                    }
                );
                if let Some(info) = catalog.lookup(&diagnosis.class) {
                    println!("    原因: {}", info.cause);
                    println!("    対処: {}", info.solution);
                }
            }
            Err(e) => eprintln!("{}: エラー: {}", path.display(), e),
        }
    }

    Ok(())
}
