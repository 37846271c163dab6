//! モデルとメタデータの永続化
//!
//! Tar.gz形式でモデルとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（クラスラベル、入力サイズなど）
//! - model.bin       - モデルの重み（バイナリ）

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const MODEL_ENTRY: &str = "model.bin";

/// ラベル表のファイル名（モデルと同じディレクトリに置く）
pub const CLASS_INDICES_FILE: &str = "class_indices.json";

/// 保存先パスを `.tar.gz` に揃える
///
/// `.gz` はそのまま、`.tar` は `.tar.gz` に、それ以外は末尾に `.tar.gz` を付け足す。
pub fn archive_path(output_path: &Path) -> PathBuf {
    match output_path.extension().and_then(|s| s.to_str()) {
        Some("gz") => output_path.to_path_buf(),
        Some("tar") => output_path.with_extension("tar.gz"),
        _ => {
            let mut name = output_path.as_os_str().to_os_string();
            name.push(".tar.gz");
            PathBuf::from(name)
        }
    }
}

/// モデルと同じディレクトリの `class_indices.json` のパス
pub fn class_indices_path(model_path: &Path) -> PathBuf {
    model_path
        .parent()
        .map(|p| p.join(CLASS_INDICES_FILE))
        .unwrap_or_else(|| PathBuf::from(CLASS_INDICES_FILE))
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, bytes: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, bytes)
        .with_context(|| format!("Failed to add {name} to tar"))
}

/// メタデータと共にモデルをTar.gz形式で保存
///
/// 戻り値は実際に書き込んだパス。
pub fn save_model_with_metadata(
    output_path: &Path,
    metadata: &ModelMetadata,
    model_binary: &[u8],
) -> Result<PathBuf> {
    let tar_gz_path = archive_path(output_path);

    if let Some(parent) = tar_gz_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
    }

    let tar_gz_file = File::create(&tar_gz_path)
        .with_context(|| format!("Failed to create tar.gz file: {:?}", tar_gz_path))?;

    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_entry(&mut tar_builder, METADATA_ENTRY, json_str.as_bytes())?;
    append_entry(&mut tar_builder, MODEL_ENTRY, model_binary)?;

    tar_builder
        .into_inner()
        .context("Failed to finalize tar archive")?
        .finish()
        .context("Failed to finalize gzip stream")?;

    Ok(tar_gz_path)
}

/// Tar.gzからモデルメタデータを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    let (metadata, _) = read_entries(tar_gz_path, false)?;
    metadata.ok_or_else(|| anyhow::anyhow!("{METADATA_ENTRY} not found in tar.gz archive"))
}

/// メタデータとモデルバイナリを共に読み込む
pub fn load_model_with_metadata(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    match read_entries(tar_gz_path, true)? {
        (Some(metadata), Some(binary)) => Ok((metadata, binary)),
        (None, _) => Err(anyhow::anyhow!("{METADATA_ENTRY} not found in tar.gz archive")),
        (_, None) => Err(anyhow::anyhow!("{MODEL_ENTRY} not found in tar.gz archive")),
    }
}

fn read_entries(
    tar_gz_path: &Path,
    with_binary: bool,
) -> Result<(Option<ModelMetadata>, Option<Vec<u8>>)> {
    let tar_gz_file = File::open(tar_gz_path)
        .with_context(|| format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;

    let decoder = GzDecoder::new(tar_gz_file);
    let mut archive = Archive::new(decoder);

    let mut metadata_opt: Option<ModelMetadata> = None;
    let mut model_binary_opt: Option<Vec<u8>> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();

        match path.as_str() {
            METADATA_ENTRY => {
                let mut json_str = String::new();
                entry.read_to_string(&mut json_str)?;
                metadata_opt = Some(ModelMetadata::from_json_string(&json_str)?);
                if !with_binary {
                    break;
                }
            }
            MODEL_ENTRY if with_binary => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                model_binary_opt = Some(buffer);
            }
            _ => {}
        }
    }

    Ok((metadata_opt, model_binary_opt))
}

/// メタデータをログに出力
pub fn log_metadata_info(metadata: &ModelMetadata) {
    tracing::info!("クラス数: {}", metadata.num_classes());
    tracing::info!("モデル入力サイズ: {}x{}", metadata.image_size, metadata.image_size);
    tracing::info!("学習エポック数: {}", metadata.num_epochs);
    tracing::info!(
        "サンプル数: 学習 {} / 検証 {}",
        metadata.train_samples,
        metadata.validation_samples
    );
    if let Some(acc) = metadata.validation_accuracy {
        tracing::info!("検証精度: {:.2}%", acc * 100.0);
    }
    tracing::info!("学習日時: {}", metadata.trained_at);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> ModelMetadata {
        ModelMetadata::new(
            vec!["Corn_(maize)___Common_rust_".into(), "Corn_(maize)___healthy".into()],
            64,
            0.5,
            2,
        )
    }

    #[test]
    fn test_save_and_load_archive() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = sample_metadata();
        let binary = vec![7u8; 1024];

        let written = save_model_with_metadata(&dir.path().join("nested/model"), &metadata, &binary).unwrap();
        assert_eq!(written, dir.path().join("nested/model.tar.gz"));

        let (loaded_meta, loaded_bin) = load_model_with_metadata(&written).unwrap();
        assert_eq!(loaded_meta, metadata);
        assert_eq!(loaded_bin, binary);

        let only_meta = load_metadata(&written).unwrap();
        assert_eq!(only_meta.class_labels, metadata.class_labels);
    }

    #[test]
    fn test_archive_path_keeps_gz() {
        assert_eq!(archive_path(Path::new("m/a.tar.gz")), PathBuf::from("m/a.tar.gz"));
        assert_eq!(archive_path(Path::new("m/a")), PathBuf::from("m/a.tar.gz"));
        assert_eq!(archive_path(Path::new("m/a.tar")), PathBuf::from("m/a.tar.gz"));
        assert_eq!(archive_path(Path::new("m/leaf.v2")), PathBuf::from("m/leaf.v2.tar.gz"));
        assert_eq!(
            class_indices_path(Path::new("m/a.tar.gz")),
            PathBuf::from("m/class_indices.json")
        );
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_metadata(&dir.path().join("missing.tar.gz")).is_err());
    }

    #[test]
    fn test_archive_without_model_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta_only.tar.gz");

        let file = File::create(&path).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        let json = sample_metadata().to_json_string().unwrap();
        append_entry(&mut builder, METADATA_ENTRY, json.as_bytes()).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        assert!(load_metadata(&path).is_ok());
        let err = load_model_with_metadata(&path).unwrap_err();
        assert!(err.to_string().contains(MODEL_ENTRY));
    }
}
