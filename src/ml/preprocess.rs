//! 画像の前処理
//!
//! RGBに変換、正方形にリサイズ、画素値を [0, 1] にスケールし、
//! (C, H, W) の順で平坦化します。学習と推論は同じ関数を使います。

use image::{imageops::FilterType, DynamicImage};
use std::path::Path;
use thiserror::Error;

/// 前処理のエラー
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("empty image data")]
    Empty,
    #[error("unsupported or corrupt image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to read image file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// デコード済み画像を正規化
pub fn preprocess_image(image: &DynamicImage, image_size: usize) -> Vec<f32> {
    let size = image_size as u32;
    let rgb = image
        .resize_exact(size, size, FilterType::CatmullRom)
        .to_rgb8();

    let num_pixels = image_size * image_size;
    let mut data = vec![0.0f32; 3 * num_pixels];

    for (i, pixel) in rgb.pixels().enumerate() {
        for channel in 0..3 {
            data[channel * num_pixels + i] = pixel[channel] as f32 / 255.0;
        }
    }

    data
}

/// アップロードされたバイト列をデコードして正規化
///
/// 形式はバイト列の内容から推定する。
pub fn preprocess_bytes(bytes: &[u8], image_size: usize) -> Result<Vec<f32>, PreprocessError> {
    if bytes.is_empty() {
        return Err(PreprocessError::Empty);
    }
    let image = image::load_from_memory(bytes)?;
    Ok(preprocess_image(&image, image_size))
}

/// 画像ファイルを読み込んで正規化
pub fn preprocess_path(path: &Path, image_size: usize) -> Result<Vec<f32>, PreprocessError> {
    let bytes = std::fs::read(path).map_err(|source| PreprocessError::Io {
        path: path.display().to_string(),
        source,
    })?;
    preprocess_bytes(&bytes, image_size)
}
