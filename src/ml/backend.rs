//! バックエンドの選択
//!
//! CPU (NdArray) は常に利用可能。WGPU は `wgpu` フィーチャ有効時のみ。

use crate::model::DeviceType;

/// CPU推論用バックエンド
pub type CpuBackend = burn_ndarray::NdArray<f32>;
/// CPU学習用バックエンド
pub type CpuAutodiff = burn_autodiff::Autodiff<CpuBackend>;

#[cfg(feature = "wgpu")]
pub type GpuBackend = burn::backend::Wgpu;
#[cfg(feature = "wgpu")]
pub type GpuAutodiff = burn_autodiff::Autodiff<GpuBackend>;

pub fn cpu_device() -> burn_ndarray::NdArrayDevice {
    burn_ndarray::NdArrayDevice::default()
}

#[cfg(feature = "wgpu")]
pub fn gpu_device() -> burn_wgpu::WgpuDevice {
    burn_wgpu::WgpuDevice::default()
}

/// 指定デバイスがこのビルドで使えるか確認
pub fn ensure_available(device_type: DeviceType) -> anyhow::Result<()> {
    match device_type {
        DeviceType::Cpu => Ok(()),
        #[cfg(feature = "wgpu")]
        DeviceType::Wgpu => Ok(()),
        #[cfg(not(feature = "wgpu"))]
        DeviceType::Wgpu => anyhow::bail!(
            "WGPUバックエンドは無効です（`wgpu` フィーチャを有効にしてビルドしてください）"
        ),
    }
}
