//! 植物の葉の病害診断
//!
//! 学習ジョブ（`train_model`）と推論HTTPサービス（`leaf_doctor`）の共通ライブラリ。

#![recursion_limit = "256"]
pub mod model;
pub mod ml;
pub mod disease_catalog;
pub mod server;

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` 未設定時のフィルタ
pub const DEFAULT_LOG_FILTER: &str = "leaf_doctor=info,train_model=info,inspect_model=info,tower_http=info";

/// ログ出力を初期化（`RUST_LOG` で上書き可能）
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // 二重初期化は無視する
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
