//! 診断HTTPサービス
//!
//! `POST /predict` にアップロードされた葉の画像を分類し、病害情報を付けて返します。

pub mod error;
pub mod handlers;
pub mod state;

use std::net::SocketAddr;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::model::ServerSettings;

pub use error::{AppError, AppResult};
pub use state::AppState;

/// ルーターを構築
///
/// アップロード上限を超えたリクエストはマルチパートの読み込みエラーとして 413 の JSON になる。
pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/predict", post(handlers::predict))
        .route("/classes", get(handlers::classes))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// サーバを起動し、Ctrl+C で停止するまで待つ
pub async fn serve(state: AppState, settings: &ServerSettings) -> anyhow::Result<()> {
    let app = create_router(state, settings.max_upload_bytes);

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
