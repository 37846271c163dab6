//! リクエストハンドラ

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;

use crate::disease_catalog::{display_name, DiseaseInfo};
use crate::ml::{ClassifyError, Diagnosis};
use crate::server::error::{AppError, AppResult};
use crate::server::state::AppState;

/// アップロード画像を受け取るフォームフィールド名
pub const UPLOAD_FIELD: &str = "file";

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    model_loaded: bool,
    num_classes: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        model_loaded: true,
        num_classes: state.labels.len(),
    })
}

/// 診断結果
///
/// `class`, `confidence` と病害情報の5項目を同じ階層に並べる。
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub class: String,
    pub confidence: f64,
    #[serde(flatten)]
    pub info: DiseaseInfo,
    pub plant: String,
    pub condition: String,
    pub healthy: bool,
}

pub async fn predict(State(state): State<AppState>, mut multipart: Multipart) -> AppResult<Json<PredictResponse>> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            upload = Some(field.bytes().await?);
            break;
        }
    }
    let bytes = upload.ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;

    let engine = state.engine.clone();
    let prediction = tokio::task::spawn_blocking(move || {
        let engine = engine
            .lock()
            .map_err(|_| ClassifyError::Backend("inference engine lock poisoned".to_string()))?;
        engine.classify_bytes(&bytes)
    })
    .await
    .map_err(|e| AppError::Internal(format!("inference task failed: {e}")))??;

    let diagnosis = Diagnosis::from_prediction(&prediction, state.confidence_threshold);
    tracing::info!(
        class = %diagnosis.class,
        predicted = %prediction.label,
        confidence = diagnosis.confidence,
        "prediction"
    );

    let name = display_name(&diagnosis.class);
    Ok(Json(PredictResponse {
        info: state.catalog.describe(&diagnosis.class),
        class: diagnosis.class,
        confidence: diagnosis.confidence,
        plant: name.plant,
        condition: name.condition,
        healthy: name.healthy,
    }))
}

#[derive(Serialize)]
pub struct ClassEntry {
    index: usize,
    label: String,
    plant: String,
    condition: String,
    healthy: bool,
    has_details: bool,
}

#[derive(Serialize)]
pub struct ClassesResponse {
    num_classes: usize,
    confidence_threshold: f64,
    classes: Vec<ClassEntry>,
}

pub async fn classes(State(state): State<AppState>) -> Json<ClassesResponse> {
    let classes = state
        .labels
        .labels()
        .iter()
        .enumerate()
        .map(|(index, label)| {
            let name = display_name(label);
            ClassEntry {
                index,
                label: label.clone(),
                plant: name.plant,
                condition: name.condition,
                healthy: name.healthy,
                has_details: state.catalog.contains(label),
            }
        })
        .collect();

    Json(ClassesResponse {
        num_classes: state.labels.len(),
        confidence_threshold: state.confidence_threshold,
        classes,
    })
}
