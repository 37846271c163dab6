use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::disease_catalog::DiseaseCatalog;
use crate::ml::InferenceEngine;
use crate::model::LabelMap;

/// ハンドラ間で共有する状態
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Mutex<InferenceEngine>>,
    /// 推論中にロックを取らずに参照するためのラベル表の複製
    pub labels: Arc<LabelMap>,
    pub confidence_threshold: f64,
    pub catalog: &'static DiseaseCatalog,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: InferenceEngine, confidence_threshold: f64) -> Self {
        let labels = Arc::new(engine.labels().clone());
        Self {
            engine: Arc::new(Mutex::new(engine)),
            labels,
            confidence_threshold,
            catalog: DiseaseCatalog::builtin(),
            started_at: Instant::now(),
        }
    }
}
