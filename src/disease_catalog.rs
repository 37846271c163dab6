//! 病害情報カタログ
//!
//! PlantVillageのラベルごとに原因・症状・対処・管理・予防の説明を持つ静的辞書。
//! `data/disease_info.json` をバイナリに埋め込み、初回アクセス時に一度だけ解析します。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::model::is_unknown_label;

const CATALOG_JSON: &str = include_str!("../data/disease_info.json");

/// "Unknown" 判定時に返すレコードのキー
const UNKNOWN_KEY: &str = "unknown";

/// 1つの病害（または健康状態）の説明
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiseaseInfo {
    pub cause: String,
    pub problem: String,
    pub solution: String,
    pub care: String,
    pub prevention: String,
}

impl DiseaseInfo {
    /// カタログに登録の無いラベルに返す説明
    pub fn not_available() -> Self {
        Self {
            cause: "No information available.".to_string(),
            problem: "No information available.".to_string(),
            solution: "No solution available.".to_string(),
            care: "No care information available.".to_string(),
            prevention: "No prevention information available.".to_string(),
        }
    }
}

/// ラベルを分解した表示名
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DisplayName {
    /// 植物名 (例: "Apple")
    pub plant: String,
    /// 病名 (例: "Apple scab")、健康な場合は "healthy"
    pub condition: String,
    pub healthy: bool,
}

/// ラベルを植物名と病名に分ける
///
/// `Apple___Apple_scab` -> ("Apple", "Apple scab")。`___` が無いラベルはそのまま病名とする。
pub fn display_name(label: &str) -> DisplayName {
    let (plant, condition) = match label.split_once("___") {
        Some((plant, condition)) => (plant, condition),
        None => ("", label),
    };
    let plant = plant.replace('_', " ").trim().to_string();
    let condition = condition.replace('_', " ").trim().to_string();
    let healthy = condition.eq_ignore_ascii_case("healthy");

    DisplayName {
        plant,
        condition,
        healthy,
    }
}

/// 病害情報カタログ
#[derive(Debug)]
pub struct DiseaseCatalog {
    entries: HashMap<String, DiseaseInfo>,
}

impl DiseaseCatalog {
    /// JSON文字列から構築
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let entries: HashMap<String, DiseaseInfo> = serde_json::from_str(json)?;
        Ok(Self { entries })
    }

    /// 埋め込み済みのカタログ
    pub fn builtin() -> &'static DiseaseCatalog {
        static CATALOG: OnceLock<DiseaseCatalog> = OnceLock::new();
        CATALOG.get_or_init(|| match Self::from_json(CATALOG_JSON) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::error!("埋め込みの病害情報を解析できません: {e}");
                Self {
                    entries: HashMap::new(),
                }
            }
        })
    }

    /// ラベルから病害情報を取得
    ///
    /// "Unknown" の場合は `unknown` レコードを返す。登録の無いラベルは None。
    pub fn lookup(&self, label: &str) -> Option<&DiseaseInfo> {
        if is_unknown_label(label) {
            return self.entries.get(UNKNOWN_KEY);
        }
        self.entries.get(label)
    }

    /// ラベルの説明を取得し、登録が無ければ既定の文言で埋める
    pub fn describe(&self, label: &str) -> DiseaseInfo {
        self.lookup(label)
            .cloned()
            .unwrap_or_else(DiseaseInfo::not_available)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.lookup(label).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
