//! クラスインデックス ⇔ ラベルの対応表
//!
//! 学習時に `class_indices.json`（`{"0": "Apple___Apple_scab", ...}`）として書き出し、
//! 推論時にモデルの出力インデックスをラベル名に戻すために使います。

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// "Unknown" クラスのラベル
pub const UNKNOWN_LABEL: &str = "Unknown";

/// クラスインデックスとラベルの対応表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    labels: Vec<String>,
}

impl LabelMap {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// `class_indices.json` 形式のJSON文字列から読み込む
    ///
    /// キーは 0..n の整数で、欠番があってはならない。
    pub fn from_class_indices_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, String> =
            serde_json::from_str(json).context("Failed to parse class index table")?;

        let mut indexed = BTreeMap::new();
        for (key, label) in raw {
            let index: usize = key
                .trim()
                .parse()
                .with_context(|| format!("class index key is not an integer: {key:?}"))?;
            if indexed.insert(index, label).is_some() {
                anyhow::bail!("duplicate class index {index}");
            }
        }

        let mut labels = Vec::with_capacity(indexed.len());
        for (expected, (index, label)) in indexed.into_iter().enumerate() {
            if index != expected {
                anyhow::bail!("class index table has a gap: missing index {expected}");
            }
            labels.push(label);
        }

        if labels.is_empty() {
            anyhow::bail!("class index table is empty");
        }
        Ok(Self { labels })
    }

    /// `class_indices.json` ファイルから読み込む
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read class index table: {}", path.display()))?;
        Self::from_class_indices_json(&json)
    }

    /// `class_indices.json` 形式に変換
    pub fn to_class_indices_json(&self) -> Result<String> {
        let table: BTreeMap<usize, &str> = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, label)| (i, label.as_str()))
            .collect();
        serde_json::to_string_pretty(&table).context("Failed to serialize class index table")
    }

    /// `class_indices.json` ファイルとして保存
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_class_indices_json()?)
            .with_context(|| format!("Failed to write class index table: {}", path.display()))
    }

    /// クラスインデックスからラベルを取得
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// "Unknown" クラスかどうか（大文字小文字は区別しない）
pub fn is_unknown_label(label: &str) -> bool {
    label.eq_ignore_ascii_case(UNKNOWN_LABEL)
}
