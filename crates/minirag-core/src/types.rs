//! Common types used across the indexing and retrieval pipeline

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Error, Result};

/// Free-form chunk metadata, carried into the vector store payload.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Prefix of every per-project collection name.
pub const COLLECTION_PREFIX: &str = "collection_";

/// Deterministic collection name for a project.
///
/// Pure function of `project_id`: no lookup table is kept anywhere, so every
/// component that needs the name recomputes it.
pub fn collection_name(project_id: &str) -> String {
    format!("{}{}", COLLECTION_PREFIX, project_id).trim().to_string()
}

/// One page of extracted document text, as handed over by a loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentPage {
    pub text: String,
    pub metadata: Metadata,
}

impl DocumentPage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A bounded segment of a source document.
///
/// `order` is 1-based and increases monotonically within one
/// `(project_id, asset_id)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: Metadata,
    pub order: usize,
    pub project_id: String,
    pub asset_id: String,
}

/// A chunk together with the identifier its store assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: i64,
    pub chunk: Chunk,
}

/// A search hit: stored text plus similarity score (higher is better).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub text: String,
    pub score: f32,
}

/// Distance metric a collection is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Dot,
    Euclidean,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Dot => "dot",
            DistanceMetric::Euclidean => "euclidean",
        }
    }

    /// Parse from a configuration string
    pub fn parse(s: &str) -> Result<DistanceMetric> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "dot" | "dot_product" | "dotproduct" => Ok(DistanceMetric::Dot),
            "euclidean" | "euclid" | "l2" => Ok(DistanceMetric::Euclidean),
            other => Err(Error::Configuration(format!(
                "unsupported distance metric: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one collection, as reported by a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: Option<usize>,
    pub distance: DistanceMetric,
    pub points_count: u64,
    pub indexed: bool,
}
