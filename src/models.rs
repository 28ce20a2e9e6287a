use crate::enrich::models::{DimensionSource, EnrichmentStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichRequest {
    pub product_id: String,
    /// Run every stage but skip the write; the result carries status `preview`.
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnrichResponse {
    pub success: bool,
    pub product_id: String,
    pub category: String,
    pub material: String,
    pub color: String,
    pub dimensions: Option<String>,
    pub dimension_source: Option<DimensionSource>,
    pub confidence_score: u8,
    pub status: EnrichmentStatus,
    pub enriched_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
