use serde::{Deserialize, Serialize};

/// Sentinel stored for numeric fields that were not found in a block.
pub const MISSING_VALUE: f64 = -1.0;

/// Agronomic fields extracted from a knowledge block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub crop: Option<String>,
    pub stage: Option<String>,
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub min_humidity: f64,
    pub max_humidity: f64,
    pub min_soil_moisture: f64,
    pub max_soil_moisture: f64,
    pub nitrogen_kg: f64,
    pub phosphorus_kg: f64,
    pub potassium_kg: f64,
    pub light_hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}

impl Default for RecordMetadata {
    fn default() -> Self {
        Self {
            crop: None,
            stage: None,
            min_temperature: MISSING_VALUE,
            max_temperature: MISSING_VALUE,
            min_humidity: MISSING_VALUE,
            max_humidity: MISSING_VALUE,
            min_soil_moisture: MISSING_VALUE,
            max_soil_moisture: MISSING_VALUE,
            nitrogen_kg: MISSING_VALUE,
            phosphorus_kg: MISSING_VALUE,
            potassium_kg: MISSING_VALUE,
            light_hours: MISSING_VALUE,
            record_id: None,
        }
    }
}

/// A stored knowledge record as returned by list/get/export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub id: String,
    pub text: String,
    pub metadata: RecordMetadata,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub content: String,
    /// Near-duplicate threshold; falls back to the configured default.
    pub threshold: Option<f32>,
    /// Store blocks even when near duplicates exist.
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// First line carries no crop/stage pair.
    Unrecognized,
    /// Identical text is already stored.
    ExactDuplicate,
    /// Neighbours at or above the threshold exist.
    Similar,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarRecord {
    pub id: String,
    pub similarity: f64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedBlock {
    pub reason: SkipReason,
    /// First line of the skipped block.
    pub heading: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub similar: Vec<SimilarRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadReport {
    pub added: usize,
    pub ids: Vec<String>,
    pub skipped: Vec<SkippedBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: RecordMetadata,
    /// Cosine distance, lower is closer.
    pub score: f64,
    pub similarity: f64,
}

/// `1 - distance`, rounded to three decimals.
pub fn similarity_from_distance(distance: f64) -> f64 {
    ((1.0 - distance) * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_rounds_to_three_decimals() {
        assert_eq!(similarity_from_distance(0.0), 1.0);
        assert_eq!(similarity_from_distance(0.00004), 1.0);
        assert_eq!(similarity_from_distance(0.1234), 0.877);
        assert_eq!(similarity_from_distance(1.0), 0.0);
    }

    #[test]
    fn metadata_serializes_missing_crop_as_null() {
        let json = serde_json::to_value(RecordMetadata::default()).unwrap();
        assert!(json["crop"].is_null());
        assert_eq!(json["light_hours"], -1.0);
        assert!(json.get("record_id").is_none());
    }
}
