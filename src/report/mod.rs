pub mod visualization;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    detection::tampering::{RegionOutcome, VerificationResult},
    error::VerifyError,
};

/// Wire form of a [`VerificationResult`].
#[derive(Debug, Serialize)]
pub struct JsonReport {
    pub results: ReportResults,
}

#[derive(Debug, Serialize)]
pub struct ReportResults {
    #[serde(flatten)]
    pub regions: BTreeMap<String, RegionReport>,
    pub tampering_suspected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RegionReport {
    Compared {
        deep_learning_similarity: Option<f64>,
        deep_learning_match: bool,
        sift_similarity: Option<f64>,
        sift_match: bool,
    },
    NotDetected {
        error: String,
    },
}

impl RegionReport {
    fn from_outcome(label: &str, outcome: &RegionOutcome) -> Self {
        match outcome {
            RegionOutcome::Compared(comparison) => {
                let similarity = &comparison.similarity;
                RegionReport::Compared {
                    deep_learning_similarity: similarity.embedding_score,
                    deep_learning_match: similarity.embedding_match,
                    sift_similarity: similarity.keypoint_score,
                    sift_match: similarity.keypoint_match,
                }
            }
            RegionOutcome::NotDetected(_) => RegionReport::NotDetected {
                error: format!("{} not detected in one or both images", label),
            },
        }
    }
}

impl From<&VerificationResult> for JsonReport {
    fn from(result: &VerificationResult) -> Self {
        let regions = result
            .regions()
            .iter()
            .map(|verdict| {
                let name = verdict.label.to_string();
                let report = RegionReport::from_outcome(&name, &verdict.outcome);
                (name, report)
            })
            .collect();

        Self {
            results: ReportResults {
                regions,
                tampering_suspected: result.tampering_suspected(),
            },
        }
    }
}

impl JsonReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Request-level failure, rendered as `{"error": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub error: String,
}

impl From<&VerifyError> for ErrorReport {
    fn from(err: &VerifyError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

impl ErrorReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
