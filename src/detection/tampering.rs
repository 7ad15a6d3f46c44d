use std::collections::HashMap;

use log::info;
use serde::Serialize;

use crate::{
    analysis::similarity::SimilarityResult,
    detection::{BoundingBox, RegionLabel},
};

/// Which of the two documents lacked a region, with the bounds found in the other one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingIn {
    /// Found only in the second document, at these bounds.
    First(BoundingBox),
    /// Found only in the first document, at these bounds.
    Second(BoundingBox),
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionComparison {
    /// Clamped bounds in the first document.
    pub first: BoundingBox,
    /// Clamped bounds in the second document.
    pub second: BoundingBox,
    pub similarity: SimilarityResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegionOutcome {
    Compared(RegionComparison),
    NotDetected(MissingIn),
}

impl RegionOutcome {
    pub fn is_match(&self) -> bool {
        match self {
            RegionOutcome::Compared(comparison) => comparison.similarity.is_match(),
            RegionOutcome::NotDetected(_) => false,
        }
    }

    pub fn similarity(&self) -> Option<&SimilarityResult> {
        match self {
            RegionOutcome::Compared(comparison) => Some(&comparison.similarity),
            RegionOutcome::NotDetected(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionVerdict {
    pub label: RegionLabel,
    pub outcome: RegionOutcome,
}

/// Final verdict for a document pair. Every configured label is present.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    regions: Vec<RegionVerdict>,
    tampering_suspected: bool,
    summary: String,
}

impl VerificationResult {
    pub fn regions(&self) -> &[RegionVerdict] {
        &self.regions
    }

    pub fn get(&self, label: &RegionLabel) -> Option<&RegionOutcome> {
        self.regions
            .iter()
            .find(|r| &r.label == label)
            .map(|r| &r.outcome)
    }

    pub fn tampering_suspected(&self) -> bool {
        self.tampering_suspected
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Labels that were compared and failed, or that could not be compared.
    pub fn suspicious_labels(&self) -> Vec<&RegionLabel> {
        self.regions
            .iter()
            .filter(|r| !r.outcome.is_match())
            .map(|r| &r.label)
            .collect()
    }
}

/// Combines per-region outcomes into one verdict.
///
/// A region passes only when both of its metrics match. Any configured region that
/// fails, or that is missing from either document, raises tampering suspicion.
pub struct TamperDecisionFuser {
    labels: Vec<RegionLabel>,
}

impl TamperDecisionFuser {
    /// Repeated labels are kept once, in first-seen order.
    pub fn new(labels: Vec<RegionLabel>) -> Self {
        let mut unique: Vec<RegionLabel> = Vec::with_capacity(labels.len());
        for label in labels {
            if !unique.contains(&label) {
                unique.push(label);
            }
        }
        Self { labels: unique }
    }

    pub fn labels(&self) -> &[RegionLabel] {
        &self.labels
    }

    /// Labels absent from `outcomes` are reported as missing in both documents.
    /// Outcomes for labels outside the configuration are ignored.
    pub fn fuse(&self, mut outcomes: HashMap<RegionLabel, RegionOutcome>) -> VerificationResult {
        let regions = self
            .labels
            .iter()
            .map(|label| RegionVerdict {
                label: label.clone(),
                outcome: outcomes
                    .remove(label)
                    .unwrap_or(RegionOutcome::NotDetected(MissingIn::Both)),
            })
            .collect::<Vec<_>>();

        let matched = regions.iter().filter(|r| r.outcome.is_match()).count();
        let missing = regions
            .iter()
            .filter(|r| matches!(r.outcome, RegionOutcome::NotDetected(_)))
            .count();
        let tampering_suspected = matched < regions.len();

        let summary = format!(
            "{} of {} region(s) matched, {} not detected; tampering {}",
            matched,
            regions.len(),
            missing,
            if tampering_suspected { "suspected" } else { "not suspected" }
        );
        info!("{}", summary);

        VerificationResult {
            regions,
            tampering_suspected,
            summary,
        }
    }
}
