pub mod crop;
pub mod tampering;
pub mod template;

use std::fmt;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::DetectionError;

/// Semantic region of a document. Names are resolved once, case-insensitively;
/// unrecognized names are kept in lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RegionLabel {
    Profile,
    Signature,
    Unknown(String),
}

impl RegionLabel {
    pub fn parse(name: &str) -> Self {
        let normalized = name.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "profile" | "photo" | "profile_photo" | "profile photo" | "face" => {
                RegionLabel::Profile
            }
            "sign" | "signature" => RegionLabel::Signature,
            _ => RegionLabel::Unknown(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RegionLabel::Profile => "profile",
            RegionLabel::Signature => "signature",
            RegionLabel::Unknown(name) => name,
        }
    }
}

impl fmt::Display for RegionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RegionLabel {
    fn from(name: String) -> Self {
        RegionLabel::parse(&name)
    }
}

impl From<&str> for RegionLabel {
    fn from(name: &str) -> Self {
        RegionLabel::parse(name)
    }
}

impl From<RegionLabel> for String {
    fn from(label: RegionLabel) -> Self {
        label.as_str().to_string()
    }
}

/// Pixel bounds `[x1, x2) x [y1, y2)`. Always non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Self, DetectionError> {
        if x1 >= x2 || y1 >= y2 {
            return Err(DetectionError::InvalidBox { x1, y1, x2, y2 });
        }

        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> u32 {
        (self.x2 - self.x1) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y2 - self.y1) as u32
    }

    /// Intersects with a `width`x`height` image. `None` if nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let max_x = width.min(i32::MAX as u32) as i32;
        let max_y = height.min(i32::MAX as u32) as i32;

        let x1 = self.x1.clamp(0, max_x);
        let y1 = self.y1.clamp(0, max_y);
        let x2 = self.x2.clamp(0, max_x);
        let y2 = self.y2.clamp(0, max_y);

        BoundingBox::new(x1, y1, x2, y2).ok()
    }
}

impl TryFrom<[i32; 4]> for BoundingBox {
    type Error = DetectionError;

    fn try_from([x1, y1, x2, y2]: [i32; 4]) -> Result<Self, Self::Error> {
        BoundingBox::new(x1, y1, x2, y2)
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.x1, bbox.y1, bbox.x2, bbox.y2]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedRegion {
    pub label: RegionLabel,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl DetectedRegion {
    pub fn new(label: impl Into<RegionLabel>, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            label: label.into(),
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Locates labelled regions on a full document image.
pub trait RegionDetector: Send + Sync {
    /// An empty result is not an error.
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedRegion>, DetectionError>;

    fn name(&self) -> &str;

    fn description(&self) -> &str;
}

/// Keeps the highest-confidence region per label, in first-seen label order.
/// Equal confidences keep the earlier region.
pub fn best_per_label(regions: &[DetectedRegion]) -> Vec<DetectedRegion> {
    let mut best: Vec<DetectedRegion> = Vec::new();

    for region in regions {
        match best.iter_mut().find(|r| r.label == region.label) {
            Some(current) if region.confidence > current.confidence => *current = region.clone(),
            Some(_) => {}
            None => best.push(region.clone()),
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x1: i32, y1: i32, x2: i32, y2: i32) -> BoundingBox {
        BoundingBox::new(x1, y1, x2, y2).unwrap()
    }

    #[test]
    fn test_label_aliases() {
        assert_eq!(RegionLabel::parse("PROFILE"), RegionLabel::Profile);
        assert_eq!(RegionLabel::parse(" Sign "), RegionLabel::Signature);
        assert_eq!(RegionLabel::parse("signature"), RegionLabel::Signature);
        assert_eq!(RegionLabel::parse("Seal"), RegionLabel::Unknown("seal".into()));
        assert_eq!(RegionLabel::parse("Seal").to_string(), "seal");
    }

    #[test]
    fn test_unknown_labels_ignore_case() {
        assert_eq!(RegionLabel::parse("Seal"), RegionLabel::parse(" SEAL"));
        assert_eq!(RegionLabel::from("Stamp"), RegionLabel::from("stamp".to_string()));

        let regions = vec![
            DetectedRegion::new("Seal", bbox(0, 0, 10, 10), 0.3),
            DetectedRegion::new("seal", bbox(2, 2, 12, 12), 0.7),
        ];
        let best = best_per_label(&regions);
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].confidence, 0.7);
    }

    #[test]
    fn test_label_serde_round_names() {
        let json = serde_json::to_string(&RegionLabel::Signature).unwrap();
        assert_eq!(json, "\"signature\"");
        let label: RegionLabel = serde_json::from_str("\"photo\"").unwrap();
        assert_eq!(label, RegionLabel::Profile);
    }

    #[test]
    fn test_bbox_rejects_empty() {
        assert!(BoundingBox::new(5, 5, 5, 10).is_err());
        assert!(BoundingBox::new(5, 10, 8, 2).is_err());
    }

    #[test]
    fn test_bbox_deserialize_validates() {
        let ok: BoundingBox = serde_json::from_str("[1, 2, 3, 4]").unwrap();
        assert_eq!(ok, bbox(1, 2, 3, 4));
        assert!(serde_json::from_str::<BoundingBox>("[3, 2, 1, 4]").is_err());
    }

    #[test]
    fn test_bbox_clamp() {
        let clamped = bbox(-10, 5, 50, 200).clamp_to(40, 100).unwrap();
        assert_eq!(clamped, bbox(0, 5, 40, 100));
        assert!(bbox(50, 50, 60, 60).clamp_to(40, 40).is_none());
    }

    #[test]
    fn test_best_per_label_keeps_highest_confidence() {
        let regions = vec![
            DetectedRegion::new("sign", bbox(0, 0, 10, 10), 0.4),
            DetectedRegion::new("profile", bbox(0, 0, 20, 20), 0.9),
            DetectedRegion::new("signature", bbox(5, 5, 15, 15), 0.8),
            DetectedRegion::new("sign", bbox(1, 1, 11, 11), 0.8),
        ];

        let best = best_per_label(&regions);
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].label, RegionLabel::Signature);
        assert_eq!(best[0].bbox, bbox(5, 5, 15, 15));
        assert_eq!(best[1].label, RegionLabel::Profile);
    }

    #[test]
    fn test_best_per_label_empty() {
        assert!(best_per_label(&[]).is_empty());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let region = DetectedRegion::new("profile", bbox(0, 0, 1, 1), 1.7);
        assert_eq!(region.confidence, 1.0);
    }
}
