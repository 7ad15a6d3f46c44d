use image::RgbImage;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    detection::{BoundingBox, DetectedRegion, RegionDetector, RegionLabel},
    error::DetectionError,
};

/// A region expressed as fractions of the page: `[x1, y1, x2, y2]` in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRegion {
    pub label: RegionLabel,
    pub relative: [f32; 4],
}

impl TemplateRegion {
    pub fn new(label: impl Into<RegionLabel>, relative: [f32; 4]) -> Self {
        Self {
            label: label.into(),
            relative,
        }
    }

    /// Portrait photo in the upper right, signature line in the lower right.
    pub fn certificate_layout() -> Vec<TemplateRegion> {
        vec![
            TemplateRegion::new(RegionLabel::Profile, [0.70, 0.08, 0.92, 0.38]),
            TemplateRegion::new(RegionLabel::Signature, [0.55, 0.72, 0.95, 0.92]),
        ]
    }

    fn validate(&self) -> Result<(), DetectionError> {
        let [x1, y1, x2, y2] = self.relative;
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);

        if !self.relative.iter().all(|&v| in_unit(v)) {
            return Err(DetectionError::InvalidTemplate {
                label: self.label.to_string(),
                reason: "coordinates must lie in [0, 1]".into(),
            });
        }

        if x1 >= x2 || y1 >= y2 {
            return Err(DetectionError::InvalidTemplate {
                label: self.label.to_string(),
                reason: "expected x1 < x2 and y1 < y2".into(),
            });
        }

        Ok(())
    }

    fn to_pixels(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let [x1, y1, x2, y2] = self.relative;
        let (w, h) = (width as f32, height as f32);

        BoundingBox::new(
            (x1 * w).floor() as i32,
            (y1 * h).floor() as i32,
            (x2 * w).ceil() as i32,
            (y2 * h).ceil() as i32,
        )
        .ok()
    }
}

/// Detector for documents with a fixed layout. Every region is reported with full confidence.
pub struct TemplateDetector {
    regions: Vec<TemplateRegion>,
    min_dimension: u32,
}

impl TemplateDetector {
    pub fn new(regions: Vec<TemplateRegion>) -> Result<Self, DetectionError> {
        for region in &regions {
            region.validate()?;
        }

        Ok(Self {
            regions,
            min_dimension: 16,
        })
    }

    pub fn with_min_dimension(mut self, min_dimension: u32) -> Self {
        self.min_dimension = min_dimension;
        self
    }

    pub fn regions(&self) -> &[TemplateRegion] {
        &self.regions
    }
}

impl RegionDetector for TemplateDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedRegion>, DetectionError> {
        let (width, height) = image.dimensions();

        if width < self.min_dimension || height < self.min_dimension {
            return Err(DetectionError::UnsupportedImage { width, height });
        }

        let detected = self
            .regions
            .iter()
            .filter_map(|region| {
                region
                    .to_pixels(width, height)
                    .map(|bbox| DetectedRegion::new(region.label.clone(), bbox, 1.0))
            })
            .collect::<Vec<_>>();

        debug!(
            "Template detector placed {} region(s) on {}x{} page",
            detected.len(),
            width,
            height
        );

        Ok(detected)
    }

    fn name(&self) -> &str {
        "Layout Template Detector"
    }

    fn description(&self) -> &str {
        "Places configured regions at fixed relative positions of the page"
    }
}
