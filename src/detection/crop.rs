use image::{RgbImage, imageops};

use crate::{
    detection::{BoundingBox, DetectedRegion, RegionLabel},
    error::CropError,
};

/// An owned copy of a document region.
#[derive(Debug, Clone)]
pub struct Crop {
    pub label: RegionLabel,
    /// Bounds after clamping to the source image.
    pub bbox: BoundingBox,
    pub image: RgbImage,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CropExtractor;

impl CropExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, image: &RgbImage, region: &DetectedRegion) -> Result<Crop, CropError> {
        let (width, height) = image.dimensions();

        let bbox = region
            .bbox
            .clamp_to(width, height)
            .ok_or_else(|| CropError::EmptyCrop {
                label: region.label.to_string(),
                width,
                height,
            })?;

        let sub = imageops::crop_imm(
            image,
            bbox.x1 as u32,
            bbox.y1 as u32,
            bbox.width(),
            bbox.height(),
        )
        .to_image();

        Ok(Crop {
            label: region.label.clone(),
            bbox,
            image: sub,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn region(x1: i32, y1: i32, x2: i32, y2: i32) -> DetectedRegion {
        DetectedRegion::new("signature", BoundingBox::new(x1, y1, x2, y2).unwrap(), 0.9)
    }

    #[test]
    fn test_extract_copies_pixels() {
        let mut image = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        image.put_pixel(12, 6, Rgb([200, 100, 50]));

        let crop = CropExtractor::new().extract(&image, &region(10, 5, 15, 10)).unwrap();
        assert_eq!(crop.image.dimensions(), (5, 5));
        assert_eq!(crop.image.get_pixel(2, 1), &Rgb([200, 100, 50]));
        assert_eq!(crop.label, RegionLabel::Signature);
    }

    #[test]
    fn test_extract_is_independent_of_source() {
        let mut image = RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]));
        let crop = CropExtractor::new().extract(&image, &region(0, 0, 5, 5)).unwrap();

        image.put_pixel(0, 0, Rgb([255, 255, 255]));
        assert_eq!(crop.image.get_pixel(0, 0), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_extract_clamps_out_of_bounds() {
        let image = RgbImage::new(30, 20);
        let crop = CropExtractor::new().extract(&image, &region(-5, 10, 50, 40)).unwrap();
        assert_eq!(crop.bbox, BoundingBox::new(0, 10, 30, 20).unwrap());
        assert_eq!(crop.image.dimensions(), (30, 10));
    }

    #[test]
    fn test_extract_outside_image_is_empty_crop() {
        let image = RgbImage::new(30, 20);
        let err = CropExtractor::new().extract(&image, &region(40, 0, 60, 10)).unwrap_err();
        assert!(matches!(err, CropError::EmptyCrop { .. }));
    }
}
