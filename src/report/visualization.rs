use std::path::Path;

use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut},
    rect::Rect,
};

use crate::{
    detection::{
        BoundingBox,
        tampering::{MissingIn, RegionOutcome, VerificationResult},
    },
    error::Result,
};

pub const MATCHED_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
pub const MISMATCHED_COLOR: Rgb<u8> = Rgb([230, 0, 0]);
pub const NOT_DETECTED_COLOR: Rgb<u8> = Rgb([128, 128, 128]);

const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BACKGROUND: Rgb<u8> = Rgb([40, 40, 40]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    First,
    Second,
}

#[derive(Debug, Clone)]
pub struct VisualizationConfig {
    pub border_thickness: u32,
    pub fill_opacity: f32,
    pub show_labels: bool,
    pub show_legend: bool,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            border_thickness: 3,
            fill_opacity: 0.2,
            show_labels: true,
            show_legend: true,
        }
    }
}

/// Draws regions onto the source documents: green when the region matched, red
/// when it did not, grey when the other document lacks it.
pub struct Visualizer {
    config: VisualizationConfig,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            config: VisualizationConfig::default(),
        }
    }

    pub fn with_config(config: VisualizationConfig) -> Self {
        Self { config }
    }

    pub fn annotate(
        &self,
        document: &RgbImage,
        result: &VerificationResult,
        side: Side,
    ) -> RgbImage {
        let mut vis = document.clone();

        for verdict in result.regions() {
            let (bbox, color, score) = match (&verdict.outcome, side) {
                (RegionOutcome::Compared(comparison), _) => {
                    let bbox = match side {
                        Side::First => comparison.first,
                        Side::Second => comparison.second,
                    };
                    let color = if comparison.similarity.is_match() {
                        MATCHED_COLOR
                    } else {
                        MISMATCHED_COLOR
                    };
                    (bbox, color, comparison.similarity.embedding_score)
                }
                // Drawn on the document the region was found in.
                (RegionOutcome::NotDetected(MissingIn::Second(bbox)), Side::First)
                | (RegionOutcome::NotDetected(MissingIn::First(bbox)), Side::Second) => {
                    (*bbox, NOT_DETECTED_COLOR, None)
                }
                (RegionOutcome::NotDetected(_), _) => continue,
            };

            self.fill_region(&mut vis, &bbox, color);
            self.draw_region_border(&mut vis, &bbox, color);

            if self.config.show_labels {
                let text = match score {
                    Some(score) => format!("{} {:.0}%", verdict.label, score * 100.0),
                    None => verdict.label.to_string(),
                };
                let y = (bbox.y1 as u32).saturating_sub(16);
                self.draw_label(&mut vis, bbox.x1 as u32, y, &text, color);
            }
        }

        if self.config.show_legend {
            self.draw_legend(&mut vis);
        }

        vis
    }

    /// Both annotated documents next to each other under their captions.
    pub fn render(
        &self,
        first: &RgbImage,
        second: &RgbImage,
        result: &VerificationResult,
    ) -> RenderedComparison {
        let first = self.annotate(first, result, Side::First);
        let second = self.annotate(second, result, Side::Second);
        let combined = self.side_by_side(&[("Document A", &first), ("Document B", &second)]);

        RenderedComparison {
            first,
            second,
            combined,
        }
    }

    pub fn side_by_side(&self, images: &[(&str, &RgbImage)]) -> RgbImage {
        let padding = 10u32;
        let caption = 20u32;

        let height = images.iter().map(|(_, img)| img.height()).max().unwrap_or(0)
            + caption
            + padding * 2;
        let width = images.iter().map(|(_, img)| img.width()).sum::<u32>()
            + padding * (images.len() as u32 + 1);

        let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);

        let mut x = padding;
        for (title, img) in images {
            self.draw_label(&mut canvas, x, padding / 2, title, LABEL_COLOR);
            image::imageops::replace(&mut canvas, *img, x as i64, (caption + padding) as i64);
            x += img.width() + padding;
        }

        canvas
    }

    fn draw_region_border(&self, image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
        for t in 0..self.config.border_thickness as i32 {
            let width = bbox.width() + 2 * t as u32;
            let height = bbox.height() + 2 * t as u32;
            draw_hollow_rect_mut(
                image,
                Rect::at(bbox.x1 - t, bbox.y1 - t).of_size(width, height),
                color,
            );
        }
    }

    fn fill_region(&self, image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
        let Some(bbox) = bbox.clamp_to(image.width(), image.height()) else {
            return;
        };
        let alpha = self.config.fill_opacity.clamp(0.0, 1.0);

        for y in bbox.y1 as u32..bbox.y2 as u32 {
            for x in bbox.x1 as u32..bbox.x2 as u32 {
                let pixel = image.get_pixel_mut(x, y);
                for c in 0..3 {
                    pixel[c] = ((1.0 - alpha) * pixel[c] as f32 + alpha * color[c] as f32) as u8;
                }
            }
        }
    }

    /// Block glyphs on a dark plate; no font is bundled.
    fn draw_label(&self, image: &mut RgbImage, x: u32, y: u32, text: &str, color: Rgb<u8>) {
        let glyph_width = 6u32;
        let glyph_height = 8u32;
        let chars = text.chars().count() as u32;

        draw_filled_rect_mut(
            image,
            Rect::at(x as i32, y as i32).of_size(chars * glyph_width + 4, glyph_height + 4),
            Rgb([0, 0, 0]),
        );

        for (i, c) in text.chars().enumerate() {
            if c.is_whitespace() {
                continue;
            }
            let cx = x + 2 + i as u32 * glyph_width;
            draw_filled_rect_mut(
                image,
                Rect::at(cx as i32, y as i32 + 2).of_size(glyph_width - 1, glyph_height),
                color,
            );
        }
    }

    fn draw_legend(&self, image: &mut RgbImage) {
        let items = [
            ("Match", MATCHED_COLOR),
            ("Mismatch", MISMATCHED_COLOR),
            ("Not detected", NOT_DETECTED_COLOR),
        ];
        let legend_width = 110u32;
        let legend_x = image.width().saturating_sub(legend_width + 10);
        let legend_y = 10u32;

        draw_filled_rect_mut(
            image,
            Rect::at(legend_x as i32, legend_y as i32)
                .of_size(legend_width, items.len() as u32 * 20 + 10),
            BACKGROUND,
        );

        for (i, (label, color)) in items.iter().enumerate() {
            let item_y = legend_y + 5 + i as u32 * 20;
            draw_filled_rect_mut(
                image,
                Rect::at(legend_x as i32 + 5, item_y as i32).of_size(16, 12),
                *color,
            );
            self.draw_label(image, legend_x + 26, item_y, label, LABEL_COLOR);
        }
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RenderedComparison {
    pub first: RgbImage,
    pub second: RgbImage,
    pub combined: RgbImage,
}

impl RenderedComparison {
    pub fn save_all<P: AsRef<Path>>(&self, directory: P) -> Result<()> {
        let directory = directory.as_ref();
        std::fs::create_dir_all(directory)?;

        self.first.save(directory.join("document_a.png"))?;
        self.second.save(directory.join("document_b.png"))?;
        self.combined.save(directory.join("comparison.png"))?;

        Ok(())
    }
}
