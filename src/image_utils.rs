use image::{GrayImage, Luma, RgbImage, imageops::{self, FilterType}};
use ndarray::{Array2, Array3};

pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let lum =
            (0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32) as u8;
        gray.put_pixel(x, y, Luma([lum]));
    }

    gray
}

pub fn gray_to_array(image: &GrayImage) -> Array2<f32> {
    let (width, height) = image.dimensions();
    let mut arr = Array2::zeros((height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        arr[[y as usize, x as usize]] = pixel[0] as f32;
    }

    arr
}

/// Grows `image` by `margin` pixels on every side, repeating the outermost pixels.
pub fn pad_replicate(image: &GrayImage, margin: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return GrayImage::new(width + 2 * margin, height + 2 * margin);
    }

    GrayImage::from_fn(width + 2 * margin, height + 2 * margin, |x, y| {
        let sx = x.saturating_sub(margin).min(width - 1);
        let sy = y.saturating_sub(margin).min(height - 1);
        *image.get_pixel(sx, sy)
    })
}

/// Scales `image` so its shorter side equals `target`, keeping the aspect ratio.
pub fn resize_shorter_side(image: &RgbImage, target: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let scaled = |long: u32, short: u32| {
        ((long as f64 * target as f64 / short.max(1) as f64).round() as u32).max(target)
    };

    let (new_width, new_height) = if width <= height {
        (target, scaled(height, width))
    } else {
        (scaled(width, height), target)
    };

    imageops::resize(image, new_width, new_height, FilterType::Triangle)
}

/// Takes the central `size`x`size` window. The input must be at least that large.
pub fn center_crop(image: &RgbImage, size: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let x = width.saturating_sub(size) / 2;
    let y = height.saturating_sub(size) / 2;

    imageops::crop_imm(image, x, y, size.min(width), size.min(height)).to_image()
}

/// Converts to a channel-first float array, normalizing each channel as `(v / 255 - mean) / std`.
pub fn rgb_to_normalized_chw(image: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut arr = Array3::zeros((3, height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            let v = pixel[c] as f32 / 255.0;
            arr[[c, y as usize, x as usize]] = (v - mean[c]) / std[c];
        }
    }

    arr
}
