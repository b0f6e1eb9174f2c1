use image::{DynamicImage, GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology;
use tracing::debug;

use super::denoise::denoise_nl_means;

#[derive(Debug, Clone, PartialEq)]
pub struct EnhanceOptions {
    pub adaptive_block_size: u32,
    pub adaptive_offset: i32,
    pub denoise_strength: f32,
    pub denoise_template: u32,
    pub denoise_search: u32,
    pub upscale: u32,
}

impl Default for EnhanceOptions {
    fn default() -> Self {
        Self {
            adaptive_block_size: 15,
            adaptive_offset: 8,
            denoise_strength: 10.0,
            denoise_template: 7,
            denoise_search: 21,
            upscale: 2,
        }
    }
}

/// Produces the enhanced detector variant of `image`.
///
/// Stages run in a fixed order: grayscale, sharpen, adaptive threshold,
/// closing, non-local-means denoise, cubic upscale.
pub fn enhance(image: &DynamicImage, options: &EnhanceOptions) -> GrayImage {
    let gray = to_luma(image);
    let sharp = sharpen(&gray);
    let binary = adaptive_threshold_gaussian(
        &sharp,
        options.adaptive_block_size,
        options.adaptive_offset,
    );
    let closed = morphology::close(&binary, Norm::LInf, 1);
    let denoised = denoise_nl_means(
        &closed,
        options.denoise_strength,
        options.denoise_template,
        options.denoise_search,
    );
    let scale = options.upscale.max(1);
    let (width, height) = denoised.dimensions();
    debug!(
        "enhance: {}x{} -> {}x{}",
        width,
        height,
        width.saturating_mul(scale),
        height.saturating_mul(scale)
    );
    if scale == 1 {
        return denoised;
    }
    image::imageops::resize(
        &denoised,
        width.saturating_mul(scale),
        height.saturating_mul(scale),
        image::imageops::FilterType::CatmullRom,
    )
}

/// Luma with transparent pixels composited over white.
fn to_luma(image: &DynamicImage) -> GrayImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut luma = GrayImage::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let r = r as f32 * alpha + 255.0 * (1.0 - alpha);
        let g = g as f32 * alpha + 255.0 * (1.0 - alpha);
        let b = b as f32 * alpha + 255.0 * (1.0 - alpha);
        let value = (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
        luma.put_pixel(x, y, Luma([value]));
    }
    luma
}

const SHARPEN_KERNEL: [[i32; 3]; 3] = [[0, -1, 0], [-1, 5, -1], [0, -1, 0]];

fn sharpen(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut output = GrayImage::new(width, height);
    if width == 0 || height == 0 {
        return output;
    }
    let max_x = width as i64 - 1;
    let max_y = height as i64 - 1;

    for y in 0..height {
        for x in 0..width {
            let mut acc = 0i32;
            for (ky, row) in SHARPEN_KERNEL.iter().enumerate() {
                for (kx, weight) in row.iter().enumerate() {
                    if *weight == 0 {
                        continue;
                    }
                    let sx = (x as i64 + kx as i64 - 1).clamp(0, max_x) as u32;
                    let sy = (y as i64 + ky as i64 - 1).clamp(0, max_y) as u32;
                    acc += weight * image.get_pixel(sx, sy)[0] as i32;
                }
            }
            output.put_pixel(x, y, Luma([acc.clamp(0, 255) as u8]));
        }
    }
    output
}

/// Binary image where a pixel is white when brighter than the Gaussian
/// weighted mean of its `block_size` neighbourhood minus `offset`.
fn adaptive_threshold_gaussian(image: &GrayImage, block_size: u32, offset: i32) -> GrayImage {
    let block_size = block_size.max(3) | 1;
    let sigma = 0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let mean = gaussian_blur_f32(image, sigma);

    let mut output = image.clone();
    for (pixel, local) in output.pixels_mut().zip(mean.pixels()) {
        let threshold = local[0] as i32 - offset;
        pixel[0] = if pixel[0] as i32 > threshold { 255 } else { 0 };
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn page(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if (4..8).contains(&y) && x % 6 < 4 {
                Luma([20])
            } else {
                Luma([235])
            }
        })
    }

    #[test]
    fn luma_composites_transparency_over_white() {
        let mut rgba = RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        rgba.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        let luma = to_luma(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(luma.get_pixel(0, 0)[0], 255);
        assert_eq!(luma.get_pixel(1, 0)[0], 0);
    }

    #[test]
    fn sharpen_keeps_flat_regions() {
        let flat = GrayImage::from_pixel(5, 5, Luma([120]));
        assert_eq!(sharpen(&flat), flat);
    }

    #[test]
    fn sharpen_boosts_isolated_pixel() {
        let mut image = GrayImage::from_pixel(3, 3, Luma([10]));
        image.put_pixel(1, 1, Luma([50]));
        let sharp = sharpen(&image);
        assert_eq!(sharp.get_pixel(1, 1)[0], 210);
        assert_eq!(sharp.get_pixel(0, 1)[0], 0);
    }

    #[test]
    fn adaptive_threshold_is_binary_and_keeps_background_white() {
        let binary = adaptive_threshold_gaussian(&page(24, 12), 15, 8);
        assert!(binary.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(binary.get_pixel(0, 0)[0], 255);
        assert_eq!(binary.get_pixel(1, 5)[0], 0);
    }

    #[test]
    fn enhance_doubles_dimensions() {
        let image = DynamicImage::ImageLuma8(page(24, 12));
        let enhanced = enhance(&image, &EnhanceOptions::default());
        assert_eq!(enhanced.dimensions(), (48, 24));
    }

    #[test]
    fn enhance_is_deterministic() {
        let image = DynamicImage::ImageLuma8(page(18, 10));
        let options = EnhanceOptions::default();
        assert_eq!(enhance(&image, &options), enhance(&image, &options));
    }
}
