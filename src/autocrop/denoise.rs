//! Non-local-means denoising for grayscale images.
//!
//! Each output pixel is a weighted average of the pixels in a search window
//! around it, weighted by how similar the patch around each candidate is to
//! the patch around the output pixel. Patch distances are accumulated one
//! search offset at a time with a squared integral image, so the cost is
//! `O(pixels * search_window)` regardless of patch size. Rows are
//! accumulated in parallel.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::integral_squared_image;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Non-local-means parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NlmConfig {
    /// Filter strength. Larger values smooth more; 0 disables the filter.
    pub strength: f32,
    /// Patch radius (1 gives 3x3 patches).
    pub patch_radius: u32,
    /// Search window radius (3 gives a 7x7 window).
    pub search_radius: u32,
}

impl Default for NlmConfig {
    fn default() -> Self {
        Self {
            strength: 3.0,
            patch_radius: 1,
            search_radius: 3,
        }
    }
}

/// Denoises `image` with the non-local-means filter.
pub fn non_local_means(image: &GrayImage, config: &NlmConfig) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || config.strength <= 0.0 {
        return image.clone();
    }

    let w = width as usize;
    let h = height as usize;
    let pixels = image.as_raw();
    let search = config.search_radius as isize;
    let patch = config.patch_radius as usize;

    // Weight by mean squared patch distance, looked up by its integer value
    let h2 = (config.strength as f64).powi(2);
    let weights: Vec<f32> = (0..=255 * 255)
        .map(|d| (-(d as f64) / h2).exp() as f32)
        .collect();

    let mut weight_sum = vec![0f32; w * h];
    let mut value_sum = vec![0f32; w * h];

    for dy in -search..=search {
        for dx in -search..=search {
            // Absolute differences against the shifted image; the squared
            // integral turns them into patch distances
            let diff: GrayImage = ImageBuffer::from_fn(width, height, |x, y| {
                let sx = clamp(x as isize + dx, w);
                let sy = clamp(y as isize + dy, h);
                let a = pixels[y as usize * w + x as usize];
                let b = pixels[sy * w + sx];
                Luma([a.abs_diff(b)])
            });
            let integral = integral_squared_image::<_, u64>(&diff);

            value_sum
                .par_chunks_mut(w)
                .zip(weight_sum.par_chunks_mut(w))
                .enumerate()
                .for_each(|(y, (values, totals))| {
                    let y0 = y.saturating_sub(patch) as u32;
                    let y1 = (y + patch + 1).min(h) as u32;
                    let sy = clamp(y as isize + dy, h);
                    for x in 0..w {
                        let x0 = x.saturating_sub(patch) as u32;
                        let x1 = (x + patch + 1).min(w) as u32;
                        let sum = integral.get_pixel(x1, y1)[0] + integral.get_pixel(x0, y0)[0]
                            - integral.get_pixel(x1, y0)[0]
                            - integral.get_pixel(x0, y1)[0];
                        let count = ((y1 - y0) * (x1 - x0)) as u64;
                        let mean = ((sum + count / 2) / count) as usize;

                        let weight = weights[mean];
                        let sx = clamp(x as isize + dx, w);
                        totals[x] += weight;
                        values[x] += weight * pixels[sy * w + sx] as f32;
                    }
                });
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let i = y as usize * w + x as usize;
        Luma([(value_sum[i] / weight_sum[i]).round().clamp(0.0, 255.0) as u8])
    })
}

#[inline]
fn clamp(v: isize, len: usize) -> usize {
    v.clamp(0, len as isize - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_image_unchanged() {
        let image = GrayImage::from_pixel(20, 10, Luma([128]));
        let out = non_local_means(&image, &NlmConfig::default());
        assert!(out.pixels().all(|p| p[0] == 128));
    }

    #[test]
    fn test_zero_strength_is_identity() {
        let image = GrayImage::from_fn(8, 8, |x, y| Luma([(x * 30 + y) as u8]));
        let config = NlmConfig {
            strength: 0.0,
            ..Default::default()
        };
        assert_eq!(non_local_means(&image, &config), image);
    }

    #[test]
    fn test_isolated_speck_is_reduced() {
        let mut image = GrayImage::from_pixel(15, 15, Luma([100]));
        image.put_pixel(7, 7, Luma([110]));
        let config = NlmConfig {
            strength: 10.0,
            ..Default::default()
        };

        let out = non_local_means(&image, &config);
        let center = out.get_pixel(7, 7)[0];
        assert!(center < 110, "speck survived: {}", center);
        assert!(center >= 100);
    }

    #[test]
    fn test_strong_edge_is_preserved() {
        // Left half dark, right half bright
        let image = GrayImage::from_fn(20, 20, |x, _| Luma([if x < 10 { 20 } else { 220 }]));
        let out = non_local_means(&image, &NlmConfig::default());

        assert_eq!(out.get_pixel(2, 10)[0], 20);
        assert_eq!(out.get_pixel(17, 10)[0], 220);
        // Pixels right at the edge stay on their side
        assert!(out.get_pixel(9, 10)[0] < 120);
        assert!(out.get_pixel(10, 10)[0] > 120);
    }

    #[test]
    fn test_matches_direct_patch_average() {
        // Reference: patch distances summed pixel by pixel
        let image = GrayImage::from_fn(9, 7, |x, y| Luma([((x * 37 + y * 91) % 256) as u8]));
        let config = NlmConfig {
            strength: 40.0,
            patch_radius: 1,
            search_radius: 2,
        };
        let out = non_local_means(&image, &config);

        let (w, h) = (9isize, 7isize);
        let at = |x: isize, y: isize| {
            image.get_pixel(x.clamp(0, w - 1) as u32, y.clamp(0, h - 1) as u32)[0] as i64
        };
        let h2 = (config.strength as f64).powi(2);
        for y in 0..h {
            for x in 0..w {
                let (mut total, mut value) = (0f64, 0f64);
                for dy in -2..=2 {
                    for dx in -2..=2 {
                        let (mut sum, mut count) = (0i64, 0i64);
                        for py in (y - 1).max(0)..(y + 2).min(h) {
                            for px in (x - 1).max(0)..(x + 2).min(w) {
                                let d = at(px, py) - at(px + dx, py + dy);
                                sum += d * d;
                                count += 1;
                            }
                        }
                        let mean = (sum + count / 2) / count;
                        let weight = (-(mean as f64) / h2).exp() as f32 as f64;
                        total += weight;
                        value += weight * at(x + dx, y + dy) as f64;
                    }
                }
                let expected = (value / total).round() as i64;
                let got = out.get_pixel(x as u32, y as u32)[0] as i64;
                assert!((got - expected).abs() <= 1, "({}, {}): {} vs {}", x, y, got, expected);
            }
        }
    }
}
