//! Pixel-level comparison of image outputs.

use image::{DynamicImage, GenericImageView};

/// Mean per-pixel RGB distance above which seeded images count as different.
pub const MAX_MEAN_PIXEL_DISTANCE: f64 = 8.0;

#[derive(Clone, Debug, PartialEq)]
pub enum ImageComparison {
    SizeMismatch,
    Identical,
    NotIdentical { distance: f64 },
    /// Only the oracle can tell.
    Undecided,
}

/// Sizes must agree; seeded outputs are then compared pixel by pixel.
/// Bytes that do not decode as an image are left to the oracle.
pub fn compare_images(current: &[u8], candidate: &[u8], deterministic: bool) -> ImageComparison {
    let (current, candidate) = match (image::load_from_memory(current), image::load_from_memory(candidate)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => {
            tracing::debug!(error = %e, "could not decode image output");
            return ImageComparison::Undecided;
        }
    };
    if current.dimensions() != candidate.dimensions() {
        return ImageComparison::SizeMismatch;
    }
    if !deterministic {
        return ImageComparison::Undecided;
    }
    let distance = mean_pixel_distance(&current, &candidate);
    tracing::debug!(distance, "seeded image distance");
    if distance > MAX_MEAN_PIXEL_DISTANCE {
        ImageComparison::NotIdentical { distance }
    } else {
        ImageComparison::Identical
    }
}

/// Mean Euclidean RGB distance; both images have the same dimensions.
fn mean_pixel_distance(a: &DynamicImage, b: &DynamicImage) -> f64 {
    let (a, b) = (a.to_rgb8(), b.to_rgb8());
    let pixels = f64::from(a.width()) * f64::from(a.height());
    if pixels == 0.0 {
        return 0.0;
    }
    let total: f64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(p, q)| {
            p.0.iter()
                .zip(q.0.iter())
                .map(|(x, y)| (f64::from(*x) - f64::from(*y)).powi(2))
                .sum::<f64>()
                .sqrt()
        })
        .sum();
    total / pixels
}
