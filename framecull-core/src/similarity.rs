//! Duplicate detection between consecutive kept frames.
//!
//! Both strategies answer the same question, "is this candidate a duplicate of
//! the previous kept frame", from a fingerprint computed once per frame. The
//! caller holds exactly one fingerprint, the one of the last kept frame.

use crate::config::SimilarityStrategy;
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Number of grayscale intensity bins.
pub const HISTOGRAM_BINS: usize = 256;

/// Comparable summary of a frame's visual content.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameFingerprint {
    /// Grayscale intensity distribution, bins summing to 1.0.
    Histogram(Vec<f64>),
    /// The frame itself, compared sample by sample.
    Pixels(RgbImage),
}

/// A duplicate-detection strategy.
pub trait SimilarityEngine: Send + Sync {
    fn strategy(&self) -> SimilarityStrategy;

    fn fingerprint(&self, image: &RgbImage) -> FrameFingerprint;

    /// True when `candidate` should be dropped as a duplicate of `previous`.
    fn is_duplicate(&self, previous: &FrameFingerprint, candidate: &FrameFingerprint) -> bool;
}

/// Builds the engine selected by the configuration.
pub fn engine_for(strategy: SimilarityStrategy, threshold: f64) -> Box<dyn SimilarityEngine> {
    match strategy {
        SimilarityStrategy::Histogram => Box::new(HistogramEngine),
        SimilarityStrategy::PixelDistance => Box::new(PixelDistanceEngine::new(threshold)),
    }
}

// ============================================================================
// HISTOGRAM STRATEGY
// ============================================================================

/// Exact equality of normalized grayscale histograms. Histograms that differ
/// in any bin are distinct frames, however close they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistogramEngine;

impl SimilarityEngine for HistogramEngine {
    fn strategy(&self) -> SimilarityStrategy {
        SimilarityStrategy::Histogram
    }

    fn fingerprint(&self, image: &RgbImage) -> FrameFingerprint {
        FrameFingerprint::Histogram(grayscale_histogram(image))
    }

    fn is_duplicate(&self, previous: &FrameFingerprint, candidate: &FrameFingerprint) -> bool {
        match (previous, candidate) {
            (FrameFingerprint::Histogram(a), FrameFingerprint::Histogram(b)) => a == b,
            _ => false,
        }
    }
}

/// Converts an RGB sample to BT.601 luma, rounded to the nearest integer.
#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114 + 500) / 1000) as u8
}

/// 256-bin grayscale histogram normalized so the bins sum to 1.0.
#[must_use]
pub fn grayscale_histogram(image: &RgbImage) -> Vec<f64> {
    let mut counts = [0u64; HISTOGRAM_BINS];
    for pixel in image.pixels() {
        let [r, g, b] = pixel.0;
        counts[usize::from(luma(r, g, b))] += 1;
    }

    let total = u64::from(image.width()) * u64::from(image.height());
    if total == 0 {
        return vec![0.0; HISTOGRAM_BINS];
    }
    counts
        .iter()
        .map(|&count| count as f64 / total as f64)
        .collect()
}

// ============================================================================
// PIXEL-DISTANCE STRATEGY
// ============================================================================

/// L2 pixel distance below a threshold.
#[derive(Debug, Clone, Copy)]
pub struct PixelDistanceEngine {
    threshold: f64,
}

impl PixelDistanceEngine {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl SimilarityEngine for PixelDistanceEngine {
    fn strategy(&self) -> SimilarityStrategy {
        SimilarityStrategy::PixelDistance
    }

    fn fingerprint(&self, image: &RgbImage) -> FrameFingerprint {
        FrameFingerprint::Pixels(image.clone())
    }

    fn is_duplicate(&self, previous: &FrameFingerprint, candidate: &FrameFingerprint) -> bool {
        match (previous, candidate) {
            (FrameFingerprint::Pixels(a), FrameFingerprint::Pixels(b)) => {
                let distance = pixel_distance(a, b);
                log::trace!("Pixel distance {:.3} (threshold {})", distance, self.threshold);
                distance < self.threshold
            }
            _ => false,
        }
    }
}

/// Euclidean distance over all RGB samples after resizing `candidate` to the
/// dimensions of `baseline`.
#[must_use]
pub fn pixel_distance(baseline: &RgbImage, candidate: &RgbImage) -> f64 {
    let resized;
    let candidate = if candidate.dimensions() == baseline.dimensions() {
        candidate
    } else {
        resized = imageops::resize(
            candidate,
            baseline.width(),
            baseline.height(),
            FilterType::Triangle,
        );
        &resized
    };

    let sum: u64 = baseline
        .as_raw()
        .iter()
        .zip(candidate.as_raw().iter())
        .map(|(&a, &b)| {
            let d = i64::from(a) - i64::from(b);
            (d * d) as u64
        })
        .sum();
    (sum as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
    }

    #[test]
    fn histogram_is_normalized() {
        let mut image = solid(4, 4, 10);
        image.put_pixel(0, 0, Rgb([200, 200, 200]));
        let histogram = grayscale_histogram(&image);
        assert_eq!(histogram.len(), HISTOGRAM_BINS);
        let sum: f64 = histogram.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert_eq!(histogram[10], 15.0 / 16.0);
        assert_eq!(histogram[200], 1.0 / 16.0);
    }

    #[test]
    fn histogram_duplicate_test_is_reflexive() {
        let engine = HistogramEngine;
        let mut image = solid(8, 6, 0);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            *pixel = Rgb([(x * 30) as u8, (y * 40) as u8, ((x + y) * 7) as u8]);
        }
        let fingerprint = engine.fingerprint(&image);
        assert!(engine.is_duplicate(&fingerprint, &fingerprint.clone()));
    }

    #[test]
    fn histogram_ignores_pixel_order() {
        let engine = HistogramEngine;
        let mut a = solid(2, 1, 0);
        a.put_pixel(0, 0, Rgb([255, 255, 255]));
        let mut b = solid(2, 1, 0);
        b.put_pixel(1, 0, Rgb([255, 255, 255]));
        assert!(engine.is_duplicate(&engine.fingerprint(&a), &engine.fingerprint(&b)));
    }

    #[test]
    fn histogram_distinguishes_brightness() {
        let engine = HistogramEngine;
        let a = engine.fingerprint(&solid(4, 4, 10));
        let b = engine.fingerprint(&solid(4, 4, 11));
        assert!(!engine.is_duplicate(&a, &b));
    }

    #[test]
    fn pixel_distance_counts_every_sample() {
        let a = solid(2, 2, 0);
        let b = solid(2, 2, 1);
        // 12 samples, each differing by one
        assert!((pixel_distance(&a, &b) - 12f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn pixel_distance_resizes_candidate() {
        let baseline = solid(4, 4, 50);
        let candidate = solid(8, 8, 50);
        assert_eq!(pixel_distance(&baseline, &candidate), 0.0);
    }

    #[test]
    fn pixel_threshold_is_strict() {
        let engine = PixelDistanceEngine::new(1.0);
        let a = solid(1, 1, 0);
        let mut b = a.clone();
        b.put_pixel(0, 0, Rgb([1, 0, 0]));
        // distance exactly 1.0 is not below the threshold
        assert!(!engine.is_duplicate(&engine.fingerprint(&a), &engine.fingerprint(&b)));
        assert!(engine.is_duplicate(&engine.fingerprint(&a), &engine.fingerprint(&a)));
    }

    #[test]
    fn engine_for_selects_strategy() {
        assert_eq!(
            engine_for(SimilarityStrategy::Histogram, 1.0).strategy(),
            SimilarityStrategy::Histogram
        );
        assert_eq!(
            engine_for(SimilarityStrategy::PixelDistance, 1.0).strategy(),
            SimilarityStrategy::PixelDistance
        );
    }
}
