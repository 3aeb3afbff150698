//! Vegetation mask from an RGB orthomosaic.
//!
//! Plants are separated from soil with the Excess Green index on
//! normalized channels, `ExG = 2g - r - b` with each channel in `[0, 1]`.

use log::{debug, warn};

use crate::core::BinaryMask;
use crate::error::PipelineError;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Borrowed interleaved RGB8 buffer, row-major.
#[derive(Clone, Copy, Debug)]
pub struct RgbView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8],
}

impl<'a> RgbView<'a> {
    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Result<Self, PipelineError> {
        let expected = width * height * 3;
        if data.len() != expected {
            return Err(PipelineError::InvalidRgbBuffer {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }
}

/// How the ExG image is thresholded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ExgThreshold {
    /// Plant when `ExG > t`.
    Fixed(f32),
    /// Otsu threshold over the in-field pixels.
    Otsu,
}

impl ExgThreshold {
    /// Values close to or above 1 cannot be met by a normalized ExG and select
    /// Otsu instead.
    pub fn from_value(t: f32) -> Self {
        if t > 0.999 {
            ExgThreshold::Otsu
        } else {
            ExgThreshold::Fixed(t)
        }
    }
}

pub fn excess_green(view: &RgbView<'_>) -> Vec<f32> {
    view.data
        .chunks_exact(3)
        .map(|px| {
            let r = f32::from(px[0]) / 255.0;
            let g = f32::from(px[1]) / 255.0;
            let b = f32::from(px[2]) / 255.0;
            2.0 * g - r - b
        })
        .collect()
}

/// 3x3 Gaussian (`[1 2 1] / 4` in each direction) with edge samples
/// replicated.
pub fn gaussian_blur_3x3(values: &[f32], width: usize, height: usize) -> Vec<f32> {
    if values.len() != width * height || width == 0 || height == 0 {
        return values.to_vec();
    }
    let pass = |src: &[f32], at: &dyn Fn(usize, usize, isize) -> usize| -> Vec<f32> {
        (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| 0.25 * src[at(x, y, -1)] + 0.5 * src[at(x, y, 0)] + 0.25 * src[at(x, y, 1)])
            .collect()
    };
    let clamp = |v: usize, d: isize, len: usize| v.saturating_add_signed(d).min(len - 1);

    let horizontal = pass(values, &|x, y, d| y * width + clamp(x, d, width));
    pass(&horizontal, &|x, y, d| clamp(y, d, height) * width + x)
}

/// Otsu's threshold over a 256-bin histogram spanning the value range.
///
/// Returns `None` for fewer than two distinct values.
pub fn otsu_threshold(values: &[f32]) -> Option<f32> {
    const BINS: usize = 256;
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if hi <= lo {
        return None;
    }

    let width = (hi - lo) / BINS as f32;
    let mut hist = [0u64; BINS];
    for &v in values.iter().filter(|v| v.is_finite()) {
        let bin = (((v - lo) / width) as usize).min(BINS - 1);
        hist[bin] += 1;
    }

    let total: u64 = hist.iter().sum();
    let weighted_total: f64 = hist.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();

    let mut best = (0usize, f64::NEG_INFINITY);
    let mut w0 = 0u64;
    let mut sum0 = 0.0f64;
    for (k, &count) in hist.iter().enumerate().take(BINS - 1) {
        w0 += count;
        sum0 += k as f64 * count as f64;
        let w1 = total - w0;
        if w0 == 0 || w1 == 0 {
            continue;
        }
        let m0 = sum0 / w0 as f64;
        let m1 = (weighted_total - sum0) / w1 as f64;
        let between = w0 as f64 * w1 as f64 * (m0 - m1) * (m0 - m1);
        if between > best.1 {
            best = (k, between);
        }
    }

    Some(lo + (best.0 + 1) as f32 * width)
}

/// Binarize an RGB field image with the ExG index, then drop connected
/// components smaller than `noise_pixels`.
///
/// With [`ExgThreshold::Otsu`] the index is smoothed with a 3x3 Gaussian
/// before the threshold is computed and applied.
///
/// When `field` is given, pixels outside it are background and do not take
/// part in the Otsu statistics.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(view, field), fields(width = view.width, height = view.height))
)]
pub fn binarize_exg(
    view: &RgbView<'_>,
    field: Option<&BinaryMask>,
    threshold: ExgThreshold,
    noise_pixels: usize,
) -> Result<BinaryMask, PipelineError> {
    if let Some(f) = field {
        if f.width != view.width || f.height != view.height {
            return Err(PipelineError::FieldSizeMismatch {
                mask_width: f.width,
                mask_height: f.height,
                width: view.width,
                height: view.height,
            });
        }
    }
    let inside = |i: usize| field.is_none_or(|f| f.data[i] != 0);

    let exg = excess_green(view);
    let (index, t) = match threshold {
        ExgThreshold::Fixed(t) => (exg, t),
        ExgThreshold::Otsu => {
            let blurred = gaussian_blur_3x3(&exg, view.width, view.height);
            let in_field: Vec<f32> = blurred
                .iter()
                .enumerate()
                .filter(|&(i, _)| inside(i))
                .map(|(_, &v)| v)
                .collect();
            let t = otsu_threshold(&in_field).unwrap_or_else(|| {
                warn!("ExG is uniform inside the field; Otsu undefined, thresholding at 0");
                0.0
            });
            (blurred, t)
        }
    };

    let data = index
        .iter()
        .enumerate()
        .map(|(i, &v)| if inside(i) && v > t { 255 } else { 0 })
        .collect();
    let binary = BinaryMask::from_raw(view.width, view.height, data)?;
    let cleaned = binary.remove_small_objects(noise_pixels);

    debug!(
        "ExG threshold {:.4} ({:?}): {} plant pixels, {} after noise removal",
        t,
        threshold,
        binary.occupied_count(),
        cleaned.occupied_count()
    );
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOIL: [u8; 3] = [120, 90, 70];
    const LEAF: [u8; 3] = [60, 160, 50];

    fn field_image(width: usize, height: usize, plant: impl Fn(usize, usize) -> bool) -> Vec<u8> {
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(if plant(x, y) { &LEAF } else { &SOIL });
            }
        }
        data
    }

    #[test]
    fn excess_green_of_pure_colours() {
        let data = [0, 255, 0, 255, 0, 0, 255, 255, 255];
        let exg = excess_green(&RgbView::new(3, 1, &data).expect("rgb"));
        assert_eq!(exg, vec![2.0, -1.0, 0.0]);
    }

    #[test]
    fn otsu_splits_two_clusters() {
        let mut values = vec![-0.1f32; 300];
        values.extend(std::iter::repeat(0.45).take(100));
        let t = otsu_threshold(&values).expect("two clusters");
        assert!(t > -0.1 && t < 0.45, "threshold {t}");
        assert!(otsu_threshold(&[0.2, 0.2]).is_none());
    }

    #[test]
    fn fixed_and_otsu_agree_on_clean_image() {
        let data = field_image(40, 30, |x, y| (10..30).contains(&x) && (5..20).contains(&y));
        let view = RgbView::new(40, 30, &data).expect("rgb");

        let fixed = binarize_exg(&view, None, ExgThreshold::from_value(0.2), 1).expect("fixed");
        let otsu = binarize_exg(&view, None, ExgThreshold::from_value(1.0), 1).expect("otsu");
        assert_eq!(fixed.occupied_count(), 20 * 15);
        assert_eq!(fixed, otsu);
    }

    #[test]
    fn blur_spreads_an_impulse_and_keeps_constants() {
        let mut impulse = vec![0.0f32; 25];
        impulse[12] = 16.0;
        let out = gaussian_blur_3x3(&impulse, 5, 5);
        assert_eq!(out[12], 4.0);
        assert_eq!(out[11], 2.0);
        assert_eq!(out[6], 1.0);
        assert_eq!(out[0], 0.0);
        assert_eq!(out.iter().sum::<f32>(), 16.0);

        let flat = gaussian_blur_3x3(&[0.3; 12], 4, 3);
        assert!(flat.iter().all(|&v| (v - 0.3).abs() < 1e-6));
    }

    #[test]
    fn otsu_on_uniform_field_falls_back_to_zero() {
        let data = field_image(12, 8, |_, _| true);
        let view = RgbView::new(12, 8, &data).expect("rgb");
        let mask = binarize_exg(&view, None, ExgThreshold::Otsu, 1).expect("mask");
        assert_eq!(mask.occupied_count(), 12 * 8);
    }

    #[test]
    fn pixels_outside_field_are_background() {
        let data = field_image(20, 20, |_, _| true);
        let view = RgbView::new(20, 20, &data).expect("rgb");
        let field = BinaryMask::from_fn(20, 20, |x, _| x < 10);
        let mask = binarize_exg(&view, Some(&field), ExgThreshold::Fixed(0.1), 1).expect("mask");
        assert_eq!(mask.occupied_count(), 200);
        assert!(!mask.get(15, 3));
    }

    #[test]
    fn noise_blobs_are_removed() {
        let data = field_image(30, 30, |x, y| {
            ((2..12).contains(&x) && (2..12).contains(&y)) || (x == 25 && y == 25)
        });
        let view = RgbView::new(30, 30, &data).expect("rgb");
        let mask = binarize_exg(&view, None, ExgThreshold::Fixed(0.1), 5).expect("mask");
        assert_eq!(mask.occupied_count(), 100);
    }

    #[test]
    fn buffer_size_is_checked() {
        assert!(matches!(
            RgbView::new(4, 4, &[0u8; 10]),
            Err(PipelineError::InvalidRgbBuffer { expected: 48, got: 10 })
        ));
    }
}
