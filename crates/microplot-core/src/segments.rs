//! Plant/gap segmentation of a 1-D occupancy profile.
//!
//! The profile is smoothed with a centred moving average, thresholded against
//! a floor relative to its maximum, and the resulting runs are cleaned up in
//! two passes: short plant runs are noise and fall back to gap, then short
//! interior gaps are sparse vegetation and get absorbed by the plant runs
//! around them.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::profile::AxisProfile;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Tunables of the segment detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentParams {
    /// Moving-average window in samples; truncated at the profile ends.
    pub smoothing_window: usize,
    /// A sample is plant when its smoothed value exceeds
    /// `density_floor * max(smoothed)`.
    pub density_floor: f32,
    /// Minimum run length for both cleanup passes. `None` reuses the
    /// noise size the mask was cleaned with.
    pub min_run: Option<usize>,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            smoothing_window: 5,
            density_floor: 0.1,
            min_run: None,
        }
    }
}

impl SegmentParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.smoothing_window == 0 {
            return Err(ConfigError::ZeroSmoothingWindow);
        }
        if !(0.0..1.0).contains(&self.density_floor) {
            return Err(ConfigError::InvalidDensityFloor(self.density_floor));
        }
        if self.min_run == Some(0) {
            return Err(ConfigError::ZeroMinRun);
        }
        Ok(())
    }

    /// Run length used by the cleanup passes for a given noise size.
    pub fn effective_min_run(&self, noise_pixels: usize) -> usize {
        self.min_run.unwrap_or(noise_pixels).max(1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentLabel {
    Plant,
    Gap,
}

/// Half-open interval `[start, end)` along a profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    pub label: SegmentLabel,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn is_plant(&self) -> bool {
        self.label == SegmentLabel::Plant
    }
}

/// Centred moving average with the window clipped at both ends.
pub fn smooth_profile(values: &[u32], window: usize) -> Vec<f32> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let half = window.max(1) / 2;

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0u64);
    for &v in values {
        let last = prefix.last().copied().unwrap_or(0);
        prefix.push(last + u64::from(v));
    }

    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            (prefix[hi] - prefix[lo]) as f32 / (hi - lo) as f32
        })
        .collect()
}

/// Full plant/gap partition of `profile`.
///
/// The result is sorted, non-overlapping and covers `[0, profile.len())`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(profile, params), fields(axis = ?profile.axis, len = profile.len()))
)]
pub fn detect_segments(
    profile: &AxisProfile,
    noise_pixels: usize,
    params: &SegmentParams,
) -> Vec<Segment> {
    let n = profile.len();
    if n == 0 {
        return Vec::new();
    }

    let smoothed = smooth_profile(&profile.values, params.smoothing_window);
    let peak = smoothed.iter().copied().fold(0.0f32, f32::max);
    let floor = params.density_floor * peak;

    let labels = smoothed.iter().map(|&v| {
        if peak > 0.0 && v > floor {
            SegmentLabel::Plant
        } else {
            SegmentLabel::Gap
        }
    });
    let mut runs = runs_from_labels(labels);

    let min_run = params.effective_min_run(noise_pixels);

    // spikes shorter than the noise size are not plants
    for run in runs.iter_mut() {
        if run.label == SegmentLabel::Plant && run.len() < min_run {
            run.label = SegmentLabel::Gap;
        }
    }
    let mut runs = coalesce(runs);

    // close short splits between two plant runs
    let last = runs.len().saturating_sub(1);
    for (i, run) in runs.iter_mut().enumerate() {
        if i > 0 && i < last && run.label == SegmentLabel::Gap && run.len() < min_run {
            run.label = SegmentLabel::Plant;
        }
    }
    let runs = coalesce(runs);

    debug!(
        "{:?} profile: {} samples, peak {:.1}, {} plant segments (min run {})",
        profile.axis,
        n,
        peak,
        runs.iter().filter(|s| s.is_plant()).count(),
        min_run
    );

    runs
}

/// The plant segments of [`detect_segments`], in profile order.
pub fn plant_segments(
    profile: &AxisProfile,
    noise_pixels: usize,
    params: &SegmentParams,
) -> Vec<Segment> {
    detect_segments(profile, noise_pixels, params)
        .into_iter()
        .filter(Segment::is_plant)
        .collect()
}

fn runs_from_labels(labels: impl IntoIterator<Item = SegmentLabel>) -> Vec<Segment> {
    let mut runs: Vec<Segment> = Vec::new();
    for (i, label) in labels.into_iter().enumerate() {
        match runs.last_mut() {
            Some(run) if run.label == label => run.end = i + 1,
            _ => runs.push(Segment {
                start: i,
                end: i + 1,
                label,
            }),
        }
    }
    runs
}

fn coalesce(runs: Vec<Segment>) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::with_capacity(runs.len());
    for run in runs {
        match out.last_mut() {
            Some(prev) if prev.label == run.label => prev.end = run.end,
            _ => out.push(run),
        }
    }
    out
}
