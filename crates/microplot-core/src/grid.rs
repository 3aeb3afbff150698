//! Grouping of plant segments into a micro-plot grid.

use std::fmt;
use std::str::FromStr;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, GridError};
use crate::mask::BinaryMask;
use crate::profile::{axis_profile, Axis};
use crate::segments::{plant_segments, Segment, SegmentParams};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Physical direction the ranges run in.
///
/// Deserializes from the same names [`FromStr`] accepts (`h`, `horizontal`,
/// `v`, `vertical`, any case).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Orientation {
    /// Ranges are horizontal bands stacked down the image.
    #[default]
    Horizontal,
    /// Ranges are vertical bands side by side.
    Vertical,
}

impl Orientation {
    /// Profile axis whose plant segments are the ranges.
    pub fn range_axis(self) -> Axis {
        match self {
            Orientation::Horizontal => Axis::Y,
            Orientation::Vertical => Axis::X,
        }
    }

    pub fn row_axis(self) -> Axis {
        self.range_axis().other()
    }
}

impl FromStr for Orientation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h" | "horizontal" => Ok(Orientation::Horizontal),
            "v" | "vertical" => Ok(Orientation::Vertical),
            _ => Err(ConfigError::InvalidOrientation(s.to_string())),
        }
    }
}

impl TryFrom<String> for Orientation {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Horizontal => f.write_str("horizontal"),
            Orientation::Vertical => f.write_str("vertical"),
        }
    }
}

/// How many detected segments make up one plot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotLayout {
    pub rows_per_plot: usize,
    pub columns_per_plot: usize,
    pub orientation: Orientation,
}

impl Default for PlotLayout {
    fn default() -> Self {
        Self {
            rows_per_plot: 1,
            columns_per_plot: 1,
            orientation: Orientation::Horizontal,
        }
    }
}

impl PlotLayout {
    pub fn new(rows_per_plot: usize, columns_per_plot: usize, orientation: Orientation) -> Self {
        Self {
            rows_per_plot,
            columns_per_plot,
            orientation,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows_per_plot == 0 {
            return Err(ConfigError::ZeroRowsPerPlot);
        }
        if self.columns_per_plot == 0 {
            return Err(ConfigError::ZeroColumnsPerPlot);
        }
        Ok(())
    }

    /// Number of consecutive range segments merged into one plot.
    pub fn range_group_size(&self) -> usize {
        match self.orientation {
            Orientation::Horizontal => self.rows_per_plot,
            Orientation::Vertical => self.columns_per_plot,
        }
    }

    /// Number of consecutive row segments merged into one plot.
    pub fn row_group_size(&self) -> usize {
        match self.orientation {
            Orientation::Horizontal => self.columns_per_plot,
            Orientation::Vertical => self.rows_per_plot,
        }
    }
}

/// One micro-plot, as a pixel rectangle `[x0, x1) x [y0, y1)` in the
/// coordinates of the (cropped) mask it was detected in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotCell {
    pub plot_id: usize,
    pub range_index: usize,
    pub row_index: usize,
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl PlotCell {
    /// Corners as `(x, y)` in top-left, top-right, bottom-right, bottom-left order.
    pub fn corners(&self) -> [(usize, usize); 4] {
        [
            (self.x0, self.y0),
            (self.x1, self.y0),
            (self.x1, self.y1),
            (self.x0, self.y1),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotGrid {
    /// Row-major over `(range_index, row_index)`.
    pub cells: Vec<PlotCell>,
    pub range_count: usize,
    pub row_count: usize,
    pub orientation: Orientation,
}

impl PlotGrid {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, range_index: usize, row_index: usize) -> Option<&PlotCell> {
        if range_index >= self.range_count || row_index >= self.row_count {
            return None;
        }
        self.cells.get(range_index * self.row_count + row_index)
    }
}

/// Spans `[first.start, last.end)` of consecutive groups of `size` plant
/// segments. A trailing partial group is dropped.
fn group_spans(segments: &[Segment], size: usize) -> Vec<(usize, usize)> {
    segments
        .chunks_exact(size)
        .filter_map(|group| Some((group.first()?.start, group.last()?.end)))
        .collect()
}

/// Build the plot grid from range and row segments.
///
/// Gap segments in either list are ignored, so the full output of
/// [`crate::detect_segments`] can be passed directly.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(range_segments, row_segments), fields(ranges = range_segments.len(), rows = row_segments.len()))
)]
pub fn build_plot_grid(
    range_segments: &[Segment],
    row_segments: &[Segment],
    layout: &PlotLayout,
) -> Result<PlotGrid, GridError> {
    let ranges: Vec<Segment> = range_segments.iter().copied().filter(Segment::is_plant).collect();
    let rows: Vec<Segment> = row_segments.iter().copied().filter(Segment::is_plant).collect();

    let range_size = layout.range_group_size().max(1);
    let row_size = layout.row_group_size().max(1);

    if ranges.len() < range_size {
        warn!(
            "no range detected: {} range segments, {} needed per plot",
            ranges.len(),
            range_size
        );
        return Err(GridError::NoRangesDetected {
            found: ranges.len(),
            needed: range_size,
        });
    }
    if rows.len() < row_size {
        warn!(
            "no row detected: {} row segments, {} needed per plot",
            rows.len(),
            row_size
        );
        return Err(GridError::NoRowsDetected {
            found: rows.len(),
            needed: row_size,
        });
    }

    let range_spans = group_spans(&ranges, range_size);
    let row_spans = group_spans(&rows, row_size);

    let mut cells = Vec::with_capacity(range_spans.len() * row_spans.len());
    for (range_index, &(r0, r1)) in range_spans.iter().enumerate() {
        for (row_index, &(c0, c1)) in row_spans.iter().enumerate() {
            let (x0, x1, y0, y1) = match layout.orientation {
                Orientation::Horizontal => (c0, c1, r0, r1),
                Orientation::Vertical => (r0, r1, c0, c1),
            };
            cells.push(PlotCell {
                plot_id: range_index * row_spans.len() + row_index,
                range_index,
                row_index,
                x0,
                y0,
                x1,
                y1,
            });
        }
    }

    debug!(
        "plot grid: {} ranges x {} rows = {} plots ({} orientation)",
        range_spans.len(),
        row_spans.len(),
        cells.len(),
        layout.orientation
    );

    Ok(PlotGrid {
        cells,
        range_count: range_spans.len(),
        row_count: row_spans.len(),
        orientation: layout.orientation,
    })
}

/// Profile, segment and grid a mask in one call.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(mask, params, layout), fields(width = mask.width, height = mask.height))
)]
pub fn grid_from_mask(
    mask: &BinaryMask,
    noise_pixels: usize,
    params: &SegmentParams,
    layout: &PlotLayout,
) -> Result<PlotGrid, GridError> {
    let ranges = plant_segments(
        &axis_profile(mask, layout.orientation.range_axis()),
        noise_pixels,
        params,
    );
    let rows = plant_segments(
        &axis_profile(mask, layout.orientation.row_axis()),
        noise_pixels,
        params,
    );
    build_plot_grid(&ranges, &rows, layout)
}
