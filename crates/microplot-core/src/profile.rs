use serde::{Deserialize, Serialize};

use crate::mask::BinaryMask;

/// Image axis a profile is indexed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// One value per column; counts occupied pixels down each column.
    X,
    /// One value per row; counts occupied pixels along each row.
    Y,
}

impl Axis {
    pub fn other(self) -> Axis {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }
}

/// Occupancy counts along one axis of a mask.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisProfile {
    pub axis: Axis,
    pub values: Vec<u32>,
}

impl AxisProfile {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn max(&self) -> u32 {
        self.values.iter().copied().max().unwrap_or(0)
    }
}

/// Collapse a mask onto `axis`.
///
/// `values[i]` is the number of occupied pixels in the slice perpendicular to
/// `axis` at position `i`.
pub fn axis_profile(mask: &BinaryMask, axis: Axis) -> AxisProfile {
    let values = match axis {
        Axis::X => {
            let mut cols = vec![0u32; mask.width];
            for y in 0..mask.height {
                for (count, &v) in cols.iter_mut().zip(mask.row(y)) {
                    *count += u32::from(v != 0);
                }
            }
            cols
        }
        Axis::Y => (0..mask.height)
            .map(|y| mask.row(y).iter().filter(|&&v| v != 0).count() as u32)
            .collect(),
    };
    AxisProfile { axis, values }
}
