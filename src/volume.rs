use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, Array4, s};

use crate::error::{ConvertError, Result};

/// The assembled diffusion series: every slice of every volume stacked along axis 0.
///
/// Voxels are stored as `(slice, row, col)`, so the standard-layout buffer is
/// already in `(x, y, slice)` order with `x` varying fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffusionVolume {
    pub data: Array3<i16>,
    /// Spacing along (col, row, slice) in mm.
    pub spacing: [f64; 3],
    /// Position of the first voxel (LPS, mm).
    pub origin: [f64; 3],
    /// Columns are the unit vectors of the col, row and slice axes.
    pub direction: Matrix3<f64>,
}

impl DiffusionVolume {
    pub fn new(data: Array3<i16>, spacing: [f64; 3], origin: [f64; 3]) -> Self {
        Self {
            data,
            spacing,
            origin,
            direction: Matrix3::identity(),
        }
    }

    /// Get the dimensions of the volume (slices, rows, cols)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn total_slices(&self) -> usize {
        self.data.dim().0
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<i16> {
        &self.data
    }

    pub fn spacing_matrix(&self) -> Matrix3<f64> {
        Matrix3::from_diagonal(&Vector3::from(self.spacing))
    }

    /// Direction scaled by spacing: column `i` is the physical step along image axis `i`.
    pub fn space_directions(&self) -> Matrix3<f64> {
        self.direction * self.spacing_matrix()
    }

    /// Split the slice axis into `(volume, slice, row, col)`.
    ///
    /// Fails when the slices do not divide evenly; with `allow_truncation` the
    /// trailing slices are dropped instead.
    pub fn to_4d(&self, volume_count: usize, allow_truncation: bool) -> Result<Array4<i16>> {
        let (slices, rows, cols) = self.dim();
        if volume_count == 0 {
            return Err(ConvertError::StructuralInconsistency {
                slices,
                divisor: volume_count,
            });
        }
        let slices_per_volume = slices / volume_count;
        if slices % volume_count != 0 && !allow_truncation {
            return Err(ConvertError::StructuralInconsistency {
                slices,
                divisor: volume_count,
            });
        }

        let kept = self
            .data
            .slice(s![..slices_per_volume * volume_count, .., ..])
            .to_owned();
        kept.into_shape_with_order((volume_count, slices_per_volume, rows, cols))
            .map_err(|_| ConvertError::InconsistentDimensions)
    }
}
