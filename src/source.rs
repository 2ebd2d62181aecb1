//! Where gradient tables come from.
//!
//! Scanner-specific extraction lives outside this crate. Anything that can
//! produce a [`GradientTable`] and a few vendor flags implements
//! [`GradientSource`]; the built-in providers are picked through the
//! [`GradientProvider`] enum.

use std::path::PathBuf;

use nalgebra::Vector3;

use crate::enums::SliceOrder;
use crate::error::{ConvertError, Result};
use crate::fsl::{read_bvalues, read_bvectors};
use crate::gradients::{GradientTable, MeasurementFrame};

/// Per-vendor facts that influence the conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VendorFlags {
    /// Gradients were derived from a B-matrix decomposition.
    pub from_bmatrix: bool,
    /// Slice order the vendor guarantees, if any.
    pub slice_order: Option<SliceOrder>,
    pub measurement_frame: MeasurementFrame,
}

pub trait GradientSource {
    /// One unit direction and b-value per volume.
    fn extract_gradient_table(&self, volume_count: usize) -> Result<GradientTable>;

    fn extract_vendor_flags(&self) -> VendorFlags;
}

/// Gradients already extracted by a vendor reader.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorGradients {
    pub directions: Vec<Vector3<f64>>,
    pub b_values: Vec<f64>,
    pub flags: VendorFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GradientProvider {
    Vendor(VendorGradients),
    /// FSL `.bval` / `.bvec` sidecars.
    Fsl { bvalues: PathBuf, bvectors: PathBuf },
}

impl GradientProvider {
    pub fn vendor(directions: Vec<Vector3<f64>>, b_values: Vec<f64>) -> Self {
        GradientProvider::Vendor(VendorGradients {
            directions,
            b_values,
            flags: VendorFlags::default(),
        })
    }

    pub fn fsl(bvalues: impl Into<PathBuf>, bvectors: impl Into<PathBuf>) -> Self {
        GradientProvider::Fsl {
            bvalues: bvalues.into(),
            bvectors: bvectors.into(),
        }
    }
}

impl GradientSource for GradientProvider {
    fn extract_gradient_table(&self, volume_count: usize) -> Result<GradientTable> {
        let table = match self {
            GradientProvider::Vendor(gradients) => {
                GradientTable::new(gradients.directions.clone(), gradients.b_values.clone())?
            }
            GradientProvider::Fsl { bvalues, bvectors } => {
                GradientTable::new(read_bvectors(bvectors)?, read_bvalues(bvalues)?)?
            }
        };
        if table.len() != volume_count {
            return Err(ConvertError::CountMismatch {
                expected: volume_count,
                found: table.len(),
            });
        }
        Ok(table)
    }

    fn extract_vendor_flags(&self) -> VendorFlags {
        match self {
            GradientProvider::Vendor(gradients) => gradients.flags,
            GradientProvider::Fsl { .. } => VendorFlags::default(),
        }
    }
}
