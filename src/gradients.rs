//! Diffusion gradient tables and their calibration.
//!
//! The vendor layer reports one unit direction and one b-value per volume.
//! What ends up in the output is each direction scaled by
//! `sqrt(b / b_max)` and, unless the identity frame is forced, mapped back
//! through the inverse of the measurement frame.

use std::fs;
use std::path::Path;

use nalgebra::{Matrix3, Vector3};

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{ConvertError, Result};

/// Unit gradient directions and b-values, one entry per volume.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientTable {
    directions: Vec<Vector3<f64>>,
    b_values: Vec<f64>,
}

impl GradientTable {
    pub fn new(directions: Vec<Vector3<f64>>, b_values: Vec<f64>) -> Result<Self> {
        if directions.len() != b_values.len() {
            return Err(ConvertError::CountMismatch {
                expected: b_values.len(),
                found: directions.len(),
            });
        }
        if let Some((k, b)) = b_values
            .iter()
            .enumerate()
            .find(|(_, b)| !b.is_finite() || **b < 0.0)
        {
            return Err(ConvertError::InvalidGradientTable(format!(
                "b-value {b} for volume {k} is not a non-negative number"
            )));
        }
        Ok(Self {
            directions,
            b_values,
        })
    }

    pub fn len(&self) -> usize {
        self.b_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.b_values.is_empty()
    }

    pub fn directions(&self) -> &[Vector3<f64>] {
        &self.directions
    }

    pub fn b_values(&self) -> &[f64] {
        &self.b_values
    }

    /// Largest b-value, 0 for an empty table.
    pub fn max_b_value(&self) -> f64 {
        self.b_values.iter().copied().fold(0.0, f64::max)
    }

    /// `sqrt(b_k / b_max)` per volume, all zero when no volume is diffusion weighted.
    pub fn scale_factors(&self) -> Vec<f64> {
        let max_b = self.max_b_value();
        self.b_values
            .iter()
            .map(|&b| if max_b > 0.0 { (b / max_b).sqrt() } else { 0.0 })
            .collect()
    }

    /// Replace the unit directions, keeping the b-values.
    pub fn with_directions(self, directions: Vec<Vector3<f64>>) -> Result<Self> {
        if directions.len() != self.b_values.len() {
            return Err(ConvertError::CountMismatch {
                expected: self.b_values.len(),
                found: directions.len(),
            });
        }
        Ok(Self {
            directions,
            ..self
        })
    }
}

/// Rotation from gradient coordinates to the patient frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementFrame(pub Matrix3<f64>);

impl Default for MeasurementFrame {
    fn default() -> Self {
        MeasurementFrame(Matrix3::identity())
    }
}

impl MeasurementFrame {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    /// True inverse rather than the transpose, so slightly non-orthonormal frames still round-trip.
    pub fn inverse(&self) -> Result<Matrix3<f64>> {
        self.0.try_inverse().ok_or_else(|| {
            ConvertError::InvalidGradientTable("measurement frame is singular".to_string())
        })
    }

    /// The frame reported in output metadata.
    pub fn operative(&self, use_identity: bool) -> MeasurementFrame {
        if use_identity { Self::identity() } else { *self }
    }
}

/// Output-ready gradient vectors together with the values they were derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedGradients {
    pub vectors: Vec<Vector3<f64>>,
    pub scale_factors: Vec<f64>,
    pub max_b_value: f64,
    /// Frame to report alongside `vectors`.
    pub frame: MeasurementFrame,
}

/// Scale every direction by its b-value and bring it into the reported frame.
pub fn calibrate(
    table: &GradientTable,
    frame: &MeasurementFrame,
    use_identity_frame: bool,
    sink: &mut dyn DiagnosticSink,
) -> Result<CalibratedGradients> {
    let max_b_value = table.max_b_value();
    let scale_factors = table.scale_factors();
    for (volume, (&b_value, &scale)) in table.b_values().iter().zip(&scale_factors).enumerate() {
        sink.record(Diagnostic::ScaleFactor {
            volume,
            b_value,
            max_b_value,
            scale,
        });
    }

    let scaled = table
        .directions()
        .iter()
        .zip(&scale_factors)
        .map(|(direction, &scale)| direction * scale);

    let vectors = if use_identity_frame {
        scaled.collect()
    } else {
        let inverse = frame.inverse()?;
        scaled.map(|v| inverse * v).collect()
    };

    Ok(CalibratedGradients {
        vectors,
        scale_factors,
        max_b_value,
        frame: frame.operative(use_identity_frame),
    })
}

/// Parse a gradient override: a count line followed by `count` lines of three numbers.
pub fn parse_gradient_override(text: &str, volume_count: usize) -> Result<Vec<Vector3<f64>>> {
    let mut tokens = text.split_whitespace();
    let count: usize = tokens
        .next()
        .ok_or_else(|| ConvertError::InvalidGradientTable("empty gradient file".to_string()))?
        .parse()
        .map_err(|_| {
            ConvertError::InvalidGradientTable("first entry must be the gradient count".to_string())
        })?;
    if count != volume_count {
        return Err(ConvertError::CountMismatch {
            expected: volume_count,
            found: count,
        });
    }

    let values = tokens
        .map(|token| {
            token.parse::<f64>().map_err(|_| {
                ConvertError::InvalidGradientTable(format!("'{token}' is not a number"))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    if values.len() != count * 3 {
        return Err(ConvertError::InvalidGradientTable(format!(
            "expected {} components for {count} gradients, found {}",
            count * 3,
            values.len()
        )));
    }
    Ok(values
        .chunks_exact(3)
        .map(|c| Vector3::new(c[0], c[1], c[2]))
        .collect())
}

pub fn read_gradient_override(
    path: impl AsRef<Path>,
    volume_count: usize,
) -> Result<Vec<Vector3<f64>>> {
    parse_gradient_override(&fs::read_to_string(path)?, volume_count)
}
