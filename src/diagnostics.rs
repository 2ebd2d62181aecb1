//! Advisory records emitted while a series is being converted.
//!
//! Pipeline stages never print. They hand [`Diagnostic`] values to a
//! caller-supplied [`DiagnosticSink`]; what happens to them (logging,
//! collecting, dropping) is the caller's business and never changes the
//! outcome of a conversion.

use std::fmt;

use nalgebra::Matrix3;

use crate::enums::{SliceLayout, SliceOrder};

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    SlicesPerVolume {
        slices_per_volume: usize,
        volume_count: usize,
    },
    LayoutDetected(SliceLayout),
    DirectionCosines(Matrix3<f64>),
    SliceOrigins {
        first: [f64; 3],
        adjacent_index: usize,
        adjacent: [f64; 3],
    },
    SliceOrderResolved(SliceOrder),
    ScaleFactor {
        volume: usize,
        b_value: f64,
        max_b_value: f64,
        scale: f64,
    },
    /// The slice count does not split evenly into volumes.
    LeftoverSlices {
        slices: usize,
        volume_count: usize,
        leftover: usize,
        /// The trailing slices were dropped instead of failing the write.
        truncated: bool,
    },
}

impl Diagnostic {
    /// Whether the record points at a possible data problem rather than plain progress.
    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::LeftoverSlices { .. })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::SlicesPerVolume {
                slices_per_volume,
                volume_count,
            } => write!(
                f,
                "{slices_per_volume} slices per volume, {volume_count} volumes"
            ),
            Diagnostic::LayoutDetected(SliceLayout::VolumeInterleaved) => {
                write!(f, "DICOM images are ordered in a volume interleaving way")
            }
            Diagnostic::LayoutDetected(SliceLayout::SliceInterleaved) => {
                write!(f, "DICOM images are ordered in a slice interleaving way")
            }
            Diagnostic::DirectionCosines(m) => write!(
                f,
                "LPS orientation matrix: [{}, {}, {}; {}, {}, {}; {}, {}, {}]",
                m[(0, 0)],
                m[(0, 1)],
                m[(0, 2)],
                m[(1, 0)],
                m[(1, 1)],
                m[(1, 2)],
                m[(2, 0)],
                m[(2, 1)],
                m[(2, 2)]
            ),
            Diagnostic::SliceOrigins {
                first,
                adjacent_index,
                adjacent,
            } => write!(
                f,
                "slice 0: {} {} {}, slice {adjacent_index}: {} {} {}",
                first[0], first[1], first[2], adjacent[0], adjacent[1], adjacent[2]
            ),
            Diagnostic::SliceOrderResolved(SliceOrder::InferiorSuperior) => {
                write!(f, "slice order is IS")
            }
            Diagnostic::SliceOrderResolved(SliceOrder::SuperiorInferior) => {
                write!(f, "slice order is SI")
            }
            Diagnostic::ScaleFactor {
                volume,
                b_value,
                max_b_value,
                scale,
            } => write!(
                f,
                "scale factor for volume {volume}: sqrt({b_value} / {max_b_value}) = {scale}"
            ),
            Diagnostic::LeftoverSlices {
                slices,
                volume_count,
                leftover,
                truncated,
            } => {
                write!(
                    f,
                    "{slices} slices not evenly divisible by {volume_count} volumes, {leftover} left-over slices"
                )?;
                if *truncated {
                    write!(f, " dropped")?;
                }
                Ok(())
            }
        }
    }
}

pub trait DiagnosticSink {
    fn record(&mut self, diagnostic: Diagnostic);
}

/// Forwards every record to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn record(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_warning() {
            log::warn!("{diagnostic}");
        } else {
            log::info!("{diagnostic}");
        }
    }
}

/// Drops every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record(&mut self, _diagnostic: Diagnostic) {}
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn record(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}
