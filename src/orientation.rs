//! Direction cosines and slice-order correction.
//!
//! DICOM reports only the in-plane row and column directions; the slice axis
//! is their cross product, which makes the basis right-handed in LPS. Whether
//! the stored slices actually advance along that normal (IS) or against it
//! (SI) is decided from the origins of two physically adjacent slices.

use nalgebra::{Matrix3, Vector3};

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::enums::SliceOrder;
use crate::slice::SliceMetadata;
use crate::structure::VolumeStructure;

/// Right-handed direction matrix from ImageOrientationPatient.
///
/// Columns 0 and 1 are the reported row and column directions, column 2 their cross product.
pub fn direction_from_cosines(cosines: &[f64; 6]) -> Matrix3<f64> {
    let row = Vector3::new(cosines[0], cosines[1], cosines[2]);
    let col = Vector3::new(cosines[3], cosines[4], cosines[5]);
    Matrix3::from_columns(&[row, col, row.cross(&col)])
}

/// Index of the first slice that is physically adjacent to slice 0 in the raw header list.
pub fn adjacent_slice_index(headers: &[SliceMetadata], structure: &VolumeStructure) -> usize {
    if headers.len() <= 1 {
        0
    } else if structure.is_interleaved() {
        structure.volume_count.min(headers.len() - 1)
    } else {
        1
    }
}

/// Decide whether the slice axis runs along (IS) or against (SI) the slice normal.
pub fn determine_slice_order(
    headers: &[SliceMetadata],
    space_directions: &Matrix3<f64>,
    structure: &VolumeStructure,
    sink: &mut dyn DiagnosticSink,
) -> SliceOrder {
    let Some(first) = headers.first() else {
        return SliceOrder::InferiorSuperior;
    };
    let adjacent_index = adjacent_slice_index(headers, structure);
    let adjacent = &headers[adjacent_index];
    sink.record(Diagnostic::SliceOrigins {
        first: first.origin,
        adjacent_index,
        adjacent: adjacent.origin,
    });

    let step = Vector3::from(adjacent.origin) - Vector3::from(first.origin);
    if step.dot(&space_directions.column(2)) < 0.0 {
        SliceOrder::SuperiorInferior
    } else {
        SliceOrder::InferiorSuperior
    }
}

/// Negate the slice column when the slices run superior to inferior.
pub fn apply_slice_order(
    direction: Matrix3<f64>,
    order: SliceOrder,
    sink: &mut dyn DiagnosticSink,
) -> Matrix3<f64> {
    sink.record(Diagnostic::SliceOrderResolved(order));
    match order {
        SliceOrder::InferiorSuperior => direction,
        SliceOrder::SuperiorInferior => {
            let mut flipped = direction;
            flipped.column_mut(2).neg_mut();
            flipped
        }
    }
}

/// Resolve the final direction matrix for a series.
///
/// A vendor that knows its slice order passes it as `known_order`, which skips the projection.
pub fn resolve_direction(
    headers: &[SliceMetadata],
    spacing: &[f64; 3],
    structure: &VolumeStructure,
    known_order: Option<SliceOrder>,
    sink: &mut dyn DiagnosticSink,
) -> (Matrix3<f64>, SliceOrder) {
    let cosines = headers
        .first()
        .map(|h| h.direction_cosines)
        .unwrap_or([1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    let direction = direction_from_cosines(&cosines);
    sink.record(Diagnostic::DirectionCosines(direction));

    let order = match known_order {
        Some(order) => order,
        None => {
            let space_directions = direction * Matrix3::from_diagonal(&Vector3::from(*spacing));
            determine_slice_order(headers, &space_directions, structure, sink)
        }
    };
    (apply_slice_order(direction, order, sink), order)
}
