//! Recovering the 4-D layout of a flat slice list.

use std::collections::HashMap;

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::enums::SliceLayout;
use crate::error::{ConvertError, Result};
use crate::slice::SliceMetadata;

/// Slice/volume counts and storage layout inferred from the slice headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeStructure {
    pub slices_per_volume: usize,
    pub volume_count: usize,
    pub total_slices: usize,
    pub layout: SliceLayout,
}

impl VolumeStructure {
    pub fn is_interleaved(&self) -> bool {
        self.layout == SliceLayout::SliceInterleaved
    }
}

/// Index of every slice's location in first-seen order, plus the number of distinct locations.
pub fn location_indices(headers: &[SliceMetadata]) -> (Vec<usize>, usize) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let indices = headers
        .iter()
        .map(|header| {
            let next = seen.len();
            *seen.entry(header.location.as_str()).or_insert(next)
        })
        .collect();
    (indices, seen.len())
}

/// Work out slices per volume, volume count and whether the slices are slice-interleaved.
///
/// `multi_frame` inputs come from a single file and are always treated as
/// volume-interleaved.
pub fn analyze(
    headers: &[SliceMetadata],
    multi_frame: bool,
    sink: &mut dyn DiagnosticSink,
) -> Result<VolumeStructure> {
    let total_slices = headers.len();
    if total_slices == 0 {
        return Err(ConvertError::NoValidImages);
    }

    let (indices, slices_per_volume) = location_indices(headers);
    if total_slices % slices_per_volume != 0 {
        return Err(ConvertError::StructuralInconsistency {
            slices: total_slices,
            divisor: slices_per_volume,
        });
    }
    let volume_count = total_slices / slices_per_volume;
    sink.record(Diagnostic::SlicesPerVolume {
        slices_per_volume,
        volume_count,
    });

    let mut layout = SliceLayout::VolumeInterleaved;
    // With a single location there is nothing to reorder.
    if !multi_frame && total_slices >= 2 && slices_per_volume > 1 {
        if indices[0] == indices[1] {
            layout = SliceLayout::SliceInterleaved;
        }
        sink.record(Diagnostic::LayoutDetected(layout));
    }

    Ok(VolumeStructure {
        slices_per_volume,
        volume_count,
        total_slices,
        layout,
    })
}
