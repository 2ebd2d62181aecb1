//! Reordering slice-interleaved series into consecutive volumes.

use ndarray::{Array3, Axis, Zip};

use crate::structure::VolumeStructure;

/// Destination of slice `source` when going from slice-interleaved to volume-interleaved order.
///
/// Source index `m * volume_count + k` (slice `m` of volume `k`) moves to
/// `k * slices_per_volume + m`.
#[inline]
pub fn volume_interleaved_index(
    source: usize,
    slices_per_volume: usize,
    volume_count: usize,
) -> usize {
    let m = source / volume_count;
    let k = source % volume_count;
    k * slices_per_volume + m
}

/// Permute one column of `slices_per_volume * volume_count` values into `out`.
pub fn deinterleave_column<T: Copy>(
    column: &[T],
    out: &mut [T],
    slices_per_volume: usize,
    volume_count: usize,
) {
    debug_assert_eq!(column.len(), slices_per_volume * volume_count);
    debug_assert_eq!(column.len(), out.len());
    for (source, &value) in column.iter().enumerate() {
        out[volume_interleaved_index(source, slices_per_volume, volume_count)] = value;
    }
}

/// Reorder every `(x, y)` column of a slice-interleaved buffer to volume-interleaved order.
///
/// The buffer is taken by value and handed back permuted; columns are processed in parallel.
pub fn deinterleave(mut data: Array3<i16>, structure: &VolumeStructure) -> Array3<i16> {
    let VolumeStructure {
        slices_per_volume,
        volume_count,
        ..
    } = *structure;
    if slices_per_volume <= 1 || volume_count <= 1 {
        return data;
    }

    Zip::from(data.lanes_mut(Axis(0))).par_for_each(|mut lane| {
        let column = lane.to_vec();
        let mut permuted = column.clone();
        deinterleave_column(&column, &mut permuted, slices_per_volume, volume_count);
        for (dst, value) in lane.iter_mut().zip(permuted) {
            *dst = value;
        }
    });
    data
}
