//! FSL-style output: a 4-D NIfTI volume plus `.bval` and `.bvec` sidecars.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use nalgebra::{Matrix3, Vector3};
use nifti::NiftiHeader;
use nifti::writer::WriterOptions;

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::enums::OutputFormat;
use crate::error::{ConvertError, Result};
use crate::format::format_plain;
use crate::volume::DiffusionVolume;

const NIFTI_XFORM_UNKNOWN: i16 = 0;
const NIFTI_XFORM_SCANNER_ANAT: i16 = 1;
const NIFTI_UNITS_MM: u8 = 2;
const NIFTI_UNITS_SEC: u8 = 8;

/// Paths written by [`write_fsl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FslOutputs {
    pub volume: PathBuf,
    pub bvalues: PathBuf,
    pub bvectors: PathBuf,
}

/// Everything the FSL writer needs from a converted series.
pub struct FslInput<'a> {
    pub volume: &'a DiffusionVolume,
    pub volume_count: usize,
    pub b_values: &'a [f64],
    pub gradients: &'a [Vector3<f64>],
}

/// `.bval`/`.bvec` paths next to a `.nii` or `.nii.gz` file.
pub fn sidecar_paths(nifti_path: &Path) -> Result<(PathBuf, PathBuf)> {
    let name = nifti_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ConvertError::UnrecognizedOutputFormat(nifti_path.to_path_buf()))?;
    let lower = name.to_ascii_lowercase();
    let stem_len = [".nii.gz", ".nii"]
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| name.len() - ext.len())
        .ok_or_else(|| ConvertError::UnrecognizedOutputFormat(nifti_path.to_path_buf()))?;
    let stem = &name[..stem_len];
    Ok((
        nifti_path.with_file_name(format!("{stem}.bval")),
        nifti_path.with_file_name(format!("{stem}.bvec")),
    ))
}

/// Write the 4-D volume and its gradient sidecars.
///
/// Sidecar paths default to the NIfTI path with `.bval` / `.bvec` extensions.
pub fn write_fsl(
    nifti_path: impl AsRef<Path>,
    input: &FslInput<'_>,
    bvalue_path: Option<&Path>,
    bvector_path: Option<&Path>,
    allow_truncation: bool,
    sink: &mut dyn DiagnosticSink,
) -> Result<FslOutputs> {
    let nifti_path = nifti_path.as_ref();
    if !matches!(
        OutputFormat::from_path(nifti_path),
        Some(OutputFormat::Nifti { .. })
    ) {
        return Err(ConvertError::UnrecognizedOutputFormat(
            nifti_path.to_path_buf(),
        ));
    }
    if input.b_values.len() != input.volume_count {
        return Err(ConvertError::CountMismatch {
            expected: input.volume_count,
            found: input.b_values.len(),
        });
    }
    if input.gradients.len() != input.volume_count {
        return Err(ConvertError::CountMismatch {
            expected: input.volume_count,
            found: input.gradients.len(),
        });
    }
    let (default_bval, default_bvec) = sidecar_paths(nifti_path)?;

    let slices = input.volume.total_slices();
    let leftover = slices % input.volume_count.max(1);
    if leftover != 0 {
        sink.record(Diagnostic::LeftoverSlices {
            slices,
            volume_count: input.volume_count,
            leftover,
            truncated: allow_truncation,
        });
    }
    // (volume, slice, row, col) -> [x, y, z, t]
    let four_d = input.volume.to_4d(input.volume_count, allow_truncation)?;
    let nifti_order = four_d.reversed_axes();

    let header = nifti_header(
        &input.volume.direction,
        &input.volume.spacing,
        &input.volume.origin,
    );
    WriterOptions::new(nifti_path)
        .reference_header(&header)
        .write_nifti(&nifti_order)?;

    let bvalues = bvalue_path.map(Path::to_path_buf).unwrap_or(default_bval);
    let bvectors = bvector_path.map(Path::to_path_buf).unwrap_or(default_bvec);
    write_bvalues(&bvalues, input.b_values)?;
    write_bvectors(&bvectors, input.gradients)?;

    Ok(FslOutputs {
        volume: nifti_path.to_path_buf(),
        bvalues,
        bvectors,
    })
}

/// Space-separated b-values on a single line.
pub fn write_bvalues(path: impl AsRef<Path>, b_values: &[f64]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let line = b_values
        .iter()
        .map(|&b| format_plain(b))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{line}")?;
    writer.flush()?;
    Ok(())
}

/// One gradient per line.
pub fn write_bvectors(path: impl AsRef<Path>, gradients: &[Vector3<f64>]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for g in gradients {
        writeln!(
            writer,
            "{} {} {}",
            format_plain(g.x),
            format_plain(g.y),
            format_plain(g.z)
        )?;
    }
    writer.flush()?;
    Ok(())
}

fn parse_numbers(line: &str) -> Result<Vec<f64>> {
    line.split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|_| {
                ConvertError::InvalidGradientTable(format!("'{token}' is not a number"))
            })
        })
        .collect()
}

pub fn read_bvalues(path: impl AsRef<Path>) -> Result<Vec<f64>> {
    parse_numbers(&fs::read_to_string(path)?)
}

/// Read gradients written either one per line or in FSL's three-row layout.
///
/// A 3x3 file fits both layouts and is read one vector per line, the layout
/// [`write_bvectors`] produces.
pub fn read_bvectors(path: impl AsRef<Path>) -> Result<Vec<Vector3<f64>>> {
    parse_bvectors(&fs::read_to_string(path)?)
}

pub fn parse_bvectors(text: &str) -> Result<Vec<Vector3<f64>>> {
    let rows = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_numbers)
        .collect::<Result<Vec<_>>>()?;

    if rows.iter().all(|row| row.len() == 3) {
        return Ok(rows.iter().map(|r| Vector3::new(r[0], r[1], r[2])).collect());
    }
    if rows.len() == 3 && rows[0].len() == rows[1].len() && rows[1].len() == rows[2].len() {
        return Ok((0..rows[0].len())
            .map(|k| Vector3::new(rows[0][k], rows[1][k], rows[2][k]))
            .collect());
    }
    Err(ConvertError::InvalidGradientTable(
        "b-vectors must be three numbers per line or three rows of equal length".to_string(),
    ))
}

/// NIfTI header carrying the LPS geometry as a RAS qform.
pub fn nifti_header(direction: &Matrix3<f64>, spacing: &[f64; 3], origin: &[f64; 3]) -> NiftiHeader {
    let (qfac, [b, c, d]) = qform_quaternion(direction);
    NiftiHeader {
        pixdim: [
            qfac as f32,
            spacing[0] as f32,
            spacing[1] as f32,
            spacing[2] as f32,
            1.0,
            1.0,
            1.0,
            1.0,
        ],
        qform_code: NIFTI_XFORM_SCANNER_ANAT,
        sform_code: NIFTI_XFORM_UNKNOWN,
        quatern_b: b as f32,
        quatern_c: c as f32,
        quatern_d: d as f32,
        quatern_x: -origin[0] as f32,
        quatern_y: -origin[1] as f32,
        quatern_z: origin[2] as f32,
        xyzt_units: NIFTI_UNITS_MM | NIFTI_UNITS_SEC,
        scl_slope: 1.0,
        scl_inter: 0.0,
        ..NiftiHeader::default()
    }
}

/// `qfac` and the (b, c, d) quaternion components of an LPS direction matrix.
///
/// The matrix is converted to RAS first; a left-handed result is made proper by
/// negating its third column and setting `qfac = -1`.
pub fn qform_quaternion(direction: &Matrix3<f64>) -> (f64, [f64; 3]) {
    let lps_to_ras = Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0));
    let mut r = lps_to_ras * direction;
    let qfac = if r.determinant() < 0.0 {
        r.column_mut(2).neg_mut();
        -1.0
    } else {
        1.0
    };

    let (r11, r12, r13) = (r[(0, 0)], r[(0, 1)], r[(0, 2)]);
    let (r21, r22, r23) = (r[(1, 0)], r[(1, 1)], r[(1, 2)]);
    let (r31, r32, r33) = (r[(2, 0)], r[(2, 1)], r[(2, 2)]);

    let trace = r11 + r22 + r33 + 1.0;
    let (a, b, c, d) = if trace > 0.5 {
        let a = 0.5 * trace.sqrt();
        (
            a,
            0.25 * (r32 - r23) / a,
            0.25 * (r13 - r31) / a,
            0.25 * (r21 - r12) / a,
        )
    } else {
        let xd = 1.0 + r11 - (r22 + r33);
        let yd = 1.0 + r22 - (r11 + r33);
        let zd = 1.0 + r33 - (r11 + r22);
        if xd > 1.0 {
            let b = 0.5 * xd.sqrt();
            (
                0.25 * (r32 - r23) / b,
                b,
                0.25 * (r12 + r21) / b,
                0.25 * (r13 + r31) / b,
            )
        } else if yd > 1.0 {
            let c = 0.5 * yd.sqrt();
            (
                0.25 * (r13 - r31) / c,
                0.25 * (r12 + r21) / c,
                c,
                0.25 * (r23 + r32) / c,
            )
        } else {
            let d = 0.5 * zd.sqrt();
            (
                0.25 * (r21 - r12) / d,
                0.25 * (r13 + r31) / d,
                0.25 * (r23 + r32) / d,
                d,
            )
        }
    };

    if a < 0.0 {
        (qfac, [-b, -c, -d])
    } else {
        (qfac, [b, c, d])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn sidecars_replace_nifti_extension() {
        let (bval, bvec) = sidecar_paths(Path::new("/out/sub-01_dwi.nii.gz")).unwrap();
        assert_eq!(bval, PathBuf::from("/out/sub-01_dwi.bval"));
        assert_eq!(bvec, PathBuf::from("/out/sub-01_dwi.bvec"));

        let (bval, _) = sidecar_paths(Path::new("dwi.nii")).unwrap();
        assert_eq!(bval, PathBuf::from("dwi.bval"));

        assert!(matches!(
            sidecar_paths(Path::new("dwi.nrrd")),
            Err(ConvertError::UnrecognizedOutputFormat(_))
        ));
    }

    #[test]
    fn bvectors_accept_both_layouts() {
        let per_line = parse_bvectors("1 0 0\n0 1 0\n0 0 1\n0.5 0.5 0\n").unwrap();
        let fsl_rows = parse_bvectors("1 0 0 0.5\n0 1 0 0.5\n0 0 1 0\n").unwrap();
        assert_eq!(per_line, fsl_rows);
        assert_eq!(per_line.len(), 4);
    }

    #[test]
    fn square_bvectors_are_read_per_line() {
        let vectors = parse_bvectors("1 0 0\n0.5 0.5 0\n0 0 1\n").unwrap();
        assert_eq!(vectors[1], Vector3::new(0.5, 0.5, 0.0));

        let dir = tempfile::tempdir().unwrap();
        let bvec = dir.path().join("three.bvec");
        let written = [Vector3::x(), Vector3::new(0.0, 0.6, 0.8), Vector3::z()];
        write_bvectors(&bvec, &written).unwrap();
        assert_eq!(read_bvectors(&bvec).unwrap(), written);
    }

    #[test]
    fn bvectors_reject_ragged_input() {
        assert!(parse_bvectors("1 0\n0 1 0\n").is_err());
        assert!(parse_bvectors("1 0 x\n").is_err());
    }

    #[test]
    fn lps_identity_is_half_turn_about_z() {
        let (qfac, q) = qform_quaternion(&Matrix3::identity());
        assert_eq!(qfac, 1.0);
        assert!(q[0].abs() < EPS && q[1].abs() < EPS);
        assert!((q[2] - 1.0).abs() < EPS);
    }

    #[test]
    fn ras_identity_is_zero_quaternion() {
        let lps = Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0));
        let (qfac, q) = qform_quaternion(&lps);
        assert_eq!(qfac, 1.0);
        assert!(q.iter().all(|v| v.abs() < EPS));
    }

    #[test]
    fn flipped_slice_axis_sets_qfac() {
        let lps = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0));
        let (qfac, q) = qform_quaternion(&lps);
        assert_eq!(qfac, -1.0);
        assert!((q[2] - 1.0).abs() < EPS);
    }

    #[test]
    fn header_carries_geometry() {
        let header = nifti_header(&Matrix3::identity(), &[2.0, 2.0, 3.0], &[10.0, -20.0, 30.0]);
        assert_eq!(header.pixdim[1..4], [2.0, 2.0, 3.0]);
        assert_eq!(header.qform_code, NIFTI_XFORM_SCANNER_ANAT);
        assert_eq!(header.sform_code, NIFTI_XFORM_UNKNOWN);
        assert_eq!(
            (header.quatern_x, header.quatern_y, header.quatern_z),
            (-10.0, 20.0, 30.0)
        );
    }

    #[test]
    fn sidecar_text_layout() {
        let dir = tempfile::tempdir().unwrap();
        let bval = dir.path().join("a.bval");
        let bvec = dir.path().join("a.bvec");
        write_bvalues(&bval, &[0.0, 1000.0, 2000.0]).unwrap();
        write_bvectors(&bvec, &[Vector3::zeros(), Vector3::new(0.5, -1.0, 0.25)]).unwrap();
        assert_eq!(fs::read_to_string(&bval).unwrap(), "0 1000 2000\n");
        assert_eq!(fs::read_to_string(&bvec).unwrap(), "0 0 0\n0.5 -1 0.25\n");
    }

    fn uneven_volume(slices: usize) -> DiffusionVolume {
        let data = ndarray::Array3::from_shape_fn((slices, 2, 3), |(k, y, x)| {
            (k * 100 + y * 10 + x) as i16
        });
        DiffusionVolume::new(data, [1.0, 1.0, 2.0], [0.0; 3])
    }

    #[test]
    fn leftover_slices_are_reported_before_failing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dwi.nii");
        let volume = uneven_volume(7);
        let input = FslInput {
            volume: &volume,
            volume_count: 2,
            b_values: &[0.0, 1000.0],
            gradients: &[Vector3::zeros(), Vector3::x()],
        };

        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let result = write_fsl(&path, &input, None, None, false, &mut diagnostics);
        assert!(matches!(
            result,
            Err(ConvertError::StructuralInconsistency { slices: 7, divisor: 2 })
        ));
        assert_eq!(
            diagnostics,
            vec![Diagnostic::LeftoverSlices {
                slices: 7,
                volume_count: 2,
                leftover: 1,
                truncated: false,
            }]
        );
        assert!(!path.exists());
    }

    #[test]
    fn leftover_slices_are_dropped_when_allowed() {
        use nifti::{IntoNdArray, NiftiObject, ReaderOptions};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dwi.nii");
        let volume = uneven_volume(7);
        let input = FslInput {
            volume: &volume,
            volume_count: 2,
            b_values: &[0.0, 1000.0],
            gradients: &[Vector3::zeros(), Vector3::x()],
        };

        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        write_fsl(&path, &input, None, None, true, &mut diagnostics).unwrap();
        assert!(diagnostics[0].is_warning());
        assert!(matches!(
            diagnostics[0],
            Diagnostic::LeftoverSlices { leftover: 1, truncated: true, .. }
        ));

        let image = ReaderOptions::new()
            .read_file(&path)
            .unwrap()
            .into_volume()
            .into_ndarray::<i16>()
            .unwrap();
        assert_eq!(image.shape(), &[3, 2, 3, 2]);
        assert_eq!(image[[2, 1, 0, 1]], 312);
    }
}
