//! NRRD0005 diffusion header writer.
//!
//! The header layout is fixed: same dataset in, same bytes out. Every float
//! goes through [`format_double`].

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use nalgebra::{Matrix3, Vector3};
use ndarray::Array3;

use crate::enums::{NrrdLayout, OutputFormat};
use crate::error::{ConvertError, Result};
use crate::format::{format_double, format_plain};
use crate::gradients::MeasurementFrame;
use crate::options::ConversionOptions;
use crate::volume::DiffusionVolume;

pub const SPACE_DEFINITION: &str = "left-posterior-superior";

/// Everything the NRRD writer needs from a converted series.
pub struct NrrdInput<'a> {
    pub volume: &'a DiffusionVolume,
    pub slices_per_volume: usize,
    pub volume_count: usize,
    /// Frame to report; already the identity when that override is active.
    pub measurement_frame: &'a MeasurementFrame,
    pub max_b_value: f64,
    pub gradients: &'a [Vector3<f64>],
}

/// Provenance block placed right after the magic line.
pub fn file_comment(options: &ConversionOptions) -> String {
    let mut comment = String::new();
    comment.push_str("#\n#\n");
    let _ = writeln!(
        comment,
        "# This file was created by DWIConvert version {}",
        options.version
    );
    comment.push_str("# https://github.com/BRAINSia/BRAINSTools\n");
    comment.push_str("# part of the BRAINSTools package.\n");
    comment.push_str("# Command line options:\n");
    let _ = writeln!(
        comment,
        "# --smallGradientThreshold {}",
        format_plain(options.small_gradient_threshold)
    );
    if options.use_identity_measurement_frame {
        comment.push_str("# --useIdentityMeasurementFrame\n");
    }
    if options.use_bmatrix_gradient_directions {
        comment.push_str("# --useBMatrixGradientDirections\n");
    }
    comment
}

/// The `.raw` sidecar written next to a detached `.nhdr` header.
pub fn data_file_path(header_path: &Path) -> PathBuf {
    header_path.with_extension("raw")
}

fn vector(v: impl IntoIterator<Item = f64>) -> String {
    let parts: Vec<String> = v.into_iter().map(format_double).collect();
    format!("({})", parts.join(","))
}

fn matrix_columns(m: &Matrix3<f64>) -> [String; 3] {
    [0, 1, 2].map(|c| vector(m.column(c).iter().copied()))
}

/// Render the header text, including the blank line that ends it.
///
/// `data_file` names the detached payload, `None` for a single-file NRRD.
pub fn render_header(input: &NrrdInput<'_>, comment: &str, data_file: Option<&str>) -> String {
    let volume = input.volume;
    let (_, rows, cols) = volume.dim();
    let mut header = String::new();

    header.push_str("NRRD0005\n");
    header.push_str(comment);
    if let Some(data_file) = data_file {
        let _ = writeln!(header, "content: exists({data_file},0)");
    }
    header.push_str("type: short\n");
    header.push_str("dimension: 4\n");
    let _ = writeln!(header, "space: {SPACE_DEFINITION}");
    let _ = writeln!(
        header,
        "sizes: {cols} {rows} {} {}",
        input.slices_per_volume, input.volume_count
    );
    let _ = writeln!(
        header,
        "thicknesses:  NaN  NaN {} NaN",
        format_double(volume.spacing[2])
    );
    let [d0, d1, d2] = matrix_columns(&volume.space_directions());
    let _ = writeln!(header, "space directions: {d0} {d1} {d2} none");
    header.push_str("centerings: cell cell cell ???\n");
    header.push_str("kinds: space space space list\n");
    header.push_str("endian: little\n");
    header.push_str("encoding: raw\n");
    header.push_str("space units: \"mm\" \"mm\" \"mm\"\n");
    let _ = writeln!(
        header,
        "space origin: {} ",
        vector(volume.origin.iter().copied())
    );
    if let Some(data_file) = data_file {
        let _ = writeln!(header, "data file: {data_file}");
    }
    let [f0, f1, f2] = matrix_columns(input.measurement_frame.matrix());
    let _ = writeln!(header, "measurement frame: {f0} {f1} {f2}");
    header.push_str("modality:=DWMRI\n");
    let _ = writeln!(header, "DWMRI_b-value:={}", format_double(input.max_b_value));
    for (k, g) in input.gradients.iter().enumerate() {
        let _ = writeln!(
            header,
            "DWMRI_gradient_{k:04}:={}   {}   {}",
            format_double(g.x),
            format_double(g.y),
            format_double(g.z)
        );
    }
    header.push('\n');
    header
}

/// Little-endian 16-bit voxels in (x, y, slice) order.
pub fn write_voxels<W: Write>(writer: &mut W, data: &Array3<i16>) -> io::Result<()> {
    match data.as_slice() {
        Some(voxels) if cfg!(target_endian = "little") => {
            writer.write_all(bytemuck::cast_slice(voxels))
        }
        _ => {
            for value in data.iter() {
                writer.write_all(&value.to_le_bytes())?;
            }
            Ok(())
        }
    }
}

/// Write a `.nrrd` (header and payload) or `.nhdr` (header plus `.raw`), picked by extension.
///
/// Returns the path of the detached payload, if one was written.
pub fn write_nrrd(
    path: impl AsRef<Path>,
    input: &NrrdInput<'_>,
    comment: &str,
) -> Result<Option<PathBuf>> {
    let path = path.as_ref();
    let layout = match OutputFormat::from_path(path) {
        Some(OutputFormat::Nrrd(layout)) => layout,
        _ => return Err(ConvertError::UnrecognizedOutputFormat(path.to_path_buf())),
    };

    let data_path = match layout {
        NrrdLayout::Detached => Some(data_file_path(path)),
        NrrdLayout::SingleFile => None,
    };
    let data_file = data_path
        .as_deref()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned());

    let mut header = BufWriter::new(File::create(path)?);
    header.write_all(render_header(input, comment, data_file.as_deref()).as_bytes())?;

    match &data_path {
        None => write_voxels(&mut header, input.volume.data())?,
        Some(data_path) => {
            let mut raw = BufWriter::new(File::create(data_path)?);
            write_voxels(&mut raw, input.volume.data())?;
            raw.flush()?;
        }
    }
    header.flush()?;
    Ok(data_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_volume() -> DiffusionVolume {
        let data = Array3::from_shape_fn((4, 2, 3), |(k, y, x)| (k * 100 + y * 10 + x) as i16);
        DiffusionVolume::new(data, [1.5, 1.5, 3.0], [-90.0, 126.0, -72.0])
    }

    #[test]
    fn comment_lists_active_flags() {
        let plain = file_comment(&ConversionOptions::default().with_version("5.0.0"));
        assert_eq!(
            plain,
            "#\n#\n# This file was created by DWIConvert version 5.0.0\n\
             # https://github.com/BRAINSia/BRAINSTools\n\
             # part of the BRAINSTools package.\n\
             # Command line options:\n\
             # --smallGradientThreshold 0.2\n"
        );

        let flagged = file_comment(
            &ConversionOptions::default()
                .with_identity_measurement_frame(true)
                .with_bmatrix_gradient_directions(true),
        );
        assert!(flagged.ends_with(
            "# --useIdentityMeasurementFrame\n# --useBMatrixGradientDirections\n"
        ));
    }

    #[test]
    fn voxels_are_little_endian() {
        let data = Array3::from_shape_vec((1, 1, 2), vec![0x0102_i16, -2]).unwrap();
        let mut out = Vec::new();
        write_voxels(&mut out, &data).unwrap();
        assert_eq!(out, vec![0x02, 0x01, 0xfe, 0xff]);
    }

    #[test]
    fn voxels_from_non_standard_layout() {
        let data = Array3::from_shape_vec((1, 2, 2), vec![1_i16, 2, 3, 4]).unwrap();
        let transposed = data.permuted_axes([0, 2, 1]);
        let mut out = Vec::new();
        write_voxels(&mut out, &transposed.to_owned()).unwrap();
        assert_eq!(out, vec![1, 0, 3, 0, 2, 0, 4, 0]);
    }

    #[test]
    fn header_lines_in_order() {
        let volume = sample_volume();
        let frame = MeasurementFrame::identity();
        let gradients = [Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0)];
        let input = NrrdInput {
            volume: &volume,
            slices_per_volume: 2,
            volume_count: 2,
            measurement_frame: &frame,
            max_b_value: 1000.0,
            gradients: &gradients,
        };
        let header = render_header(&input, "", Some("dwi.raw"));
        let keys: Vec<&str> = header
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.split([':']).next().unwrap_or(l))
            .collect();
        assert_eq!(
            keys,
            [
                "NRRD0005",
                "content",
                "type",
                "dimension",
                "space",
                "sizes",
                "thicknesses",
                "space directions",
                "centerings",
                "kinds",
                "endian",
                "encoding",
                "space units",
                "space origin",
                "data file",
                "measurement frame",
                "modality",
                "DWMRI_b-value",
                "DWMRI_gradient_0000",
                "DWMRI_gradient_0001",
            ]
        );
        assert!(header.contains("sizes: 3 2 2 2\n"));
        assert!(header.contains("thicknesses:  NaN  NaN 3.0000000000000000e+00 NaN\n"));
        assert!(header.contains(
            "space directions: (1.5000000000000000e+00,0.0000000000000000e+00,0.0000000000000000e+00) \
             (0.0000000000000000e+00,1.5000000000000000e+00,0.0000000000000000e+00) \
             (0.0000000000000000e+00,0.0000000000000000e+00,3.0000000000000000e+00) none\n"
        ));
        assert!(header.contains(
            "space origin: (-9.0000000000000000e+01,1.2600000000000000e+02,-7.2000000000000000e+01) \n"
        ));
        assert!(header.contains(
            "DWMRI_gradient_0001:=1.0000000000000000e+00   0.0000000000000000e+00   0.0000000000000000e+00\n"
        ));
        assert!(header.ends_with("\n\n"));
    }

    #[test]
    fn single_file_header_has_no_data_file() {
        let volume = sample_volume();
        let frame = MeasurementFrame::identity();
        let input = NrrdInput {
            volume: &volume,
            slices_per_volume: 4,
            volume_count: 1,
            measurement_frame: &frame,
            max_b_value: 0.0,
            gradients: &[Vector3::zeros()],
        };
        let header = render_header(&input, "", None);
        assert!(!header.contains("data file"));
        assert!(!header.contains("content:"));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let volume = sample_volume();
        let frame = MeasurementFrame::identity();
        let input = NrrdInput {
            volume: &volume,
            slices_per_volume: 4,
            volume_count: 1,
            measurement_frame: &frame,
            max_b_value: 0.0,
            gradients: &[Vector3::zeros()],
        };
        let result = write_nrrd(dir.path().join("dwi.nii"), &input, "");
        assert!(matches!(result, Err(ConvertError::UnrecognizedOutputFormat(_))));
    }

    #[test]
    fn detached_data_file_sits_next_to_header() {
        assert_eq!(
            data_file_path(Path::new("/out/dwi.nhdr")),
            PathBuf::from("/out/dwi.raw")
        );
    }
}
