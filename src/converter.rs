//! The conversion pipeline: structure, de-interleave, orientation, gradients.

use std::path::{Path, PathBuf};

use nalgebra::Vector3;

use crate::deinterleave::deinterleave;
use crate::diagnostics::DiagnosticSink;
use crate::enums::{OutputFormat, SliceOrder};
use crate::error::{ConvertError, Result};
use crate::fsl::{FslInput, FslOutputs, write_fsl};
use crate::gradients::{CalibratedGradients, GradientTable, calibrate, read_gradient_override};
use crate::nrrd::{NrrdInput, file_comment, write_nrrd};
use crate::options::ConversionOptions;
use crate::orientation::resolve_direction;
use crate::slice::SliceMetadata;
use crate::source::{GradientSource, VendorFlags};
use crate::structure::{VolumeStructure, analyze};
use crate::volume::DiffusionVolume;
use crate::volume_loader::DicomSeries;

/// A fully resolved diffusion dataset, ready to be written.
#[derive(Debug, Clone)]
pub struct DwiDataset {
    pub volume: DiffusionVolume,
    pub structure: VolumeStructure,
    pub slice_order: SliceOrder,
    pub gradient_table: GradientTable,
    pub gradients: CalibratedGradients,
    pub vendor_flags: VendorFlags,
    /// Options the dataset was converted with. They also drive output naming and the
    /// provenance comment, so the written files always describe the data they hold.
    pub options: ConversionOptions,
}

/// What a call to [`DwiDataset::write`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WrittenFiles {
    Nrrd {
        header: PathBuf,
        data: Option<PathBuf>,
    },
    Fsl(FslOutputs),
}

pub struct DwiConverter {
    headers: Vec<SliceMetadata>,
    volume: DiffusionVolume,
    multi_frame: bool,
    options: ConversionOptions,
}

impl DwiConverter {
    pub fn new(series: DicomSeries, options: ConversionOptions) -> Self {
        Self {
            headers: series.headers,
            volume: series.volume,
            multi_frame: series.multi_frame,
            options,
        }
    }

    /// Run every stage and hand back the finished dataset.
    pub fn convert(
        self,
        source: &impl GradientSource,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<DwiDataset> {
        let Self {
            headers,
            volume,
            multi_frame,
            mut options,
        } = self;

        let structure = analyze(&headers, multi_frame, sink)?;
        if volume.total_slices() != structure.total_slices {
            return Err(ConvertError::InconsistentDimensions);
        }

        let DiffusionVolume {
            data,
            spacing,
            origin,
            ..
        } = volume;
        let data = if structure.is_interleaved() {
            deinterleave(data, &structure)
        } else {
            data
        };

        let vendor_flags = source.extract_vendor_flags();
        let (direction, slice_order) = resolve_direction(
            &headers,
            &spacing,
            &structure,
            vendor_flags.slice_order,
            sink,
        );
        let volume = DiffusionVolume {
            data,
            spacing,
            origin,
            direction,
        };

        let mut gradient_table = source.extract_gradient_table(structure.volume_count)?;
        if let Some(path) = &options.gradient_override {
            let directions = read_gradient_override(path, structure.volume_count)?;
            gradient_table = gradient_table.with_directions(directions)?;
        }

        let gradients = calibrate(
            &gradient_table,
            &vendor_flags.measurement_frame,
            options.use_identity_measurement_frame,
            sink,
        )?;

        options.use_bmatrix_gradient_directions |= vendor_flags.from_bmatrix;

        Ok(DwiDataset {
            volume,
            structure,
            slice_order,
            gradient_table,
            gradients,
            vendor_flags,
            options,
        })
    }
}

impl DwiDataset {
    pub fn volume_count(&self) -> usize {
        self.structure.volume_count
    }

    pub fn slices_per_volume(&self) -> usize {
        self.structure.slices_per_volume
    }

    pub fn b_values(&self) -> &[f64] {
        self.gradient_table.b_values()
    }

    /// Scaled, frame-corrected gradient vectors, one per volume.
    pub fn gradient_vectors(&self) -> &[Vector3<f64>] {
        &self.gradients.vectors
    }

    fn nrrd_input(&self) -> NrrdInput<'_> {
        NrrdInput {
            volume: &self.volume,
            slices_per_volume: self.structure.slices_per_volume,
            volume_count: self.structure.volume_count,
            measurement_frame: &self.gradients.frame,
            max_b_value: self.gradients.max_b_value,
            gradients: &self.gradients.vectors,
        }
    }

    pub fn write_nrrd(&self, path: impl AsRef<Path>) -> Result<Option<PathBuf>> {
        write_nrrd(path, &self.nrrd_input(), &file_comment(&self.options))
    }

    pub fn write_fsl(
        &self,
        path: impl AsRef<Path>,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<FslOutputs> {
        let input = FslInput {
            volume: &self.volume,
            volume_count: self.structure.volume_count,
            b_values: self.gradient_table.b_values(),
            gradients: &self.gradients.vectors,
        };
        write_fsl(
            path,
            &input,
            self.options.bvalue_path.as_deref(),
            self.options.bvector_path.as_deref(),
            self.options.allow_truncated_volumes,
            sink,
        )
    }

    /// Write NRRD or FSL output depending on the extension of `path`.
    pub fn write(
        &self,
        path: impl AsRef<Path>,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<WrittenFiles> {
        let path = path.as_ref();
        match OutputFormat::from_path(path) {
            Some(OutputFormat::Nrrd(_)) => Ok(WrittenFiles::Nrrd {
                header: path.to_path_buf(),
                data: self.write_nrrd(path)?,
            }),
            Some(OutputFormat::Nifti { .. }) => Ok(WrittenFiles::Fsl(self.write_fsl(path, sink)?)),
            None => Err(ConvertError::UnrecognizedOutputFormat(path.to_path_buf())),
        }
    }
}
