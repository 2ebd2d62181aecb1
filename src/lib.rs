//! # DWI-convert library
//!
//! This crate turns a diffusion-weighted DICOM series into a canonical 4-D
//! diffusion dataset and writes it as NRRD or as an FSL file set.

//!
//! The DICOM reading itself is done by the dicom-rs ecosystem. What this crate
//! adds on top of a plain stack of slices is:
//!  - Discovering slices per volume and volume count from the slice locations
//!  - Reordering slice-interleaved series into consecutive volumes
//!  - A right-handed direction matrix with the slice axis pointing the way the
//!    slices were actually acquired (IS vs. SI)
//!  - b-value scaled gradient vectors in the measurement frame
//!  - Byte-stable NRRD headers and FSL `.nii(.gz)` / `.bval` / `.bvec` output
//!
//!  Vendor-specific gradient extraction is not part of this crate. Gradient
//!  tables are handed in through the [`GradientSource`] trait, either from a
//!  vendor reader or from existing FSL sidecars.
//!
//!  Progress and decisions (detected layout, slice order, per-volume scale
//!  factors) are reported as [`Diagnostic`] records to a caller-supplied sink
//!  and never influence the result.
//!
//! # Examples
//!
//! ## Converting a DICOM directory to a detached NRRD
//!
//! Read all DICOM files from the dicom/ directory, sorted by InstanceNumber,
//! take the gradient table from FSL sidecars and write `dwi.nhdr` + `dwi.raw`.
//!
//! ```no_run
//! # use dwi_convert::{ConversionOptions, DwiConverter, GradientProvider, LogSink, SeriesLoader};
//! let options = ConversionOptions::default();
//! let series = SeriesLoader::load_from_directory("dicom", options.sort_by)
//!     .expect("should have loaded files from directory");
//! let gradients = GradientProvider::fsl("dicom/dwi.bval", "dicom/dwi.bvec");
//! let dataset = DwiConverter::new(series, options)
//!     .convert(&gradients, &mut LogSink)
//!     .expect("should have converted the series");
//! dataset
//!     .write("dwi.nhdr", &mut LogSink)
//!     .expect("should have written the NRRD header and data");
//! ```

pub mod converter;
pub mod deinterleave;
pub mod diagnostics;
pub mod enums;
pub mod error;
pub mod format;
pub mod fsl;
pub mod gradients;
pub mod nrrd;
pub mod options;
pub mod orientation;
pub mod slice;
pub mod source;
pub mod structure;
pub mod volume;
pub mod volume_loader;

pub use converter::{DwiConverter, DwiDataset, WrittenFiles};
pub use diagnostics::{Diagnostic, DiagnosticSink, LogSink, NullSink};
pub use error::{ConvertError, Result};
pub use gradients::{GradientTable, MeasurementFrame};
pub use options::ConversionOptions;
pub use slice::SliceMetadata;
pub use source::{GradientProvider, GradientSource, VendorFlags, VendorGradients};
pub use structure::VolumeStructure;
pub use volume::DiffusionVolume;
pub use volume_loader::{DicomSeries, SeriesLoader};
