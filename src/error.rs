use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Pixel data error: {0}")]
    PixelData(String),

    #[error("Missing DICOM attribute: {0}")]
    MissingTag(&'static str),

    #[error("Structural inconsistency: {slices} slices not evenly divisible by {divisor}")]
    StructuralInconsistency { slices: usize, divisor: usize },

    #[error("Count mismatch: expected {expected} gradients, found {found}")]
    CountMismatch { expected: usize, found: usize },

    #[error("Unrecognized output format: {}", .0.display())]
    UnrecognizedOutputFormat(PathBuf),

    #[error("Invalid gradient table: {0}")]
    InvalidGradientTable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::NiftiError),
}

pub type Result<T> = std::result::Result<T, ConvertError>;
