use std::path::Path;

/// Ordering applied to single-frame DICOM files before they are stacked.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    InstanceNumber,
    // Keep the order the files were handed in.
    None,
}

/// How the flat slice list of a series is laid out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SliceLayout {
    /// One full volume (every distinct location), then the next volume.
    #[default]
    VolumeInterleaved,
    /// Every volume's copy of location 0, then every copy of location 1, ...
    SliceInterleaved,
}

/// Direction of the slice axis.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SliceOrder {
    /// Slice index increases from inferior to superior.
    #[default]
    InferiorSuperior,
    SuperiorInferior,
}

/// NRRD flavour, chosen from the header filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NrrdLayout {
    /// `.nrrd`: header and raw payload in one file.
    SingleFile,
    /// `.nhdr`: header plus a `.raw` sidecar.
    Detached,
}

/// Output file families understood by the writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Nrrd(NrrdLayout),
    Nifti { compressed: bool },
}

impl OutputFormat {
    /// Pick the output format from the filename, or `None` if the extension is not supported.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let name = path.as_ref().file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".nhdr") {
            Some(OutputFormat::Nrrd(NrrdLayout::Detached))
        } else if name.ends_with(".nrrd") {
            Some(OutputFormat::Nrrd(NrrdLayout::SingleFile))
        } else if name.ends_with(".nii.gz") {
            Some(OutputFormat::Nifti { compressed: true })
        } else if name.ends_with(".nii") {
            Some(OutputFormat::Nifti { compressed: false })
        } else {
            None
        }
    }
}
