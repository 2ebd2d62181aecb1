use std::path::PathBuf;

use crate::enums::SortBy;

/// Knobs for a single conversion run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    /// Report an identity measurement frame and leave gradients unrotated.
    pub use_identity_measurement_frame: bool,
    /// Recorded in the provenance comment; the vendor layer decides what it means.
    pub use_bmatrix_gradient_directions: bool,
    /// Recorded in the provenance comment.
    pub small_gradient_threshold: f64,
    /// Replaces the unit gradient directions before scaling.
    pub gradient_override: Option<PathBuf>,
    /// Drop left-over slices when splitting into 4-D instead of failing.
    pub allow_truncated_volumes: bool,
    pub sort_by: SortBy,
    /// Stamped into the provenance comment.
    pub version: String,
    pub bvalue_path: Option<PathBuf>,
    pub bvector_path: Option<PathBuf>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            use_identity_measurement_frame: false,
            use_bmatrix_gradient_directions: false,
            small_gradient_threshold: 0.2,
            gradient_override: None,
            allow_truncated_volumes: false,
            sort_by: SortBy::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            bvalue_path: None,
            bvector_path: None,
        }
    }
}

impl ConversionOptions {
    pub fn with_identity_measurement_frame(mut self, value: bool) -> Self {
        self.use_identity_measurement_frame = value;
        self
    }

    pub fn with_bmatrix_gradient_directions(mut self, value: bool) -> Self {
        self.use_bmatrix_gradient_directions = value;
        self
    }

    pub fn with_small_gradient_threshold(mut self, value: f64) -> Self {
        self.small_gradient_threshold = value;
        self
    }

    pub fn with_gradient_override(mut self, path: impl Into<PathBuf>) -> Self {
        self.gradient_override = Some(path.into());
        self
    }

    pub fn with_truncated_volumes(mut self, value: bool) -> Self {
        self.allow_truncated_volumes = value;
        self
    }

    pub fn with_sort_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_fsl_sidecars(
        mut self,
        bvalues: impl Into<PathBuf>,
        bvectors: impl Into<PathBuf>,
    ) -> Self {
        self.bvalue_path = Some(bvalues.into());
        self.bvector_path = Some(bvectors.into());
        self
    }
}
