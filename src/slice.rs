use dicom::object::{FileDicomObject, InMemDicomObject};
use dicom_dictionary_std::tags;

use crate::error::{ConvertError, Result};

/// Acquisition metadata of one 2-D slice, as reported by its DICOM header.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceMetadata {
    /// ImagePositionPatient of the first transmitted voxel (LPS, mm).
    pub origin: [f64; 3],
    pub rows: u16,
    pub cols: u16,
    /// ImageOrientationPatient: row direction followed by column direction.
    pub direction_cosines: [f64; 6],
    /// Grouping key for slices at the same physical location. Never parsed as a number.
    pub location: String,
}

impl SliceMetadata {
    pub fn new(origin: [f64; 3], rows: u16, cols: u16, direction_cosines: [f64; 6]) -> Self {
        Self {
            origin,
            rows,
            cols,
            direction_cosines,
            location: location_key(&origin),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Read the slice metadata of a single-frame object.
    pub fn from_dicom_object(dicom_object: &FileDicomObject<InMemDicomObject>) -> Result<Self> {
        let position = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .map_err(|_| ConvertError::MissingTag("ImagePositionPatient"))?;
        let origin = to_array::<3>(
            position
                .to_multi_float64()
                .map_err(|_| ConvertError::MissingTag("ImagePositionPatient"))?,
        )
        .ok_or(ConvertError::MissingTag("ImagePositionPatient"))?;
        let location = position
            .to_str()
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| location_key(&origin));

        let (rows, cols) = Self::image_size(dicom_object)?;
        let direction_cosines = Self::direction_cosines(dicom_object)?;

        Ok(Self {
            origin,
            rows,
            cols,
            direction_cosines,
            location,
        })
    }

    /// Read one record per frame of a multi-frame object.
    ///
    /// Frame positions come from the per-frame functional groups when present; otherwise every
    /// frame inherits the top-level ImagePositionPatient.
    pub fn from_multi_frame_object(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        frames: usize,
    ) -> Result<Vec<Self>> {
        let (rows, cols) = Self::image_size(dicom_object)?;
        let shared_cosines = Self::direction_cosines(dicom_object).ok();

        let per_frame = dicom_object
            .element(tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE)
            .ok()
            .and_then(|element| element.items());

        match per_frame {
            Some(items) if items.len() == frames => items
                .iter()
                .map(|item| {
                    let origin = frame_position(item)
                        .ok_or(ConvertError::MissingTag("PlanePositionSequence"))?;
                    let direction_cosines = frame_orientation(item)
                        .or(shared_cosines)
                        .ok_or(ConvertError::MissingTag("ImageOrientationPatient"))?;
                    Ok(Self::new(origin, rows, cols, direction_cosines))
                })
                .collect(),
            _ => {
                let first = Self::from_dicom_object(dicom_object)?;
                Ok(vec![first; frames])
            }
        }
    }

    fn image_size(dicom_object: &FileDicomObject<InMemDicomObject>) -> Result<(u16, u16)> {
        let rows = dicom_object
            .element(tags::ROWS)
            .ok()
            .and_then(|e| e.to_int::<u16>().ok())
            .ok_or(ConvertError::MissingTag("Rows"))?;
        let cols = dicom_object
            .element(tags::COLUMNS)
            .ok()
            .and_then(|e| e.to_int::<u16>().ok())
            .ok_or(ConvertError::MissingTag("Columns"))?;
        Ok((rows, cols))
    }

    fn direction_cosines(dicom_object: &FileDicomObject<InMemDicomObject>) -> Result<[f64; 6]> {
        dicom_object
            .element(tags::IMAGE_ORIENTATION_PATIENT)
            .ok()
            .and_then(|e| e.to_multi_float64().ok())
            .and_then(to_array::<6>)
            .ok_or(ConvertError::MissingTag("ImageOrientationPatient"))
    }
}

fn frame_position(item: &InMemDicomObject) -> Option<[f64; 3]> {
    let plane = item.element(tags::PLANE_POSITION_SEQUENCE).ok()?.items()?.first()?;
    let values = plane
        .element(tags::IMAGE_POSITION_PATIENT)
        .ok()?
        .to_multi_float64()
        .ok()?;
    to_array::<3>(values)
}

fn frame_orientation(item: &InMemDicomObject) -> Option<[f64; 6]> {
    let plane = item
        .element(tags::PLANE_ORIENTATION_SEQUENCE)
        .ok()?
        .items()?
        .first()?;
    let values = plane
        .element(tags::IMAGE_ORIENTATION_PATIENT)
        .ok()?
        .to_multi_float64()
        .ok()?;
    to_array::<6>(values)
}

fn to_array<const N: usize>(values: Vec<f64>) -> Option<[f64; N]> {
    values.get(..N)?.try_into().ok()
}

/// DS-style key for a position that did not come with its own string.
fn location_key(origin: &[f64; 3]) -> String {
    format!("{}\\{}\\{}", origin[0], origin[1], origin[2])
}
