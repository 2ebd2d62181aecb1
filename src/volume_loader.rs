use crate::{
    enums::SortBy,
    error::{ConvertError, Result},
    slice::SliceMetadata,
    volume::DiffusionVolume,
};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use ndarray::{Array2, Array3, s};
use rayon::prelude::*;
use std::{fs, path::Path};

/// A diffusion series as read from disk, before any reordering.
#[derive(Debug, Clone)]
pub struct DicomSeries {
    /// One record per stacked slice, in stacking order.
    pub headers: Vec<SliceMetadata>,
    pub volume: DiffusionVolume,
    /// The whole series came from one multi-frame file.
    pub multi_frame: bool,
}

pub struct SeriesLoader;

impl SeriesLoader {
    /// Load a series from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found, dimensions are inconsistent or
    /// a required attribute is missing
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<DicomSeries> {
        match dicom_objects {
            [] => Err(ConvertError::NoValidImages),
            [single] => Self::load_multi_frame(single),
            _ => Self::load_single_frames(dicom_objects, sort_by),
        }
    }

    /// Load a series from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path> + Sync],
        sort_by: SortBy,
    ) -> Result<DicomSeries> {
        let objects: std::result::Result<Vec<_>, _> = paths
            .par_iter()
            .map(|path| open_file(path.as_ref()))
            .collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a series from a directory containing .dcm files
    pub fn load_from_directory(path: impl AsRef<Path>, sort_by: SortBy) -> Result<DicomSeries> {
        let mut paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(ConvertError::NoValidImages);
        }
        paths.sort();

        Self::load_from_file_paths(&paths, sort_by)
    }

    fn load_single_frames(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<DicomSeries> {
        let mut slices = dicom_objects
            .iter()
            .map(|dicom_object| {
                let order = Self::get_sort_order(dicom_object, sort_by);
                let header = SliceMetadata::from_dicom_object(dicom_object)?;
                let image = Self::decode_frames(dicom_object)?
                    .slice_move(s![0, .., ..]);
                Ok((order, header, image))
            })
            .collect::<Result<Vec<_>>>()?;

        if !matches!(sort_by, SortBy::None) {
            slices.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        }

        let (headers, images): (Vec<_>, Vec<_>) = slices
            .into_iter()
            .map(|(_, header, image)| (header, image))
            .unzip();

        Self::validate_dimensions(&headers, &images)?;
        let data = Self::build_volume_array(&images);
        let spacing = Self::get_spacing(dicom_objects)?;
        let origin = headers[0].origin;

        Ok(DicomSeries {
            headers,
            volume: DiffusionVolume::new(data, spacing, origin),
            multi_frame: false,
        })
    }

    fn load_multi_frame(dicom_object: &FileDicomObject<InMemDicomObject>) -> Result<DicomSeries> {
        let data = Self::decode_frames(dicom_object)?;
        let (frames, height, width) = data.dim();
        let headers = SliceMetadata::from_multi_frame_object(dicom_object, frames)?;
        let first = headers.first().ok_or(ConvertError::NoValidImages)?;
        if (height, width) != (usize::from(first.rows), usize::from(first.cols)) {
            return Err(ConvertError::InconsistentDimensions);
        }
        let origin = first.origin;
        let spacing = Self::get_spacing(std::slice::from_ref(dicom_object))?;

        Ok(DicomSeries {
            headers,
            volume: DiffusionVolume::new(data, spacing, origin),
            multi_frame: true,
        })
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: SortBy,
    ) -> Option<f32> {
        match sort_by {
            SortBy::InstanceNumber => dicom_object
                .element(tags::INSTANCE_NUMBER)
                .ok()?
                .to_int::<i32>()
                .ok()
                .map(|n| n as f32),
            SortBy::None => Some(0.0),
        }
    }

    /// Stored values of every frame as `(frame, row, col)`, without rescale or windowing.
    fn decode_frames(dicom_object: &FileDicomObject<InMemDicomObject>) -> Result<Array3<i16>> {
        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(|e| ConvertError::PixelData(e.to_string()))?;
        let options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::None)
            .with_voi_lut(VoiLutOption::Identity);
        pixel_data
            .to_ndarray_with_options::<i16>(&options)
            .map(|arr| arr.slice_move(s![.., .., .., 0]))
            .map_err(|e| ConvertError::PixelData(e.to_string()))
    }

    /// Every decoded plane must have the shape of the first header's Rows x Columns.
    fn validate_dimensions(headers: &[SliceMetadata], images: &[Array2<i16>]) -> Result<()> {
        let first = headers.first().ok_or(ConvertError::NoValidImages)?;
        let expected = (usize::from(first.rows), usize::from(first.cols));
        let consistent = headers.iter().zip(images).all(|(header, img)| {
            (usize::from(header.rows), usize::from(header.cols)) == expected
                && img.dim() == expected
        });
        if images.is_empty() || headers.len() != images.len() || !consistent {
            return Err(ConvertError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(images: &[Array2<i16>]) -> Array3<i16> {
        let (height, width) = images[0].dim();
        let depth = images.len();
        let mut volume = Array3::<i16>::zeros((depth, height, width));

        for (i, image) in images.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(image);
        }

        volume
    }

    /// Column, row and slice spacing. The slice step prefers SpacingBetweenSlices over
    /// SliceThickness.
    ///
    /// PixelSpacing holds the row spacing (between rows, along y) first and the column
    /// spacing (along x) second.
    fn get_spacing(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Result<[f64; 3]> {
        dicom_objects
            .iter()
            .find_map(|dicom_object| {
                let pixel_spacing = dicom_object
                    .element(tags::PIXEL_SPACING)
                    .ok()?
                    .to_multi_float64()
                    .ok()?;

                let slice_step = dicom_object
                    .element(tags::SPACING_BETWEEN_SLICES)
                    .ok()
                    .and_then(|e| e.to_float64().ok())
                    .or_else(|| {
                        dicom_object
                            .element(tags::SLICE_THICKNESS)
                            .ok()?
                            .to_float64()
                            .ok()
                    })?;

                Some([*pixel_spacing.get(1)?, *pixel_spacing.first()?, slice_step])
            })
            .ok_or(ConvertError::MissingTag("PixelSpacing"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::tests::{ds, file_object, us};
    use dicom::core::{DataElement, PrimitiveValue, VR};

    const AXIAL: [&str; 6] = ["1", "0", "0", "0", "1", "0"];

    fn header(rows: u16, cols: u16) -> SliceMetadata {
        SliceMetadata::new([0.0; 3], rows, cols, [1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
    }

    /// Two 2x3 frames of signed 16-bit samples, positioned through the top-level header only.
    fn multi_frame_object() -> FileDicomObject<InMemDicomObject> {
        let samples: Vec<i16> = vec![-3, -2, -1, 0, 1, 2, 10, 11, 12, 13, 14, 15];
        let bytes: Vec<u8> = samples.iter().flat_map(|v| v.to_le_bytes()).collect();
        file_object([
            ds(tags::IMAGE_POSITION_PATIENT, &["-50", "60", "2.5"]),
            ds(tags::IMAGE_ORIENTATION_PATIENT, &AXIAL),
            ds(tags::PIXEL_SPACING, &["0.5", "2.0"]),
            ds(tags::SLICE_THICKNESS, &["3.0"]),
            us(tags::ROWS, 2),
            us(tags::COLUMNS, 3),
            us(tags::SAMPLES_PER_PIXEL, 1),
            us(tags::BITS_ALLOCATED, 16),
            us(tags::BITS_STORED, 16),
            us(tags::HIGH_BIT, 15),
            us(tags::PIXEL_REPRESENTATION, 1),
            DataElement::new(
                tags::PHOTOMETRIC_INTERPRETATION,
                VR::CS,
                PrimitiveValue::from("MONOCHROME2"),
            ),
            DataElement::new(tags::NUMBER_OF_FRAMES, VR::IS, PrimitiveValue::from("2")),
            DataElement::new(tags::PIXEL_DATA, VR::OW, PrimitiveValue::from(bytes)),
        ])
    }

    #[test]
    fn volume_array_stacks_images_in_order() {
        let images: Vec<_> = (0..3)
            .map(|k| Array2::from_elem((2, 4), k as i16))
            .collect();
        let volume = SeriesLoader::build_volume_array(&images);
        assert_eq!(volume.dim(), (3, 2, 4));
        assert_eq!(volume[[2, 1, 3]], 2);
        assert_eq!(volume[[0, 0, 0]], 0);
    }

    #[test]
    fn mismatched_images_are_rejected() {
        let headers = vec![header(2, 2), header(2, 2)];
        let images = vec![Array2::<i16>::zeros((2, 2)), Array2::<i16>::zeros((2, 3))];
        assert!(matches!(
            SeriesLoader::validate_dimensions(&headers, &images),
            Err(ConvertError::InconsistentDimensions)
        ));
    }

    #[test]
    fn images_must_match_header_size() {
        let images = vec![Array2::<i16>::zeros((2, 3)), Array2::<i16>::zeros((2, 3))];
        assert!(SeriesLoader::validate_dimensions(&[header(2, 3), header(2, 3)], &images).is_ok());
        assert!(matches!(
            SeriesLoader::validate_dimensions(&[header(3, 2), header(3, 2)], &images),
            Err(ConvertError::InconsistentDimensions)
        ));
    }

    #[test]
    fn pixel_spacing_is_reordered_to_column_row() {
        let object = file_object([
            ds(tags::PIXEL_SPACING, &["0.5", "2.0"]),
            ds(tags::SLICE_THICKNESS, &["3.0"]),
        ]);
        let spacing = SeriesLoader::get_spacing(std::slice::from_ref(&object)).unwrap();
        assert_eq!(spacing, [2.0, 0.5, 3.0]);
    }

    #[test]
    fn spacing_between_slices_wins_over_thickness() {
        let object = file_object([
            ds(tags::PIXEL_SPACING, &["1.0", "1.0"]),
            ds(tags::SLICE_THICKNESS, &["3.0"]),
            ds(tags::SPACING_BETWEEN_SLICES, &["3.5"]),
        ]);
        let spacing = SeriesLoader::get_spacing(std::slice::from_ref(&object)).unwrap();
        assert_eq!(spacing, [1.0, 1.0, 3.5]);
    }

    #[test]
    fn missing_pixel_spacing_is_reported() {
        let object = file_object([ds(tags::SLICE_THICKNESS, &["3.0"])]);
        assert!(matches!(
            SeriesLoader::get_spacing(std::slice::from_ref(&object)),
            Err(ConvertError::MissingTag("PixelSpacing"))
        ));
    }

    #[test]
    fn single_object_is_loaded_as_multi_frame() {
        let series =
            SeriesLoader::load_from_dicom_objects(&[multi_frame_object()], SortBy::default())
                .unwrap();

        assert!(series.multi_frame);
        assert_eq!(series.headers.len(), 2);
        assert_eq!(series.volume.dim(), (2, 2, 3));
        assert_eq!(series.volume.data[[0, 0, 0]], -3);
        assert_eq!(series.volume.data[[1, 1, 2]], 15);
        assert_eq!(series.volume.spacing, [2.0, 0.5, 3.0]);
        assert_eq!(series.volume.origin, [-50.0, 60.0, 2.5]);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            SeriesLoader::load_from_dicom_objects(&[], SortBy::default()),
            Err(ConvertError::NoValidImages)
        ));
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SeriesLoader::load_from_directory(dir.path(), SortBy::None),
            Err(ConvertError::NoValidImages)
        ));
    }
}
