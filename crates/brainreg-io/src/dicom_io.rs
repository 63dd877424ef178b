use anyhow::{Context, Result, anyhow, bail};
use burn::tensor::backend::Backend;
use dicom::object::{FileDicomObject, InMemDicomObject, open_file};
use dicom::pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption};
use dicom::dictionary_std::tags;
use brainreg_core::image::Image;
use brainreg_core::spatial::{Point3, Spacing3};
use brainreg_core::tensor::volume_from_vec;
use nalgebra::{Matrix3, Vector3};
use std::path::{Path, PathBuf};
use std::fs;
use std::collections::HashMap;
use rayon::prelude::*;

/// Relative spread of slice increments tolerated without a warning.
const SLICE_INCREMENT_TOLERANCE: f64 = 0.01;

/// Metadata for a discovered DICOM series
#[derive(Debug, Clone)]
pub struct DicomSeriesInfo {
    pub series_instance_uid: String,
    pub series_description: String,
    pub modality: String,
    pub patient_id: String,
    pub file_paths: Vec<PathBuf>,
}

/// Scan a directory for DICOM series, grouping them by SeriesInstanceUID.
///
/// Headers are parsed in parallel. Files that are not DICOM, or carry no
/// SeriesInstanceUID, are ignored. Series are returned sorted by UID.
pub fn scan_dicom_directory<P: AsRef<Path>>(path: P) -> Result<Vec<DicomSeriesInfo>> {
    let path = path.as_ref();

    let entries: Vec<PathBuf> = fs::read_dir(path)
        .context("Failed to read directory")?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();

    if entries.is_empty() {
        return Ok(Vec::new());
    }

    let headers: Vec<DicomSeriesInfo> = entries
        .par_iter()
        .filter_map(|file_path| {
            let obj = open_file(file_path).ok()?;
            let uid = get_string(&obj, tags::SERIES_INSTANCE_UID)?;
            Some(DicomSeriesInfo {
                series_instance_uid: uid,
                series_description: get_string(&obj, tags::SERIES_DESCRIPTION).unwrap_or_default(),
                modality: get_string(&obj, tags::MODALITY).unwrap_or_default(),
                patient_id: get_string(&obj, tags::PATIENT_ID).unwrap_or_default(),
                file_paths: vec![file_path.clone()],
            })
        })
        .collect();

    let mut series_map = HashMap::<String, DicomSeriesInfo>::new();
    for info in headers {
        match series_map.get_mut(&info.series_instance_uid) {
            Some(entry) => entry.file_paths.extend(info.file_paths),
            None => {
                series_map.insert(info.series_instance_uid.clone(), info);
            }
        }
    }

    let mut series_list: Vec<DicomSeriesInfo> = series_map.into_values().collect();
    for series in &mut series_list {
        series.file_paths.sort();
    }
    series_list.sort_by(|a, b| a.series_instance_uid.cmp(&b.series_instance_uid));

    Ok(series_list)
}

/// Load a specific DICOM series into a 3D Image.
///
/// Slices are sorted along the slice normal and rescaled with
/// RescaleSlope/RescaleIntercept. The geometry is in DICOM patient (LPS)
/// coordinates. Non-uniform slice increments are tolerated: a warning is
/// logged and the mean increment is used.
pub fn load_dicom_series<B: Backend>(series: &DicomSeriesInfo, device: &B::Device) -> Result<Image<B, 3>> {
    if series.file_paths.is_empty() {
        bail!("Series {} has no files", series.series_instance_uid);
    }

    let mut slices: Vec<FileDicomObject<InMemDicomObject>> = series.file_paths.par_iter()
        .map(|p| open_file(p).context("Failed to open DICOM file"))
        .collect::<Result<Vec<_>>>()?;

    let orientation = get_f64_vec(&slices[0], tags::IMAGE_ORIENTATION_PATIENT)
        .context("Missing ImageOrientationPatient in first slice")?;

    if orientation.len() != 6 {
        bail!("Invalid ImageOrientationPatient length: {}", orientation.len());
    }

    let dir_x = Vector3::new(orientation[0], orientation[1], orientation[2]).normalize();
    let dir_y = Vector3::new(orientation[3], orientation[4], orientation[5]).normalize();
    let dir_z = dir_x.cross(&dir_y).normalize();

    // Sort by projection of the slice position onto the normal
    let projection = |obj: &FileDicomObject<InMemDicomObject>| {
        get_position(obj).map(|p| p.coords.dot(&dir_z)).unwrap_or(0.0)
    };
    slices.sort_by(|a, b| {
        projection(a).partial_cmp(&projection(b)).unwrap_or(std::cmp::Ordering::Equal)
    });

    let first_obj = &slices[0];
    let rows = get_u32(first_obj, tags::ROWS).context("Missing Rows")? as usize;
    let cols = get_u32(first_obj, tags::COLUMNS).context("Missing Columns")? as usize;
    let pixel_spacing = get_f64_vec(first_obj, tags::PIXEL_SPACING).context("Missing PixelSpacing")?;
    if pixel_spacing.len() != 2 {
        bail!("Invalid PixelSpacing length: {}", pixel_spacing.len());
    }
    let dy = pixel_spacing[0]; // between rows
    let dx = pixel_spacing[1]; // between columns

    let origin_pos = get_position(first_obj).context("Missing ImagePositionPatient")?;

    let dz = if slices.len() > 1 {
        let mut increments = Vec::with_capacity(slices.len() - 1);
        for pair in slices.windows(2) {
            let p1 = get_position(&pair[0]).context("Missing ImagePositionPatient")?;
            let p2 = get_position(&pair[1]).context("Missing ImagePositionPatient")?;
            increments.push((p2 - p1).dot(&dir_z).abs());

            let current = get_f64_vec(&pair[1], tags::IMAGE_ORIENTATION_PATIENT).unwrap_or_default();
            if current.len() == 6 {
                let cx = Vector3::new(current[0], current[1], current[2]);
                let cy = Vector3::new(current[3], current[4], current[5]);
                if (cx - dir_x).norm() > 1e-3 || (cy - dir_y).norm() > 1e-3 {
                    bail!("Inconsistent ImageOrientationPatient in series");
                }
            }
        }

        let mean = increments.iter().sum::<f64>() / increments.len() as f64;
        let min = increments.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = increments.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        if (max - min) > SLICE_INCREMENT_TOLERANCE * mean {
            tracing::warn!(
                series = %series.series_instance_uid,
                min, max, mean,
                "non-uniform slice increment, using the mean"
            );
        }
        if mean <= 0.0 {
            get_f64(first_obj, tags::SLICE_THICKNESS).unwrap_or(1.0)
        } else {
            mean
        }
    } else {
        get_f64(first_obj, tags::SLICE_THICKNESS).unwrap_or(1.0)
    };

    let spacing = Spacing3::new(dx, dy, dz);
    let origin = Point3::new(origin_pos.x, origin_pos.y, origin_pos.z);
    let direction = Matrix3::from_columns(&[dir_x, dir_y, dir_z]);

    // raw stored values; each slice is rescaled with its own slope and intercept
    let options = ConvertOptions::new()
        .with_modality_lut(ModalityLutOption::None)
        .with_voi_lut(VoiLutOption::Identity);

    let slice_pixels: Vec<Vec<f32>> = slices.par_iter()
        .map(|obj| {
            let pixel_data = obj.decode_pixel_data().context("Failed to decode pixel data")?;
            let slope = get_f64(obj, tags::RESCALE_SLOPE).unwrap_or(1.0) as f32;
            let intercept = get_f64(obj, tags::RESCALE_INTERCEPT).unwrap_or(0.0) as f32;

            let data = pixel_data.to_vec_with_options::<f32>(&options).map_err(|e| anyhow!("Pixel data conversion error: {}", e))?;
            if data.len() != rows * cols {
                return Err(anyhow!("Slice data size mismatch: expected {}, got {}", rows * cols, data.len()));
            }

            Ok(data.into_iter().map(|v| v * slope + intercept).collect())
        })
        .collect::<Result<Vec<_>>>()?;

    let depth = slices.len();
    let mut flattened = Vec::with_capacity(depth * rows * cols);
    for slice in slice_pixels {
        flattened.extend(slice);
    }

    let tensor = volume_from_vec::<B>(flattened, [depth, rows, cols], device);
    Ok(Image::new(tensor, origin, spacing, direction))
}

/// Read the DICOM series stored in a directory.
///
/// If the directory holds several series, the one with the most slices is
/// loaded and a warning is logged.
pub fn read_dicom_series<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B, 3>> {
    let series_list = scan_dicom_directory(path.as_ref())?;
    if series_list.is_empty() {
        bail!("No DICOM series found in directory");
    }

    if series_list.len() > 1 {
        tracing::warn!(
            count = series_list.len(),
            "multiple DICOM series found, using the one with the most slices"
        );
    }

    let series = series_list
        .iter()
        .max_by_key(|s| s.file_paths.len())
        .context("No DICOM series found in directory")?;

    tracing::debug!(
        uid = %series.series_instance_uid,
        description = %series.series_description,
        slices = series.file_paths.len(),
        "loading DICOM series"
    );
    load_dicom_series(series, device)
}

// --- Helpers ---

fn get_string(obj: &FileDicomObject<InMemDicomObject>, tag: dicom::core::Tag) -> Option<String> {
    obj.element(tag).ok()?.to_str().ok().map(|s| s.trim().to_string())
}

fn get_u32(obj: &FileDicomObject<InMemDicomObject>, tag: dicom::core::Tag) -> Option<u32> {
    obj.element(tag).ok()?.to_int::<u32>().ok()
}

fn get_f64(obj: &FileDicomObject<InMemDicomObject>, tag: dicom::core::Tag) -> Option<f64> {
    obj.element(tag).ok()?.to_float64().ok()
}

fn get_f64_vec(obj: &FileDicomObject<InMemDicomObject>, tag: dicom::core::Tag) -> Option<Vec<f64>> {
    obj.element(tag).ok()?.to_multi_float64().ok()
}

fn get_position(obj: &FileDicomObject<InMemDicomObject>) -> Option<nalgebra::Point3<f64>> {
    let v = get_f64_vec(obj, tags::IMAGE_POSITION_PATIENT)?;
    if v.len() == 3 {
        Some(nalgebra::Point3::new(v[0], v[1], v[2]))
    } else {
        None
    }
}
