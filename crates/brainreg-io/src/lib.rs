pub mod nifti_io;
pub mod dicom_io;
pub mod convert;

pub use nifti_io::{read_volume, write_volume, NiftiWriteOptions, OutputFrame, SpatialUnit, VolumeMetadata};
pub use dicom_io::{read_dicom_series, scan_dicom_directory, load_dicom_series, DicomSeriesInfo};
pub use convert::{convert_dicom_to_nifti, is_nifti_path};
