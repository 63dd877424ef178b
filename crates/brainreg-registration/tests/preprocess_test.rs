use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use brainreg_core::image::Image;
use brainreg_core::tensor::{to_host_vec, volume_from_vec};
use brainreg_registration::{normalize, resize, RegistrationError};
use proptest::prelude::*;

type B = NdArray<f32>;

fn stats(values: &[f32]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().map(|v| *v as f64).sum::<f64>() / n;
    let variance = values.iter().map(|v| (*v as f64 - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

proptest! {
    #[test]
    fn normalized_volume_has_zero_mean_unit_std(
        values in prop::collection::vec(-1000.0f32..1000.0, 27),
    ) {
        let (_, std) = stats(&values);
        prop_assume!(std > 1.0);

        let device = Default::default();
        let image = Image::from_tensor(volume_from_vec::<B>(values, [3, 3, 3], &device));
        let normalized = to_host_vec(normalize(&image).unwrap().into_data());

        let (mean, std) = stats(&normalized);
        prop_assert!(mean.abs() < 1e-3, "mean {}", mean);
        prop_assert!((std - 1.0).abs() < 1e-3, "std {}", std);
    }

    #[test]
    fn resize_produces_requested_shape(
        input in (1usize..8, 1usize..8, 1usize..8),
        output in (1usize..10, 1usize..10, 1usize..10),
    ) {
        let device = Default::default();
        let moving = Image::from_tensor(Tensor::<B, 3>::ones([input.0, input.1, input.2], &device));
        let target = [output.0, output.1, output.2];

        let resized = resize(target, &moving).unwrap();
        prop_assert_eq!(resized.shape(), target);

        // constant input stays constant
        let values = to_host_vec(resized.into_data());
        prop_assert!(values.iter().all(|v| (v - 1.0).abs() < 1e-5));
    }
}

#[test]
fn test_normalize_keeps_geometry() {
    let device = Default::default();
    let values: Vec<f32> = (0..8).map(|v| v as f32).collect();
    let image = Image::new(
        volume_from_vec::<B>(values, [2, 2, 2], &device),
        brainreg_core::spatial::Point3::new(1.0, 2.0, 3.0),
        brainreg_core::spatial::Spacing3::new(0.5, 0.5, 2.0),
        brainreg_core::spatial::Direction3::identity(),
    );

    let normalized = normalize(&image).unwrap();
    assert_eq!(normalized.origin(), image.origin());
    assert_eq!(normalized.spacing(), image.spacing());
}

#[test]
fn test_normalize_rejects_non_finite() {
    let device = Default::default();
    let mut values = vec![1.0f32; 8];
    values[3] = f32::NAN;
    let image = Image::from_tensor(volume_from_vec::<B>(values, [2, 2, 2], &device));
    assert!(matches!(normalize(&image), Err(RegistrationError::DegenerateVolume(_))));
}

#[test]
fn test_resize_zero_sized_moving() {
    let device = Default::default();
    let moving = Image::from_tensor(Tensor::<B, 3>::zeros([0, 4, 4], &device));
    let result = resize([4, 4, 4], &moving);
    match result {
        Err(RegistrationError::ShapeMismatch { expected, actual }) => {
            assert_eq!(expected, vec![4, 4, 4]);
            assert_eq!(actual, vec![0, 4, 4]);
        }
        other => panic!("unexpected result: {:?}", other.map(|i| i.shape())),
    }
}
