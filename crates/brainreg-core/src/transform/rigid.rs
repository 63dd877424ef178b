//! Rigid transform implementation.
//!
//! Euler 3D rigid transform (three rotation angles plus a translation) about
//! a fixed center: `T(x) = R(x - c) + c + t` with `R = Rz * Ry * Rx`.
//!
//! Parameters are ordered `[rx, ry, rz, tx, ty, tz]`. The optimizer never
//! mutates a transform; every step builds a new one with
//! [`RigidTransform::from_parameters`].

use burn::module::{Module, Param};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Tensor, TensorData, Shape};
use nalgebra::{Matrix3, Rotation3};
use serde::{Deserialize, Serialize};

use super::trait_::Transform;
use crate::spatial::{Point3, Vector3};
use crate::tensor::to_host_vec;

/// Number of parameters of the Euler 3D rigid transform.
pub const NUM_RIGID_PARAMETERS: usize = 6;

/// Rigid Transform (Rotation + Translation) in 3D.
#[derive(Module, Debug)]
pub struct RigidTransform<B: Backend> {
    rotation: Param<Tensor<B, 1>>,    // [3] radians about x, y, z
    translation: Param<Tensor<B, 1>>, // [3]
    center: Tensor<B, 1>,             // fixed center of rotation
}

impl<B: Backend> RigidTransform<B> {
    /// Create a new rigid transform.
    ///
    /// # Arguments
    /// * `rotation` - Tensor of shape `[3]` with Euler angles in radians
    /// * `translation` - Tensor of shape `[3]` containing the translation vector
    /// * `center` - Tensor of shape `[3]` containing the fixed center of rotation
    pub fn new(rotation: Tensor<B, 1>, translation: Tensor<B, 1>, center: Tensor<B, 1>) -> Self {
        Self {
            rotation: Param::from_tensor(rotation.require_grad()),
            translation: Param::from_tensor(translation.require_grad()),
            center,
        }
    }

    /// Build a transform from a host parameter vector and rotation center.
    pub fn from_parameters(
        parameters: &[f64; NUM_RIGID_PARAMETERS],
        center: &Point3,
        device: &B::Device,
    ) -> Self {
        let vec3 = |values: [f64; 3]| {
            let data: Vec<f32> = values.iter().map(|v| *v as f32).collect();
            Tensor::<B, 1>::from_data(TensorData::new(data, Shape::new([3])), device)
        };

        Self::new(
            vec3([parameters[0], parameters[1], parameters[2]]),
            vec3([parameters[3], parameters[4], parameters[5]]),
            vec3([center.x, center.y, center.z]),
        )
    }

    /// Create an identity rigid transform about `center`.
    pub fn identity(center: &Point3, device: &B::Device) -> Self {
        Self::from_parameters(&[0.0; NUM_RIGID_PARAMETERS], center, device)
    }

    /// Get the rotation angles.
    pub fn rotation(&self) -> Tensor<B, 1> {
        self.rotation.val()
    }

    /// Get the translation vector.
    pub fn translation(&self) -> Tensor<B, 1> {
        self.translation.val()
    }

    /// Get the center of rotation.
    pub fn center(&self) -> Tensor<B, 1> {
        self.center.clone()
    }

    /// Current parameters copied to the host.
    pub fn parameters(&self) -> RigidParameters {
        let rotation = to_host_vec(self.rotation.val());
        let translation = to_host_vec(self.translation.val());
        let center = to_host_vec(self.center.clone());
        let get = |values: &[f32], i: usize| values.get(i).copied().unwrap_or(0.0) as f64;

        RigidParameters {
            rotation: [get(&rotation, 0), get(&rotation, 1), get(&rotation, 2)],
            translation: Vector3::new(get(&translation, 0), get(&translation, 1), get(&translation, 2)),
            center: Point3::new(get(&center, 0), get(&center, 1), get(&center, 2)),
        }
    }

    /// Build the rotation matrix from Euler angles.
    fn build_rotation_matrix(&self) -> Tensor<B, 2> {
        let r = self.rotation.val();

        // R = R_z(gamma) * R_y(beta) * R_x(alpha)
        let alpha = r.clone().slice([0..1]);
        let beta = r.clone().slice([1..2]);
        let gamma = r.slice([2..3]);

        let cx = alpha.clone().cos();
        let sx = alpha.sin();
        let cy = beta.clone().cos();
        let sy = beta.sin();
        let cz = gamma.clone().cos();
        let sz = gamma.sin();

        let r11 = cz.clone().mul(cy.clone());
        let r12 = cz.clone().mul(sy.clone()).mul(sx.clone()).sub(sz.clone().mul(cx.clone()));
        let r13 = cz.clone().mul(sy.clone()).mul(cx.clone()).add(sz.clone().mul(sx.clone()));

        let r21 = sz.clone().mul(cy.clone());
        let r22 = sz.clone().mul(sy.clone()).mul(sx.clone()).add(cz.clone().mul(cx.clone()));
        let r23 = sz.mul(sy.clone()).mul(cx.clone()).sub(cz.mul(sx.clone()));

        let r31 = sy.neg();
        let r32 = cy.clone().mul(sx);
        let r33 = cy.mul(cx);

        let row1 = Tensor::cat(vec![r11, r12, r13], 0).reshape([1, 3]);
        let row2 = Tensor::cat(vec![r21, r22, r23], 0).reshape([1, 3]);
        let row3 = Tensor::cat(vec![r31, r32, r33], 0).reshape([1, 3]);

        Tensor::cat(vec![row1, row2, row3], 0)
    }
}

impl<B: AutodiffBackend> RigidTransform<B> {
    /// Gradient of the last backward pass with respect to the six parameters.
    ///
    /// Returns `None` if the parameters did not take part in the graph.
    pub fn parameter_gradient(&self, grads: &B::Gradients) -> Option<[f64; NUM_RIGID_PARAMETERS]> {
        let rotation = to_host_vec(self.rotation.val().grad(grads)?);
        let translation = to_host_vec(self.translation.val().grad(grads)?);
        if rotation.len() != 3 || translation.len() != 3 {
            return None;
        }

        let mut gradient = [0.0; NUM_RIGID_PARAMETERS];
        for (slot, value) in gradient.iter_mut().zip(rotation.iter().chain(translation.iter())) {
            *slot = *value as f64;
        }
        Some(gradient)
    }
}

impl<B: Backend> Transform<B, 3> for RigidTransform<B> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        // Row vector form: y = (x - c) @ R^T + c + t
        let r = self.build_rotation_matrix();
        let t = self.translation.val().reshape([1, 3]);
        let c = self.center.clone().reshape([1, 3]);

        let centered = points - c.clone();
        let rotated = centered.matmul(r.transpose());
        rotated + c + t
    }
}

/// Host-side copy of rigid transform parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidParameters {
    /// Euler angles in radians about x, y, z.
    pub rotation: [f64; 3],
    pub translation: Vector3,
    pub center: Point3,
}

impl RigidParameters {
    pub fn new(parameters: &[f64; NUM_RIGID_PARAMETERS], center: Point3) -> Self {
        Self {
            rotation: [parameters[0], parameters[1], parameters[2]],
            translation: Vector3::new(parameters[3], parameters[4], parameters[5]),
            center,
        }
    }

    /// Parameters ordered `[rx, ry, rz, tx, ty, tz]`.
    pub fn to_array(&self) -> [f64; NUM_RIGID_PARAMETERS] {
        [
            self.rotation[0],
            self.rotation[1],
            self.rotation[2],
            self.translation.x,
            self.translation.y,
            self.translation.z,
        ]
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        let [ax, ay, az] = self.rotation;
        let rx = Rotation3::from_axis_angle(&Vector3::x_axis(), ax);
        let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), ay);
        let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), az);
        (rz * ry * rx).into_inner()
    }

    pub fn transform_point(&self, point: &Point3) -> Point3 {
        let centered = point - self.center;
        let rotated = self.rotation_matrix() * centered;
        self.center + rotated + self.translation
    }
}
