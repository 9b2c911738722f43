//! Quaternion rotation of coordinate lists and axis reflection/permutation
//! of grid tensors.

use candle_core::Tensor;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use voxfrag_common::Coordinate3D;

/// A quaternion stored as `[w, x, y, z]`.
///
/// Rotation quaternions are unit length by construction
/// ([`random_unit_quaternion`], [`Quaternion::from_axis_angle`]); nothing
/// re-normalizes them on use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion(pub [f64; 4]);

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion([1.0, 0.0, 0.0, 0.0]);

    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Quaternion([w, x, y, z])
    }

    /// Rotation of `angle` radians about `axis` (which need not be normalized).
    pub fn from_axis_angle(axis: [f64; 3], angle: f64) -> Self {
        let len = (axis[0] * axis[0] + axis[1] * axis[1] + axis[2] * axis[2]).sqrt();
        let (s, c) = (angle / 2.0).sin_cos();
        Quaternion([c, s * axis[0] / len, s * axis[1] / len, s * axis[2] / len])
    }

    pub fn w(&self) -> f64 { self.0[0] }
    pub fn x(&self) -> f64 { self.0[1] }
    pub fn y(&self) -> f64 { self.0[2] }
    pub fn z(&self) -> f64 { self.0[3] }

    /// `[w, -x, -y, -z]`; the inverse for unit quaternions.
    pub fn conjugate(&self) -> Self {
        Quaternion([self.0[0], -self.0[1], -self.0[2], -self.0[3]])
    }

    pub fn norm(&self) -> f64 {
        self.0.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    fn pure(p: &Coordinate3D) -> Self {
        Quaternion([0.0, p.x, p.y, p.z])
    }
}

/// Hamilton product `a ∘ b`.
pub fn hamilton_product(a: &Quaternion, b: &Quaternion) -> Quaternion {
    let [a0, a1, a2, a3] = a.0;
    let [b0, b1, b2, b3] = b.0;
    Quaternion([
        a0 * b0 - a1 * b1 - a2 * b2 - a3 * b3,
        a0 * b1 + a1 * b0 + a2 * b3 - a3 * b2,
        a0 * b2 - a1 * b3 + a2 * b0 + a3 * b1,
        a0 * b3 + a1 * b2 - a2 * b1 + a3 * b0,
    ])
}

/// Rotate every point about `center` by `q ∘ p ∘ q⁻¹`.
///
/// Returns a new list with the same length and order as `coords`.
pub fn rotate_coordinates(coords: &[Coordinate3D], q: &Quaternion, center: &Coordinate3D) -> Vec<Coordinate3D> {
    let q_inv = q.conjugate();
    coords
        .iter()
        .map(|point| {
            let p = Quaternion::pure(&point.offset_from(center));
            let r = hamilton_product(&hamilton_product(q, &p), &q_inv);
            Coordinate3D::new(r.x() + center.x, r.y() + center.y, r.z() + center.z)
        })
        .collect()
}

/// Uniformly random rotation from the thread-local RNG.
pub fn random_unit_quaternion() -> Quaternion {
    random_unit_quaternion_with(&mut rand::thread_rng())
}

/// Four standard-normal draws normalized to unit length.
pub fn random_unit_quaternion_with<R: Rng + ?Sized>(rng: &mut R) -> Quaternion {
    let raw: [f64; 4] = std::array::from_fn(|_| rng.sample(StandardNormal));
    let norm = raw.iter().map(|v| v * v).sum::<f64>().sqrt();
    Quaternion(raw.map(|v| v / norm))
}

/// Reverse the tensor along each listed axis.
pub fn reflect_axes(tensor: &Tensor, axes: &[usize]) -> candle_core::Result<Tensor> {
    let mut out = tensor.clone();
    for &axis in axes {
        let n = out.dim(axis)?;
        let reversed: Vec<u32> = (0..n as u32).rev().collect();
        let index = Tensor::from_vec(reversed, n, out.device())?;
        out = out.index_select(&index, axis)?;
    }
    Ok(out)
}

/// Reorder the four axes of a `[c, w, w, w]` tensor and materialize the result.
pub fn permute_axes(tensor: &Tensor, order: [usize; 4]) -> candle_core::Result<Tensor> {
    tensor
        .permute((order[0], order[1], order[2], order[3]))?
        .contiguous()
}
