//! Cartesian geometry for receptor/ligand atoms and the growing point.

use serde::{Deserialize, Serialize};

/// A point in 3D space (Ångström units in practice, but nothing here cares).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coordinate3D {
    pub const ORIGIN: Coordinate3D = Coordinate3D { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Component-wise difference `self - other`.
    pub fn offset_from(&self, other: &Coordinate3D) -> Coordinate3D {
        Coordinate3D::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    /// Component-wise sum `self + other`.
    pub fn translate(&self, by: &Coordinate3D) -> Coordinate3D {
        Coordinate3D::new(self.x + by.x, self.y + by.y, self.z + by.z)
    }

    pub fn distance(&self, other: &Coordinate3D) -> f64 {
        let d = self.offset_from(other);
        (d.x * d.x + d.y * d.y + d.z * d.z).sqrt()
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Coordinate3D {
    fn from(v: [f64; 3]) -> Self {
        Coordinate3D::new(v[0], v[1], v[2])
    }
}

/// Everything the voxelizer needs to lay out one growing-point environment.
///
/// `receptor` and `ligand` are the raw structure texts (PDB/SDF) exactly as
/// the host loaded them; only the voxelizer interprets them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowingPointInput {
    pub receptor: String,
    pub ligand: String,
    pub center: Coordinate3D,
}

impl GrowingPointInput {
    pub fn new(receptor: impl Into<String>, ligand: impl Into<String>, center: Coordinate3D) -> Self {
        Self {
            receptor: receptor.into(),
            ligand: ligand.into(),
            center,
        }
    }
}
