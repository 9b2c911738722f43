//! Voxel grid shape contract and the voxelizer collaborator interface.
//!
//! The core never computes grids itself. It asks a [`Voxelizer`] for
//! pre-grid data once per run, may rotate the coordinate lists inside it,
//! and then asks for one grid per channel plus a final merge.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GridError, Result};
use crate::geometry::{Coordinate3D, GrowingPointInput};

/// Shape of a multi-channel cubic voxel grid: `[channels, width, width, width]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    #[serde(default = "default_channels")]
    pub channels: usize,
    #[serde(default = "default_width")]
    pub width: usize,
}

fn default_channels() -> usize { 9 }
fn default_width() -> usize { 24 }

impl Default for GridShape {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            width: default_width(),
        }
    }
}

impl GridShape {
    pub fn new(channels: usize, width: usize) -> Result<Self> {
        if channels == 0 || width == 0 {
            return Err(GridError::InvalidShape(format!(
                "channels and width must be positive (got {channels}x{width})"
            )));
        }
        Ok(Self { channels, width })
    }

    /// Number of values in a single channel (`width³`).
    pub fn channel_len(&self) -> usize {
        self.width * self.width * self.width
    }

    /// Number of values in the whole flattened grid.
    pub fn len(&self) -> usize {
        self.channels * self.channel_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dims(&self) -> (usize, usize, usize, usize) {
        (self.channels, self.width, self.width, self.width)
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {w}, {w}, {w}]", self.channels, w = self.width)
    }
}

/// A flattened, row-major voxel grid. The length always matches `shape.len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid {
    shape: GridShape,
    values: Vec<f32>,
}

impl VoxelGrid {
    pub fn new(shape: GridShape, values: Vec<f32>) -> Result<Self> {
        if values.len() != shape.len() {
            return Err(GridError::ShapeMismatch {
                shape: shape.to_string(),
                expected: shape.len(),
                actual: values.len(),
            });
        }
        Ok(Self { shape, values })
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }
}

/// Atom data prepared by the voxelizer ahead of grid generation.
///
/// The core only ever rewrites `receptor_coords` and `parent_coords`
/// (rotation about the growing point); layers and the connection point are
/// handed back to the voxelizer untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreGridData {
    pub receptor_coords: Vec<Coordinate3D>,
    /// Per-atom channel layer assignment for the receptor.
    pub receptor_layers: Vec<u32>,
    pub parent_coords: Vec<Coordinate3D>,
    /// Per-atom channel layer assignment for the parent ligand.
    pub parent_layers: Vec<u32>,
    /// The growing point the grid is centered on.
    pub connection: Coordinate3D,
}

impl PreGridData {
    pub fn atom_count(&self) -> usize {
        self.receptor_coords.len() + self.parent_coords.len()
    }
}

/// External grid builder.
///
/// Implementations must be deterministic for identical `PreGridData`.
/// The reflective augmentation relies on that to cache one grid per run.
pub trait Voxelizer: Send + Sync {
    /// Parse structures and assign atoms to channel layers.
    fn pre_grid_gen(&self, input: &GrowingPointInput) -> Result<PreGridData>;

    /// Build the flattened grid contribution of a single channel.
    fn make_grid_for_channel(&self, data: &PreGridData, channel: usize, shape: GridShape) -> Result<Vec<f32>>;

    /// Merge per-channel grids into one flattened grid.
    ///
    /// Each channel grid spans the full `[channels, w, w, w]` layout with only
    /// its own channel populated, so the default merge is an element-wise sum.
    fn sum_channel_grids(&self, grids: Vec<Vec<f32>>, shape: GridShape) -> Result<Vec<f32>> {
        let mut merged = vec![0.0f32; shape.len()];
        for (channel, grid) in grids.iter().enumerate() {
            if grid.len() != merged.len() {
                return Err(GridError::ShapeMismatch {
                    shape: format!("channel {channel} of {shape}"),
                    expected: merged.len(),
                    actual: grid.len(),
                });
            }
            for (acc, v) in merged.iter_mut().zip(grid) {
                *acc += *v;
            }
        }
        Ok(merged)
    }
}

/// Run every channel through the voxelizer and merge the result.
pub fn build_voxel_grid<V>(voxelizer: &V, data: &PreGridData, shape: GridShape) -> Result<VoxelGrid>
where
    V: Voxelizer + ?Sized,
{
    let mut grids = Vec::with_capacity(shape.channels);
    for channel in 0..shape.channels {
        grids.push(voxelizer.make_grid_for_channel(data, channel, shape)?);
    }
    let merged = voxelizer.sum_channel_grids(grids, shape)?;
    debug!(atoms = data.atom_count(), shape = %shape, "Voxel grid built");
    VoxelGrid::new(shape, merged)
}
