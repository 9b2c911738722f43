//! voxfrag-common: shared types used across the voxfrag crates.
//!
//! Holds the geometry and voxel-grid vocabulary plus the [`Voxelizer`]
//! seam through which the inference core reaches the grid builder.

pub mod error;
pub mod geometry;
pub mod grid;

// Re-export commonly used types
pub use error::{GridError, Result};
pub use geometry::{Coordinate3D, GrowingPointInput};
pub use grid::{build_voxel_grid, GridShape, PreGridData, VoxelGrid, Voxelizer};
