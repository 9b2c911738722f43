//! Geometric augmentation of the growing-point voxel grid.
//!
//! Two strategies share one constructor (voxelizer pre-grid data is always
//! computed up front) and differ only in how each new variant is produced:
//!
//! - [`AugmentationKind::Reflective`] voxelizes once and walks a fixed,
//!   ordered table of 8 axis reflections × 6 axis permutations over that
//!   single cached tensor. Cheap, but a finite subset of orientations.
//! - [`AugmentationKind::FullRotation`] draws a random unit quaternion for
//!   every variant, rotates the receptor and parent coordinates about the
//!   growing point, and voxelizes again.

use std::sync::Arc;

use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use voxfrag_common::{build_voxel_grid, Coordinate3D, GridShape, GrowingPointInput, PreGridData, Voxelizer};

use crate::rotation::{permute_axes, random_unit_quaternion_with, reflect_axes, rotate_coordinates, Quaternion};
use crate::Result;

/// Spatial axes to reverse, in `[channel, x, y, z]` axis numbering.
pub const REFLECTIONS: [&[usize]; 8] = [
    &[],
    &[1],
    &[2],
    &[3],
    &[1, 2],
    &[1, 3],
    &[2, 3],
    &[1, 2, 3],
];

/// Axis orders; the channel axis always stays first.
pub const PERMUTATIONS: [[usize; 4]; 6] = [
    [0, 1, 2, 3],
    [0, 1, 3, 2],
    [0, 2, 1, 3],
    [0, 2, 3, 1],
    [0, 3, 1, 2],
    [0, 3, 2, 1],
];

/// Which augmentation strategy a run uses. Fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AugmentationKind {
    Reflective,
    FullRotation,
}

impl AugmentationKind {
    pub fn from_full_rotation(full_rotation_at_every_inference: bool) -> Self {
        if full_rotation_at_every_inference {
            AugmentationKind::FullRotation
        } else {
            AugmentationKind::Reflective
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AugmentationKind::Reflective => "reflective",
            AugmentationKind::FullRotation => "full_rotation",
        }
    }
}

/// One (reflection, permutation) pair from the reflective schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridTransform {
    pub reflect: &'static [usize],
    pub permute: [usize; 4],
}

impl GridTransform {
    pub fn apply(&self, tensor: &Tensor) -> candle_core::Result<Tensor> {
        permute_axes(&reflect_axes(tensor, self.reflect)?, self.permute)
    }
}

/// Deterministic walk over all reflection/permutation pairs.
///
/// Reflections are the outer loop, permutations the inner one. Past the
/// 48th entry the walk starts over from the identity.
#[derive(Debug, Clone, Default)]
pub struct ReflectionSchedule {
    cursor: usize,
}

impl ReflectionSchedule {
    pub const LEN: usize = REFLECTIONS.len() * PERMUTATIONS.len();

    pub fn new() -> Self {
        Self { cursor: 0 }
    }

    pub fn transform_at(index: usize) -> GridTransform {
        let i = index % Self::LEN;
        GridTransform {
            reflect: REFLECTIONS[i / PERMUTATIONS.len()],
            permute: PERMUTATIONS[i % PERMUTATIONS.len()],
        }
    }

    /// Hand out the next transform, wrapping after the last one.
    pub fn advance(&mut self) -> GridTransform {
        let transform = Self::transform_at(self.cursor);
        self.cursor = (self.cursor + 1) % Self::LEN;
        transform
    }
}

impl Iterator for ReflectionSchedule {
    type Item = GridTransform;

    fn next(&mut self) -> Option<GridTransform> {
        Some(self.advance())
    }
}

enum Variant {
    Reflective {
        base: Tensor,
        schedule: ReflectionSchedule,
        last: Option<GridTransform>,
    },
    FullRotation {
        rng: StdRng,
    },
}

/// Produces augmented `[channels, w, w, w]` tensors for one pipeline run.
///
/// Owns its cached state exclusively; a concurrent run needs its own instance.
pub struct AugmentationStrategy {
    voxelizer: Arc<dyn Voxelizer>,
    pre_grid: PreGridData,
    center: Coordinate3D,
    shape: GridShape,
    device: Device,
    variant: Variant,
}

impl AugmentationStrategy {
    /// Compute pre-grid data and run the strategy-specific setup.
    ///
    /// `seed` only matters for [`AugmentationKind::FullRotation`].
    pub fn new(
        kind: AugmentationKind,
        voxelizer: Arc<dyn Voxelizer>,
        input: &GrowingPointInput,
        shape: GridShape,
        device: Device,
        seed: Option<u64>,
    ) -> Result<Self> {
        let pre_grid = voxelizer.pre_grid_gen(input)?;
        debug!(
            receptor_atoms = pre_grid.receptor_coords.len(),
            parent_atoms = pre_grid.parent_coords.len(),
            "Pre-grid data ready"
        );

        let variant = Self::setup(kind, seed, || {
            voxelize(voxelizer.as_ref(), &pre_grid, &input.center, shape, &device, None)
        })?;
        info!(strategy = kind.as_str(), shape = %shape, "Augmentation strategy ready");
        Ok(Self {
            voxelizer,
            pre_grid,
            center: input.center,
            shape,
            device,
            variant,
        })
    }

    fn setup(kind: AugmentationKind, seed: Option<u64>, base: impl FnOnce() -> Result<Tensor>) -> Result<Variant> {
        Ok(match kind {
            // Only one grid is ever needed; every variant derives from it.
            AugmentationKind::Reflective => Variant::Reflective {
                base: base()?,
                schedule: ReflectionSchedule::new(),
                last: None,
            },
            AugmentationKind::FullRotation => Variant::FullRotation {
                rng: match seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                },
            },
        })
    }

    /// Voxelize after rotating about the growing point. Rotation always
    /// starts from the pristine pre-grid coordinates.
    fn build_rotated_tensor(&self, rotation: &Quaternion) -> Result<Tensor> {
        voxelize(self.voxelizer.as_ref(), &self.pre_grid, &self.center, self.shape, &self.device, Some(rotation))
    }

    /// Produce the next augmented tensor.
    pub fn make_new_variant(&mut self) -> Result<Tensor> {
        let rotation = match &mut self.variant {
            Variant::Reflective { base, schedule, last } => {
                let transform = schedule.advance();
                *last = Some(transform);
                return Ok(transform.apply(base)?);
            }
            Variant::FullRotation { rng } => random_unit_quaternion_with(rng),
        };
        self.build_rotated_tensor(&rotation)
    }

    pub fn kind(&self) -> AugmentationKind {
        match self.variant {
            Variant::Reflective { .. } => AugmentationKind::Reflective,
            Variant::FullRotation { .. } => AugmentationKind::FullRotation,
        }
    }

    /// The transform behind the most recent reflective variant.
    pub fn last_transform(&self) -> Option<GridTransform> {
        match &self.variant {
            Variant::Reflective { last, .. } => *last,
            Variant::FullRotation { .. } => None,
        }
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

/// Voxelize `pre_grid` (optionally rotated about `center`) into a
/// `[channels, w, w, w]` tensor.
fn voxelize(
    voxelizer: &dyn Voxelizer,
    pre_grid: &PreGridData,
    center: &Coordinate3D,
    shape: GridShape,
    device: &Device,
    rotation: Option<&Quaternion>,
) -> Result<Tensor> {
    let grid = match rotation {
        Some(q) => {
            let rotated = PreGridData {
                receptor_coords: rotate_coordinates(&pre_grid.receptor_coords, q, center),
                parent_coords: rotate_coordinates(&pre_grid.parent_coords, q, center),
                ..pre_grid.clone()
            };
            build_voxel_grid(voxelizer, &rotated, shape)?
        }
        None => build_voxel_grid(voxelizer, pre_grid, shape)?,
    };
    Ok(Tensor::from_vec(grid.into_values(), shape.dims(), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use voxfrag_common::GridError;

    /// Drops each atom into the voxel it falls in, one channel per layer.
    struct PointVoxelizer {
        channel_calls: AtomicUsize,
    }

    impl PointVoxelizer {
        fn new() -> Self {
            Self { channel_calls: AtomicUsize::new(0) }
        }
    }

    impl Voxelizer for PointVoxelizer {
        fn pre_grid_gen(&self, input: &GrowingPointInput) -> voxfrag_common::Result<PreGridData> {
            let c = input.center;
            Ok(PreGridData {
                receptor_coords: vec![c.translate(&Coordinate3D::new(1.0, 0.0, 0.0)), c.translate(&Coordinate3D::new(0.0, -1.0, 1.0))],
                receptor_layers: vec![0, 1],
                parent_coords: vec![c.translate(&Coordinate3D::new(0.0, 1.0, 0.0))],
                parent_layers: vec![1],
                connection: c,
            })
        }

        fn make_grid_for_channel(&self, data: &PreGridData, channel: usize, shape: GridShape) -> voxfrag_common::Result<Vec<f32>> {
            if channel >= shape.channels {
                return Err(GridError::ChannelOutOfRange { channel, channels: shape.channels });
            }
            self.channel_calls.fetch_add(1, Ordering::SeqCst);
            let mut grid = vec![0.0; shape.len()];
            let half = shape.width as f64 / 2.0;
            let atoms = data
                .receptor_coords
                .iter()
                .zip(&data.receptor_layers)
                .chain(data.parent_coords.iter().zip(&data.parent_layers));
            for (coord, layer) in atoms {
                if *layer as usize != channel {
                    continue;
                }
                let rel = coord.offset_from(&data.connection);
                let idx = |v: f64| (v + half).floor().clamp(0.0, shape.width as f64 - 1.0) as usize;
                let (x, y, z) = (idx(rel.x), idx(rel.y), idx(rel.z));
                let w = shape.width;
                grid[channel * shape.channel_len() + (x * w + y) * w + z] += 1.0;
            }
            Ok(grid)
        }
    }

    fn input() -> GrowingPointInput {
        GrowingPointInput::new("REC", "LIG", Coordinate3D::new(10.0, 10.0, 10.0))
    }

    fn strategy(kind: AugmentationKind, voxelizer: Arc<PointVoxelizer>, seed: Option<u64>) -> AugmentationStrategy {
        let shape = GridShape::new(2, 4).unwrap();
        AugmentationStrategy::new(kind, voxelizer, &input(), shape, Device::Cpu, seed).unwrap()
    }

    fn values(t: &Tensor) -> Vec<f32> {
        t.flatten_all().unwrap().to_vec1::<f32>().unwrap()
    }

    #[test]
    fn test_schedule_order_reflections_outer() {
        let first: Vec<GridTransform> = ReflectionSchedule::new().take(7).collect();
        assert_eq!(first[0], GridTransform { reflect: &[], permute: [0, 1, 2, 3] });
        assert_eq!(first[5], GridTransform { reflect: &[], permute: [0, 3, 2, 1] });
        assert_eq!(first[6], GridTransform { reflect: &[1], permute: [0, 1, 2, 3] });
        assert_eq!(ReflectionSchedule::transform_at(47), GridTransform { reflect: &[1, 2, 3], permute: [0, 3, 2, 1] });
    }

    #[test]
    fn test_schedule_covers_48_distinct_pairs_then_cycles() {
        let all: Vec<GridTransform> = ReflectionSchedule::new().take(96).collect();
        let distinct: HashSet<(Vec<usize>, [usize; 4])> =
            all[..48].iter().map(|t| (t.reflect.to_vec(), t.permute)).collect();
        assert_eq!(distinct.len(), ReflectionSchedule::LEN);
        assert_eq!(all[..48], all[48..]);
    }

    #[test]
    fn test_reflective_voxelizes_once() {
        let vox = Arc::new(PointVoxelizer::new());
        let mut s = strategy(AugmentationKind::Reflective, vox.clone(), None);
        for _ in 0..10 {
            let t = s.make_new_variant().unwrap();
            assert_eq!(t.dims(), &[2, 4, 4, 4]);
        }
        assert_eq!(vox.channel_calls.load(Ordering::SeqCst), 2);
        assert_eq!(s.kind(), AugmentationKind::Reflective);
    }

    #[test]
    fn test_reflective_first_variant_is_base_grid() {
        let vox = Arc::new(PointVoxelizer::new());
        let mut s = strategy(AugmentationKind::Reflective, vox.clone(), None);
        let first = s.make_new_variant().unwrap();
        let data = vox.pre_grid_gen(&input()).unwrap();
        let grid = build_voxel_grid(vox.as_ref(), &data, GridShape::new(2, 4).unwrap()).unwrap();
        assert_eq!(values(&first), grid.values());
        assert_eq!(s.last_transform(), Some(ReflectionSchedule::transform_at(0)));
    }

    #[test]
    fn test_reflective_is_reproducible() {
        let run = || {
            let mut s = strategy(AugmentationKind::Reflective, Arc::new(PointVoxelizer::new()), None);
            (0..20)
                .map(|_| {
                    let t = s.make_new_variant().unwrap();
                    (s.last_transform().unwrap(), values(&t))
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_reflective_wraps_to_identity_after_full_schedule() {
        let mut s = strategy(AugmentationKind::Reflective, Arc::new(PointVoxelizer::new()), None);
        let first = values(&s.make_new_variant().unwrap());
        for i in 1..ReflectionSchedule::LEN {
            s.make_new_variant().unwrap();
            assert_eq!(s.last_transform(), Some(ReflectionSchedule::transform_at(i)));
        }
        let wrapped = values(&s.make_new_variant().unwrap());
        assert_eq!(s.last_transform(), Some(ReflectionSchedule::transform_at(0)));
        assert_eq!(wrapped, first);
    }

    #[test]
    fn test_constructor_prepares_only_selected_strategy() {
        let vox = Arc::new(PointVoxelizer::new());
        let reflective = strategy(AugmentationKind::Reflective, vox.clone(), Some(9));
        assert_eq!(reflective.kind(), AugmentationKind::Reflective);
        assert_eq!(vox.channel_calls.load(Ordering::SeqCst), 2);

        let rotating = strategy(AugmentationKind::FullRotation, vox.clone(), Some(9));
        assert_eq!(rotating.kind(), AugmentationKind::FullRotation);
        assert_eq!(vox.channel_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_variants_preserve_occupancy() {
        let mut s = strategy(AugmentationKind::Reflective, Arc::new(PointVoxelizer::new()), None);
        for _ in 0..48 {
            let total: f32 = values(&s.make_new_variant().unwrap()).iter().sum();
            assert_eq!(total, 3.0);
        }
    }

    #[test]
    fn test_full_rotation_revoxelizes_every_variant() {
        let vox = Arc::new(PointVoxelizer::new());
        let mut s = strategy(AugmentationKind::FullRotation, vox.clone(), Some(5));
        assert_eq!(vox.channel_calls.load(Ordering::SeqCst), 0);
        for _ in 0..3 {
            s.make_new_variant().unwrap();
        }
        assert_eq!(vox.channel_calls.load(Ordering::SeqCst), 6);
        assert!(s.last_transform().is_none());
    }

    #[test]
    fn test_full_rotation_seed_reproducible() {
        let run = |seed| {
            let mut s = strategy(AugmentationKind::FullRotation, Arc::new(PointVoxelizer::new()), Some(seed));
            (0..5).map(|_| values(&s.make_new_variant().unwrap())).collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
    }
}
