//! Shared fixtures for the pipeline integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use candle_core::{Device, Tensor};
use voxfrag_common::{Coordinate3D, GridShape, GrowingPointInput, PreGridData, Voxelizer};
use voxfrag_infer::{FingerprintLibrary, FragmentModel};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn shape() -> GridShape {
    GridShape::new(2, 4).unwrap()
}

pub fn growing_point() -> GrowingPointInput {
    GrowingPointInput::new("RECEPTOR", "LIGAND", Coordinate3D::new(-3.0, 12.5, 7.0))
}

/// Counts atoms into voxels around the growing point.
///
/// One receptor atom on channel 0; one receptor atom and one parent atom on
/// channel 1. Positions are clamped into the grid, so every orientation
/// keeps the per-channel totals at `[1, 2]`.
#[derive(Default)]
pub struct CountingVoxelizer {
    pub pre_grid_calls: AtomicUsize,
    pub channel_calls: AtomicUsize,
}

impl CountingVoxelizer {
    pub fn pre_grid_calls(&self) -> usize {
        self.pre_grid_calls.load(Ordering::SeqCst)
    }

    pub fn channel_calls(&self) -> usize {
        self.channel_calls.load(Ordering::SeqCst)
    }
}

impl Voxelizer for CountingVoxelizer {
    fn pre_grid_gen(&self, input: &GrowingPointInput) -> voxfrag_common::Result<PreGridData> {
        self.pre_grid_calls.fetch_add(1, Ordering::SeqCst);
        let c = input.center;
        Ok(PreGridData {
            receptor_coords: vec![
                c.translate(&Coordinate3D::new(1.5, 0.2, -0.7)),
                c.translate(&Coordinate3D::new(-0.4, 1.1, 0.9)),
            ],
            receptor_layers: vec![0, 1],
            parent_coords: vec![c.translate(&Coordinate3D::new(0.3, -1.6, 0.1))],
            parent_layers: vec![1],
            connection: c,
        })
    }

    fn make_grid_for_channel(&self, data: &PreGridData, channel: usize, shape: GridShape) -> voxfrag_common::Result<Vec<f32>> {
        self.channel_calls.fetch_add(1, Ordering::SeqCst);
        let w = shape.width;
        let half = w as f64 / 2.0;
        let idx = |v: f64| (v + half).floor().clamp(0.0, w as f64 - 1.0) as usize;

        let mut grid = vec![0.0; shape.len()];
        let atoms = data
            .receptor_coords
            .iter()
            .zip(&data.receptor_layers)
            .chain(data.parent_coords.iter().zip(&data.parent_layers));
        for (coord, _) in atoms.filter(|(_, layer)| **layer as usize == channel) {
            let rel = coord.offset_from(&data.connection);
            grid[channel * shape.channel_len() + (idx(rel.x) * w + idx(rel.y)) * w + idx(rel.z)] += 1.0;
        }
        Ok(grid)
    }
}

/// Sums each channel of each input grid, giving a `[batch, channels]` output.
#[derive(Default)]
pub struct ChannelSumModel {
    fail_on_call: Option<usize>,
    calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    inputs: Mutex<Vec<Vec<f32>>>,
}

impl ChannelSumModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `k`-th (1-based) prediction with an out-of-memory error.
    pub fn failing_on(k: usize) -> Self {
        Self { fail_on_call: Some(k), ..Self::default() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    /// Flattened input batches in call order.
    pub fn inputs(&self) -> Vec<Vec<f32>> {
        self.inputs.lock().unwrap().clone()
    }
}

impl FragmentModel for ChannelSumModel {
    fn predict(&self, batch: &Tensor) -> candle_core::Result<Tensor> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(candle_core::Error::Msg("CUDA_ERROR_OUT_OF_MEMORY".to_string()));
        }
        self.batch_sizes.lock().unwrap().push(batch.dims()[0]);
        self.inputs.lock().unwrap().push(batch.flatten_all()?.to_vec1::<f32>()?);
        batch.flatten_from(2)?.sum(2)
    }

    fn name(&self) -> &str {
        "channel-sum"
    }
}

pub fn library(entries: &[(&str, &[f32])]) -> Arc<FingerprintLibrary> {
    let entries = entries.iter().map(|(s, v)| (s.to_string(), v.to_vec())).collect();
    Arc::new(FingerprintLibrary::from_entries(entries, &Device::Cpu).unwrap())
}

/// Three fragments against the `[1, 2]` embedding: one parallel, one
/// orthogonal, one in between.
pub fn reference_library() -> Arc<FingerprintLibrary> {
    library(&[("*C", &[2.0, -1.0]), ("*CC", &[1.0, 2.0]), ("*O", &[0.0, 1.0])])
}
