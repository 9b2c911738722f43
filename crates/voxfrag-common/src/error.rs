use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("Voxelizer error: {0}")]
    Voxelizer(String),

    #[error("Grid shape mismatch: expected {expected} values for {shape}, got {actual}")]
    ShapeMismatch {
        shape: String,
        expected: usize,
        actual: usize,
    },

    #[error("Channel {channel} out of range (grid has {channels} channels)")]
    ChannelOutOfRange { channel: usize, channels: usize },

    #[error("Invalid grid shape: {0}")]
    InvalidShape(String),
}

pub type Result<T> = std::result::Result<T, GridError>;
