use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColorStackError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Image dimensions cannot be zero")]
    ZeroDimension,

    #[error("Pixel buffer length {len} does not match {width}x{height} RGBA")]
    DimensionMismatch {
        len: usize,
        width: u32,
        height: u32,
    },

    #[error("Band count {requested} outside supported range {min}..={max}")]
    BandCount {
        requested: usize,
        min: usize,
        max: usize,
    },

    #[error("Mesh needs at least 2x2 pixels, got {width}x{height}")]
    MeshTooSmall { width: u32, height: u32 },

    #[error("Height table has {len} entries but raster uses band {band}")]
    HeightTable { band: usize, len: usize },

    #[error("Invalid hex color: {0:?}")]
    InvalidHex(String),

    #[error("Response for request {token} superseded by request {latest}")]
    Superseded { token: u64, latest: u64 },

    #[error("Worker is no longer running")]
    WorkerClosed,
}

pub type Result<T> = std::result::Result<T, ColorStackError>;

// Errors cross the worker boundary as plain strings
impl serde::Serialize for ColorStackError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
