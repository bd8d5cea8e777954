use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input not found: {0}")]
    InputNotFound(String),

    #[error("Invalid raster shape: {0}")]
    InvalidShape(String),

    #[error("Corrupt metadata: {0}")]
    CorruptMetadata(String),

    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    #[error("Failed to encode image: {0}")]
    EncodeError(String),

    #[error("Failed to write output file: {0}")]
    OutputWriteError(String),

    #[error("No input rasters supplied: {0}")]
    EmptyInput(String),

    #[error("Mosaic does not cover the field window: {0}")]
    OutsideWindow(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Projection error: {0}")]
    Projection(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PipelineError {
    /// True when the error only invalidates the frame or tile being processed,
    /// so a batch can record a skip and continue.
    pub fn is_unit_local(&self) -> bool {
        !matches!(self, PipelineError::EmptyInput(_) | PipelineError::InvalidConfig(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
