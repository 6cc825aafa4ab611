use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("could not find fixture \"{}\"", .path.display())]
    Fixture { path: PathBuf },

    #[error("Content type is wrong: expected {expected}, got {}", .actual.as_deref().unwrap_or("<none>"))]
    UnexpectedContentType {
        expected: String,
        actual: Option<String>,
    },

    #[error("malformed header line: {line:?}")]
    MalformedHeaders { line: String },

    #[error("{message}")]
    DimensionMismatch { message: String },

    #[error("{message}")]
    ContentMismatch { message: String },

    #[error("failed to process image \"{}\": {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("i/o error on \"{}\": {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("server request failed: {0:#}")]
    Server(anyhow::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CheckError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CheckError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        CheckError::Image {
            path: path.into(),
            source,
        }
    }

    /// Whether this error comes from comparing images, as opposed to the
    /// harness failing to run the comparison at all.
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self,
            CheckError::DimensionMismatch { .. } | CheckError::ContentMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CheckError>;
