use std::fmt;

/// Errors surfaced by the editing engine.
///
/// Bounds violations and missing layers are not errors (they are recovered
/// locally as no-ops); everything here means history data or a snapshot no
/// longer matches the buffer it is meant to restore.
#[derive(Debug)]
pub enum EngineError {
    /// A whole-buffer or canvas-size action was replayed before its snapshot was captured.
    MissingSnapshot { label: String },
    /// Raw pixel data does not match `width * height * 4`.
    BufferSizeMismatch { expected: usize, actual: usize },
    /// The snapshot codec failed to encode or decode.
    Codec(String),
    Io(std::io::Error),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::MissingSnapshot { label } => {
                write!(f, "history action '{}' has no captured snapshot", label)
            }
            EngineError::BufferSizeMismatch { expected, actual } => {
                write!(f, "buffer size mismatch: expected {} bytes, got {}", expected, actual)
            }
            EngineError::Codec(e) => write!(f, "snapshot codec error: {}", e),
            EngineError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e)
    }
}

impl From<image::ImageError> for EngineError {
    fn from(e: image::ImageError) -> Self {
        EngineError::Codec(e.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for EngineError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        EngineError::Codec(e.to_string())
    }
}
