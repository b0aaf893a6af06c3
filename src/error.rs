use thiserror::Error;

use crate::domain::LayerType;

/// Errors raised by the capture session and its backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Cannot open capture while already busy")]
    AlreadyOpen,

    #[error("Cannot close capture without an open capture")]
    NotOpen,

    #[error("Could not open capture '{source_name}', {message}")]
    Open {
        source_name: String,
        message: String,
    },

    #[error("Could not activate filter '{filter}', {message}")]
    Filter { filter: String, message: String },

    #[error("Capture reader failed, {0}")]
    Read(String),

    #[error("Could not list capture interfaces, {0}")]
    Interfaces(String),
}

/// Errors raised while parsing a frame into its layer stack.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The next layer is of a kind the parser does not know.
    #[error("Unrecognized {what} 0x{value:04x}")]
    UnrecognizedLayer { what: &'static str, value: u32 },

    #[error("Truncated {layer} layer: need {needed} bytes, have {available}")]
    Truncated {
        layer: LayerType,
        needed: usize,
        available: usize,
    },

    #[error("Malformed {layer} layer: {message}")]
    Malformed { layer: LayerType, message: String },
}

impl ParseError {
    /// Whether this is the expected, non-structural "unknown layer" case.
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, ParseError::UnrecognizedLayer { .. })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid value for '{key}': {value}")]
    InvalidValue { key: String, value: String },
}
