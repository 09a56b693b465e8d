use crate::config::ConfigError;
use crate::readers::ReadError;

use std::fmt;

/// Scene-fatal errors raised by the correction pipeline.
///
/// Per-pixel retrieval failures are not errors; they are encoded in the
/// pixel flag byte and repaired by the fill stage.
#[derive(Debug)]
pub enum SrError {
    Lut(String),
    Ancillary(String),
    Geolocation(String),
    Scene(String),
    Band(usize),
    Config(ConfigError),
    Read(ReadError),
    Write(String),
    Io(std::io::Error),
}

impl fmt::Display for SrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SrError::Lut(msg) => write!(f, "LUT error: {}", msg),
            SrError::Ancillary(msg) => write!(f, "Ancillary grid error: {}", msg),
            SrError::Geolocation(msg) => write!(f, "Geolocation error: {}", msg),
            SrError::Scene(msg) => write!(f, "Scene error: {}", msg),
            SrError::Band(ib) => write!(f, "Band index {} out of range", ib),
            SrError::Config(e) => write!(f, "{}", e),
            SrError::Read(e) => write!(f, "{}", e),
            SrError::Write(msg) => write!(f, "Failed to write product: {}", msg),
            SrError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for SrError {}

impl From<std::io::Error> for SrError {
    fn from(err: std::io::Error) -> SrError {
        SrError::Io(err)
    }
}

impl From<ConfigError> for SrError {
    fn from(err: ConfigError) -> SrError {
        SrError::Config(err)
    }
}

impl From<ReadError> for SrError {
    fn from(err: ReadError) -> SrError {
        SrError::Read(err)
    }
}
