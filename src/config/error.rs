use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Satellite(String),
    Window(usize),
    BandCount(usize),
    Threshold(String),
    OutputDirectory(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {}", e),
            ConfigError::Json(e) => write!(f, "Failed to parse JSON: {}", e),
            ConfigError::Satellite(s) => {
                write!(f, "Unknown satellite '{}', expected landsat8 or landsat9", s)
            }
            ConfigError::Window(w) => {
                write!(f, "aero_window must be an even value >= 2, got {}", w)
            }
            ConfigError::BandCount(n) => {
                write!(f, "toa_bands must list 7 reflective bands, got {}", n)
            }
            ConfigError::Threshold(msg) => write!(f, "Inconsistent tunables: {}", msg),
            ConfigError::OutputDirectory(dir) => {
                write!(f, "Output directory does not exist: {}", dir)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> ConfigError {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> ConfigError {
        ConfigError::Json(err)
    }
}
