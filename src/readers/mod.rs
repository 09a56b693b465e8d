pub mod geotiff;

pub use geotiff::read_dn;

use std::fmt;

/// A digital-number raster as read from disk, before any scaling.
#[derive(Debug)]
pub struct DnRaster {
    pub width: u32,
    pub height: u32,
    pub data: Vec<i32>,
}

#[derive(Debug)]
pub enum ReadError {
    GeoTiff(String),
    Format(String),
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::GeoTiff(msg) => write!(f, "GeoTIFF read error: {}", msg),
            ReadError::Format(msg) => write!(f, "Unsupported raster format: {}", msg),
        }
    }
}

impl std::error::Error for ReadError {}

impl DnRaster {
    pub fn npix(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Applies a linear DN scaling into physical units.
    pub fn to_f32_scaled(&self, mult: f32, add: f32) -> Vec<f32> {
        self.data.iter().map(|&dn| dn as f32 * mult + add).collect()
    }

    pub fn to_u16(&self) -> Vec<u16> {
        self.data.iter().map(|&dn| dn.clamp(0, 65535) as u16).collect()
    }

    pub fn to_i16(&self) -> Vec<i16> {
        self.data
            .iter()
            .map(|&dn| dn.clamp(i16::MIN as i32, i16::MAX as i32) as i16)
            .collect()
    }
}

impl fmt::Display for DnRaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DnRaster {}x{} ({} values)",
            self.width,
            self.height,
            self.data.len()
        )
    }
}
