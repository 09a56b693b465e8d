//! Product writers: scaled surface reflectance and the aerosol QA byte.

use crate::error::SrError;

use std::fs::File;
use std::path::Path;

use tiff::encoder::{colortype, TiffEncoder};

/// SR product scaling: DN = (rho + 0.2) / 2.75e-5, clamped to u16.
const SR_OFFSET: f32 = 0.2;
const SR_SCALE: f32 = 2.75e-5;

/// Writes one surface-reflectance band as a scaled u16 GeoTIFF plane.
pub fn write_sr_band<P: AsRef<Path>>(
    path: P,
    width: u32,
    height: u32,
    data: &[f32],
) -> Result<(), SrError> {
    let path = path.as_ref();
    if data.len() != width as usize * height as usize {
        return Err(SrError::Write(format!(
            "band has {} pixels, expected {}x{}",
            data.len(),
            width,
            height
        )));
    }

    let scaled: Vec<u16> = data
        .iter()
        .map(|&v| (((v + SR_OFFSET) / SR_SCALE).round()).clamp(0.0, 65535.0) as u16)
        .collect();

    let mut file = File::create(path)
        .map_err(|e| SrError::Write(format!("{}: {}", path.display(), e)))?;
    let mut encoder = TiffEncoder::new(&mut file)
        .map_err(|e| SrError::Write(format!("{}: {}", path.display(), e)))?;
    encoder
        .write_image::<colortype::Gray16>(width, height, &scaled)
        .map_err(|e| SrError::Write(format!("{}: {}", path.display(), e)))?;

    Ok(())
}

/// Writes the aerosol QA / pixel-flag byte unscaled.
pub fn write_qa_band<P: AsRef<Path>>(
    path: P,
    width: u32,
    height: u32,
    data: &[u8],
) -> Result<(), SrError> {
    let path = path.as_ref();
    if data.len() != width as usize * height as usize {
        return Err(SrError::Write(format!(
            "QA band has {} pixels, expected {}x{}",
            data.len(),
            width,
            height
        )));
    }

    let mut file = File::create(path)
        .map_err(|e| SrError::Write(format!("{}: {}", path.display(), e)))?;
    let mut encoder = TiffEncoder::new(&mut file)
        .map_err(|e| SrError::Write(format!("{}: {}", path.display(), e)))?;
    encoder
        .write_image::<colortype::Gray8>(width, height, data)
        .map_err(|e| SrError::Write(format!("{}: {}", path.display(), e)))?;

    Ok(())
}
