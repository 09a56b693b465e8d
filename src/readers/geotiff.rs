use super::{DnRaster, ReadError};

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};

/// Reads a single-band integer raster (Level-1 DN, QA word, angle grid or
/// ancillary plane) into a [`DnRaster`].
pub fn read_dn<P: AsRef<Path>>(path: P) -> Result<DnRaster, ReadError> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| ReadError::GeoTiff(format!("Failed to open {}: {}", path.display(), e)))?;

    let reader = BufReader::new(file);

    let mut decoder = Decoder::new(reader)
        .map_err(|e| ReadError::GeoTiff(format!("Failed to decode TIFF: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| ReadError::GeoTiff(format!("Failed to get dimensions: {}", e)))?;

    let data: Vec<i32> = match decoder
        .read_image()
        .map_err(|e| ReadError::GeoTiff(format!("Failed to read image: {}", e)))?
    {
        DecodingResult::U8(data) => data.iter().map(|&x| x as i32).collect(),
        DecodingResult::U16(data) => data.iter().map(|&x| x as i32).collect(),
        DecodingResult::I8(data) => data.iter().map(|&x| x as i32).collect(),
        DecodingResult::I16(data) => data.iter().map(|&x| x as i32).collect(),
        DecodingResult::I32(data) => data,
        _ => {
            return Err(ReadError::Format(
                "expected an integer sample format".to_string(),
            ));
        }
    };

    Ok(DnRaster {
        width,
        height,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tiff::encoder::{colortype, TiffEncoder};

    #[test]
    fn test_read_u16_raster_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dn.tif");

        let values: Vec<u16> = (0..12).map(|v| v * 100).collect();
        {
            let mut file = std::fs::File::create(&path).unwrap();
            let mut encoder = TiffEncoder::new(&mut file).unwrap();
            encoder
                .write_image::<colortype::Gray16>(4, 3, &values)
                .unwrap();
        }

        let raster = read_dn(&path).unwrap();
        assert_eq!((raster.width, raster.height), (4, 3));
        assert_eq!(raster.npix(), 12);
        assert_eq!(raster.data[5], 500);

        let scaled = raster.to_f32_scaled(0.0001, 0.0);
        assert!((scaled[5] - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(read_dn("/nonexistent/raster.tif").is_err());
    }
}
