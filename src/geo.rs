use crate::error::SrError;

pub const RAD2DEG: f64 = 57.29577951308232;

/// Image-space coordinate in (line, sample) order, pixel units.
#[derive(Debug, Clone, Copy)]
pub struct ImgCoord {
    pub l: f32,
    pub s: f32,
}

/// Geographic coordinate in radians.
#[derive(Debug, Clone, Copy)]
pub struct GeoCoord {
    pub lat: f64,
    pub lon: f64,
}

impl GeoCoord {
    pub fn lat_deg(&self) -> f32 {
        (self.lat * RAD2DEG) as f32
    }

    pub fn lon_deg(&self) -> f32 {
        (self.lon * RAD2DEG) as f32
    }
}

/// Mapping from image space to geographic space.
///
/// A failure here signals corrupt scene metadata and is fatal for the scene.
pub trait FromSpace {
    fn from_space(&self, img: ImgCoord) -> Result<GeoCoord, SrError>;
}

/// Affine geolocation for scenes on a geographic lat/lon grid.
///
/// The geotransform follows the usual raster convention:
/// `[ul_lon, dlon_per_samp, dlon_per_line, ul_lat, dlat_per_samp, dlat_per_line]`
/// in degrees.
#[derive(Debug, Clone)]
pub struct MapGrid {
    geotransform: [f64; 6],
}

impl MapGrid {
    pub fn new(geotransform: [f64; 6]) -> Result<Self, SrError> {
        if geotransform[1] == 0.0 || geotransform[5] == 0.0 {
            return Err(SrError::Geolocation(
                "geotransform has a zero pixel size".to_string(),
            ));
        }
        Ok(MapGrid { geotransform })
    }
}

impl FromSpace for MapGrid {
    fn from_space(&self, img: ImgCoord) -> Result<GeoCoord, SrError> {
        let gt = &self.geotransform;
        let lon = gt[0] + img.s as f64 * gt[1] + img.l as f64 * gt[2];
        let lat = gt[3] + img.s as f64 * gt[4] + img.l as f64 * gt[5];

        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(SrError::Geolocation(format!(
                "pixel (l={}, s={}) maps outside the globe: lat={}, lon={}",
                img.l, img.s, lat, lon
            )));
        }

        Ok(GeoCoord {
            lat: lat.to_radians(),
            lon: lon.to_radians(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_map_grid_affine() {
        // 30 m pixels around 45N, 75W, expressed in degrees.
        let grid = MapGrid::new([-75.0, 0.00027, 0.0, 45.0, 0.0, -0.00027]).unwrap();
        let geo = grid.from_space(ImgCoord { l: 0.0, s: 0.0 }).unwrap();
        assert_relative_eq!(geo.lat_deg(), 45.0, epsilon = 1e-5);
        assert_relative_eq!(geo.lon_deg(), -75.0, epsilon = 1e-5);

        let geo = grid.from_space(ImgCoord { l: 100.0, s: 200.0 }).unwrap();
        assert_relative_eq!(geo.lat_deg(), 45.0 - 100.0 * 0.00027, epsilon = 1e-5);
        assert_relative_eq!(geo.lon_deg(), -75.0 + 200.0 * 0.00027, epsilon = 1e-5);
    }

    #[test]
    fn test_map_grid_rejects_zero_pixel_size() {
        assert!(MapGrid::new([0.0, 0.0, 0.0, 0.0, 0.0, -1.0]).is_err());
    }

    #[test]
    fn test_off_globe_pixel_is_fatal() {
        let grid = MapGrid::new([-75.0, 1.0, 0.0, 45.0, 0.0, -1.0]).unwrap();
        assert!(grid.from_space(ImgCoord { l: 200.0, s: 0.0 }).is_err());
    }
}
