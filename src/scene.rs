use crate::atmosphere::Geometry;
use crate::bands::{Satellites, NREFL_BANDS};
use crate::error::SrError;

/// Pixel-flag bit positions.
pub const IPFLAG_FILL: u8 = 0x01;
pub const IPFLAG_CLEAR: u8 = 0x02;
pub const IPFLAG_WATER: u8 = 0x04;
// Bits 3-5 are reserved for cloud/cirrus products.
pub const IPFLAG_AERO1: u8 = 0x40;
pub const IPFLAG_AERO2: u8 = 0x80;

/// Level-1 QA fill predicate: bit 0 of the QA_PIXEL word.
#[inline]
pub fn is_fill_qa(qa: u16) -> bool {
    qa & 0x1 != 0
}

/// One scene's Level-1 inputs: unscaled TOA reflectance per reflective band,
/// the Level-1 QA word and the per-pixel solar zenith grid.
///
/// `sband` starts as TOA reflectance and is overwritten in place with surface
/// reflectance as the pipeline advances.
#[derive(Debug)]
pub struct Scene {
    pub satellite: Satellites,
    pub nlines: usize,
    pub nsamps: usize,
    pub qaband: Vec<u16>,
    pub sband: Vec<Vec<f32>>,
    pub sza: Vec<i16>,
    pub sza_mult: f32,
    pub sza_add: f32,
}

impl Scene {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        satellite: Satellites,
        nlines: usize,
        nsamps: usize,
        qaband: Vec<u16>,
        sband: Vec<Vec<f32>>,
        sza: Vec<i16>,
        sza_mult: f32,
        sza_add: f32,
    ) -> Result<Self, SrError> {
        let npix = nlines * nsamps;
        if npix == 0 {
            return Err(SrError::Scene("scene has no pixels".to_string()));
        }
        if qaband.len() != npix {
            return Err(SrError::Scene(format!(
                "QA band has {} pixels, expected {}",
                qaband.len(),
                npix
            )));
        }
        if sband.len() != NREFL_BANDS {
            return Err(SrError::Scene(format!(
                "expected {} reflectance bands, got {}",
                NREFL_BANDS,
                sband.len()
            )));
        }
        for (ib, band) in sband.iter().enumerate() {
            if band.len() != npix {
                return Err(SrError::Scene(format!(
                    "band {} has {} pixels, expected {}",
                    ib + 1,
                    band.len(),
                    npix
                )));
            }
        }
        if sza.len() != npix {
            return Err(SrError::Scene(format!(
                "solar zenith grid has {} pixels, expected {}",
                sza.len(),
                npix
            )));
        }

        Ok(Scene {
            satellite,
            nlines,
            nsamps,
            qaband,
            sband,
            sza,
            sza_mult,
            sza_add,
        })
    }

    #[inline]
    pub fn npix(&self) -> usize {
        self.nlines * self.nsamps
    }

    #[inline]
    pub fn is_fill(&self, idx: usize) -> bool {
        is_fill_qa(self.qaband[idx])
    }

    /// Solar zenith angle of one pixel in degrees.
    #[inline]
    pub fn solar_zenith(&self, idx: usize) -> f32 {
        self.sza[idx] as f32 * self.sza_mult + self.sza_add
    }

    /// Scene-centre observation geometry: nadir view, solar zenith from the
    /// mean of the per-pixel grid over non-fill pixels.
    pub fn center_geometry(&self) -> Result<Geometry, SrError> {
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for idx in 0..self.npix() {
            if !self.is_fill(idx) {
                sum += self.solar_zenith(idx) as f64;
                count += 1;
            }
        }
        if count == 0 {
            return Err(SrError::Scene(
                "cannot derive scene geometry: every pixel is fill".to_string(),
            ));
        }

        Ok(Geometry::nadir((sum / count as f64) as f32))
    }

    /// Initial pixel flags: only the fill bit, from the Level-1 QA.
    pub fn initial_flags(&self) -> Vec<u8> {
        self.qaband
            .iter()
            .map(|&qa| if is_fill_qa(qa) { IPFLAG_FILL } else { 0 })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A uniform synthetic scene: every band at `toa`, no fill, SZA 30 deg.
    pub fn uniform_scene(nlines: usize, nsamps: usize, toa: f32) -> Scene {
        let npix = nlines * nsamps;
        Scene::new(
            Satellites::Landsat8,
            nlines,
            nsamps,
            vec![0; npix],
            vec![vec![toa; npix]; NREFL_BANDS],
            vec![3000; npix],
            0.01,
            0.0,
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scene_dimension_checks() {
        let scene = Scene::new(
            Satellites::Landsat8,
            2,
            2,
            vec![0; 4],
            vec![vec![0.1; 4]; NREFL_BANDS],
            vec![3000; 3],
            0.01,
            0.0,
        );
        assert!(scene.is_err());
    }

    #[test]
    fn test_center_geometry_skips_fill() {
        let mut scene = test_support::uniform_scene(2, 2, 0.1);
        scene.qaband[0] = 1;
        scene.sza[0] = 9000; // fill pixel must not drag the mean

        let geom = scene.center_geometry().unwrap();
        assert_relative_eq!(geom.xts, 30.0, epsilon = 1e-4);
        assert_relative_eq!(geom.xmuv, 1.0);
    }

    #[test]
    fn test_center_geometry_requires_data() {
        let mut scene = test_support::uniform_scene(2, 2, 0.1);
        scene.qaband = vec![1; 4];
        assert!(scene.center_geometry().is_err());
    }

    #[test]
    fn test_initial_flags() {
        let mut scene = test_support::uniform_scene(2, 2, 0.1);
        scene.qaband[3] = 1;
        assert_eq!(scene.initial_flags(), vec![0, 0, 0, IPFLAG_FILL]);
    }
}
