//! Climate Modeling Grid ancillary data and the surface band-ratio
//! climatology, with the bilinear lat/lon resampling both share.

use crate::error::SrError;

/// Production CMG dimensions, 0.05 degree cells.
pub const CMG_NBLAT: usize = 3600;
pub const CMG_NBLON: usize = 7200;

/// Production band-ratio grid dimensions.
pub const RATIO_NBLAT: usize = 3600;
pub const RATIO_NBLON: usize = 7200;

const WV_SCALE: f32 = 0.01;
const OZ_SCALE: f32 = 0.001;
const RATIO_SCALE: f32 = 0.001;

/// Bilinear neighborhood of a (lat, lon) point on a global grid whose cells
/// are centered at `90 - cell/2 - row*cell` / `-180 + cell/2 + col*cell`.
///
/// Longitude wraps across the antimeridian; latitude clamps at the poles.
#[derive(Debug, Clone, Copy)]
pub struct GridIndex {
    pub lcmg: usize,
    pub scmg: usize,
    pub lcmg1: usize,
    pub scmg1: usize,
    pub u: f32,
    pub v: f32,
    nblon: usize,
}

impl GridIndex {
    pub fn locate(lat: f32, lon: f32, nblat: usize, nblon: usize) -> Self {
        let cell = 180.0 / nblat as f32;
        let ycmg = (90.0 - 0.5 * cell - lat) / cell;
        let xcmg = (180.0 - 0.5 * cell + lon) / cell;

        let lcmg = (ycmg.floor() as isize).clamp(0, nblat as isize - 1) as usize;
        let scmg = (xcmg.floor() as isize).clamp(0, nblon as isize - 1) as usize;

        let scmg1 = if scmg >= nblon - 1 { 0 } else { scmg + 1 };
        let lcmg1 = if lcmg >= nblat - 1 { lcmg } else { lcmg + 1 };

        let u = (ycmg - lcmg as f32).clamp(0.0, 1.0);
        let v = (xcmg - scmg as f32).clamp(0.0, 1.0);

        GridIndex {
            lcmg,
            scmg,
            lcmg1,
            scmg1,
            u,
            v,
            nblon,
        }
    }

    /// Flat indices of the four neighbors, row-major.
    pub fn neighbors(&self) -> [usize; 4] {
        [
            self.lcmg * self.nblon + self.scmg,
            self.lcmg * self.nblon + self.scmg1,
            self.lcmg1 * self.nblon + self.scmg,
            self.lcmg1 * self.nblon + self.scmg1,
        ]
    }

    pub fn bilinear(&self, p11: f32, p12: f32, p21: f32, p22: f32) -> f32 {
        let (u, v) = (self.u, self.v);
        (1.0 - u) * (1.0 - v) * p11 + (1.0 - u) * v * p12 + u * (1.0 - v) * p21 + u * v * p22
    }

    fn sample_scaled_i16(&self, grid: &[i16], scale: f32) -> f32 {
        let [i11, i12, i21, i22] = self.neighbors();
        self.bilinear(
            grid[i11] as f32 * scale,
            grid[i12] as f32 * scale,
            grid[i21] as f32 * scale,
            grid[i22] as f32 * scale,
        )
    }
}

/// CMG digital elevation, water vapor and ozone grids.
#[derive(Debug)]
pub struct CmgGrid {
    nblat: usize,
    nblon: usize,
    dem: Vec<i16>,
    water_vapor: Vec<u16>,
    ozone: Vec<u16>,
}

/// Point sample of the CMG grids in physical units.
#[derive(Debug, Clone, Copy)]
pub struct CmgSample {
    /// Surface elevation in meters.
    pub elevation: f32,
    /// Total column water vapor in g/cm^2.
    pub uwv: f32,
    /// Total column ozone in atm-cm.
    pub uoz: f32,
}

impl CmgGrid {
    pub fn new(
        nblat: usize,
        nblon: usize,
        dem: Vec<i16>,
        water_vapor: Vec<u16>,
        ozone: Vec<u16>,
    ) -> Result<Self, SrError> {
        let npix = nblat * nblon;
        for (name, len) in [
            ("dem", dem.len()),
            ("water_vapor", water_vapor.len()),
            ("ozone", ozone.len()),
        ] {
            if len != npix {
                return Err(SrError::Ancillary(format!(
                    "CMG {} grid has {} cells, expected {}x{}",
                    name, len, nblat, nblon
                )));
            }
        }

        Ok(CmgGrid {
            nblat,
            nblon,
            dem,
            water_vapor,
            ozone,
        })
    }

    pub fn sample(&self, lat: f32, lon: f32) -> CmgSample {
        let idx = GridIndex::locate(lat, lon, self.nblat, self.nblon);
        let [i11, i12, i21, i22] = idx.neighbors();

        CmgSample {
            elevation: idx.bilinear(
                self.dem[i11] as f32,
                self.dem[i12] as f32,
                self.dem[i21] as f32,
                self.dem[i22] as f32,
            ),
            uwv: idx.bilinear(
                self.water_vapor[i11] as f32 * WV_SCALE,
                self.water_vapor[i12] as f32 * WV_SCALE,
                self.water_vapor[i21] as f32 * WV_SCALE,
                self.water_vapor[i22] as f32 * WV_SCALE,
            ),
            uoz: idx.bilinear(
                self.ozone[i11] as f32 * OZ_SCALE,
                self.ozone[i12] as f32 * OZ_SCALE,
                self.ozone[i21] as f32 * OZ_SCALE,
                self.ozone[i22] as f32 * OZ_SCALE,
            ),
        }
    }
}

/// Standard-atmosphere surface pressure in hPa for an elevation in meters.
pub fn surface_pressure(elevation: f32) -> f32 {
    1013.0 * (1.0 - 0.0065 * elevation / 288.15).powf(5.255)
}

/// Surface band-ratio climatology: NDWI statistics and the band 1/2/7 ratio
/// slope/intercept records, all stored as integers scaled by 1000.
#[derive(Debug, Clone)]
pub struct RatioGrid {
    pub nblat: usize,
    pub nblon: usize,
    pub andwi: Vec<i16>,
    pub sndwi: Vec<i16>,
    pub ratiob1: Vec<i16>,
    pub ratiob2: Vec<i16>,
    pub ratiob7: Vec<i16>,
    pub slpratiob1: Vec<i16>,
    pub slpratiob2: Vec<i16>,
    pub slpratiob7: Vec<i16>,
    pub intratiob1: Vec<i16>,
    pub intratiob2: Vec<i16>,
    pub intratiob7: Vec<i16>,
}

/// Resampled ratio-model terms for one pixel.
#[derive(Debug, Clone, Copy)]
pub struct RatioSample {
    pub slprb1: f32,
    pub slprb2: f32,
    pub slprb7: f32,
    pub intrb1: f32,
    pub intrb2: f32,
    pub intrb7: f32,
    pub ndwi_th1: f32,
    pub ndwi_th2: f32,
}

impl RatioGrid {
    /// Applies the per-cell guard rule once over the whole grid, so that the
    /// retrieval stage reads an immutable, already-sanitized climatology.
    ///
    /// Cells whose band-1 or band-2 mean ratio falls outside [0.1, 1.0] are
    /// replaced with the default record (flat slopes, 0.550/0.600/2.000
    /// intercepts); cells with a weak NDWI spread keep their mean ratio as a
    /// flat intercept. The rule only reads the cell itself, so reapplying it
    /// is a no-op.
    pub fn guarded(mut self) -> Result<RatioGrid, SrError> {
        let npix = self.nblat * self.nblon;
        for (name, len) in [
            ("andwi", self.andwi.len()),
            ("sndwi", self.sndwi.len()),
            ("ratiob1", self.ratiob1.len()),
            ("ratiob2", self.ratiob2.len()),
            ("ratiob7", self.ratiob7.len()),
            ("slpratiob1", self.slpratiob1.len()),
            ("slpratiob2", self.slpratiob2.len()),
            ("slpratiob7", self.slpratiob7.len()),
            ("intratiob1", self.intratiob1.len()),
            ("intratiob2", self.intratiob2.len()),
            ("intratiob7", self.intratiob7.len()),
        ] {
            if len != npix {
                return Err(SrError::Ancillary(format!(
                    "ratio {} grid has {} cells, expected {}x{}",
                    name, len, self.nblat, self.nblon
                )));
            }
        }

        for i in 0..npix {
            let rb1 = self.ratiob1[i] as f32 * RATIO_SCALE;
            let rb2 = self.ratiob2[i] as f32 * RATIO_SCALE;

            if !(0.1..=1.0).contains(&rb1) || !(0.1..=1.0).contains(&rb2) {
                self.slpratiob1[i] = 0;
                self.slpratiob2[i] = 0;
                self.slpratiob7[i] = 0;
                self.intratiob1[i] = 550;
                self.intratiob2[i] = 600;
                self.intratiob7[i] = 2000;
            } else if self.sndwi[i] < 200 {
                self.slpratiob1[i] = 0;
                self.slpratiob2[i] = 0;
                self.slpratiob7[i] = 0;
                self.intratiob1[i] = self.ratiob1[i];
                self.intratiob2[i] = self.ratiob2[i];
                self.intratiob7[i] = self.ratiob7[i];
            }
        }

        Ok(self)
    }

    pub fn resample(&self, lat: f32, lon: f32) -> RatioSample {
        let idx = GridIndex::locate(lat, lon, self.nblat, self.nblon);
        let pix11 = idx.lcmg * self.nblon + idx.scmg;

        RatioSample {
            slprb1: idx.sample_scaled_i16(&self.slpratiob1, RATIO_SCALE),
            slprb2: idx.sample_scaled_i16(&self.slpratiob2, RATIO_SCALE),
            slprb7: idx.sample_scaled_i16(&self.slpratiob7, RATIO_SCALE),
            intrb1: idx.sample_scaled_i16(&self.intratiob1, RATIO_SCALE),
            intrb2: idx.sample_scaled_i16(&self.intratiob2, RATIO_SCALE),
            intrb7: idx.sample_scaled_i16(&self.intratiob7, RATIO_SCALE),
            ndwi_th1: (self.andwi[pix11] as f32 + 2.0 * self.sndwi[pix11] as f32) * RATIO_SCALE,
            ndwi_th2: (self.andwi[pix11] as f32 - 2.0 * self.sndwi[pix11] as f32) * RATIO_SCALE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn test_locate_north_east_corner() {
        // First row, last column; the longitude neighbor wraps to column 0.
        let idx = GridIndex::locate(89.975, 179.975, CMG_NBLAT, CMG_NBLON);
        assert_eq!((idx.lcmg, idx.scmg), (0, CMG_NBLON - 1));
        assert_eq!(idx.scmg1, 0);
        assert_abs_diff_eq!(idx.u, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(idx.v, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_locate_south_pole_clamps() {
        let idx = GridIndex::locate(-89.975, 0.0, CMG_NBLAT, CMG_NBLON);
        assert_eq!(idx.lcmg, CMG_NBLAT - 1);
        assert_eq!(idx.lcmg1, idx.lcmg);
    }

    #[test]
    fn test_locate_beyond_pole_clamps_to_first_row() {
        let idx = GridIndex::locate(90.0, 0.0, CMG_NBLAT, CMG_NBLON);
        assert_eq!(idx.lcmg, 0);
        assert_eq!(idx.u, 0.0);
    }

    fn small_ratio_grid(nblat: usize, nblon: usize) -> RatioGrid {
        let n = nblat * nblon;
        RatioGrid {
            nblat,
            nblon,
            andwi: vec![100; n],
            sndwi: vec![300; n],
            ratiob1: vec![500; n],
            ratiob2: vec![550; n],
            ratiob7: vec![900; n],
            slpratiob1: vec![50; n],
            slpratiob2: vec![60; n],
            slpratiob7: vec![70; n],
            intratiob1: vec![450; n],
            intratiob2: vec![500; n],
            intratiob7: vec![800; n],
        }
    }

    #[test]
    fn test_antimeridian_wrap_is_convex() {
        // 36x72 grid (5 degree cells): a point just east of the last column
        // center blends the last and first columns.
        let (nblat, nblon) = (36, 72);
        let mut grid = small_ratio_grid(nblat, nblon);
        // Distinct intercepts in the last and first columns of row 17.
        for row in 0..nblat {
            grid.intratiob1[row * nblon] = 400;
            grid.intratiob1[row * nblon + nblon - 1] = 800;
        }
        let grid = grid.guarded().unwrap();

        let sample = grid.resample(0.0, 179.9999);
        let idx = GridIndex::locate(0.0, 179.9999, nblat, nblon);
        assert_eq!(idx.scmg, nblon - 1);
        assert_eq!(idx.scmg1, 0);
        // Convex combination of 0.8 (west neighbor) and 0.4 (wrapped east).
        assert!(sample.intrb1 > 0.4 && sample.intrb1 < 0.8);
        let expect = (1.0 - idx.v) * 0.8 + idx.v * 0.4;
        assert_relative_eq!(sample.intrb1, expect, epsilon = 1e-5);
    }

    #[test]
    fn test_guard_replaces_out_of_range_ratios() {
        let mut grid = small_ratio_grid(4, 8);
        grid.ratiob1 = vec![50; 32]; // rb1 = 0.05, outside [0.1, 1.0]
        let grid = grid.guarded().unwrap();

        assert_eq!(grid.slpratiob1[0], 0);
        assert_eq!(grid.intratiob1[0], 550);
        assert_eq!(grid.intratiob2[0], 600);
        assert_eq!(grid.intratiob7[0], 2000);
    }

    #[test]
    fn test_guard_is_idempotent() {
        let mut grid = small_ratio_grid(4, 8);
        grid.ratiob1 = vec![50; 32];
        grid.sndwi = vec![100; 32]; // also below the NDWI-spread cutoff
        let once = grid.clone().guarded().unwrap();
        let twice = once.clone().guarded().unwrap();

        assert_eq!(once.slpratiob1, twice.slpratiob1);
        assert_eq!(once.intratiob1, twice.intratiob1);
        assert_eq!(once.intratiob7, twice.intratiob7);
    }

    #[test]
    fn test_guard_flattens_weak_ndwi_cells() {
        let mut grid = small_ratio_grid(4, 8);
        grid.sndwi = vec![100; 32];
        let grid = grid.guarded().unwrap();

        assert_eq!(grid.slpratiob2[5], 0);
        assert_eq!(grid.intratiob1[5], 500);
        assert_eq!(grid.intratiob2[5], 550);
        assert_eq!(grid.intratiob7[5], 900);
    }

    #[test]
    fn test_ndwi_thresholds() {
        let grid = small_ratio_grid(4, 8).guarded().unwrap();
        let sample = grid.resample(45.0, 0.0);
        assert_relative_eq!(sample.ndwi_th1, 0.7, epsilon = 1e-5);
        assert_relative_eq!(sample.ndwi_th2, -0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_cmg_sample_units() {
        let (nblat, nblon) = (36, 72);
        let n = nblat * nblon;
        let cmg = CmgGrid::new(nblat, nblon, vec![1000; n], vec![200; n], vec![300; n]).unwrap();
        let s = cmg.sample(45.0, -75.0);
        assert_relative_eq!(s.elevation, 1000.0, epsilon = 1e-3);
        assert_relative_eq!(s.uwv, 2.0, epsilon = 1e-5);
        assert_relative_eq!(s.uoz, 0.3, epsilon = 1e-5);
    }

    #[test]
    fn test_surface_pressure_decreases_with_height() {
        assert_relative_eq!(surface_pressure(0.0), 1013.0, epsilon = 1e-3);
        assert!(surface_pressure(1000.0) < 920.0);
        assert!(surface_pressure(1000.0) > 880.0);
    }

    #[test]
    fn test_cmg_grid_rejects_bad_lengths() {
        assert!(CmgGrid::new(4, 8, vec![0; 10], vec![0; 32], vec![0; 32]).is_err());
    }
}
