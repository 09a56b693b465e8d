//! Windowed aerosol retrieval.
//!
//! The scene is tiled into fixed-size aerosol windows; a single (AOT, ε) pair
//! is retrieved at each window centre from the pre-correction TOA snapshots,
//! classified as clear land or water, and later spread to every pixel by the
//! fill/interpolation stage.

pub mod fill;
pub mod solver;

pub use fill::{fill_invalid_centers, interpolate_to_pixels, AeroDefaults};
pub use solver::{epsilon_minimum, retrieve_aot, Retrieval};

use crate::ancillary::RatioGrid;
use crate::atmosphere::CoefficientCache;
use crate::bands::{B1, B2, B4, B5, B7, NREFL_BANDS};
use crate::correction::ToaSnapshots;
use crate::error::SrError;
use crate::geo::{FromSpace, ImgCoord};
use crate::pipeline::SrParams;
use crate::scene::{Scene, IPFLAG_CLEAR, IPFLAG_FILL, IPFLAG_WATER};

use rayon::prelude::*;

/// Sentinel for centres that never received a retrieval.
pub const AERO_UNSET: f32 = -1.0;

/// Residual acceptance threshold for the land model; grows with the
/// air-mass-corrected AOT and the SWIR TOA brightness.
fn threshold_land(corf: f32, troatm_b7: f32) -> f32 {
    0.015 + 0.005 * corf + 0.10 * troatm_b7
}

/// Residual acceptance threshold for the water model.
fn threshold_water(corf: f32) -> f32 {
    0.010 + 0.005 * corf
}

/// The regular lattice of aerosol-window centres over a scene.
#[derive(Debug, Clone, Copy)]
pub struct WindowLattice {
    pub window: usize,
    pub half: usize,
    pub nlines: usize,
    pub nsamps: usize,
    pub ncl: usize,
    pub ncs: usize,
}

impl WindowLattice {
    pub fn new(window: usize, nlines: usize, nsamps: usize) -> Self {
        WindowLattice {
            window,
            half: window / 2,
            nlines,
            nsamps,
            ncl: nlines.div_ceil(window),
            ncs: nsamps.div_ceil(window),
        }
    }

    /// Centre pixel of window (k, m), clamped inside the scene.
    pub fn center(&self, k: usize, m: usize) -> (usize, usize) {
        (
            (self.half + k * self.window).min(self.nlines - 1),
            (self.half + m * self.window).min(self.nsamps - 1),
        )
    }

    /// Half-open pixel bounds of window (k, m).
    pub fn bounds(&self, k: usize, m: usize) -> (usize, usize, usize, usize) {
        (
            k * self.window,
            ((k + 1) * self.window).min(self.nlines),
            m * self.window,
            ((m + 1) * self.window).min(self.nsamps),
        )
    }
}

/// Per-centre retrieval results on the window lattice.
#[derive(Debug)]
pub struct CenterGrid {
    pub ncl: usize,
    pub ncs: usize,
    /// Pixel index of each centre.
    pub idx: Vec<usize>,
    pub taero: Vec<f32>,
    pub teps: Vec<f32>,
    /// FILL for all-fill windows, CLEAR/WATER/both for retrievals, 0 for
    /// invalid retrievals awaiting the fill stage.
    pub flag: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct CenterResult {
    idx: usize,
    taero: f32,
    teps: f32,
    flag: u8,
}

/// Aerosol inversion over the window-centre lattice. All referenced state is
/// immutable; centres are processed in parallel.
pub struct AerosolInverter<'a, G: FromSpace + Sync> {
    pub scene: &'a Scene,
    pub snapshots: &'a ToaSnapshots,
    pub ratios: &'a RatioGrid,
    pub cache: &'a CoefficientCache,
    pub geoloc: &'a G,
    pub params: &'a SrParams,
    pub lattice: WindowLattice,
    /// Scene-centre solar zenith cosine.
    pub xmus: f32,
}

impl<'a, G: FromSpace + Sync> AerosolInverter<'a, G> {
    pub fn run(&self) -> Result<CenterGrid, SrError> {
        let lattice = self.lattice;
        let cells: Vec<(usize, usize)> = (0..lattice.ncl)
            .flat_map(|k| (0..lattice.ncs).map(move |m| (k, m)))
            .collect();

        let results: Vec<CenterResult> = cells
            .par_iter()
            .map(|&(k, m)| self.retrieve_center(k, m))
            .collect::<Result<Vec<_>, SrError>>()?;

        let mut grid = CenterGrid {
            ncl: lattice.ncl,
            ncs: lattice.ncs,
            idx: Vec::with_capacity(results.len()),
            taero: Vec::with_capacity(results.len()),
            teps: Vec::with_capacity(results.len()),
            flag: Vec::with_capacity(results.len()),
        };
        for r in results {
            grid.idx.push(r.idx);
            grid.taero.push(r.taero);
            grid.teps.push(r.teps);
            grid.flag.push(r.flag);
        }

        Ok(grid)
    }

    /// Nearest non-fill pixel to the centre of window (k, m), scanning by
    /// expanding Chebyshev rings inside the window.
    fn window_radiometry(&self, k: usize, m: usize) -> Option<usize> {
        let (lc, sc) = self.lattice.center(k, m);
        let cidx = lc * self.lattice.nsamps + sc;
        if !self.scene.is_fill(cidx) {
            return Some(cidx);
        }

        let (l0, l1, s0, s1) = self.lattice.bounds(k, m);
        let max_r = (l1 - l0).max(s1 - s0);
        for r in 1..max_r {
            let lmin = lc.saturating_sub(r).max(l0);
            let lmax = (lc + r).min(l1 - 1);
            let smin = sc.saturating_sub(r).max(s0);
            let smax = (sc + r).min(s1 - 1);
            for l in lmin..=lmax {
                for s in smin..=smax {
                    let on_ring = l.abs_diff(lc) == r || s.abs_diff(sc) == r;
                    if !on_ring {
                        continue;
                    }
                    let idx = l * self.lattice.nsamps + s;
                    if !self.scene.is_fill(idx) {
                        return Some(idx);
                    }
                }
            }
        }

        None
    }

    fn retrieve_center(&self, k: usize, m: usize) -> Result<CenterResult, SrError> {
        let (lc, sc) = self.lattice.center(k, m);
        let cidx = lc * self.lattice.nsamps + sc;

        // All-fill windows keep their centre as fill.
        let pix = match self.window_radiometry(k, m) {
            Some(pix) => pix,
            None => {
                return Ok(CenterResult {
                    idx: cidx,
                    taero: AERO_UNSET,
                    teps: AERO_UNSET,
                    flag: IPFLAG_FILL,
                });
            }
        };

        let geo = self.geoloc.from_space(ImgCoord {
            l: lc as f32 - 0.5,
            s: sc as f32 + 0.5,
        })?;
        let ratio = self.ratios.resample(geo.lat_deg(), geo.lon_deg());

        let snap = self.snapshots;
        let b5 = snap.b5[pix];
        let b7 = snap.b7[pix];
        let denom = b5 + 0.5 * b7;
        let mut xndwi = if denom.abs() > f32::EPSILON {
            (b5 - 0.5 * b7) / denom
        } else {
            0.01
        };
        xndwi = xndwi.max(ratio.ndwi_th2).min(ratio.ndwi_th1);

        let mut erelc = [-1.0f32; NREFL_BANDS];
        let mut troatm = [0.0f32; NREFL_BANDS];
        erelc[B1] = xndwi * ratio.slprb1 + ratio.intrb1;
        erelc[B2] = xndwi * ratio.slprb2 + ratio.intrb2;
        erelc[B4] = 1.0;
        erelc[B7] = xndwi * ratio.slprb7 + ratio.intrb7;
        troatm[B1] = snap.b1[pix];
        troatm[B2] = snap.b2[pix];
        troatm[B4] = snap.b4[pix];
        troatm[B7] = snap.b7[pix];

        let p = self.params;
        let mut iaots = 0usize;
        let t1 = retrieve_aot(self.cache, &erelc, &troatm, B4, p.low_eps, &mut iaots);
        let t2 = retrieve_aot(self.cache, &erelc, &troatm, B4, p.mod_eps, &mut iaots);
        let t3 = retrieve_aot(self.cache, &erelc, &troatm, B4, p.high_eps, &mut iaots);

        let (mut teps, mut retrieval) = match epsilon_minimum(
            p.low_eps,
            t1.residual,
            p.mod_eps,
            t2.residual,
            p.high_eps,
            t3.residual,
        ) {
            Some(e) if e <= p.low_eps => (p.low_eps, t1),
            Some(e) if e >= p.high_eps => (p.high_eps, t3),
            Some(e) => {
                let t = retrieve_aot(self.cache, &erelc, &troatm, B4, e, &mut iaots);
                (e, t)
            }
            None => {
                // Degenerate fit: keep the best sampled trial.
                let mut best = (p.low_eps, t1);
                if t2.residual < best.1.residual {
                    best = (p.mod_eps, t2);
                }
                if t3.residual < best.1.residual {
                    best = (p.high_eps, t3);
                }
                best
            }
        };

        let corf = retrieval.raot / self.xmus;

        let mut flag = if retrieval.residual < threshold_land(corf, troatm[B7]) {
            let ros5 = self.cache.correct(snap.b5[pix], B5, retrieval.raot, teps);
            let ros4 = self.cache.correct(snap.b4[pix], B4, retrieval.raot, teps);
            if ros5 > 0.1 && (ros5 - ros4) / (ros5 + ros4) > 0.0 {
                IPFLAG_CLEAR
            } else {
                IPFLAG_WATER
            }
        } else {
            IPFLAG_WATER
        };

        if flag & IPFLAG_WATER != 0 {
            let mut erelc = [-1.0f32; NREFL_BANDS];
            let mut troatm = [0.0f32; NREFL_BANDS];
            erelc[B1] = 1.0;
            erelc[B4] = 1.0;
            erelc[B5] = 1.0;
            erelc[B7] = 1.0;
            troatm[B1] = snap.b1[pix];
            troatm[B4] = snap.b4[pix];
            troatm[B5] = snap.b5[pix];
            troatm[B7] = snap.b7[pix];

            let mut iaots = 0usize;
            retrieval = retrieve_aot(self.cache, &erelc, &troatm, B4, p.water_eps, &mut iaots);
            teps = p.water_eps;

            let ros1 = self.cache.correct(troatm[B1], B1, retrieval.raot, teps);
            let corf = retrieval.raot / self.xmus;
            if retrieval.residual > threshold_water(corf) || ros1 < 0.0 {
                // Not a valid water retrieval, likely urban: invalid.
                flag = 0;
            } else {
                flag = IPFLAG_CLEAR | IPFLAG_WATER;
            }
        }

        Ok(CenterResult {
            idx: cidx,
            taero: retrieval.raot,
            teps,
            flag,
        })
    }
}
