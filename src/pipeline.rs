//! Scene-level orchestration of the surface-reflectance pipeline.

use crate::aerosol::{
    fill_invalid_centers, interpolate_to_pixels, AerosolInverter, WindowLattice,
};
use crate::ancillary::{surface_pressure, CmgGrid, RatioGrid};
use crate::atmosphere::{AtmKernel, CoefficientCache};
use crate::correction::{climatology_correct, final_correct, snapshot};
use crate::error::SrError;
use crate::geo::{FromSpace, ImgCoord};
use crate::lut::AerosolLut;
use crate::scene::{Scene, IPFLAG_CLEAR, IPFLAG_FILL, IPFLAG_WATER};

use log::{debug, info};

/// Correction tunables. The defaults match the operational configuration;
/// the config file may override any of them.
#[derive(Debug, Clone)]
pub struct SrParams {
    pub aero_window: usize,
    pub low_eps: f32,
    pub mod_eps: f32,
    pub high_eps: f32,
    pub water_eps: f32,
    pub low_aero_thresh: f32,
    pub avg_aero_thresh: f32,
    pub min_valid_refl: f32,
    pub max_valid_refl: f32,
    pub default_aot: f32,
}

impl Default for SrParams {
    fn default() -> Self {
        SrParams {
            aero_window: 6,
            low_eps: 1.0,
            mod_eps: 1.75,
            high_eps: 2.5,
            water_eps: 1.5,
            low_aero_thresh: 0.01,
            avg_aero_thresh: 0.05,
            min_valid_refl: -0.01,
            max_valid_refl: 1.6,
            default_aot: 0.05,
        }
    }
}

/// Final per-pixel products of a scene run.
#[derive(Debug)]
pub struct SrProducts {
    pub nlines: usize,
    pub nsamps: usize,
    pub sband: Vec<Vec<f32>>,
    pub ipflag: Vec<u8>,
    pub taero: Vec<f32>,
    pub teps: Vec<f32>,
}

impl SrProducts {
    /// Retrieval class counts (clear, water, fill) over the scene.
    pub fn class_counts(&self) -> (usize, usize, usize) {
        let mut clear = 0;
        let mut water = 0;
        let mut fill = 0;
        for &f in &self.ipflag {
            if f & IPFLAG_FILL != 0 {
                fill += 1;
            } else {
                if f & IPFLAG_CLEAR != 0 {
                    clear += 1;
                }
                if f & IPFLAG_WATER != 0 {
                    water += 1;
                }
            }
        }
        (clear, water, fill)
    }

    /// (min, max, mean) of one band over non-fill pixels.
    pub fn band_stats(&self, ib: usize) -> Option<(f32, f32, f32)> {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for (v, f) in self.sband[ib].iter().zip(self.ipflag.iter()) {
            if f & IPFLAG_FILL == 0 {
                min = min.min(*v);
                max = max.max(*v);
                sum += *v as f64;
                count += 1;
            }
        }
        if count == 0 {
            None
        } else {
            Some((min, max, (sum / count as f64) as f32))
        }
    }
}

/// One scene's correction run. The LUT and ancillary grids are shared
/// read-only; the scene is consumed and its band buffers become the output.
pub struct SrPipeline<'a, G: FromSpace + Sync> {
    pub scene: Scene,
    pub lut: &'a AerosolLut,
    pub cmg: &'a CmgGrid,
    pub ratios: &'a RatioGrid,
    pub geoloc: G,
    pub params: SrParams,
}

impl<'a, G: FromSpace + Sync> SrPipeline<'a, G> {
    pub fn run(mut self) -> Result<SrProducts, SrError> {
        let nlines = self.scene.nlines;
        let nsamps = self.scene.nsamps;

        // Scene-centre geometry and atmospheric state.
        let geom = self.scene.center_geometry()?;
        let center = self.geoloc.from_space(ImgCoord {
            l: (nlines / 2) as f32 - 0.5,
            s: (nsamps / 2) as f32 + 0.5,
        })?;
        let cmg = self.cmg.sample(center.lat_deg(), center.lon_deg());
        let pres = surface_pressure(cmg.elevation);
        info!(
            "scene centre: xts={:.3} deg, pres={:.1} hPa, uoz={:.3} atm-cm, uwv={:.3} g/cm2",
            geom.xts, pres, cmg.uoz, cmg.uwv
        );

        let kernel = AtmKernel::new(self.lut, self.scene.satellite, geom)?;
        let cache =
            CoefficientCache::build(&kernel, pres, cmg.uoz, cmg.uwv, self.params.high_eps)?;
        let scene_coefs = cache.at(self.params.default_aot, self.params.high_eps);
        debug!("coefficient cache built: ia_max={:?}", cache.ia_max);

        // First-guess correction; the retrieval reads the TOA snapshots.
        let snapshots = snapshot(&self.scene);
        climatology_correct(&mut self.scene, &scene_coefs);
        info!("climatology correction done");

        // Aerosol retrieval over the window-centre lattice.
        let lattice = WindowLattice::new(self.params.aero_window, nlines, nsamps);
        let mut centers = {
            let inverter = AerosolInverter {
                scene: &self.scene,
                snapshots: &snapshots,
                ratios: self.ratios,
                cache: &cache,
                geoloc: &self.geoloc,
                params: &self.params,
                lattice,
                xmus: geom.xmus,
            };
            inverter.run()?
        };
        drop(snapshots);

        let invalid = centers.flag.iter().filter(|&&f| f == 0).count();
        info!(
            "aerosol retrieval done: {} centres, {} invalid",
            centers.flag.len(),
            invalid
        );

        let defaults = fill_invalid_centers(&mut centers);

        // Spread (AOT, eps) and the centre classes to every pixel.
        let mut ipflag = self.scene.initial_flags();
        let npix = self.scene.npix();
        let mut taero = vec![defaults.taero; npix];
        let mut teps = vec![defaults.teps; npix];
        for c in 0..centers.flag.len() {
            // A centre retrieved through substitute radiometry may sit on a
            // fill pixel; its class bits stay on the lattice only.
            if ipflag[centers.idx[c]] & IPFLAG_FILL == 0 {
                ipflag[centers.idx[c]] |= centers.flag[c];
            }
        }
        interpolate_to_pixels(
            &centers,
            &lattice,
            &self.scene.qaband,
            defaults,
            &mut taero,
            &mut teps,
            &mut ipflag,
        );

        final_correct(
            &mut self.scene,
            &scene_coefs,
            &cache,
            &taero,
            &teps,
            &mut ipflag,
            &self.params,
        );
        info!("surface reflectance correction done");

        Ok(SrProducts {
            nlines,
            nsamps,
            sband: self.scene.sband,
            ipflag,
            taero,
            teps,
        })
    }
}
