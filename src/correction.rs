//! The two pixel-parallel correction passes.
//!
//! The climatology pass converts TOA reflectance to a first-guess surface
//! reflectance using scene-wide coefficients at the default aerosol state;
//! the final pass reconstructs the TOA value exactly, then re-inverts it with
//! the retrieved per-pixel (AOT, ε) and stamps the aerosol QA bits.

use crate::atmosphere::{lambertian, to_toa, CoefficientCache, SceneCoefficients};
use crate::bands::{B1, B2, B4, B5, B7, NREFL_BANDS};
use crate::pipeline::SrParams;
use crate::scene::{is_fill_qa, Scene, IPFLAG_AERO1, IPFLAG_AERO2};

use rayon::prelude::*;

/// TOA reflectance of the aerosol-retrieval bands, captured before the
/// climatology pass overwrites `sband`. Freed after the inversion.
#[derive(Debug)]
pub struct ToaSnapshots {
    pub b1: Vec<f32>,
    pub b2: Vec<f32>,
    pub b4: Vec<f32>,
    pub b5: Vec<f32>,
    pub b7: Vec<f32>,
}

pub fn snapshot(scene: &Scene) -> ToaSnapshots {
    ToaSnapshots {
        b1: scene.sband[B1].clone(),
        b2: scene.sband[B2].clone(),
        b4: scene.sband[B4].clone(),
        b5: scene.sband[B5].clone(),
        b7: scene.sband[B7].clone(),
    }
}

/// First-guess correction of every non-fill pixel with the scene-wide
/// coefficients.
pub fn climatology_correct(scene: &mut Scene, coefs: &SceneCoefficients) {
    let qaband = std::mem::take(&mut scene.qaband);

    for ib in 0..NREFL_BANDS {
        let tgo = coefs.tgo[ib];
        let roatm = coefs.roatm[ib];
        let ttatmg = coefs.ttatmg[ib];
        let satm = coefs.satm[ib];

        scene.sband[ib]
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, v)| {
                if !is_fill_qa(qaband[i]) {
                    *v = lambertian(*v, tgo, roatm, ttatmg, satm);
                }
            });
    }

    scene.qaband = qaband;
}

/// Final correction: undo the climatology pass analytically, re-invert with
/// the per-pixel aerosol state, stamp band-1 aerosol QA, clamp and write.
pub fn final_correct(
    scene: &mut Scene,
    coefs: &SceneCoefficients,
    cache: &CoefficientCache,
    taero: &[f32],
    teps: &[f32],
    ipflag: &mut [u8],
    params: &SrParams,
) {
    let qaband = std::mem::take(&mut scene.qaband);
    let low = params.low_aero_thresh;
    let avg = params.avg_aero_thresh;
    let min_refl = params.min_valid_refl;
    let max_refl = params.max_valid_refl;

    for ib in 0..NREFL_BANDS {
        let tgo = coefs.tgo[ib];
        let roatm = coefs.roatm[ib];
        let ttatmg = coefs.ttatmg[ib];
        let satm = coefs.satm[ib];

        if ib == B1 {
            scene.sband[ib]
                .par_iter_mut()
                .zip(ipflag.par_iter_mut())
                .enumerate()
                .for_each(|(i, (v, fl))| {
                    if is_fill_qa(qaband[i]) {
                        return;
                    }
                    let rsurf = *v;
                    let rotoa = to_toa(rsurf, tgo, roatm, ttatmg, satm);
                    let roslamb = cache.correct(rotoa, ib, taero[i], teps[i]);

                    let delta = (rsurf - roslamb).abs();
                    if delta <= low {
                        *fl |= IPFLAG_AERO1;
                    } else if delta < avg {
                        *fl |= IPFLAG_AERO2;
                    } else {
                        *fl |= IPFLAG_AERO1 | IPFLAG_AERO2;
                    }

                    *v = roslamb.clamp(min_refl, max_refl);
                });
        } else {
            scene.sband[ib]
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, v)| {
                    if is_fill_qa(qaband[i]) {
                        return;
                    }
                    let rotoa = to_toa(*v, tgo, roatm, ttatmg, satm);
                    let roslamb = cache.correct(rotoa, ib, taero[i], teps[i]);
                    *v = roslamb.clamp(min_refl, max_refl);
                });
        }
    }

    scene.qaband = qaband;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::WAVELENGTH;
    use crate::lut::tables::AOT550NM;
    use crate::lut::NAOT_VALS;
    use crate::pipeline::SrParams;
    use crate::scene::test_support::uniform_scene;
    use approx::assert_abs_diff_eq;

    fn scene_coefs() -> SceneCoefficients {
        SceneCoefficients {
            tgo: [0.98; NREFL_BANDS],
            roatm: [0.05; NREFL_BANDS],
            ttatmg: [0.9; NREFL_BANDS],
            satm: [0.1; NREFL_BANDS],
        }
    }

    fn identity_cache() -> CoefficientCache {
        let mut normext = [0.0f32; NREFL_BANDS];
        for (ib, n) in normext.iter_mut().enumerate() {
            *n = (550.0 / WAVELENGTH[ib]).powf(2.5);
        }
        CoefficientCache {
            tgo: [0.98; NREFL_BANDS],
            roatm_coef: [[0.05, 0.0, 0.0, 0.0]; NREFL_BANDS],
            ttatmg_coef: [[0.9, 0.0, 0.0, 0.0]; NREFL_BANDS],
            satm_coef: [[0.1, 0.0, 0.0, 0.0]; NREFL_BANDS],
            normext_p0a3: normext,
            ia_max: [NAOT_VALS - 1; NREFL_BANDS],
            aot_max: [AOT550NM[NAOT_VALS - 1]; NREFL_BANDS],
        }
    }

    #[test]
    fn test_climatology_correction_value() {
        let mut scene = uniform_scene(4, 4, 0.2);
        climatology_correct(&mut scene, &scene_coefs());
        assert_abs_diff_eq!(scene.sband[B4][0], 0.16832, epsilon = 1e-4);
    }

    #[test]
    fn test_climatology_skips_fill_pixels() {
        let mut scene = uniform_scene(4, 4, 0.2);
        scene.qaband[5] = 1;
        climatology_correct(&mut scene, &scene_coefs());
        assert_abs_diff_eq!(scene.sband[B4][5], 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_toa_reconstruction_roundtrip() {
        // Correct, then analytically reconstruct the TOA value: the round
        // trip must be tight for every band.
        let mut scene = uniform_scene(4, 4, 0.2);
        let coefs = scene_coefs();
        climatology_correct(&mut scene, &coefs);

        for ib in 0..NREFL_BANDS {
            let rsurf = scene.sband[ib][0];
            let rotoa = to_toa(
                rsurf,
                coefs.tgo[ib],
                coefs.roatm[ib],
                coefs.ttatmg[ib],
                coefs.satm[ib],
            );
            assert_abs_diff_eq!(rotoa, 0.2, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_final_correction_with_matching_state_is_stable() {
        // When the cache reproduces the scene coefficients and the per-pixel
        // aerosol equals the default state, the final pass is a fixed point
        // and the aerosol QA reports low aerosol.
        let mut scene = uniform_scene(4, 4, 0.2);
        let coefs = scene_coefs();
        let cache = identity_cache();
        climatology_correct(&mut scene, &coefs);
        let before = scene.sband[B4][0];

        let npix = scene.npix();
        let taero = vec![0.1f32; npix];
        let teps = vec![2.5f32; npix];
        let mut ipflag = scene.initial_flags();
        final_correct(
            &mut scene,
            &coefs,
            &cache,
            &taero,
            &teps,
            &mut ipflag,
            &SrParams::default(),
        );

        assert_abs_diff_eq!(scene.sband[B4][0], before, epsilon = 1e-5);
        assert_eq!(ipflag[0] & (IPFLAG_AERO1 | IPFLAG_AERO2), IPFLAG_AERO1);
    }

    #[test]
    fn test_final_correction_clamps_to_valid_range() {
        let mut scene = uniform_scene(2, 2, 0.2);
        // A wildly negative "surface reflectance" going in clamps on write.
        scene.sband[B5] = vec![-0.9; 4];
        let coefs = scene_coefs();
        let cache = identity_cache();
        let params = SrParams::default();

        let taero = vec![0.1f32; 4];
        let teps = vec![2.5f32; 4];
        let mut ipflag = scene.initial_flags();
        final_correct(
            &mut scene,
            &coefs,
            &cache,
            &taero,
            &teps,
            &mut ipflag,
            &params,
        );

        for &v in &scene.sband[B5] {
            assert!(v >= params.min_valid_refl && v <= params.max_valid_refl);
        }
    }

    #[test]
    fn test_snapshot_captures_retrieval_bands() {
        let scene = uniform_scene(2, 2, 0.3);
        let snap = snapshot(&scene);
        assert_eq!(snap.b1, scene.sband[B1]);
        assert_eq!(snap.b2, scene.sband[B2]);
        assert_eq!(snap.b4, scene.sband[B4]);
        assert_eq!(snap.b5, scene.sband[B5]);
        assert_eq!(snap.b7, scene.sband[B7]);
    }
}
