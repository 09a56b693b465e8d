//! Per-band cubic coefficient cache in AOT.
//!
//! The full kernel is evaluated once per band at every AOT grid sample and a
//! 3rd-order polynomial is fitted to each of the intrinsic reflectance, total
//! transmission and spherical albedo curves. The per-pixel correction then
//! reduces to three polynomial evaluations and the closed-form Lambertian
//! inversion.

use super::{effective_aot, lambertian, AtmKernel};
use crate::bands::{NREFL_BANDS, WAVELENGTH};
use crate::error::SrError;
use crate::lut::tables::AOT550NM;
use crate::lut::NAOT_VALS;

/// Increment below which the intrinsic-reflectance curve is considered to
/// have stopped increasing in AOT.
const EPS_TINY: f32 = 1.0e-6;

#[derive(Debug, Clone)]
pub struct CoefficientCache {
    pub tgo: [f32; NREFL_BANDS],
    pub roatm_coef: [[f32; 4]; NREFL_BANDS],
    pub ttatmg_coef: [[f32; 4]; NREFL_BANDS],
    pub satm_coef: [[f32; 4]; NREFL_BANDS],
    pub normext_p0a3: [f32; NREFL_BANDS],
    pub ia_max: [usize; NREFL_BANDS],
    pub aot_max: [f32; NREFL_BANDS],
}

/// Scene-wide scalar coefficients: the cache evaluated at one (AOT, ε) for
/// every band, used by the climatology pass and the TOA reconstruction.
#[derive(Debug, Clone)]
pub struct SceneCoefficients {
    pub tgo: [f32; NREFL_BANDS],
    pub roatm: [f32; NREFL_BANDS],
    pub ttatmg: [f32; NREFL_BANDS],
    pub satm: [f32; NREFL_BANDS],
}

impl CoefficientCache {
    /// Samples the kernel over the AOT grid at the scene state and fits the
    /// per-band cubics. `eps` is the reference Ångström exponent the curves
    /// are sampled at.
    pub fn build(
        kernel: &AtmKernel,
        pres: f32,
        uoz: f32,
        uwv: f32,
        eps: f32,
    ) -> Result<Self, SrError> {
        let mut cache = CoefficientCache {
            tgo: [0.0; NREFL_BANDS],
            roatm_coef: [[0.0; 4]; NREFL_BANDS],
            ttatmg_coef: [[0.0; 4]; NREFL_BANDS],
            satm_coef: [[0.0; 4]; NREFL_BANDS],
            normext_p0a3: [0.0; NREFL_BANDS],
            ia_max: [0; NREFL_BANDS],
            aot_max: [0.0; NREFL_BANDS],
        };

        for ib in 0..NREFL_BANDS {
            let mut roatm_arr = [0.0f32; NAOT_VALS];
            let mut ttatmg_arr = [0.0f32; NAOT_VALS];
            let mut satm_arr = [0.0f32; NAOT_VALS];

            for ia in 0..NAOT_VALS {
                let terms = kernel.components(ib, pres, AOT550NM[ia], eps, uoz, uwv)?;
                roatm_arr[ia] = terms.roatm;
                ttatmg_arr[ia] = terms.ttatmg;
                satm_arr[ia] = terms.satm;
                cache.tgo[ib] = terms.tgo;
            }

            let ia_max = monotone_limit(&roatm_arr);
            // A cubic needs four samples even when monotonicity dies early.
            let fit_end = ia_max.max(3);

            cache.roatm_coef[ib] =
                fit_cubic(&AOT550NM[..=fit_end], &roatm_arr[..=fit_end]);
            cache.ttatmg_coef[ib] = fit_cubic(&AOT550NM, &ttatmg_arr);
            cache.satm_coef[ib] = fit_cubic(&AOT550NM, &satm_arr);
            cache.normext_p0a3[ib] = kernel.normext_p0a3(ib);
            cache.ia_max[ib] = ia_max;
            cache.aot_max[ib] = AOT550NM[ia_max];
        }

        Ok(cache)
    }

    /// Fast-path Lambertian correction of one TOA reflectance value using the
    /// fitted polynomials. ε rescales the AOT axis for the intrinsic
    /// reflectance and spherical albedo through the band extinction ratio.
    pub fn correct(&self, rotoa: f32, ib: usize, raot550nm: f32, eps: f32) -> f32 {
        let tau_eff = effective_aot(raot550nm, eps, WAVELENGTH[ib], self.normext_p0a3[ib]);

        let roatm = eval_cubic(
            &self.roatm_coef[ib],
            tau_eff.clamp(AOT550NM[0], self.aot_max[ib]),
        );
        let satm = eval_cubic(
            &self.satm_coef[ib],
            tau_eff.clamp(AOT550NM[0], AOT550NM[NAOT_VALS - 1]),
        );
        let ttatmg = eval_cubic(
            &self.ttatmg_coef[ib],
            raot550nm.clamp(AOT550NM[0], AOT550NM[NAOT_VALS - 1]),
        );

        lambertian(rotoa, self.tgo[ib], roatm, ttatmg, satm)
    }

    /// Scalar per-band coefficients at one (AOT, ε).
    pub fn at(&self, raot550nm: f32, eps: f32) -> SceneCoefficients {
        let mut scene = SceneCoefficients {
            tgo: self.tgo,
            roatm: [0.0; NREFL_BANDS],
            ttatmg: [0.0; NREFL_BANDS],
            satm: [0.0; NREFL_BANDS],
        };

        for ib in 0..NREFL_BANDS {
            let tau_eff = effective_aot(raot550nm, eps, WAVELENGTH[ib], self.normext_p0a3[ib]);
            scene.roatm[ib] = eval_cubic(
                &self.roatm_coef[ib],
                tau_eff.clamp(AOT550NM[0], self.aot_max[ib]),
            );
            scene.satm[ib] = eval_cubic(
                &self.satm_coef[ib],
                tau_eff.clamp(AOT550NM[0], AOT550NM[NAOT_VALS - 1]),
            );
            scene.ttatmg[ib] = eval_cubic(
                &self.ttatmg_coef[ib],
                raot550nm.clamp(AOT550NM[0], AOT550NM[NAOT_VALS - 1]),
            );
        }

        scene
    }
}

/// Index of the last sample of the strictly increasing prefix of `arr`.
pub fn monotone_limit(arr: &[f32]) -> usize {
    for ia in 1..arr.len() {
        if arr[ia] - arr[ia - 1] <= EPS_TINY {
            return ia - 1;
        }
    }
    arr.len() - 1
}

/// Least-squares 3rd-order polynomial fit, `y = c0 + c1 x + c2 x^2 + c3 x^3`.
///
/// Accumulation and the normal-equation solve run in double precision; the
/// coefficients are truncated to single precision on return.
pub fn fit_cubic(x: &[f32], y: &[f32]) -> [f32; 4] {
    debug_assert!(x.len() == y.len() && x.len() >= 4);

    // Moments of x up to x^6 and mixed moments with y.
    let mut sx = [0.0f64; 7];
    let mut sxy = [0.0f64; 4];
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let xi = xi as f64;
        let yi = yi as f64;
        let mut p = 1.0;
        for sxk in sx.iter_mut() {
            *sxk += p;
            p *= xi;
        }
        let mut p = 1.0;
        for sxyk in sxy.iter_mut() {
            *sxyk += p * yi;
            p *= xi;
        }
    }

    let mut a = [[0.0f64; 5]; 4];
    for (r, row) in a.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().take(4).enumerate() {
            *cell = sx[r + c];
        }
        row[4] = sxy[r];
    }

    // Gaussian elimination with partial pivoting.
    for col in 0..4 {
        let mut pivot = col;
        for r in col + 1..4 {
            if a[r][col].abs() > a[pivot][col].abs() {
                pivot = r;
            }
        }
        a.swap(col, pivot);

        let diag = a[col][col];
        if diag.abs() < 1.0e-30 {
            continue;
        }
        for r in col + 1..4 {
            let factor = a[r][col] / diag;
            for c in col..5 {
                a[r][c] -= factor * a[col][c];
            }
        }
    }

    let mut coef = [0.0f64; 4];
    for r in (0..4).rev() {
        let mut acc = a[r][4];
        for c in r + 1..4 {
            acc -= a[r][c] * coef[c];
        }
        coef[r] = if a[r][r].abs() < 1.0e-30 {
            0.0
        } else {
            acc / a[r][r]
        };
    }

    [coef[0] as f32, coef[1] as f32, coef[2] as f32, coef[3] as f32]
}

#[inline]
pub fn eval_cubic(c: &[f32; 4], x: f32) -> f32 {
    c[0] + x * (c[1] + x * (c[2] + x * c[3]))
}
