//! AOT retrieval for one pixel and one Ångström exponent: a monotone
//! bracket-and-interpolate walk over the AOT sample grid driven by the
//! fitted coefficient polynomials.

use crate::atmosphere::CoefficientCache;
use crate::bands::NREFL_BANDS;
use crate::lut::tables::AOT550NM;
use crate::lut::NAOT_VALS;

/// Result of one AOT retrieval.
#[derive(Debug, Clone, Copy)]
pub struct Retrieval {
    pub raot: f32,
    pub residual: f32,
}

/// Band-consistency residual at one trial AOT, in units of reference-band
/// surface reflectance.
///
/// Every constrained band (`erelc > 0`) is inverted and scaled by its
/// expected ratio to the reference band; the residual is the RMS spread of
/// those implied reference-band reflectances around the reference band's own
/// inversion. The water model supplies unit ratios, which turns this into
/// the plain RMS spread of the per-band reflectances.
fn residual_at(
    cache: &CoefficientCache,
    erelc: &[f32; NREFL_BANDS],
    troatm: &[f32; NREFL_BANDS],
    ref_band: usize,
    eps: f32,
    tau: f32,
) -> f32 {
    let ros_ref = cache.correct(troatm[ref_band], ref_band, tau, eps);

    let mut sum = 0.0f64;
    let mut n = 0u32;
    for ib in 0..NREFL_BANDS {
        if ib == ref_band || erelc[ib] <= 0.0 {
            continue;
        }
        let ros = cache.correct(troatm[ib], ib, tau, eps);
        let err = (ros / erelc[ib] - ros_ref) as f64;
        sum += err * err;
        n += 1;
    }

    if n == 0 {
        0.0
    } else {
        (sum / n as f64).sqrt() as f32
    }
}

/// Retrieves the AOT minimizing the band-consistency residual.
///
/// The walk starts at `iaots` and steps downhill along the AOT grid; once the
/// residual turns back up, a parabola through the three bracketing samples
/// refines the minimum. `iaots` is advanced so the next retrieval at a nearby
/// Ångström exponent starts its walk where this one ended.
pub fn retrieve_aot(
    cache: &CoefficientCache,
    erelc: &[f32; NREFL_BANDS],
    troatm: &[f32; NREFL_BANDS],
    ref_band: usize,
    eps: f32,
    iaots: &mut usize,
) -> Retrieval {
    let res = |tau: f32| residual_at(cache, erelc, troatm, ref_band, eps, tau);

    let mut ia = (*iaots).min(NAOT_VALS - 1);
    let mut r_cur = res(AOT550NM[ia]);

    // Pick the downhill direction, then walk until the residual turns up.
    if ia > 0 && res(AOT550NM[ia - 1]) < r_cur {
        while ia > 0 {
            let r_next = res(AOT550NM[ia - 1]);
            if r_next >= r_cur {
                break;
            }
            ia -= 1;
            r_cur = r_next;
        }
    } else {
        while ia + 1 < NAOT_VALS {
            let r_next = res(AOT550NM[ia + 1]);
            if r_next >= r_cur {
                break;
            }
            ia += 1;
            r_cur = r_next;
        }
    }

    *iaots = ia.saturating_sub(1);

    if ia == 0 || ia + 1 >= NAOT_VALS {
        return Retrieval {
            raot: AOT550NM[ia],
            residual: r_cur,
        };
    }

    let r_lo = res(AOT550NM[ia - 1]);
    let r_hi = res(AOT550NM[ia + 1]);
    match parabola_vertex(
        AOT550NM[ia - 1] as f64,
        r_lo as f64,
        AOT550NM[ia] as f64,
        r_cur as f64,
        AOT550NM[ia + 1] as f64,
        r_hi as f64,
    ) {
        Some(tau) => {
            let tau = (tau as f32).clamp(AOT550NM[ia - 1], AOT550NM[ia + 1]);
            let r = res(tau);
            if r <= r_cur {
                Retrieval {
                    raot: tau,
                    residual: r,
                }
            } else {
                Retrieval {
                    raot: AOT550NM[ia],
                    residual: r_cur,
                }
            }
        }
        None => Retrieval {
            raot: AOT550NM[ia],
            residual: r_cur,
        },
    }
}

/// Vertex of the parabola through three points, if it is well defined.
fn parabola_vertex(x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) -> Option<f64> {
    let d1 = (x2 - x1) * (y2 - y3);
    let d2 = (x2 - x3) * (y2 - y1);
    let denom = d1 - d2;
    if denom.abs() < 1.0e-12 {
        return None;
    }
    Some(x2 - 0.5 * ((x2 - x1) * d1 - (x2 - x3) * d2) / denom)
}

/// Minimum of the parabola through the three (ε, residual) trials.
///
/// Returns `None` when the three residuals are degenerate (collinear), in
/// which case the caller falls back to the best sampled trial.
pub fn epsilon_minimum(e1: f32, r1: f32, e2: f32, r2: f32, e3: f32, r3: f32) -> Option<f32> {
    let (e1, e2, e3) = (e1 as f64, e2 as f64, e3 as f64);
    let (r1, r2, r3) = (r1 as f64, r2 as f64, r3 as f64);

    let xa = (r1 - r3) * (e2 - e3);
    let xb = (r2 - r3) * (e1 - e3);
    let denom = xa - xb;
    if denom.abs() < 1.0e-12 {
        return None;
    }

    Some((0.5 * (xa * (e2 + e3) - xb * (e1 + e3)) / denom) as f32)
}
