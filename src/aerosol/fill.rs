//! Repair of failed window-centre retrievals and the bilinear spread of the
//! centre-lattice (AOT, ε) values to every scene pixel.

use super::{CenterGrid, WindowLattice};
use crate::scene::{is_fill_qa, IPFLAG_CLEAR, IPFLAG_FILL, IPFLAG_WATER};

use rayon::prelude::*;

/// Last-resort aerosol state when no clear centre exists anywhere.
const FALLBACK_AOT: f32 = 0.05;
const FALLBACK_EPS: f32 = 1.5;

/// Scene-wide default aerosol state, used for fill pixels and for centres
/// with no valid neighbour at any radius.
#[derive(Debug, Clone, Copy)]
pub struct AeroDefaults {
    pub taero: f32,
    pub teps: f32,
}

fn has_retrieval(flag: u8) -> bool {
    flag & (IPFLAG_CLEAR | IPFLAG_WATER) != 0
}

fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values[values.len() / 2]
}

/// Replaces every invalid centre (flag 0) by the mean over valid centres
/// within an expanding Chebyshev radius. Returns the scene-wide defaults
/// derived from the clear-centre population.
pub fn fill_invalid_centers(grid: &mut CenterGrid) -> AeroDefaults {
    let mut clear_taero: Vec<f32> = Vec::new();
    let mut clear_teps: Vec<f32> = Vec::new();
    for c in 0..grid.flag.len() {
        if grid.flag[c] & IPFLAG_CLEAR != 0 {
            clear_taero.push(grid.taero[c]);
            clear_teps.push(grid.teps[c]);
        }
    }

    let defaults = if clear_taero.is_empty() {
        AeroDefaults {
            taero: FALLBACK_AOT,
            teps: FALLBACK_EPS,
        }
    } else {
        AeroDefaults {
            taero: median(&mut clear_taero),
            teps: median(&mut clear_teps),
        }
    };

    // Read validity from the pre-fill flags: repaired centres keep flag 0 and
    // never feed other repairs.
    let flags = grid.flag.clone();
    let max_r = grid.ncl.max(grid.ncs);

    for k in 0..grid.ncl {
        for m in 0..grid.ncs {
            let c = k * grid.ncs + m;
            if flags[c] != 0 {
                continue;
            }

            let mut filled = false;
            for r in 1..=max_r {
                let kmin = k.saturating_sub(r);
                let kmax = (k + r).min(grid.ncl - 1);
                let mmin = m.saturating_sub(r);
                let mmax = (m + r).min(grid.ncs - 1);

                let mut sum_taero = 0.0f64;
                let mut sum_teps = 0.0f64;
                let mut count = 0usize;
                for kk in kmin..=kmax {
                    for mm in mmin..=mmax {
                        let n = kk * grid.ncs + mm;
                        if n != c && has_retrieval(flags[n]) {
                            sum_taero += grid.taero[n] as f64;
                            sum_teps += grid.teps[n] as f64;
                            count += 1;
                        }
                    }
                }

                if count > 0 {
                    grid.taero[c] = (sum_taero / count as f64) as f32;
                    grid.teps[c] = (sum_teps / count as f64) as f32;
                    filled = true;
                    break;
                }
            }

            if !filled {
                grid.taero[c] = defaults.taero;
                grid.teps[c] = defaults.teps;
            }
        }
    }

    defaults
}

/// Bilinearly interpolates the centre-lattice (AOT, ε) to every non-fill
/// pixel and propagates the dominant centre's land/water class bits. Fill
/// pixels receive the scene defaults and keep their fill flag.
#[allow(clippy::too_many_arguments)]
pub fn interpolate_to_pixels(
    grid: &CenterGrid,
    lattice: &WindowLattice,
    qaband: &[u16],
    defaults: AeroDefaults,
    taero: &mut [f32],
    teps: &mut [f32],
    ipflag: &mut [u8],
) {
    let nsamps = lattice.nsamps;

    taero
        .par_chunks_mut(nsamps)
        .zip(teps.par_chunks_mut(nsamps))
        .zip(ipflag.par_chunks_mut(nsamps))
        .enumerate()
        .for_each(|(l, ((ta_row, te_row), fl_row))| {
            let fk = ((l as f32 - lattice.half as f32) / lattice.window as f32).max(0.0);
            let k0 = (fk as usize).min(grid.ncl - 1);
            let k1 = (k0 + 1).min(grid.ncl - 1);
            let u = (fk - k0 as f32).clamp(0.0, 1.0);

            for s in 0..nsamps {
                if is_fill_qa(qaband[l * nsamps + s]) {
                    ta_row[s] = defaults.taero;
                    te_row[s] = defaults.teps;
                    continue;
                }

                let fm = ((s as f32 - lattice.half as f32) / lattice.window as f32).max(0.0);
                let m0 = (fm as usize).min(grid.ncs - 1);
                let m1 = (m0 + 1).min(grid.ncs - 1);
                let v = (fm - m0 as f32).clamp(0.0, 1.0);

                let corners = [
                    (k0 * grid.ncs + m0, (1.0 - u) * (1.0 - v)),
                    (k0 * grid.ncs + m1, (1.0 - u) * v),
                    (k1 * grid.ncs + m0, u * (1.0 - v)),
                    (k1 * grid.ncs + m1, u * v),
                ];

                let mut wsum = 0.0f32;
                let mut acc_taero = 0.0f32;
                let mut acc_teps = 0.0f32;
                let mut best_weight = -1.0f32;
                let mut best_bits = 0u8;
                for (c, w) in corners {
                    if grid.flag[c] & IPFLAG_FILL != 0 {
                        continue;
                    }
                    wsum += w;
                    acc_taero += w * grid.taero[c];
                    acc_teps += w * grid.teps[c];
                    if w > best_weight {
                        best_weight = w;
                        best_bits = grid.flag[c] & (IPFLAG_CLEAR | IPFLAG_WATER);
                    }
                }

                if wsum > 0.0 {
                    ta_row[s] = acc_taero / wsum;
                    te_row[s] = acc_teps / wsum;
                    fl_row[s] |= best_bits;
                } else {
                    ta_row[s] = defaults.taero;
                    te_row[s] = defaults.teps;
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aerosol::AERO_UNSET;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn center_grid(ncl: usize, ncs: usize, taero: f32, flag: u8) -> CenterGrid {
        let n = ncl * ncs;
        CenterGrid {
            ncl,
            ncs,
            idx: (0..n).collect(),
            taero: vec![taero; n],
            teps: vec![1.5; n],
            flag: vec![flag; n],
        }
    }

    #[test]
    fn test_invalid_center_takes_mean_of_eight_neighbors() {
        let mut grid = center_grid(3, 3, 0.0, IPFLAG_CLEAR);
        for (c, t) in grid.taero.iter_mut().enumerate() {
            *t = 0.1 + 0.01 * c as f32;
        }
        grid.flag[4] = 0;
        grid.taero[4] = AERO_UNSET;

        fill_invalid_centers(&mut grid);

        // Mean over the eight surrounding valid centres.
        let expect: f32 = (0..9).filter(|&c| c != 4).map(|c| 0.1 + 0.01 * c as f32).sum::<f32>() / 8.0;
        assert_relative_eq!(grid.taero[4], expect, epsilon = 1e-5);
        assert_eq!(grid.flag[4], 0);
    }

    #[test]
    fn test_radius_expands_past_invalid_ring() {
        // Only the far corner is valid; the search must expand to reach it.
        let mut grid = center_grid(3, 3, AERO_UNSET, 0);
        grid.flag[8] = IPFLAG_CLEAR;
        grid.taero[8] = 0.3;
        grid.teps[8] = 2.0;

        fill_invalid_centers(&mut grid);
        assert_relative_eq!(grid.taero[0], 0.3, epsilon = 1e-6);
        assert_relative_eq!(grid.teps[0], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_no_valid_centers_falls_back_to_defaults() {
        let mut grid = center_grid(2, 2, AERO_UNSET, 0);
        let defaults = fill_invalid_centers(&mut grid);
        assert_abs_diff_eq!(defaults.taero, 0.05);
        assert_abs_diff_eq!(defaults.teps, 1.5);
        assert_abs_diff_eq!(grid.taero[3], 0.05);
    }

    #[test]
    fn test_defaults_are_clear_population_medians() {
        let mut grid = center_grid(3, 3, 0.2, IPFLAG_CLEAR);
        grid.taero = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];
        let defaults = fill_invalid_centers(&mut grid);
        assert_relative_eq!(defaults.taero, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_interpolation_is_exact_at_centers_and_uniform() {
        let lattice = WindowLattice::new(6, 12, 12);
        let grid = center_grid(2, 2, 0.25, IPFLAG_CLEAR);
        let qaband = vec![0u16; 144];
        let mut taero = vec![0.0f32; 144];
        let mut teps = vec![0.0f32; 144];
        let mut ipflag = vec![0u8; 144];

        interpolate_to_pixels(
            &grid,
            &lattice,
            &qaband,
            AeroDefaults {
                taero: 0.05,
                teps: 1.5,
            },
            &mut taero,
            &mut teps,
            &mut ipflag,
        );

        // Uniform centres produce a uniform field with the class bit set.
        for idx in 0..144 {
            assert_relative_eq!(taero[idx], 0.25, epsilon = 1e-6);
            assert_eq!(ipflag[idx] & IPFLAG_CLEAR, IPFLAG_CLEAR);
        }
    }

    #[test]
    fn test_interpolation_blends_between_centers() {
        let lattice = WindowLattice::new(6, 12, 12);
        let mut grid = center_grid(2, 2, 0.1, IPFLAG_CLEAR);
        grid.taero = vec![0.1, 0.3, 0.1, 0.3];
        let qaband = vec![0u16; 144];
        let mut taero = vec![0.0f32; 144];
        let mut teps = vec![0.0f32; 144];
        let mut ipflag = vec![0u8; 144];

        interpolate_to_pixels(
            &grid,
            &lattice,
            &qaband,
            AeroDefaults {
                taero: 0.05,
                teps: 1.5,
            },
            &mut taero,
            &mut teps,
            &mut ipflag,
        );

        // Exact at the two centres of the first row of windows.
        assert_relative_eq!(taero[3 * 12 + 3], 0.1, epsilon = 1e-6);
        assert_relative_eq!(taero[3 * 12 + 9], 0.3, epsilon = 1e-6);
        // Halfway between them the blend is the average.
        assert_relative_eq!(taero[3 * 12 + 6], 0.2, epsilon = 1e-6);
        // Before the first centre: nearest-centre extrapolation.
        assert_relative_eq!(taero[0], 0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_fill_pixels_keep_defaults() {
        let lattice = WindowLattice::new(6, 12, 12);
        let grid = center_grid(2, 2, 0.25, IPFLAG_CLEAR);
        let mut qaband = vec![0u16; 144];
        qaband[7] = 1;
        let mut taero = vec![0.0f32; 144];
        let mut teps = vec![0.0f32; 144];
        let mut ipflag = vec![0u8; 144];
        ipflag[7] = IPFLAG_FILL;

        interpolate_to_pixels(
            &grid,
            &lattice,
            &qaband,
            AeroDefaults {
                taero: 0.05,
                teps: 1.5,
            },
            &mut taero,
            &mut teps,
            &mut ipflag,
        );

        assert_relative_eq!(taero[7], 0.05, epsilon = 1e-6);
        assert_eq!(ipflag[7], IPFLAG_FILL);
    }

    #[test]
    fn test_fill_corner_centers_renormalize_weights() {
        let lattice = WindowLattice::new(6, 12, 12);
        let mut grid = center_grid(2, 2, 0.25, IPFLAG_CLEAR);
        grid.flag[0] = IPFLAG_FILL;
        grid.taero[0] = AERO_UNSET;
        let qaband = vec![0u16; 144];
        let mut taero = vec![0.0f32; 144];
        let mut teps = vec![0.0f32; 144];
        let mut ipflag = vec![0u8; 144];

        interpolate_to_pixels(
            &grid,
            &lattice,
            &qaband,
            AeroDefaults {
                taero: 0.05,
                teps: 1.5,
            },
            &mut taero,
            &mut teps,
            &mut ipflag,
        );

        // A pixel splitting its weight between the fill corner and a valid
        // centre renormalizes onto the valid one; never the sentinel.
        assert_relative_eq!(taero[3 * 12 + 6], 0.25, epsilon = 1e-6);
        // A pixel whose whole weight sits on the fill corner gets defaults.
        assert_relative_eq!(taero[3 * 12 + 3], 0.05, epsilon = 1e-6);
    }
}
