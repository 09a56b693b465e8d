//! Atmospheric radiative-transfer kernel.
//!
//! Given the scene observation geometry and the precomputed 6S-style tables,
//! the kernel produces the terms of the Lambertian correction for one band at
//! one (pressure, AOT, ε, ozone, water vapor) state: intrinsic atmospheric
//! reflectance, total transmission, spherical albedo, the AOT-independent
//! gaseous transmission, and the Rayleigh reflectance. The closed-form
//! inversion itself is the pair [`lambertian`] / [`to_toa`].

pub mod coefficients;

pub use coefficients::{CoefficientCache, SceneCoefficients};

use crate::bands::{GasCoefficients, Satellites, WAVELENGTH};
use crate::error::SrError;
use crate::lut::tables::{bracket_increasing, bracket_pressure, ANGLE_STEP, AOT550NM};
use crate::lut::AerosolLut;

/// Scene observation geometry, all angles in degrees.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub xts: f32,
    pub xtv: f32,
    pub xfi: f32,
    pub xmus: f32,
    pub xmuv: f32,
    pub cosxfi: f32,
}

impl Geometry {
    /// Nadir-viewing geometry for a given solar zenith angle.
    pub fn nadir(xts: f32) -> Self {
        Geometry {
            xts,
            xtv: 0.0,
            xfi: 0.0,
            xmus: xts.to_radians().cos(),
            xmuv: 1.0,
            cosxfi: 1.0,
        }
    }
}

/// Atmospheric terms for one band at one atmospheric state.
#[derive(Debug, Clone, Copy)]
pub struct AtmosTerms {
    pub roatm: f32,
    pub ttatmg: f32,
    pub satm: f32,
    pub tgo: f32,
    pub rorayl: f32,
}

/// One (view, sun) node of the geometry interpolation with its weight and the
/// scattering-sample position the scene geometry falls on.
#[derive(Debug, Clone, Copy)]
struct GeomCorner {
    base: usize,
    k: usize,
    rk: f32,
    weight: f32,
}

/// Kernel bound to one LUT and one scene geometry.
///
/// The sun/view angle indices and scattering-sample positions are resolved
/// once at construction; per-call work is reduced to pressure/AOT bracketing
/// and the analytic gas terms.
#[derive(Debug)]
pub struct AtmKernel<'a> {
    lut: &'a AerosolLut,
    gas: &'static GasCoefficients,
    geom: Geometry,
    corners: [GeomCorner; 4],
}

impl<'a> AtmKernel<'a> {
    pub fn new(lut: &'a AerosolLut, satellite: Satellites, geom: Geometry) -> Result<Self, SrError> {
        if !(0.0..90.0).contains(&geom.xts) {
            return Err(SrError::Lut(format!(
                "solar zenith {} out of range [0, 90)",
                geom.xts
            )));
        }

        let nsz = lut.nsz();
        let nvz = lut.nvz();

        let fts = (geom.xts / ANGLE_STEP).min((nsz - 1) as f32);
        let its = (fts as usize).min(nsz - 2);
        let rts = (fts - its as f32).clamp(0.0, 1.0);

        // Scattering angle between the sun and view directions.
        let sints = (1.0 - geom.xmus * geom.xmus).max(0.0).sqrt();
        let sintv = (1.0 - geom.xmuv * geom.xmuv).max(0.0).sqrt();
        let cscat = (-geom.xmus * geom.xmuv - sints * sintv * geom.cosxfi).clamp(-1.0, 1.0);
        let scat_deg = cscat.acos().to_degrees();

        let mut corners = [GeomCorner {
            base: 0,
            k: 0,
            rk: 0.0,
            weight: 0.0,
        }; 4];

        for (j, (col, wsun)) in [(its, 1.0 - rts), (its + 1, rts)].into_iter().enumerate() {
            // Bracket the view zenith in this solar column of the ttv table.
            let mut itv = 0;
            while itv + 2 < nvz && lut.ttv(itv + 1, col) <= geom.xtv {
                itv += 1;
            }
            let tv0 = lut.ttv(itv, col);
            let tv1 = lut.ttv(itv + 1, col);
            let rtv = if tv1 > tv0 {
                ((geom.xtv - tv0) / (tv1 - tv0)).clamp(0.0, 1.0)
            } else {
                0.0
            };

            for (c, (row, wview)) in [(itv, 1.0 - rtv), (itv + 1, rtv)].into_iter().enumerate() {
                let nfi = lut.nbfi(row, col);
                let base = lut.nbfic(row, col) - nfi;
                let smin = lut.tsmin(row, col);
                let smax = lut.tsmax(row, col);
                let span = smax - smin;
                let pos = if span > 0.0 {
                    ((scat_deg - smin) / span).clamp(0.0, 1.0) * (nfi - 1) as f32
                } else {
                    0.0
                };
                let k = (pos as usize).min(nfi - 2);
                let rk = (pos - k as f32).clamp(0.0, 1.0);

                corners[j * 2 + c] = GeomCorner {
                    base,
                    k,
                    rk,
                    weight: wsun * wview,
                };
            }
        }

        Ok(AtmKernel {
            lut,
            gas: satellite.gas_coefficients(),
            geom,
            corners,
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geom
    }

    pub fn normext_p0a3(&self, ib: usize) -> f32 {
        self.lut.normext(ib, 0, 3)
    }

    /// Intrinsic reflectance at one (pressure, AOT) grid point, interpolated
    /// over the resolved geometry corners.
    fn ro_geom(&self, ib: usize, ip: usize, ia: usize) -> f32 {
        let mut ro = 0.0;
        for corner in &self.corners {
            let v0 = self.lut.rolutt(ib, ip, ia, corner.base + corner.k);
            let v1 = self.lut.rolutt(ib, ip, ia, corner.base + corner.k + 1);
            ro += corner.weight * ((1.0 - corner.rk) * v0 + corner.rk * v1);
        }
        ro
    }

    fn roatm(&self, ib: usize, ip: usize, rp: f32, ia: usize, ra: f32) -> f32 {
        let lo = (1.0 - ra) * self.ro_geom(ib, ip, ia) + ra * self.ro_geom(ib, ip, ia + 1);
        let hi = (1.0 - ra) * self.ro_geom(ib, ip + 1, ia) + ra * self.ro_geom(ib, ip + 1, ia + 1);
        (1.0 - rp) * lo + rp * hi
    }

    /// One-way transmission toward a given zenith angle.
    fn trans(&self, ib: usize, ip: usize, rp: f32, ia: usize, ra: f32, angle: f32) -> f32 {
        let nsun = self.lut.nsun();
        let fsun = (angle / ANGLE_STEP).clamp(0.0, (nsun - 1) as f32);
        let isun = (fsun as usize).min(nsun - 2);
        let rsun = fsun - isun as f32;

        let at = |p: usize, a: usize| -> f32 {
            (1.0 - rsun) * self.lut.transt(ib, p, a, isun) + rsun * self.lut.transt(ib, p, a, isun + 1)
        };

        let lo = (1.0 - ra) * at(ip, ia) + ra * at(ip, ia + 1);
        let hi = (1.0 - ra) * at(ip + 1, ia) + ra * at(ip + 1, ia + 1);
        (1.0 - rp) * lo + rp * hi
    }

    fn sphalb(&self, ib: usize, ip: usize, rp: f32, ia: usize, ra: f32) -> f32 {
        let lo = (1.0 - ra) * self.lut.sphalbt(ib, ip, ia) + ra * self.lut.sphalbt(ib, ip, ia + 1);
        let hi =
            (1.0 - ra) * self.lut.sphalbt(ib, ip + 1, ia) + ra * self.lut.sphalbt(ib, ip + 1, ia + 1);
        (1.0 - rp) * lo + rp * hi
    }

    /// Atmospheric terms for band `ib` at the given state. Out-of-grid AOT and
    /// pressure clamp to the nearest grid endpoint; only a bad band index is
    /// an error.
    pub fn components(
        &self,
        ib: usize,
        pres: f32,
        raot550nm: f32,
        eps: f32,
        uoz: f32,
        uwv: f32,
    ) -> Result<AtmosTerms, SrError> {
        self.lut.check_band(ib)?;

        let (ip, rp) = bracket_pressure(pres);

        let tau_eff = effective_aot(raot550nm, eps, WAVELENGTH[ib], self.normext_p0a3(ib));
        let (ia, ra) = bracket_increasing(&AOT550NM, tau_eff);
        let roatm = self.roatm(ib, ip, rp, ia, ra);
        let satm = self.sphalb(ib, ip, rp, ia, ra);

        let (iat, rat) = bracket_increasing(&AOT550NM, raot550nm);
        let xtts = self.trans(ib, ip, rp, iat, rat, self.geom.xts);
        let xttv = self.trans(ib, ip, rp, iat, rat, self.geom.xtv);

        let m = 1.0 / self.geom.xmus + 1.0 / self.geom.xmuv;
        let p = pres / 1013.0;

        let ttoz = (self.gas.oztransa[ib] * uoz * m).exp();
        let x = uwv * m;
        let ttwv = if x > 1.0e-6 {
            (-self.gas.wvtransa[ib] * x.powf(self.gas.wvtransb[ib])).exp()
        } else {
            1.0
        };
        let ttog = (-(self.gas.ogtransa1[ib] * p)
            * m.powf(self.gas.ogtransb0[ib] + self.gas.ogtransb1[ib] * p))
        .exp();

        // Single-scattering Rayleigh reflectance at the scene pressure.
        let phase = 0.75 * (1.0 + cscat_sq(&self.geom));
        let rorayl =
            self.gas.tauray[ib] * p * phase / (4.0 * self.geom.xmus * self.geom.xmuv);

        Ok(AtmosTerms {
            roatm,
            ttatmg: xtts * xttv * ttwv,
            satm,
            tgo: ttoz * ttog,
            rorayl,
        })
    }

    /// Full-path Lambertian correction of one TOA reflectance value.
    pub fn correct(
        &self,
        rotoa: f32,
        ib: usize,
        pres: f32,
        raot550nm: f32,
        eps: f32,
        uoz: f32,
        uwv: f32,
    ) -> Result<(f32, AtmosTerms), SrError> {
        let terms = self.components(ib, pres, raot550nm, eps, uoz, uwv)?;
        let roslamb = lambertian(rotoa, terms.tgo, terms.roatm, terms.ttatmg, terms.satm);
        Ok((roslamb, terms))
    }
}

fn cscat_sq(geom: &Geometry) -> f32 {
    let sints = (1.0 - geom.xmus * geom.xmus).max(0.0).sqrt();
    let sintv = (1.0 - geom.xmuv * geom.xmuv).max(0.0).sqrt();
    let cscat = (-geom.xmus * geom.xmuv - sints * sintv * geom.cosxfi).clamp(-1.0, 1.0);
    cscat * cscat
}

/// Effective AOT on the table axis for a requested Ångström exponent.
///
/// The per-band tables are built at the aerosol model's native exponent;
/// `normext` carries the model's band extinction normalized at 550 nm, so the
/// requested ε maps onto the AOT axis through the extinction ratio.
pub fn effective_aot(raot550nm: f32, eps: f32, wavelength: f32, normext: f32) -> f32 {
    if normext <= 1.0e-6 {
        return raot550nm;
    }
    raot550nm * (550.0 / wavelength).powf(eps) / normext
}

/// Lambertian surface reflectance from TOA reflectance and the atmospheric
/// terms.
#[inline]
pub fn lambertian(rotoa: f32, tgo: f32, roatm: f32, ttatmg: f32, satm: f32) -> f32 {
    let rop = rotoa / tgo - roatm;
    rop / (ttatmg + satm * rop)
}

/// Exact inverse of [`lambertian`]: reconstructs the TOA reflectance a surface
/// reflectance would produce under the same atmospheric terms.
#[inline]
pub fn to_toa(roslamb: f32, tgo: f32, roatm: f32, ttatmg: f32, satm: f32) -> f32 {
    (roslamb * ttatmg / (1.0 - satm * roslamb) + roatm) * tgo
}
