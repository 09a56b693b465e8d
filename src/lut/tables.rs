use crate::bands::NREFL_BANDS;
use crate::error::SrError;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// AOT sample grid at 550 nm, strictly increasing.
pub const AOT550NM: [f32; 22] = [
    0.01, 0.05, 0.10, 0.15, 0.20, 0.30, 0.40, 0.60, 0.80, 1.00, 1.20, 1.40, 1.60, 1.80, 2.00,
    2.30, 2.60, 3.00, 3.50, 4.00, 4.50, 5.00,
];

/// Surface pressure grid in hPa, strictly decreasing.
pub const TPRES: [f32; 7] = [1050.0, 1013.0, 900.0, 800.0, 700.0, 600.0, 500.0];

pub const NAOT_VALS: usize = AOT550NM.len();
pub const NPRES_VALS: usize = TPRES.len();

/// Zenith-angle step of the solar/transmission angle grids, degrees.
pub const ANGLE_STEP: f32 = 4.0;

/// 4-D radiative-transfer tables plus the geometry tables that address the
/// scattering dimension.
///
/// The reflectance table `rolutt` is `[band][pressure][aot][nsol]`, the
/// transmission table `transt` is `[band][pressure][aot][nsun]`, and
/// `sphalbt`/`normext` are `[band][pressure][aot]`, all row-major in a flat
/// `Vec<f32>`. Each (view, sun) node of the geometry tables owns a run of
/// `nbfi` scattering samples ending at offset `nbfic` on the `nsol` axis,
/// spaced uniformly in scattering angle between `tsmin` and `tsmax`.
#[derive(Debug)]
pub struct AerosolLut {
    nvz: usize,
    nsz: usize,
    nsol: usize,
    nsun: usize,
    rolutt: Vec<f32>,
    transt: Vec<f32>,
    sphalbt: Vec<f32>,
    normext: Vec<f32>,
    tsmax: Vec<f32>,
    tsmin: Vec<f32>,
    ttv: Vec<f32>,
    nbfi: Vec<i32>,
    nbfic: Vec<i32>,
}

impl AerosolLut {
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        nvz: usize,
        nsz: usize,
        nsol: usize,
        nsun: usize,
        rolutt: Vec<f32>,
        transt: Vec<f32>,
        sphalbt: Vec<f32>,
        normext: Vec<f32>,
        tsmax: Vec<f32>,
        tsmin: Vec<f32>,
        ttv: Vec<f32>,
        nbfi: Vec<i32>,
        nbfic: Vec<i32>,
    ) -> Result<Self, SrError> {
        let expect = |name: &str, len: usize, want: usize| -> Result<(), SrError> {
            if len != want {
                return Err(SrError::Lut(format!(
                    "{} has {} values, expected {}",
                    name, len, want
                )));
            }
            Ok(())
        };

        if nvz < 2 || nsz < 2 || nsun < 2 {
            return Err(SrError::Lut(format!(
                "geometry grids need at least 2 nodes per axis: nvz={}, nsz={}, nsun={}",
                nvz, nsz, nsun
            )));
        }

        expect("rolutt", rolutt.len(), NREFL_BANDS * NPRES_VALS * NAOT_VALS * nsol)?;
        expect("transt", transt.len(), NREFL_BANDS * NPRES_VALS * NAOT_VALS * nsun)?;
        expect("sphalbt", sphalbt.len(), NREFL_BANDS * NPRES_VALS * NAOT_VALS)?;
        expect("normext", normext.len(), NREFL_BANDS * NPRES_VALS * NAOT_VALS)?;
        for (name, len) in [
            ("tsmax", tsmax.len()),
            ("tsmin", tsmin.len()),
            ("ttv", ttv.len()),
            ("nbfi", nbfi.len()),
            ("nbfic", nbfic.len()),
        ] {
            expect(name, len, nvz * nsz)?;
        }

        // Each node's sample run must fit on the nsol axis.
        for node in 0..nvz * nsz {
            let nfi = nbfi[node];
            let cum = nbfic[node];
            if nfi < 2 || cum < nfi || cum as usize > nsol {
                return Err(SrError::Lut(format!(
                    "geometry node {}: nbfi={} nbfic={} inconsistent with nsol={}",
                    node, nfi, cum, nsol
                )));
            }
        }

        Ok(AerosolLut {
            nvz,
            nsz,
            nsol,
            nsun,
            rolutt,
            transt,
            sphalbt,
            normext,
            tsmax,
            tsmin,
            ttv,
            nbfi,
            nbfic,
        })
    }

    /// Loads the tables from a directory of whitespace-separated text files.
    ///
    /// `angles.txt` starts with a header line `nvz nsz nsol nsun` followed by
    /// the `tsmax`, `tsmin`, `ttv`, `nbfi` and `nbfic` blocks in that order.
    /// The 4-D tables are stored band-major in the same order as the in-memory
    /// layout.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, SrError> {
        let dir = dir.as_ref();

        let angles = read_values(&dir.join("angles.txt"))?;
        if angles.len() < 4 {
            return Err(SrError::Lut("angles.txt is missing its header".to_string()));
        }
        let nvz = angles[0] as usize;
        let nsz = angles[1] as usize;
        let nsol = angles[2] as usize;
        let nsun = angles[3] as usize;

        let nodes = nvz * nsz;
        if angles.len() != 4 + 5 * nodes {
            return Err(SrError::Lut(format!(
                "angles.txt has {} values, expected {}",
                angles.len(),
                4 + 5 * nodes
            )));
        }
        let tsmax = angles[4..4 + nodes].to_vec();
        let tsmin = angles[4 + nodes..4 + 2 * nodes].to_vec();
        let ttv = angles[4 + 2 * nodes..4 + 3 * nodes].to_vec();
        let nbfi: Vec<i32> = angles[4 + 3 * nodes..4 + 4 * nodes]
            .iter()
            .map(|v| *v as i32)
            .collect();
        let nbfic: Vec<i32> = angles[4 + 4 * nodes..4 + 5 * nodes]
            .iter()
            .map(|v| *v as i32)
            .collect();

        let rolutt = read_values(&dir.join("intrinsic_reflectance.txt"))?;
        let transt = read_values(&dir.join("transmission.txt"))?;
        let sphalbt = read_values(&dir.join("spherical_albedo.txt"))?;
        let normext = read_values(&dir.join("normalized_extinction.txt"))?;

        Self::from_parts(
            nvz, nsz, nsol, nsun, rolutt, transt, sphalbt, normext, tsmax, tsmin, ttv, nbfi, nbfic,
        )
    }

    pub fn nvz(&self) -> usize {
        self.nvz
    }

    pub fn nsz(&self) -> usize {
        self.nsz
    }

    pub fn nsun(&self) -> usize {
        self.nsun
    }

    #[inline]
    pub fn rolutt(&self, ib: usize, ip: usize, ia: usize, is: usize) -> f32 {
        self.rolutt[((ib * NPRES_VALS + ip) * NAOT_VALS + ia) * self.nsol + is]
    }

    #[inline]
    pub fn transt(&self, ib: usize, ip: usize, ia: usize, isun: usize) -> f32 {
        self.transt[((ib * NPRES_VALS + ip) * NAOT_VALS + ia) * self.nsun + isun]
    }

    #[inline]
    pub fn sphalbt(&self, ib: usize, ip: usize, ia: usize) -> f32 {
        self.sphalbt[(ib * NPRES_VALS + ip) * NAOT_VALS + ia]
    }

    #[inline]
    pub fn normext(&self, ib: usize, ip: usize, ia: usize) -> f32 {
        self.normext[(ib * NPRES_VALS + ip) * NAOT_VALS + ia]
    }

    #[inline]
    pub fn tsmax(&self, itv: usize, its: usize) -> f32 {
        self.tsmax[itv * self.nsz + its]
    }

    #[inline]
    pub fn tsmin(&self, itv: usize, its: usize) -> f32 {
        self.tsmin[itv * self.nsz + its]
    }

    #[inline]
    pub fn ttv(&self, itv: usize, its: usize) -> f32 {
        self.ttv[itv * self.nsz + its]
    }

    #[inline]
    pub fn nbfi(&self, itv: usize, its: usize) -> usize {
        self.nbfi[itv * self.nsz + its] as usize
    }

    #[inline]
    pub fn nbfic(&self, itv: usize, its: usize) -> usize {
        self.nbfic[itv * self.nsz + its] as usize
    }

    pub fn check_band(&self, ib: usize) -> Result<(), SrError> {
        if ib >= NREFL_BANDS {
            return Err(SrError::Band(ib));
        }
        Ok(())
    }
}

fn read_values(path: &Path) -> Result<Vec<f32>, SrError> {
    let file = File::open(path)
        .map_err(|e| SrError::Lut(format!("cannot open {}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);

    let mut values = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| SrError::Lut(format!("read {}: {}", path.display(), e)))?;
        for value_str in line.split_whitespace() {
            let value: f32 = value_str.parse().map_err(|_| {
                SrError::Lut(format!("bad value '{}' in {}", value_str, path.display()))
            })?;
            values.push(value);
        }
    }

    Ok(values)
}

/// Bracketing index and fractional weight into a strictly increasing grid.
/// Out-of-range targets clamp to the nearest endpoint.
pub fn bracket_increasing(grid: &[f32], target: f32) -> (usize, f32) {
    if target <= grid[0] {
        return (0, 0.0);
    }
    let last = grid.len() - 1;
    if target >= grid[last] {
        return (last - 1, 1.0);
    }

    let mut idx = 0;
    for i in 0..last {
        if target >= grid[i] && target < grid[i + 1] {
            idx = i;
            break;
        }
    }

    let rr = (target - grid[idx]) / (grid[idx + 1] - grid[idx]);
    (idx, rr)
}

/// Bracketing index and weight into the strictly decreasing pressure grid.
pub fn bracket_pressure(pres: f32) -> (usize, f32) {
    if pres >= TPRES[0] {
        return (0, 0.0);
    }
    let last = TPRES.len() - 1;
    if pres <= TPRES[last] {
        return (last - 1, 1.0);
    }

    let mut idx = 0;
    for i in 0..last {
        if pres <= TPRES[i] && pres > TPRES[i + 1] {
            idx = i;
            break;
        }
    }

    let rr = (TPRES[idx] - pres) / (TPRES[idx] - TPRES[idx + 1]);
    (idx, rr)
}


#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_aot_grid_is_strictly_increasing() {
        for ia in 1..NAOT_VALS {
            assert!(AOT550NM[ia] > AOT550NM[ia - 1]);
        }
    }

    #[test]
    fn test_pressure_grid_is_strictly_decreasing() {
        for ip in 1..NPRES_VALS {
            assert!(TPRES[ip] < TPRES[ip - 1]);
        }
    }

    #[test]
    fn test_bracket_increasing_interior() {
        let (idx, rr) = bracket_increasing(&AOT550NM, 0.25);
        assert_eq!(idx, 4);
        assert_relative_eq!(rr, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_bracket_increasing_clamps_at_ends() {
        let (idx, rr) = bracket_increasing(&AOT550NM, -1.0);
        assert_eq!((idx, rr), (0, 0.0));

        let (idx, rr) = bracket_increasing(&AOT550NM, 9.0);
        assert_eq!(idx, NAOT_VALS - 2);
        assert_relative_eq!(rr, 1.0);
    }

    #[test]
    fn test_bracket_pressure() {
        let (idx, rr) = bracket_pressure(850.0);
        assert_eq!(idx, 2);
        assert_relative_eq!(rr, 0.5, epsilon = 1e-6);

        assert_eq!(bracket_pressure(1100.0), (0, 0.0));
        let (idx, rr) = bracket_pressure(400.0);
        assert_eq!(idx, NPRES_VALS - 2);
        assert_relative_eq!(rr, 1.0);
    }

    #[test]
    fn test_from_parts_rejects_bad_lengths() {
        let lut = AerosolLut::from_parts(
            1,
            1,
            4,
            2,
            vec![0.0; 3],
            vec![],
            vec![],
            vec![],
            vec![],
            vec![],
            vec![],
            vec![],
            vec![],
        );
        assert!(lut.is_err());
    }

    #[test]
    fn test_from_parts_rejects_inconsistent_nodes() {
        // A node claiming more samples than its cumulative offset allows.
        let nodes = 4;
        let lut = AerosolLut::from_parts(
            2,
            2,
            4,
            2,
            vec![0.1; NREFL_BANDS * NPRES_VALS * NAOT_VALS * 4],
            vec![0.9; NREFL_BANDS * NPRES_VALS * NAOT_VALS * 2],
            vec![0.1; NREFL_BANDS * NPRES_VALS * NAOT_VALS],
            vec![1.0; NREFL_BANDS * NPRES_VALS * NAOT_VALS],
            vec![180.0; nodes],
            vec![0.0; nodes],
            vec![0.0; nodes],
            vec![8; nodes],
            vec![4; nodes],
        );
        assert!(lut.is_err());
    }

    #[test]
    fn test_uniform_lut_accessors() {
        let lut = test_support::uniform_lut(0.05, 0.95, 0.1, 1.0);
        assert_eq!(lut.rolutt(3, 2, 10, 5), 0.05);
        assert_eq!(lut.transt(6, 0, 21, 3), 0.95);
        assert_eq!(lut.sphalbt(0, 6, 0), 0.1);
        assert_eq!(lut.normext(1, 1, 3), 1.0);
        assert_eq!(lut.nbfi(1, 1), 4);
        assert_eq!(lut.nbfic(0, 1), 8);
        assert!(lut.check_band(7).is_err());
        assert!(lut.check_band(6).is_ok());
    }

    #[test]
    fn test_from_dir_roundtrip() {
        let dir = tempdir().unwrap();

        // 2x2 geometry grid, 8 scattering samples, 2 transmission angles.
        let mut angles = File::create(dir.path().join("angles.txt")).unwrap();
        writeln!(angles, "2 2 8 2").unwrap();
        writeln!(angles, "180.0 180.0 180.0 180.0").unwrap(); // tsmax
        writeln!(angles, "0.0 0.0 0.0 0.0").unwrap(); // tsmin
        writeln!(angles, "0.0 0.0 60.0 60.0").unwrap(); // ttv
        writeln!(angles, "4 4 4 4").unwrap(); // nbfi
        writeln!(angles, "4 8 4 8").unwrap(); // nbfic

        let n3 = NREFL_BANDS * NPRES_VALS * NAOT_VALS;
        for (name, count, value) in [
            ("intrinsic_reflectance.txt", n3 * 8, 0.05_f32),
            ("transmission.txt", n3 * 2, 0.9),
            ("spherical_albedo.txt", n3, 0.1),
            ("normalized_extinction.txt", n3, 1.0),
        ] {
            let mut file = File::create(dir.path().join(name)).unwrap();
            for _ in 0..count {
                writeln!(file, "{}", value).unwrap();
            }
        }

        let lut = AerosolLut::from_dir(dir.path()).unwrap();
        assert_eq!(lut.nvz(), 2);
        assert_eq!(lut.nsun(), 2);
        assert_relative_eq!(lut.rolutt(0, 0, 0, 0), 0.05);
        assert_relative_eq!(lut.sphalbt(6, 6, 21), 0.1);
    }
}
