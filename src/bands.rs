use std::fmt::Display;

/// Number of reflective OLI bands carried through the correction (bands 1-7).
pub const NREFL_BANDS: usize = 7;

pub const B1: usize = 0;
pub const B2: usize = 1;
pub const B3: usize = 2;
pub const B4: usize = 3;
pub const B5: usize = 4;
pub const B6: usize = 5;
pub const B7: usize = 6;

/// Band-centre wavelengths in nm for OLI bands 1-7.
pub const WAVELENGTH: [f32; NREFL_BANDS] = [443.0, 482.0, 561.0, 655.0, 865.0, 1609.0, 2201.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Satellites {
    Landsat8,
    Landsat9,
}

/// Per-band analytic gas-transmission coefficients.
///
/// These are fits of the 6S gaseous transmission terms to the OLI relative
/// spectral responses: `oztransa` for ozone, `wvtransa`/`wvtransb` for water
/// vapor, `ogtransa1`/`ogtransb0`/`ogtransb1` for the remaining gases, and
/// `tauray` is the Rayleigh optical depth at standard pressure.
#[derive(Debug)]
pub struct GasCoefficients {
    pub tauray: [f32; NREFL_BANDS],
    pub oztransa: [f32; NREFL_BANDS],
    pub wvtransa: [f32; NREFL_BANDS],
    pub wvtransb: [f32; NREFL_BANDS],
    pub ogtransa1: [f32; NREFL_BANDS],
    pub ogtransb0: [f32; NREFL_BANDS],
    pub ogtransb1: [f32; NREFL_BANDS],
}

static LANDSAT8_GAS: GasCoefficients = GasCoefficients {
    tauray: [0.23638, 0.16933, 0.09070, 0.04827, 0.01563, 0.00129, 0.00037],
    oztransa: [-0.00255649, -0.0177861, -0.0802377, -0.0180559, 0.0, 0.0, 0.0],
    wvtransa: [
        2.29849e-27, 2.29849e-27, 7.77307e-4, 3.61051e-3, 6.19835e-4, 1.83826e-3, 5.61586e-4,
    ],
    wvtransb: [
        0.999742, 0.999742, 0.891099, 0.754895, 0.844907, 0.791344, 0.886086,
    ],
    ogtransa1: [
        4.22870e-4, 4.22870e-4, 6.86450e-4, 3.25017e-3, 8.18361e-4, 1.01230e-2, 3.00139e-3,
    ],
    ogtransb0: [
        0.965333, 0.965333, 0.967746, 0.981896, 0.974398, 0.905925, 0.940073,
    ],
    ogtransb1: [
        0.0560055, 0.0560055, 0.0456075, 0.0287894, 0.0425913, 0.0675711, 0.0527707,
    ],
};

static LANDSAT9_GAS: GasCoefficients = GasCoefficients {
    tauray: [0.23747, 0.16983, 0.09102, 0.04851, 0.01571, 0.00130, 0.00037],
    oztransa: [-0.00263497, -0.0180478, -0.0792231, -0.0178578, 0.0, 0.0, 0.0],
    wvtransa: [
        2.31243e-27, 2.31243e-27, 7.81361e-4, 3.58526e-3, 6.23071e-4, 1.84612e-3, 5.63652e-4,
    ],
    wvtransb: [
        0.999740, 0.999740, 0.890751, 0.755394, 0.844394, 0.790949, 0.885780,
    ],
    ogtransa1: [
        4.25961e-4, 4.25961e-4, 6.89735e-4, 3.23173e-3, 8.21123e-4, 1.00958e-2, 2.99343e-3,
    ],
    ogtransb0: [
        0.965164, 0.965164, 0.967580, 0.982052, 0.974233, 0.906486, 0.940353,
    ],
    ogtransb1: [
        0.0561030, 0.0561030, 0.0456958, 0.0286968, 0.0426651, 0.0673700, 0.0526742,
    ],
};

impl Satellites {
    pub fn gas_coefficients(&self) -> &'static GasCoefficients {
        match self {
            Satellites::Landsat8 => &LANDSAT8_GAS,
            Satellites::Landsat9 => &LANDSAT9_GAS,
        }
    }
}

impl Display for Satellites {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Satellites::Landsat8 => write!(f, "Landsat 8"),
            Satellites::Landsat9 => write!(f, "Landsat 9"),
        }
    }
}
