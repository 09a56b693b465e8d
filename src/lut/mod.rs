//! Aerosol/atmosphere lookup tables precomputed by a 6S-style
//! radiative-transfer model.

pub mod tables;

pub use tables::{AerosolLut, AOT550NM, NAOT_VALS, NPRES_VALS, TPRES};
