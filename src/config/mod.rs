use serde::de::Error;
use serde::Deserialize;
use serde::Deserializer;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::bands::{Satellites, NREFL_BANDS};
use crate::pipeline::SrParams;

pub mod error;
pub use error::ConfigError;

/// Run configuration for one scene: satellite, correction tunables and the
/// input/output locations.
#[derive(Debug, Clone)]
pub struct Config {
    satellite: Satellites,
    params: SrParams,
    sza_mult: f32,
    sza_add: f32,
    lut_dir: String,
    ancillary_dir: String,
    toa_bands: Vec<String>,
    qa_band: String,
    sza_band: String,
    geotransform: [f64; 6],
    output_directory: String,
}

// Deserializes through a helper struct so every tunable stays optional with
// its operational default, while the cross-field constraints are validated
// in one place.
impl<'de> Deserialize<'de> for Config {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ConfigHelper {
            satellite: String,
            aero_window: Option<usize>,
            low_aero_thresh: Option<f32>,
            avg_aero_thresh: Option<f32>,
            min_valid_refl: Option<f32>,
            max_valid_refl: Option<f32>,
            default_aot: Option<f32>,
            sza_mult: Option<f32>,
            sza_add: Option<f32>,
            lut_dir: String,
            ancillary_dir: String,
            toa_bands: Vec<String>,
            qa_band: String,
            sza_band: String,
            geotransform: [f64; 6],
            output_directory: String,
        }

        let helper = ConfigHelper::deserialize(deserializer)?;

        let satellite = match helper.satellite.to_lowercase().as_str() {
            "landsat8" | "landsat_8" | "landsat-8" => Satellites::Landsat8,
            "landsat9" | "landsat_9" | "landsat-9" => Satellites::Landsat9,
            _ => return Err(D::Error::custom(ConfigError::Satellite(helper.satellite))),
        };

        let mut params = SrParams::default();
        if let Some(window) = helper.aero_window {
            if window < 2 || window % 2 != 0 {
                return Err(D::Error::custom(ConfigError::Window(window)));
            }
            params.aero_window = window;
        }
        if let Some(v) = helper.low_aero_thresh {
            params.low_aero_thresh = v;
        }
        if let Some(v) = helper.avg_aero_thresh {
            params.avg_aero_thresh = v;
        }
        if let Some(v) = helper.min_valid_refl {
            params.min_valid_refl = v;
        }
        if let Some(v) = helper.max_valid_refl {
            params.max_valid_refl = v;
        }
        if let Some(v) = helper.default_aot {
            params.default_aot = v;
        }

        if params.low_aero_thresh >= params.avg_aero_thresh {
            return Err(D::Error::custom(ConfigError::Threshold(
                "low_aero_thresh must be below avg_aero_thresh".to_string(),
            )));
        }
        if params.min_valid_refl >= params.max_valid_refl {
            return Err(D::Error::custom(ConfigError::Threshold(
                "min_valid_refl must be below max_valid_refl".to_string(),
            )));
        }

        if helper.toa_bands.len() != NREFL_BANDS {
            return Err(D::Error::custom(ConfigError::BandCount(
                helper.toa_bands.len(),
            )));
        }

        if !Path::new(&helper.output_directory).exists() {
            return Err(D::Error::custom(ConfigError::OutputDirectory(
                helper.output_directory.clone(),
            )));
        }

        Ok(Config {
            satellite,
            params,
            sza_mult: helper.sza_mult.unwrap_or(0.01),
            sza_add: helper.sza_add.unwrap_or(0.0),
            lut_dir: helper.lut_dir,
            ancillary_dir: helper.ancillary_dir,
            toa_bands: helper.toa_bands,
            qa_band: helper.qa_band,
            sza_band: helper.sza_band,
            geotransform: helper.geotransform,
            output_directory: helper.output_directory,
        })
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let config: Config = serde_json::from_reader(reader).map_err(ConfigError::from)?;

        Ok(config)
    }

    pub fn satellite(&self) -> Satellites {
        self.satellite
    }

    pub fn params(&self) -> &SrParams {
        &self.params
    }

    pub fn sza_scaling(&self) -> (f32, f32) {
        (self.sza_mult, self.sza_add)
    }

    pub fn lut_dir(&self) -> &str {
        &self.lut_dir
    }

    pub fn ancillary_dir(&self) -> &str {
        &self.ancillary_dir
    }

    pub fn toa_bands(&self) -> &[String] {
        &self.toa_bands
    }

    pub fn qa_band(&self) -> &str {
        &self.qa_band
    }

    pub fn sza_band(&self) -> &str {
        &self.sza_band
    }

    pub fn geotransform(&self) -> [f64; 6] {
        self.geotransform
    }

    pub fn output_directory(&self) -> &str {
        &self.output_directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn config_json(window: usize) -> String {
        format!(
            r#"
    {{
        "satellite": "landsat8",
        "aero_window": {},
        "lut_dir": "/tmp/lut",
        "ancillary_dir": "/tmp/ancillary",
        "toa_bands": ["b1.tif", "b2.tif", "b3.tif", "b4.tif", "b5.tif", "b6.tif", "b7.tif"],
        "qa_band": "qa.tif",
        "sza_band": "sza.tif",
        "geotransform": [-75.0, 0.00027, 0.0, 45.0, 0.0, -0.00027],
        "output_directory": "/tmp"
    }}
    "#,
            window
        )
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.json");
        let mut file = File::create(&file_path).unwrap();
        file.write_all(config_json(6).as_bytes()).unwrap();

        let config = Config::from_file(file_path).unwrap();
        assert_eq!(config.satellite(), Satellites::Landsat8);
        assert_eq!(config.params().aero_window, 6);
        // Unspecified tunables keep their operational defaults.
        assert_eq!(config.params().high_eps, 2.5);
        assert_eq!(config.sza_scaling(), (0.01, 0.0));
        assert_eq!(config.toa_bands().len(), 7);
    }

    #[test]
    fn test_odd_window_is_rejected() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.json");
        let mut file = File::create(&file_path).unwrap();
        file.write_all(config_json(5).as_bytes()).unwrap();

        assert!(Config::from_file(file_path).is_err());
    }

    #[test]
    fn test_unknown_satellite_is_rejected() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.json");
        let mut file = File::create(&file_path).unwrap();
        let json = config_json(6).replace("landsat8", "sentinel2");
        file.write_all(json.as_bytes()).unwrap();

        assert!(Config::from_file(file_path).is_err());
    }

    #[test]
    fn test_missing_output_directory_is_rejected() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.json");
        let mut file = File::create(&file_path).unwrap();
        let json = config_json(6).replace("\"/tmp\"", "\"/nonexistent-output-dir\"");
        file.write_all(json.as_bytes()).unwrap();

        assert!(Config::from_file(file_path).is_err());
    }
}
