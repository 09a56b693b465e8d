use aether::ancillary::{CmgGrid, RatioGrid};
use aether::bands::{B4, NREFL_BANDS};
use aether::config::Config;
use aether::error::SrError;
use aether::geo::MapGrid;
use aether::lut::AerosolLut;
use aether::pipeline::SrPipeline;
use aether::readers::read_dn;
use aether::scene::Scene;
use aether::writers::{write_qa_band, write_sr_band};

use log::info;
use std::path::Path;

/// TOA band DN scaling into unscaled reflectance.
const TOA_SCALE: f32 = 1.0e-4;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./data/config/aether.json".to_string());
    let config = Config::from_file(&config_path)?;
    info!("processing a {} scene", config.satellite());

    let lut = AerosolLut::from_dir(config.lut_dir())?;
    let cmg = load_cmg(config.ancillary_dir())?;
    let ratios = load_ratios(config.ancillary_dir())?;
    let scene = load_scene(&config)?;
    let geoloc = MapGrid::new(config.geotransform())?;

    let (nlines, nsamps) = (scene.nlines, scene.nsamps);
    info!("scene is {} lines x {} samples", nlines, nsamps);

    let pipeline = SrPipeline {
        scene,
        lut: &lut,
        cmg: &cmg,
        ratios: &ratios,
        geoloc,
        params: config.params().clone(),
    };
    let products = pipeline.run()?;

    let out = Path::new(config.output_directory());
    for ib in 0..NREFL_BANDS {
        write_sr_band(
            out.join(format!("sr_band{}.tif", ib + 1)),
            nsamps as u32,
            nlines as u32,
            &products.sband[ib],
        )?;
    }
    write_qa_band(
        out.join("aerosol_qa.tif"),
        nsamps as u32,
        nlines as u32,
        &products.ipflag,
    )?;

    let (clear, water, fill) = products.class_counts();
    println!(
        "Pixel classes - clear: {}, water: {}, fill: {}",
        clear, water, fill
    );
    if let Some((min, max, mean)) = products.band_stats(B4) {
        println!("Band 4 surface reflectance:");
        println!("  Min: {:.4}", min);
        println!("  Max: {:.4}", max);
        println!("  Mean: {:.4}", mean);
    }

    Ok(())
}

/// Loads the Level-1 rasters listed in the config into a scene.
fn load_scene(config: &Config) -> Result<Scene, Box<dyn std::error::Error>> {
    let qa = read_dn(config.qa_band())?;
    let sza = read_dn(config.sza_band())?;

    let mut sband = Vec::with_capacity(NREFL_BANDS);
    for path in config.toa_bands() {
        let raster = read_dn(path)?;
        if (raster.width, raster.height) != (qa.width, qa.height) {
            return Err(Box::new(SrError::Scene(format!(
                "{} is {}x{}, QA band is {}x{}",
                path, raster.width, raster.height, qa.width, qa.height
            ))));
        }
        sband.push(raster.to_f32_scaled(TOA_SCALE, 0.0));
    }

    let (sza_mult, sza_add) = config.sza_scaling();
    let scene = Scene::new(
        config.satellite(),
        qa.height as usize,
        qa.width as usize,
        qa.to_u16(),
        sband,
        sza.to_i16(),
        sza_mult,
        sza_add,
    )?;
    Ok(scene)
}

fn load_cmg(dir: &str) -> Result<CmgGrid, Box<dyn std::error::Error>> {
    let dir = Path::new(dir);
    let dem = read_dn(dir.join("dem.tif"))?;
    let water_vapor = read_dn(dir.join("water_vapor.tif"))?;
    let ozone = read_dn(dir.join("ozone.tif"))?;

    let grid = CmgGrid::new(
        dem.height as usize,
        dem.width as usize,
        dem.to_i16(),
        water_vapor.to_u16(),
        ozone.to_u16(),
    )?;
    Ok(grid)
}

fn load_ratios(dir: &str) -> Result<RatioGrid, Box<dyn std::error::Error>> {
    let dir = Path::new(dir);
    let read_i16 = |name: &str| -> Result<Vec<i16>, Box<dyn std::error::Error>> {
        Ok(read_dn(dir.join(name))?.to_i16())
    };

    let andwi = read_dn(dir.join("andwi.tif"))?;
    let (nblat, nblon) = (andwi.height as usize, andwi.width as usize);

    let grid = RatioGrid {
        nblat,
        nblon,
        andwi: andwi.to_i16(),
        sndwi: read_i16("sndwi.tif")?,
        ratiob1: read_i16("ratiob1.tif")?,
        ratiob2: read_i16("ratiob2.tif")?,
        ratiob7: read_i16("ratiob7.tif")?,
        slpratiob1: read_i16("slpratiob1.tif")?,
        slpratiob2: read_i16("slpratiob2.tif")?,
        slpratiob7: read_i16("slpratiob7.tif")?,
        intratiob1: read_i16("intratiob1.tif")?,
        intratiob2: read_i16("intratiob2.tif")?,
        intratiob7: read_i16("intratiob7.tif")?,
    }
    .guarded()?;
    Ok(grid)
}
