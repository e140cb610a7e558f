use log::info;

use crate::config::ExperimentConfig;
use crate::error::{Error, Result};
use crate::sources::images::{BayerPngDecoder, ImageData};
use crate::sources::mirex::MirexData;
use crate::sources::simulation::{SimData, SimOptions};
use crate::sources::temparray::TempArrayData;

/// Every configured source of one experiment, with calibration and clock
/// corrections applied.
#[derive(Debug)]
pub struct Experiment {
    pub simulation: Option<SimData>,
    pub images: Option<ImageData<BayerPngDecoder>>,
    pub mirex: Option<MirexData>,
    pub temparray: Option<TempArrayData>,
}

impl Experiment {
    /// Load all configured sources; the first failure aborts.
    pub fn open(config: &ExperimentConfig) -> Result<Experiment> {
        let simulation = match &config.simulation {
            Some(path) => {
                let options = SimOptions {
                    load_all: config.load_all,
                    average_images: config.average_images,
                    led_params_file: config.led_params_file.clone(),
                };
                let mut sim = SimData::open(path, options)?;
                if let Some(layers) = config.layers {
                    sim.set_layer_params(layers.bottom, layers.top);
                }
                sim.set_timeshift(config.shifts.simulation);
                Some(sim)
            }
            None => None,
        };

        let images = match (&config.images, &config.simulation) {
            (Some(images), Some(sim)) => Some(ImageData::open(
                images,
                sim,
                BayerPngDecoder::rggb(config.black_level, config.white_level),
                config.colordepth,
            )?),
            (Some(images), None) => {
                return Err(Error::malformed(images, "images need a simulation directory"));
            }
            (None, _) => None,
        };

        let mirex = match &config.mirex {
            Some(path) => {
                let mut mirex = MirexData::open(path, &config.mirex_profile)?;
                mirex.set_timeshift(config.shifts.mirex);
                Some(mirex)
            }
            None => None,
        };

        let temparray = match &config.temparray {
            Some(path) => {
                let mut temp = TempArrayData::open(path)?;
                temp.set_timeshift(config.shifts.temparray);
                Some(temp)
            }
            None => None,
        };

        info!(
            "experiment opened: simulation={} images={} mirex={} temparray={}",
            simulation.is_some(),
            images.is_some(),
            mirex.is_some(),
            temparray.is_some()
        );
        Ok(Experiment {
            simulation,
            images,
            mirex,
            temparray,
        })
    }
}
