use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::calibration::LayerCalibration;
use crate::data::resample::WindowEdge;
use crate::data::shift::TimeShift;
use crate::error::{Error, Result};

/// Column layout of a MIREX log and its window convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirexProfile {
    /// Free-form lines above the column header.
    pub header_lines: usize,
    pub time_column: String,
    pub mirex_1_column: String,
    pub mirex_2_column: String,
    pub mirex_3_column: String,
    pub balance_column: String,
    /// Edge used by [`MirexData::smoothing`](crate::sources::mirex::MirexData::smoothing).
    pub window_edge: WindowEdge,
}

impl Default for MirexProfile {
    fn default() -> Self {
        MirexProfile {
            header_lines: 19,
            time_column: "# Time : ;  Sample".to_string(),
            mirex_1_column: "MIREX".to_string(),
            mirex_2_column: "Mirex 2".to_string(),
            mirex_3_column: "Mirex 3".to_string(),
            balance_column: "Balance".to_string(),
            window_edge: WindowEdge::Exclusive,
        }
    }
}

/// Clock corrections per source, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceShifts {
    pub simulation: TimeShift,
    pub mirex: TimeShift,
    pub temparray: TimeShift,
}

/// Everything needed to open one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Simulation directory holding `analysis/`.
    pub simulation: Option<PathBuf>,
    /// Directory of the camera images named in the image-info table.
    pub images: Option<PathBuf>,
    pub mirex: Option<PathBuf>,
    pub temparray: Option<PathBuf>,
    /// Use `image_infos_analysis_avg.csv` instead of `image_infos_analysis.csv`.
    pub average_images: bool,
    /// Load extinction coefficients and LED parameters when opening.
    pub load_all: bool,
    pub layers: Option<LayerCalibration>,
    pub shifts: SourceShifts,
    pub mirex_profile: MirexProfile,
    /// Bit depth the image channels are scaled to.
    pub colordepth: u32,
    /// Sensor levels of the PNG mosaics in `images`.
    pub black_level: u16,
    pub white_level: u16,
    /// File name of the per-channel LED parameter table.
    pub led_params_file: String,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            simulation: None,
            images: None,
            mirex: None,
            temparray: None,
            average_images: false,
            load_all: true,
            layers: None,
            shifts: SourceShifts::default(),
            mirex_profile: MirexProfile::default(),
            colordepth: 14,
            black_level: 0,
            white_level: u16::MAX,
            led_params_file: "all_parameters.parquet".to_string(),
        }
    }
}

impl ExperimentConfig {
    /// Read a JSON config. Relative paths are resolved against the file's
    /// directory.
    pub fn from_file(path: &Path) -> Result<ExperimentConfig> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config: ExperimentConfig = serde_json::from_str(&text)?;
        if let Some(base) = path.parent() {
            for slot in [
                &mut config.simulation,
                &mut config.images,
                &mut config.mirex,
                &mut config.temparray,
            ] {
                if let Some(p) = slot.as_mut() {
                    if p.is_relative() {
                        *p = base.join(&*p);
                    }
                }
            }
        }
        Ok(config)
    }
}
