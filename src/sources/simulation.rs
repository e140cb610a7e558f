//! Outputs of the LED-extinction simulation: per-LED parameters and per-layer
//! extinction coefficients, aligned to experiment time through the image list.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::info;

use crate::data::calibration::LayerCalibration;
use crate::data::loader::load_numeric_columns;
use crate::data::model::{ChannelId, GeometryAxis, Table};
use crate::data::query::{LayerRef, QueryEngine};
use crate::data::resample::SmoothingSpec;
use crate::data::shift::TimeShift;
use crate::data::store::{ExtcoTable, LedParamsTable, MultiChannelStore};
use crate::error::{Error, Result};
use crate::sources::images::{ImageInfoTable, IMAGE_INFOS, IMAGE_INFOS_AVG};

pub const EXTCO_DIR: &str = "analysis/AbsorptionCoefficients";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimOptions {
    /// Load extinction coefficients and LED parameters right away.
    pub load_all: bool,
    /// Use the averaged-image list.
    pub average_images: bool,
    /// File name of `analysis/channel{c}/<file>`.
    pub led_params_file: String,
}

impl Default for SimOptions {
    fn default() -> Self {
        SimOptions {
            load_all: true,
            average_images: false,
            led_params_file: "all_parameters.parquet".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimData {
    path: PathBuf,
    options: SimOptions,
    image_info: ImageInfoTable,
    store: Option<MultiChannelStore>,
    calibration: Option<LayerCalibration>,
    time_shift: TimeShift,
}

impl SimData {
    pub fn open(path: &Path, options: SimOptions) -> Result<SimData> {
        let infos = if options.average_images {
            IMAGE_INFOS_AVG
        } else {
            IMAGE_INFOS
        };
        let image_info = ImageInfoTable::load(&path.join(infos))?;

        let mut sim = SimData {
            path: path.to_path_buf(),
            options,
            image_info,
            store: None,
            calibration: None,
            time_shift: TimeShift::default(),
        };
        if sim.options.load_all {
            sim.read_all()?;
        }
        Ok(sim)
    }

    /// Load LED parameters of all three channels and every extinction file.
    ///
    /// Nothing is kept unless everything loads.
    pub fn read_all(&mut self) -> Result<()> {
        let times = self.image_info.times();
        let analysis = self.path.join("analysis");

        let mut led_params = BTreeMap::new();
        for channel in ChannelId::ALL {
            let file = analysis
                .join(format!("channel{channel}"))
                .join(&self.options.led_params_file);
            let raw = load_numeric_columns(&file)?;
            led_params.insert(channel, LedParamsTable::merge_with_image_times(&raw, times, &file)?);
        }
        let extco = ExtcoTable::build(&self.path.join(EXTCO_DIR), times)?;

        info!(
            "{}: {} images, {} layers",
            self.path.display(),
            times.len(),
            extco.n_layers()
        );
        self.store = Some(MultiChannelStore::new(extco, led_params));
        Ok(())
    }

    pub fn image_info(&self) -> &ImageInfoTable {
        &self.image_info
    }

    /// Heights above floor of the lowest and highest layer.
    pub fn set_layer_params(&mut self, bottom: f64, top: f64) {
        self.calibration = Some(LayerCalibration::new(bottom, top));
    }

    pub fn layer_params(&self) -> Option<LayerCalibration> {
        self.calibration
    }

    /// Clock offset for the start of the experiment, applied to every query.
    pub fn set_timeshift(&mut self, time_shift: TimeShift) {
        self.time_shift = time_shift;
    }

    pub fn n_layers(&self) -> Option<usize> {
        self.store.as_ref().map(|s| s.extco().n_layers())
    }

    pub fn height_from_layer(&self, layer: f64) -> Result<f64> {
        let (cal, n) = self.calibrated()?;
        Ok(cal.height_from_layer(layer, n))
    }

    pub fn layer_from_height(&self, height: f64) -> Result<f64> {
        let (cal, n) = self.calibrated()?;
        Ok(cal.layer_from_height(height, n))
    }

    fn calibrated(&self) -> Result<(LayerCalibration, usize)> {
        let cal = self.calibration.ok_or(Error::MissingCalibration)?;
        let n = self.n_layers().ok_or_else(|| Error::NotLoaded {
            path: self.path.clone(),
        })?;
        Ok((cal, n))
    }

    pub fn store(&self, channel: ChannelId) -> Result<&MultiChannelStore> {
        self.store
            .as_ref()
            .ok_or(Error::MissingChannelData(channel.get()))
    }

    pub fn led_params(&self, channel: u8) -> Result<&LedParamsTable> {
        let channel = ChannelId::new(channel)?;
        self.store(channel)?.led_params(channel)
    }

    fn engine(&self, channel: ChannelId) -> Result<QueryEngine<'_>> {
        Ok(QueryEngine::new(self.store(channel)?, self.calibration).with_time_shift(self.time_shift))
    }

    /// Index = layer (or height), columns = line.
    pub fn extco_at_timestep(
        &self,
        channel: u8,
        timestep: f64,
        yaxis: GeometryAxis,
        smoothing: &SmoothingSpec,
    ) -> Result<Table> {
        let channel = ChannelId::new(channel)?;
        self.engine(channel)?.at_time(channel, timestep, yaxis, smoothing)
    }

    /// Index = experiment time, columns = layer (or height).
    pub fn extco_at_line(
        &self,
        channel: u8,
        line: u32,
        yaxis: GeometryAxis,
        smoothing: &SmoothingSpec,
    ) -> Result<Table> {
        let channel = ChannelId::new(channel)?;
        self.engine(channel)?.at_line(channel, line, yaxis, smoothing)
    }

    /// Index = experiment time, columns = line.
    pub fn extco_at_layer(&self, channel: u8, layer: LayerRef, smoothing: &SmoothingSpec) -> Result<Table> {
        let channel = ChannelId::new(channel)?;
        self.engine(channel)?.at_layer(channel, layer, smoothing)
    }

    /// Index = experiment time, columns = LED id (or height). See
    /// [`QueryEngine::led_param_at_line`] for `n_ref`.
    pub fn ledparams_at_line(
        &self,
        channel: u8,
        line: i64,
        param: &str,
        yaxis: GeometryAxis,
        smoothing: &SmoothingSpec,
        n_ref: Option<usize>,
    ) -> Result<Table> {
        let channel = ChannelId::new(channel)?;
        self.engine(channel)?
            .led_param_at_line(channel, line, param, yaxis, smoothing, n_ref)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    use crate::data::model::Label;
    use crate::data::resample::SmoothingMode;
    use crate::data::store::tests::{extco_value, write_extco};

    /// Five images at 0, 10, .., 40 s; two lines of four layers per channel;
    /// three LEDs per channel, two on line 0.
    pub(crate) fn write_simulation(dir: &Path) {
        let analysis = dir.join("analysis");
        std::fs::create_dir_all(dir.join(EXTCO_DIR)).unwrap();
        let mut infos = String::from("Name,Experiment_Time[s]\n");
        for i in 0..5 {
            infos.push_str(&format!("img_{i}.cr2,{}\n", i * 10));
        }
        std::fs::write(dir.join(IMAGE_INFOS), infos).unwrap();

        for channel in 0..3u8 {
            for line in 0..2 {
                write_extco(&dir.join(EXTCO_DIR), channel, line, 4, 5);
            }

            let mut img_id = Vec::new();
            let mut led_id = Vec::new();
            let mut line = Vec::new();
            let mut height = Vec::new();
            let mut value = Vec::new();
            for img in 0..5i64 {
                for (led, l, h) in [(0i64, 0i64, 2.0), (1, 0, 1.0), (2, 1, 1.5)] {
                    img_id.push(img);
                    led_id.push(led);
                    line.push(l);
                    height.push(h);
                    value.push(100.0 * (channel as f64 + 1.0) + led as f64 * 10.0 + img as f64);
                }
            }
            let schema = Arc::new(Schema::new(vec![
                Field::new("img_id", DataType::Int64, false),
                Field::new("led_id", DataType::Int64, false),
                Field::new("line", DataType::Int64, false),
                Field::new("height", DataType::Float64, false),
                Field::new("sum_col_val", DataType::Float64, false),
            ]));
            let batch = RecordBatch::try_new(
                schema.clone(),
                vec![
                    Arc::new(Int64Array::from(img_id)),
                    Arc::new(Int64Array::from(led_id)),
                    Arc::new(Int64Array::from(line)),
                    Arc::new(Float64Array::from(height)),
                    Arc::new(Float64Array::from(value)),
                ],
            )
            .unwrap();
            let channel_dir = analysis.join(format!("channel{channel}"));
            std::fs::create_dir_all(&channel_dir).unwrap();
            let file = std::fs::File::create(channel_dir.join("all_parameters.parquet")).unwrap();
            let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
            writer.write(&batch).unwrap();
            writer.close().unwrap();
        }
    }

    #[test]
    fn opens_and_queries_all_channels() {
        let dir = tempfile::tempdir().unwrap();
        write_simulation(dir.path());
        let sim = SimData::open(dir.path(), SimOptions::default()).unwrap();

        assert_eq!(sim.n_layers(), Some(4));
        let at_t = sim
            .extco_at_timestep(2, 20.0, GeometryAxis::Layer, &SmoothingSpec::none())
            .unwrap();
        assert_eq!((at_t.n_rows(), at_t.n_cols()), (4, 2));
        assert_eq!(at_t.columns()[1].values[3], extco_value(2, 1, 3, 2));

        let led = sim
            .ledparams_at_line(1, 0, "sum_col_val", GeometryAxis::LedId, &SmoothingSpec::none(), None)
            .unwrap();
        assert_eq!(led.index(), &[0.0, 10.0, 20.0, 30.0, 40.0]);
        assert_eq!(led.column(&Label::Int(1)).unwrap().values[4], 214.0);
    }

    #[test]
    fn lazy_open_reports_missing_channel_data() {
        let dir = tempfile::tempdir().unwrap();
        write_simulation(dir.path());
        let options = SimOptions {
            load_all: false,
            ..SimOptions::default()
        };
        let mut sim = SimData::open(dir.path(), options).unwrap();

        let err = sim
            .extco_at_line(1, 0, GeometryAxis::Layer, &SmoothingSpec::none())
            .unwrap_err();
        assert!(matches!(err, Error::MissingChannelData(1)));

        sim.set_layer_params(1.0, 3.0);
        assert!(matches!(sim.height_from_layer(1.0), Err(Error::NotLoaded { .. })));

        sim.read_all().unwrap();
        assert!(sim.extco_at_line(1, 0, GeometryAxis::Layer, &SmoothingSpec::none()).is_ok());
        assert_eq!(sim.height_from_layer(2.0).unwrap(), 2.0);
    }

    #[test]
    fn timeshift_and_calibration_apply_to_queries() {
        let dir = tempfile::tempdir().unwrap();
        write_simulation(dir.path());
        let mut sim = SimData::open(dir.path(), SimOptions::default()).unwrap();
        sim.set_layer_params(1.0, 3.0);
        sim.set_timeshift(TimeShift::new(-10.0));

        let spec = SmoothingSpec::centered(1, SmoothingMode::Mean);
        let by_line = sim.extco_at_line(0, 1, GeometryAxis::Height, &spec).unwrap();
        assert_eq!(by_line.index(), &[-10.0, 0.0, 10.0, 20.0, 30.0]);
        assert_eq!(by_line.labels().next(), Some(&Label::Float(3.0)));

        // The shifted clock is the one callers query with.
        let at_t = sim.extco_at_timestep(0, 0.0, GeometryAxis::Height, &spec).unwrap();
        assert_eq!(at_t.columns()[0].values[0], extco_value(0, 0, 0, 1));
        assert!(matches!(
            sim.extco_at_timestep(0, 40.0, GeometryAxis::Layer, &spec),
            Err(Error::TimestepNotFound(_))
        ));

        assert_eq!(sim.height_from_layer(2.0).unwrap(), 2.0);
        assert_eq!(sim.layer_from_height(2.0).unwrap(), 2.0);
        let by_layer = sim.extco_at_layer(0, LayerRef::Height(2.5), &spec).unwrap();
        assert_eq!(by_layer.columns()[0].values[0], extco_value(0, 0, 1, 0));
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_simulation(dir.path());
        let sim = SimData::open(dir.path(), SimOptions::default()).unwrap();
        assert!(matches!(sim.led_params(3), Err(Error::UnknownChannel(3))));
    }
}
