//! Multi-channel storage for simulation outputs.
//!
//! Extinction coefficients arrive as one CSV per (channel, line) pair with one
//! column per layer. They are held in a single wide table whose column key is
//! the tuple `(channel, line, layer)`; slicing is key-prefix filtering on an
//! ordered map.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use regex::Regex;

use crate::data::calibration::LayerCalibration;
use crate::data::loader::{read_delimited, Delimited, NumericColumns};
use crate::data::model::{Axis, ChannelId, Column, GeometryAxis, Label, Table, TimeAxis};
use crate::error::{Error, Result};

/// Preamble lines above the layer header of an absorption-coefficient CSV.
pub const EXTCO_HEADER_LINES: usize = 4;

// ---------------------------------------------------------------------------
// ExtcoTable
// ---------------------------------------------------------------------------

/// Column key of the extinction-coefficient table. Ordering is channel, then
/// line, then layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtcoKey {
    pub channel: ChannelId,
    pub line: u32,
    pub layer: u32,
}

/// One discovered `absorption_coefs*channel_{c}*array_{l}.csv` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtcoFile {
    pub path: PathBuf,
    pub channel: ChannelId,
    pub line: u32,
}

/// Extinction coefficients indexed by experiment time and keyed by
/// `(channel, line, layer)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtcoTable {
    time: TimeAxis,
    columns: BTreeMap<ExtcoKey, Vec<f64>>,
    n_layers: usize,
}

fn extco_name_pattern() -> Result<Regex> {
    Regex::new(r"^absorption_coefs.*channel_(\d+).*array_(\d+)\.csv$")
        .map_err(|e| Error::malformed(PathBuf::new(), e.to_string()))
}

/// List the absorption-coefficient files in `dir`, sorted by path.
pub fn discover_extco_files(dir: &Path) -> Result<Vec<ExtcoFile>> {
    let pattern = extco_name_pattern()?;
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(caps) = pattern.captures(name) else {
            continue;
        };
        let channel: u8 = caps[1]
            .parse()
            .map_err(|_| Error::malformed(&path, "channel number out of range"))?;
        let line: u32 = caps[2]
            .parse()
            .map_err(|_| Error::malformed(&path, "line number out of range"))?;
        files.push(ExtcoFile {
            channel: ChannelId::new(channel)?,
            line,
            path,
        });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

impl ExtcoTable {
    /// Read every absorption-coefficient file in `dir`.
    ///
    /// Row `k` of each file belongs to `image_times[k]`; rows beyond the image
    /// list are dropped and files shorter than the longest one are padded with
    /// `NaN`. All files must have the same number of layers.
    pub fn build(dir: &Path, image_times: &[f64]) -> Result<ExtcoTable> {
        let files = discover_extco_files(dir)?;
        if files.is_empty() {
            return Err(Error::malformed(dir, "no absorption coefficient files found"));
        }

        let layout = Delimited {
            skip_lines: EXTCO_HEADER_LINES,
            ..Delimited::csv()
        };

        let mut blocks = Vec::with_capacity(files.len());
        for file in &files {
            let text = read_delimited(&file.path, layout)?;
            if text.headers.is_empty() {
                return Err(Error::malformed(&file.path, "no layer columns"));
            }
            let layers = (0..text.headers.len())
                .map(|idx| text.numeric_column(&file.path, idx))
                .collect::<Result<Vec<_>>>()?;
            debug!(
                "{}: channel {} line {}, {} layers x {} rows",
                file.path.display(),
                file.channel,
                file.line,
                layers.len(),
                text.rows.len()
            );
            blocks.push((file, layers));
        }

        let mut table = ExtcoTable::empty();
        for (file, layers) in blocks {
            table.insert_block(&file.path, file.channel, file.line, layers, image_times)?;
        }
        table.pad_columns();

        info!(
            "loaded {} extinction files: {} columns, {} layers, {} time steps",
            files.len(),
            table.columns.len(),
            table.n_layers,
            table.time.len()
        );
        Ok(table)
    }

    fn empty() -> Self {
        ExtcoTable {
            time: TimeAxis::default(),
            columns: BTreeMap::new(),
            n_layers: 0,
        }
    }

    /// Add the layer columns of one (channel, line) file.
    fn insert_block(
        &mut self,
        path: &Path,
        channel: ChannelId,
        line: u32,
        layers: Vec<Vec<f64>>,
        image_times: &[f64],
    ) -> Result<()> {
        if self.columns.is_empty() {
            self.n_layers = layers.len();
        } else if layers.len() != self.n_layers {
            return Err(Error::InconsistentLayerCount {
                path: path.to_path_buf(),
                expected: self.n_layers,
                found: layers.len(),
            });
        }

        for (layer, mut values) in layers.into_iter().enumerate() {
            values.truncate(image_times.len());
            if values.len() > self.time.len() {
                self.time = TimeAxis::from_seconds(image_times[..values.len()].to_vec());
            }
            let key = ExtcoKey {
                channel,
                line,
                layer: layer as u32,
            };
            if self.columns.insert(key, values).is_some() {
                return Err(Error::malformed(
                    path,
                    format!("channel {channel} line {line} appears twice"),
                ));
            }
        }
        Ok(())
    }

    fn pad_columns(&mut self) {
        let n = self.time.len();
        for values in self.columns.values_mut() {
            values.resize(n, f64::NAN);
        }
    }

    pub fn time(&self) -> &TimeAxis {
        &self.time
    }

    pub fn n_layers(&self) -> usize {
        self.n_layers
    }

    pub fn keys(&self) -> impl Iterator<Item = &ExtcoKey> {
        self.columns.keys()
    }

    pub fn get(&self, key: &ExtcoKey) -> Option<&[f64]> {
        self.columns.get(key).map(Vec::as_slice)
    }

    pub fn has_channel(&self, channel: ChannelId) -> bool {
        self.channel_range(channel).next().is_some()
    }

    /// Sorted line numbers recorded for `channel`.
    pub fn lines(&self, channel: ChannelId) -> Vec<u32> {
        let mut lines: Vec<u32> = self.channel_range(channel).map(|(k, _)| k.line).collect();
        lines.dedup();
        lines
    }

    fn channel_range(&self, channel: ChannelId) -> impl Iterator<Item = (&ExtcoKey, &Vec<f64>)> {
        let lo = ExtcoKey {
            channel,
            line: 0,
            layer: 0,
        };
        let hi = ExtcoKey {
            channel,
            line: u32::MAX,
            layer: u32::MAX,
        };
        self.columns.range(lo..=hi)
    }

    /// Time × layer table for one channel and line.
    ///
    /// With `yaxis = Height` the layer columns are relabelled with their
    /// calibrated height.
    pub fn slice_line(
        &self,
        channel: ChannelId,
        line: u32,
        yaxis: GeometryAxis,
        calibration: Option<&LayerCalibration>,
    ) -> Result<Table> {
        if !self.has_channel(channel) {
            return Err(Error::MissingChannelData(channel.get()));
        }
        let columns: Vec<Column> = self
            .channel_range(channel)
            .filter(|(k, _)| k.line == line)
            .map(|(k, v)| Column::new(Label::Int(k.layer as i64), v.clone()))
            .collect();
        if columns.is_empty() {
            return Err(Error::MissingKey {
                axis: "line",
                key: line.to_string(),
            });
        }

        let table = Table::new(
            Axis::Time,
            self.time.as_slice().to_vec(),
            GeometryAxis::Layer.into(),
            columns,
        )?;
        match yaxis {
            GeometryAxis::Layer => Ok(table),
            GeometryAxis::Height => {
                let cal = calibration.ok_or(Error::MissingCalibration)?;
                let heights = table
                    .labels()
                    .map(|l| Label::Float(cal.height_from_layer(l.as_f64().unwrap_or(f64::NAN), self.n_layers)))
                    .collect();
                table.with_labels(GeometryAxis::Height.into(), heights)
            }
            other => Err(Error::UnsupportedAxis(other)),
        }
    }

    /// Time × line table for one channel and layer.
    pub fn slice_layer(&self, channel: ChannelId, layer: u32) -> Result<Table> {
        if !self.has_channel(channel) {
            return Err(Error::MissingChannelData(channel.get()));
        }
        let columns: Vec<Column> = self
            .channel_range(channel)
            .filter(|(k, _)| k.layer == layer)
            .map(|(k, v)| Column::new(Label::Int(k.line as i64), v.clone()))
            .collect();
        if columns.is_empty() {
            return Err(Error::MissingKey {
                axis: "layer",
                key: layer.to_string(),
            });
        }
        Table::new(
            Axis::Time,
            self.time.as_slice().to_vec(),
            GeometryAxis::Line.into(),
            columns,
        )
    }
}

// ---------------------------------------------------------------------------
// LedParamsTable
// ---------------------------------------------------------------------------

pub const IMG_ID_COLUMN: &str = "img_id";
pub const LED_ID_COLUMN: &str = "led_id";
pub const LINE_COLUMN: &str = "line";
pub const HEIGHT_COLUMN: &str = "height";

/// Per-LED measurement parameters of one channel, indexed by
/// (experiment time, LED id).
#[derive(Debug, Clone, PartialEq)]
pub struct LedParamsTable {
    time: Vec<f64>,
    led_id: Vec<i64>,
    line: Vec<i64>,
    height: Vec<f64>,
    params: BTreeMap<String, Vec<f64>>,
}

impl LedParamsTable {
    /// Attach experiment time to raw LED parameter rows.
    ///
    /// `img_id` is the row position in the image-info table whose time is
    /// `image_times[img_id]`; rows without a matching image, and rows whose
    /// `img_id`, `led_id` or `line` is not a whole number, are dropped.
    /// Rows are ordered by time, keeping file order within one time step.
    pub fn merge_with_image_times(
        raw: &NumericColumns,
        image_times: &[f64],
        source: &Path,
    ) -> Result<LedParamsTable> {
        let img_id = raw.require(source, IMG_ID_COLUMN)?;
        let led_id = raw.require(source, LED_ID_COLUMN)?;
        let line = raw.require(source, LINE_COLUMN)?;
        let height = raw.require(source, HEIGHT_COLUMN)?;

        let keep: Vec<(usize, f64)> = (0..raw.n_rows())
            .filter_map(|row| {
                let id = whole_number(img_id[row])?;
                whole_number(led_id[row])?;
                whole_number(line[row])?;
                let id = usize::try_from(id).ok()?;
                image_times.get(id).map(|&t| (row, t))
            })
            .collect();
        let mut order = keep;
        order.sort_by(|a, b| a.1.total_cmp(&b.1));

        if order.is_empty() {
            return Err(Error::malformed(source, "no LED rows match an image"));
        }
        let dropped = raw.n_rows() - order.len();
        if dropped > 0 {
            warn!(
                "{}: dropped {dropped} rows without image or with a non-integer id",
                source.display()
            );
        }

        let pick = |col: &[f64]| -> Vec<f64> { order.iter().map(|&(row, _)| col[row]).collect() };

        let mut params = BTreeMap::new();
        for (name, values) in raw.names.iter().zip(&raw.columns) {
            let name = name.trim();
            if [IMG_ID_COLUMN, LED_ID_COLUMN, LINE_COLUMN, HEIGHT_COLUMN].contains(&name) {
                continue;
            }
            params.insert(name.to_string(), pick(values));
        }

        Ok(LedParamsTable {
            time: order.iter().map(|&(_, t)| t).collect(),
            led_id: pick(led_id).into_iter().map(|v| v as i64).collect(),
            line: pick(line).into_iter().map(|v| v as i64).collect(),
            height: pick(height),
            params,
        })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.time
    }

    pub fn led_ids(&self) -> &[i64] {
        &self.led_id
    }

    pub fn heights(&self) -> &[f64] {
        &self.height
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn param(&self, name: &str) -> Option<&[f64]> {
        self.params.get(name).map(Vec::as_slice)
    }

    /// `(time, key, value)` of every row on `line`, keyed by LED id or height.
    pub fn rows_at_line(
        &self,
        line: i64,
        param: &str,
        key: GeometryAxis,
    ) -> Result<Vec<(f64, Label, f64)>> {
        let values = self.param(param).ok_or_else(|| Error::MissingKey {
            axis: "parameter",
            key: param.to_string(),
        })?;
        let label = |row: usize| -> Result<Label> {
            match key {
                GeometryAxis::LedId => Ok(Label::Int(self.led_id[row])),
                GeometryAxis::Height => Ok(Label::Float(self.height[row])),
                other => Err(Error::UnsupportedAxis(other)),
            }
        };
        (0..self.len())
            .filter(|&row| self.line[row] == line)
            .map(|row| Ok((self.time[row], label(row)?, values[row])))
            .collect()
    }
}

/// `v` as an integer, if it is one.
fn whole_number(v: f64) -> Option<i64> {
    (v.is_finite() && v.fract() == 0.0).then_some(v as i64)
}

// ---------------------------------------------------------------------------
// MultiChannelStore
// ---------------------------------------------------------------------------

/// Extinction coefficients plus per-channel LED parameters of one simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiChannelStore {
    extco: ExtcoTable,
    led_params: BTreeMap<ChannelId, LedParamsTable>,
}

impl MultiChannelStore {
    pub fn new(extco: ExtcoTable, led_params: BTreeMap<ChannelId, LedParamsTable>) -> Self {
        MultiChannelStore { extco, led_params }
    }

    pub fn extco(&self) -> &ExtcoTable {
        &self.extco
    }

    pub fn led_params(&self, channel: ChannelId) -> Result<&LedParamsTable> {
        self.led_params
            .get(&channel)
            .ok_or(Error::MissingChannelData(channel.get()))
    }
}
