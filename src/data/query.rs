//! Queries over a [`MultiChannelStore`]: axis slicing, smoothing, optional
//! height labels and reference normalisation.

use std::collections::BTreeMap;

use crate::data::calibration::LayerCalibration;
use crate::data::model::{Axis, ChannelId, Column, GeometryAxis, Label, Table};
use crate::data::resample::{resample, SmoothingSpec};
use crate::data::shift::{shift, TimeShift};
use crate::data::store::MultiChannelStore;
use crate::error::{Error, Result};

/// A layer given by index or by calibrated height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerRef {
    Index(u32),
    Height(f64),
}

pub struct QueryEngine<'a> {
    store: &'a MultiChannelStore,
    calibration: Option<LayerCalibration>,
    time_shift: TimeShift,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a MultiChannelStore, calibration: Option<LayerCalibration>) -> Self {
        QueryEngine {
            store,
            calibration,
            time_shift: TimeShift::default(),
        }
    }

    /// Report every time-indexed result on the shifted clock.
    pub fn with_time_shift(mut self, time_shift: TimeShift) -> Self {
        self.time_shift = time_shift;
        self
    }

    /// Extinction coefficients of one channel at time `t`.
    ///
    /// `t` is read on the shifted clock. Index = layer (or height), columns =
    /// line. Smoothing runs along time before the row is picked.
    pub fn at_time(
        &self,
        channel: ChannelId,
        t: f64,
        yaxis: GeometryAxis,
        smoothing: &SmoothingSpec,
    ) -> Result<Table> {
        smoothing.validate()?;
        let extco = self.store.extco();
        let lines = extco.lines(channel);
        if lines.is_empty() {
            return Err(Error::MissingChannelData(channel.get()));
        }
        let row = extco
            .time()
            .shifted(self.time_shift.offset(smoothing))
            .position(t)
            .ok_or(Error::TimestepNotFound(t))?;

        let mut columns = Vec::with_capacity(lines.len());
        for line in lines {
            let slice = extco.slice_line(channel, line, GeometryAxis::Layer, None)?;
            let smoothed = resample(&slice, smoothing)?;
            let values = smoothed.row(row).ok_or(Error::TimestepNotFound(t))?;
            columns.push(Column::new(Label::Int(line as i64), values));
        }

        let layers: Vec<f64> = (0..extco.n_layers()).map(|l| l as f64).collect();
        let index = match yaxis {
            GeometryAxis::Layer => layers,
            GeometryAxis::Height => {
                let cal = self.calibration.ok_or(Error::MissingCalibration)?;
                layers
                    .iter()
                    .map(|&l| cal.height_from_layer(l, extco.n_layers()))
                    .collect()
            }
            other => return Err(Error::UnsupportedAxis(other)),
        };
        Table::new(yaxis.into(), index, GeometryAxis::Line.into(), columns)
    }

    /// Extinction coefficients along one line over time.
    ///
    /// Index = time, columns = layer (or height).
    pub fn at_line(
        &self,
        channel: ChannelId,
        line: u32,
        yaxis: GeometryAxis,
        smoothing: &SmoothingSpec,
    ) -> Result<Table> {
        let slice = self
            .store
            .extco()
            .slice_line(channel, line, yaxis, self.calibration.as_ref())?;
        self.smoothed(&slice, smoothing)
    }

    /// Extinction coefficients in one layer over time.
    ///
    /// Index = time, columns = line.
    pub fn at_layer(&self, channel: ChannelId, layer: LayerRef, smoothing: &SmoothingSpec) -> Result<Table> {
        let extco = self.store.extco();
        let layer = match layer {
            LayerRef::Index(layer) => layer,
            LayerRef::Height(height) => {
                let cal = self.calibration.ok_or(Error::MissingCalibration)?;
                cal.nearest_layer(height, extco.n_layers())
                    .ok_or_else(|| Error::MissingKey {
                        axis: "height",
                        key: height.to_string(),
                    })? as u32
            }
        };
        let slice = extco.slice_layer(channel, layer)?;
        self.smoothed(&slice, smoothing)
    }

    /// One LED parameter along a line over time.
    ///
    /// Index = time, columns = LED id (or LED height). With `n_ref = Some(n)`
    /// each column is divided by the mean of its first `n` samples before
    /// smoothing; `None` or `Some(0)` returns raw values.
    pub fn led_param_at_line(
        &self,
        channel: ChannelId,
        line: i64,
        param: &str,
        yaxis: GeometryAxis,
        smoothing: &SmoothingSpec,
        n_ref: Option<usize>,
    ) -> Result<Table> {
        smoothing.validate()?;
        let led = self.store.led_params(channel)?;
        let mut rows = led.rows_at_line(line, param, yaxis)?;

        if let Some(n) = n_ref.filter(|&n| n > 0) {
            normalise_to_reference(&mut rows, n);
        }

        let table = pivot(&rows, yaxis)?;
        self.smoothed(&table, smoothing)
    }

    fn smoothed(&self, table: &Table, smoothing: &SmoothingSpec) -> Result<Table> {
        let smoothed = resample(table, smoothing)?;
        Ok(shift(&smoothed, &self.time_shift, smoothing))
    }
}

/// Divide every value by the mean of the first `n` values of its key.
fn normalise_to_reference(rows: &mut [(f64, Label, f64)], n: usize) {
    let mut firsts: BTreeMap<Label, Vec<f64>> = BTreeMap::new();
    for (_, key, value) in rows.iter() {
        let seen = firsts.entry(key.clone()).or_default();
        if seen.len() < n {
            seen.push(*value);
        }
    }
    let reference: BTreeMap<Label, f64> = firsts
        .into_iter()
        .map(|(key, values)| {
            let defined: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
            let mean = if defined.is_empty() {
                f64::NAN
            } else {
                defined.iter().sum::<f64>() / defined.len() as f64
            };
            (key, mean)
        })
        .collect();

    for (_, key, value) in rows.iter_mut() {
        *value /= reference[key];
    }
}

/// Long `(time, key, value)` rows to a time × key table. Missing cells are
/// `NaN`; two values for one cell are an error.
pub fn pivot(rows: &[(f64, Label, f64)], key_axis: GeometryAxis) -> Result<Table> {
    let mut times: Vec<f64> = rows.iter().map(|r| r.0).collect();
    times.sort_by(f64::total_cmp);
    times.dedup();

    // Values plus which cells were written; a written cell may hold NaN.
    let mut cells: BTreeMap<Label, (Vec<f64>, Vec<bool>)> = BTreeMap::new();
    for (time, key, value) in rows {
        let (column, filled) = cells
            .entry(key.clone())
            .or_insert_with(|| (vec![f64::NAN; times.len()], vec![false; times.len()]));
        let pos = times
            .binary_search_by(|t| t.total_cmp(time))
            .map_err(|_| Error::TimestepNotFound(*time))?;
        if filled[pos] {
            return Err(Error::DuplicateEntry {
                time: *time,
                key: key.to_string(),
            });
        }
        column[pos] = *value;
        filled[pos] = true;
    }

    let columns = cells
        .into_iter()
        .map(|(label, (values, _))| Column { label, values })
        .collect();
    Table::new(Axis::Time, times, key_axis.into(), columns)
}

/// Smooth a single source's table and read every column at time `t`.
pub fn sample_at(table: &Table, t: f64, smoothing: &SmoothingSpec) -> Result<Vec<(Label, f64)>> {
    let row = table.row_position(t).ok_or(Error::TimestepNotFound(t))?;
    let smoothed = resample(table, smoothing)?;
    Ok(smoothed
        .columns()
        .iter()
        .map(|c| (c.label.clone(), c.values[row]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::NumericColumns;
    use crate::data::resample::SmoothingMode;
    use crate::data::store::tests::{extco_value, write_extco};
    use crate::data::store::{ExtcoTable, LedParamsTable};
    use std::path::Path;

    fn ch(c: u8) -> ChannelId {
        ChannelId::new(c).unwrap()
    }

    fn led_params() -> LedParamsTable {
        // Two LEDs on line 0, one on line 1, four time steps.
        let mut cols = vec![Vec::new(); 5];
        for img in 0..4 {
            for (led, line, height, base) in [(0, 0, 2.0, 10.0), (1, 0, 1.0, 20.0), (2, 1, 2.0, 30.0)] {
                cols[0].push(img as f64);
                cols[1].push(led as f64);
                cols[2].push(line as f64);
                cols[3].push(height);
                cols[4].push(base + img as f64);
            }
        }
        let raw = NumericColumns {
            names: ["img_id", "led_id", "line", "height", "sum_col_val"]
                .map(String::from)
                .to_vec(),
            columns: cols,
        };
        LedParamsTable::merge_with_image_times(&raw, &[0.0, 1.0, 2.0, 3.0], Path::new("p.csv")).unwrap()
    }

    fn store(dir: &Path) -> MultiChannelStore {
        for line in 0..3 {
            write_extco(dir, 0, line, 4, 5);
        }
        let extco = ExtcoTable::build(dir, &[0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        let led = BTreeMap::from([(ch(0), led_params())]);
        MultiChannelStore::new(extco, led)
    }

    #[test]
    fn at_time_rows_are_layers() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let engine = QueryEngine::new(&store, None);

        let table = engine
            .at_time(ch(0), 2.0, GeometryAxis::Layer, &SmoothingSpec::none())
            .unwrap();
        assert_eq!(table.n_rows(), 4);
        assert_eq!(table.n_cols(), 3);
        assert_eq!(table.index_axis(), Axis::Geometry(GeometryAxis::Layer));
        assert_eq!(table.columns()[1].values[3], extco_value(0, 1, 3, 2));
    }

    #[test]
    fn at_time_smooths_along_time_without_current_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let engine = QueryEngine::new(&store, None);

        let spec = SmoothingSpec::trailing(2, SmoothingMode::Mean);
        let table = engine.at_time(ch(0), 1.0, GeometryAxis::Layer, &spec).unwrap();
        let expected = (extco_value(0, 0, 0, 2) + extco_value(0, 0, 0, 3)) / 2.0;
        assert_eq!(table.columns()[0].values[0], expected);

        // The last row has nothing after it.
        let last = engine.at_time(ch(0), 4.0, GeometryAxis::Layer, &spec).unwrap();
        assert!(last.columns()[0].values[0].is_nan());
    }

    #[test]
    fn at_time_misses_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let engine = QueryEngine::new(&store, None);

        let err = engine
            .at_time(ch(0), 2.5, GeometryAxis::Layer, &SmoothingSpec::none())
            .unwrap_err();
        assert!(matches!(err, Error::TimestepNotFound(t) if t == 2.5));
        let err = engine
            .at_time(ch(1), 2.0, GeometryAxis::Layer, &SmoothingSpec::none())
            .unwrap_err();
        assert!(matches!(err, Error::MissingChannelData(1)));
    }

    #[test]
    fn at_time_height_index_needs_calibration() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let spec = SmoothingSpec::none();

        let err = QueryEngine::new(&store, None)
            .at_time(ch(0), 0.0, GeometryAxis::Height, &spec)
            .unwrap_err();
        assert!(matches!(err, Error::MissingCalibration));

        let engine = QueryEngine::new(&store, Some(LayerCalibration::new(1.0, 3.0)));
        let table = engine.at_time(ch(0), 0.0, GeometryAxis::Height, &spec).unwrap();
        assert_eq!(table.index(), &[3.0, 2.5, 2.0, 1.5]);
    }

    #[test]
    fn at_line_and_at_layer_are_time_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let engine = QueryEngine::new(&store, Some(LayerCalibration::new(1.0, 3.0)));
        let spec = SmoothingSpec::none();

        let by_line = engine.at_line(ch(0), 2, GeometryAxis::Layer, &spec).unwrap();
        assert_eq!(by_line.n_rows(), 5);
        assert_eq!(by_line.n_cols(), 4);

        let by_index = engine.at_layer(ch(0), LayerRef::Index(2), &spec).unwrap();
        let by_height = engine.at_layer(ch(0), LayerRef::Height(2.0), &spec).unwrap();
        assert_eq!(by_index, by_height);
        assert_eq!(by_index.n_cols(), 3);
        assert_eq!(by_index.columns()[2].values[4], extco_value(0, 2, 2, 4));
    }

    #[test]
    fn led_params_without_reference_are_raw() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let engine = QueryEngine::new(&store, None);
        let spec = SmoothingSpec::none();

        let raw = engine
            .led_param_at_line(ch(0), 0, "sum_col_val", GeometryAxis::LedId, &spec, None)
            .unwrap();
        let rows = store
            .led_params(ch(0))
            .unwrap()
            .rows_at_line(0, "sum_col_val", GeometryAxis::LedId)
            .unwrap();
        assert_eq!(raw, pivot(&rows, GeometryAxis::LedId).unwrap());
        assert_eq!(raw.columns()[1].values, vec![20.0, 21.0, 22.0, 23.0]);

        let zero = engine
            .led_param_at_line(ch(0), 0, "sum_col_val", GeometryAxis::LedId, &spec, Some(0))
            .unwrap();
        assert_eq!(raw, zero);
    }

    #[test]
    fn led_params_are_normalised_per_led() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let engine = QueryEngine::new(&store, None);

        let rel = engine
            .led_param_at_line(ch(0), 0, "sum_col_val", GeometryAxis::Height, &SmoothingSpec::none(), Some(2))
            .unwrap();
        assert_eq!(rel.column_axis(), Axis::Geometry(GeometryAxis::Height));
        // Height 1.0 belongs to LED 1: reference = (20 + 21) / 2.
        let led1 = rel.column(&Label::Float(1.0)).unwrap();
        assert_eq!(led1.values, vec![20.0 / 20.5, 21.0 / 20.5, 22.0 / 20.5, 23.0 / 20.5]);
    }

    #[test]
    fn led_params_for_unloaded_channel_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let engine = QueryEngine::new(&store, None);
        let err = engine
            .led_param_at_line(ch(2), 0, "sum_col_val", GeometryAxis::LedId, &SmoothingSpec::none(), None)
            .unwrap_err();
        assert!(matches!(err, Error::MissingChannelData(2)));
    }

    #[test]
    fn time_shift_moves_queries_and_results() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let engine = QueryEngine::new(&store, None).with_time_shift(TimeShift::autocorrected(-1.0));
        let spec = SmoothingSpec::trailing(2, SmoothingMode::Mean);

        // offset = -1 + 2
        let by_line = engine.at_line(ch(0), 0, GeometryAxis::Layer, &spec).unwrap();
        assert_eq!(by_line.index(), &[1.0, 2.0, 3.0, 4.0, 5.0]);

        let at_t = engine.at_time(ch(0), 1.0, GeometryAxis::Layer, &spec).unwrap();
        let expected = (extco_value(0, 0, 0, 1) + extco_value(0, 0, 0, 2)) / 2.0;
        assert_eq!(at_t.columns()[0].values[0], expected);
        assert!(engine.at_time(ch(0), 0.0, GeometryAxis::Layer, &spec).is_err());

        let led = engine
            .led_param_at_line(ch(0), 0, "sum_col_val", GeometryAxis::LedId, &SmoothingSpec::none(), None)
            .unwrap();
        assert_eq!(led.index(), &[-1.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn pivot_rejects_duplicate_cells() {
        let rows = vec![(0.0, Label::Int(1), 1.0), (0.0, Label::Int(1), 2.0)];
        assert!(matches!(pivot(&rows, GeometryAxis::LedId), Err(Error::DuplicateEntry { .. })));

        let nan_first = vec![(0.0, Label::Int(1), f64::NAN), (0.0, Label::Int(1), 2.0)];
        assert!(matches!(pivot(&nan_first, GeometryAxis::LedId), Err(Error::DuplicateEntry { .. })));
    }

    #[test]
    fn sample_at_reads_one_row() {
        let table = Table::new(
            Axis::Time,
            vec![0.0, 0.5, 1.0],
            Axis::Position,
            vec![Column::new(Label::Int(0), vec![1.0, 2.0, 3.0])],
        )
        .unwrap();
        let spec = SmoothingSpec::centered(3, SmoothingMode::Mean);
        assert_eq!(sample_at(&table, 0.5, &spec).unwrap(), vec![(Label::Int(0), 1.5)]);
        assert!(matches!(sample_at(&table, 2.0, &spec), Err(Error::TimestepNotFound(_))));
    }
}
