//! MIREX gas-sensor log.
//!
//! Three sensor channels log a decibel-like raw reading that is converted to
//! an extinction value; a balance column logs the cumulative sample mass.

use std::path::Path;

use crate::config::MirexProfile;
use crate::data::loader::{read_delimited, Delimited};
use crate::data::model::{Axis, Column, Label, Table};
use crate::data::resample::{resample, SmoothingMode, SmoothingSpec};
use crate::data::shift::{shift, TimeShift};
use crate::error::Result;
use crate::sources::series::{ColumnRef, TimeColumn, TimeSeriesSource, TimeUnit};

pub const MIREX_1: &str = "mirex_1";
pub const MIREX_2: &str = "mirex_2";
pub const MIREX_3: &str = "mirex_3";
pub const MASS_LOSS_RATE: &str = "mass_loss_rate";

const RAW_1: &str = "raw_1";
const RAW_2: &str = "raw_2";
const RAW_3: &str = "raw_3";
const RAW_BALANCE: &str = "balance";

/// Correction for the first MIREX channel.
pub fn sigma_1(b: f64) -> f64 {
    10f64.powf(b / 10.0).ln()
}

/// Correction for the second and third MIREX channels.
pub fn sigma_2(b: f64) -> f64 {
    5.0 * (1.0 / b * 10.0).log10() / (std::f64::consts::E.log10() * 10.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MirexData {
    source: TimeSeriesSource,
    profile: MirexProfile,
    time_shift: TimeShift,
}

impl MirexData {
    pub fn open(path: &Path, profile: &MirexProfile) -> Result<MirexData> {
        let text = read_delimited(
            path,
            Delimited {
                delimiter: b'\t',
                skip_lines: profile.header_lines,
                has_headers: true,
            },
        )?;
        let time = TimeColumn {
            column: ColumnRef::Name(profile.time_column.clone()),
            unit: TimeUnit::Seconds,
        };
        let values = [
            (&profile.mirex_1_column, RAW_1),
            (&profile.mirex_2_column, RAW_2),
            (&profile.mirex_3_column, RAW_3),
            (&profile.balance_column, RAW_BALANCE),
        ]
        .map(|(name, label)| (ColumnRef::Name(name.clone()), Label::from(label)));

        let source = TimeSeriesSource::load(path, &text, &time, &values, Axis::Signal)?;
        Ok(MirexData {
            source,
            profile: profile.clone(),
            time_shift: TimeShift::default(),
        })
    }

    /// Raw readings: `raw_1`, `raw_2`, `raw_3`, `balance`.
    pub fn raw(&self) -> &Table {
        self.source.raw()
    }

    /// Trailing window with this log's configured edge.
    pub fn smoothing(&self, window: usize, mode: SmoothingMode) -> SmoothingSpec {
        SmoothingSpec::trailing(window, mode).with_edge(self.profile.window_edge)
    }

    /// Shift applied to every derived series.
    pub fn set_timeshift(&mut self, time_shift: TimeShift) {
        self.time_shift = time_shift;
    }

    pub fn timeshift(&self) -> TimeShift {
        self.time_shift
    }

    /// Corrected sensor values and mass-loss rate.
    ///
    /// Raw readings are smoothed first, then corrected, then shifted. Columns:
    /// `mirex_1`, `mirex_2`, `mirex_3`, `mass_loss_rate`.
    pub fn series(&self, smoothing: &SmoothingSpec) -> Result<Table> {
        let smoothed = resample(self.source.raw(), smoothing)?;

        let columns = vec![
            Column::new(MIREX_1, column_values(&smoothed, RAW_1).iter().map(|&b| sigma_1(b)).collect()),
            Column::new(MIREX_2, column_values(&smoothed, RAW_2).iter().map(|&b| sigma_2(b)).collect()),
            Column::new(MIREX_3, column_values(&smoothed, RAW_3).iter().map(|&b| sigma_2(b)).collect()),
            Column::new(MASS_LOSS_RATE, diff(column_values(&smoothed, RAW_BALANCE))),
        ];
        let derived = Table::new(Axis::Time, smoothed.index().to_vec(), Axis::Signal, columns)?;
        Ok(shift(&derived, &self.time_shift, smoothing))
    }
}

fn column_values<'a>(table: &'a Table, label: &str) -> &'a [f64] {
    table
        .column(&Label::from(label))
        .map(|c| c.values.as_slice())
        .unwrap_or(&[])
}

/// First difference; the first sample has none.
fn diff(values: &[f64]) -> Vec<f64> {
    std::iter::once(f64::NAN)
        .chain(values.windows(2).map(|w| w[1] - w[0]))
        .take(values.len())
        .collect()
}
