use std::path::Path;

use log::warn;

use crate::data::loader::{read_delimited, Delimited, DelimitedText};
use crate::data::model::{Axis, Label, Table};
use crate::data::resample::{SmoothingMode, SmoothingSpec};
use crate::data::shift::TimeShift;
use crate::error::{Error, Result};
use crate::sources::series::{ColumnRef, TimeColumn, TimeSeriesSource, TimeUnit};

/// Columns before the first sensor reading: clock, signal label.
const LEADING_COLUMNS: usize = 2;

/// Thermal line-scanner log: one reading per sensor position and sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TempArrayData {
    source: TimeSeriesSource,
    signals: Vec<String>,
    time_shift: TimeShift,
}

impl TempArrayData {
    /// Read a semicolon-delimited log without header.
    ///
    /// Column 0 is the millisecond clock, column 1 the signal label and every
    /// following column one sensor position. Blank columns and rows without any
    /// reading are dropped; positions keep their place in the row.
    pub fn open(path: &Path) -> Result<TempArrayData> {
        let text = read_delimited(
            path,
            Delimited {
                delimiter: b';',
                skip_lines: 0,
                has_headers: false,
            },
        )?;
        let text = drop_blank_rows(text);
        let kept = non_blank_columns(&text);
        if !kept.contains(&0) {
            return Err(Error::malformed(path, "no time column"));
        }

        let values: Vec<(ColumnRef, Label)> = kept
            .iter()
            .filter(|&&idx| idx >= LEADING_COLUMNS)
            .map(|&idx| (ColumnRef::Position(idx), Label::Int((idx - LEADING_COLUMNS) as i64)))
            .collect();
        if values.is_empty() {
            return Err(Error::malformed(path, "no sensor columns"));
        }

        let time = TimeColumn {
            column: ColumnRef::Position(0),
            unit: TimeUnit::Milliseconds,
        };
        let source = TimeSeriesSource::load(path, &text, &time, &values, Axis::Position)?;
        Ok(TempArrayData {
            signals: text.text_column(1),
            source,
            time_shift: TimeShift::default(),
        })
    }

    pub fn raw(&self) -> &Table {
        self.source.raw()
    }

    /// Signal label of every sample.
    pub fn signals(&self) -> &[String] {
        &self.signals
    }

    /// Closed-left trailing window, as the logger's analysis scripts use.
    pub fn smoothing(&self, window: usize, mode: SmoothingMode) -> SmoothingSpec {
        SmoothingSpec::trailing(window, mode)
    }

    pub fn set_timeshift(&mut self, time_shift: TimeShift) {
        self.time_shift = time_shift;
    }

    pub fn timeshift(&self) -> TimeShift {
        self.time_shift
    }

    /// Readings per position, smoothed and shifted.
    pub fn series(&self, smoothing: &SmoothingSpec) -> Result<Table> {
        self.source.series(smoothing, &self.time_shift)
    }
}

fn is_blank(cell: &str) -> bool {
    cell.trim().is_empty()
}

fn drop_blank_rows(mut text: DelimitedText) -> DelimitedText {
    let before = text.rows.len();
    text.rows.retain(|row| {
        !is_blank(row.first().map(String::as_str).unwrap_or(""))
            && row.iter().skip(LEADING_COLUMNS).any(|c| !is_blank(c))
    });
    let dropped = before - text.rows.len();
    if dropped > 0 {
        warn!("temperature array: dropped {dropped} rows without readings");
    }
    text
}

/// Columns holding at least one non-blank cell.
fn non_blank_columns(text: &DelimitedText) -> Vec<usize> {
    let width = text.rows.iter().map(Vec::len).max().unwrap_or(0);
    (0..width)
        .filter(|&idx| {
            text.rows
                .iter()
                .any(|row| row.get(idx).is_some_and(|c| !is_blank(c)))
        })
        .collect()
}
