use std::path::{Path, PathBuf};

use log::info;

use crate::data::loader::DelimitedText;
use crate::data::model::{Axis, Column, Label, Table, TimeAxis};
use crate::data::resample::{resample, SmoothingSpec};
use crate::data::shift::{shift, TimeShift};
use crate::error::{Error, Result};

/// A column picked by header name or by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Name(String),
    Position(usize),
}

impl ColumnRef {
    fn resolve(&self, text: &DelimitedText, path: &Path) -> Result<usize> {
        match self {
            ColumnRef::Name(name) => text.require(path, name),
            ColumnRef::Position(pos) => {
                if text.rows.iter().any(|row| row.len() > *pos) {
                    Ok(*pos)
                } else {
                    Err(Error::malformed(path, format!("missing column {pos}")))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    /// Device clock in integer milliseconds; rebased to the first sample.
    Milliseconds,
    /// Already elapsed seconds; taken as is.
    Seconds,
}

/// Where a source keeps its native clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeColumn {
    pub column: ColumnRef,
    pub unit: TimeUnit,
}

/// One raw tabular log on the experiment time axis.
///
/// Holds only the raw readings; smoothed and shifted views are derived on
/// every call.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesSource {
    path: PathBuf,
    raw: Table,
}

impl TimeSeriesSource {
    /// Build the raw table from parsed text cells.
    ///
    /// `values` pairs each wanted column with the label it gets in the table.
    pub fn load(
        path: &Path,
        text: &DelimitedText,
        time: &TimeColumn,
        values: &[(ColumnRef, Label)],
        column_axis: Axis,
    ) -> Result<TimeSeriesSource> {
        if text.rows.is_empty() {
            return Err(Error::malformed(path, "no data rows"));
        }

        let time_idx = time.column.resolve(text, path)?;
        let stamps = text.numeric_column(path, time_idx)?;
        if let Some(row) = stamps.iter().position(|t| t.is_nan()) {
            return Err(Error::malformed(path, format!("row {row}: missing time stamp")));
        }
        if let Some(row) = stamps.windows(2).position(|w| w[1] < w[0]) {
            return Err(Error::malformed(
                path,
                format!("row {}: time stamp goes backwards", row + 1),
            ));
        }
        let axis = match time.unit {
            TimeUnit::Milliseconds => {
                let millis: Vec<i64> = stamps.iter().map(|&ms| ms as i64).collect();
                TimeAxis::from_millis(&millis)
            }
            TimeUnit::Seconds => TimeAxis::from_seconds(stamps),
        };

        let columns = values
            .iter()
            .map(|(column, label)| {
                let idx = column.resolve(text, path)?;
                Ok(Column::new(label.clone(), text.numeric_column(path, idx)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let raw = Table::new(Axis::Time, axis.into_inner(), column_axis, columns)?;
        info!(
            "{}: {} samples x {} columns",
            path.display(),
            raw.n_rows(),
            raw.n_cols()
        );
        Ok(TimeSeriesSource {
            path: path.to_path_buf(),
            raw,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Readings as loaded, before smoothing or shifting.
    pub fn raw(&self) -> &Table {
        &self.raw
    }

    /// Smoothed and shifted copy of the raw readings.
    pub fn series(&self, smoothing: &SmoothingSpec, time_shift: &TimeShift) -> Result<Table> {
        let smoothed = resample(&self.raw, smoothing)?;
        Ok(shift(&smoothed, time_shift, smoothing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::resample::SmoothingMode;

    fn text(headers: &[&str], rows: &[&[&str]]) -> DelimitedText {
        DelimitedText {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn millisecond_clock_is_rebased() {
        let text = text(&[], &[&["1000", "5"], &["1500", "6"], &["3000", "7"]]);
        let source = TimeSeriesSource::load(
            Path::new("t.csv"),
            &text,
            &TimeColumn {
                column: ColumnRef::Position(0),
                unit: TimeUnit::Milliseconds,
            },
            &[(ColumnRef::Position(1), Label::Int(0))],
            Axis::Position,
        )
        .unwrap();
        assert_eq!(source.raw().index(), &[0.0, 0.5, 2.0]);
        assert_eq!(source.raw().columns()[0].values, vec![5.0, 6.0, 7.0]);
    }

    #[test]
    fn seconds_pass_through_and_series_is_derived() {
        let text = text(&["Time", "a"], &[&["3", "1"], &["4", "2"], &["5", "3"]]);
        let source = TimeSeriesSource::load(
            Path::new("t.csv"),
            &text,
            &TimeColumn {
                column: ColumnRef::Name("Time".into()),
                unit: TimeUnit::Seconds,
            },
            &[(ColumnRef::Name("a".into()), Label::from("a"))],
            Axis::Signal,
        )
        .unwrap();
        assert_eq!(source.raw().index(), &[3.0, 4.0, 5.0]);

        let spec = SmoothingSpec::trailing(2, SmoothingMode::Mean);
        let series = source.series(&spec, &TimeShift::new(-3.0)).unwrap();
        assert_eq!(series.index(), &[0.0, 1.0, 2.0]);
        let values = &series.columns()[0].values;
        assert_eq!(&values[..2], &[2.5, 3.0]);
        assert!(values[2].is_nan());
        // raw stays untouched
        assert_eq!(source.raw().columns()[0].values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn backwards_clock_is_malformed() {
        let text = text(&[], &[&["1000", "5"], &["3000", "6"], &["2000", "7"]]);
        let err = TimeSeriesSource::load(
            Path::new("t.csv"),
            &text,
            &TimeColumn {
                column: ColumnRef::Position(0),
                unit: TimeUnit::Milliseconds,
            },
            &[(ColumnRef::Position(1), Label::Int(0))],
            Axis::Position,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedInput { ref reason, .. } if reason.contains("row 2")));
    }

    #[test]
    fn missing_columns_and_empty_input_are_malformed() {
        let spec = TimeColumn {
            column: ColumnRef::Name("Time".into()),
            unit: TimeUnit::Seconds,
        };
        let missing = text(&["Clock"], &[&["0"]]);
        let err = TimeSeriesSource::load(Path::new("t"), &missing, &spec, &[], Axis::Signal).unwrap_err();
        assert!(matches!(err, Error::MalformedInput { .. }));

        let empty = text(&["Time"], &[]);
        let err = TimeSeriesSource::load(Path::new("t"), &empty, &spec, &[], Axis::Signal).unwrap_err();
        assert!(matches!(err, Error::MalformedInput { .. }));
    }
}
