use serde::{Deserialize, Serialize};

use crate::data::model::Table;
use crate::data::resample::{Alignment, SmoothingSpec};

/// Additive clock correction in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeShift {
    #[serde(default)]
    pub delta: f64,
    /// Also move trailing-smoothed values to the end of their window.
    #[serde(default)]
    pub autocorrect: bool,
}

impl TimeShift {
    pub fn new(delta: f64) -> Self {
        TimeShift {
            delta,
            autocorrect: false,
        }
    }

    pub fn autocorrected(delta: f64) -> Self {
        TimeShift {
            delta,
            autocorrect: true,
        }
    }

    /// Total offset applied to a series smoothed with `smoothing`.
    ///
    /// A trailing window of `w` samples reports each aggregate at the start of
    /// its window; autocorrection adds `w` so the label sits at its end. The
    /// window length is taken as seconds (one sample per second).
    pub fn offset(&self, smoothing: &SmoothingSpec) -> f64 {
        let lag = if self.autocorrect
            && smoothing.alignment == Alignment::Trailing
            && smoothing.window > 1
        {
            smoothing.window as f64
        } else {
            0.0
        };
        self.delta + lag
    }
}

/// Copy of `table` with every index entry moved by the shift's offset.
pub fn shift(table: &Table, shift: &TimeShift, smoothing: &SmoothingSpec) -> Table {
    let offset = shift.offset(smoothing);
    table.map_index(|t| t + offset)
}

/// Shift every series of one source by the same offset so they stay aligned.
pub fn shift_all(tables: &[Table], time_shift: &TimeShift, smoothing: &SmoothingSpec) -> Vec<Table> {
    tables
        .iter()
        .map(|table| shift(table, time_shift, smoothing))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Axis, Column};
    use crate::data::resample::SmoothingMode;

    fn table() -> Table {
        Table::new(
            Axis::Time,
            vec![0.0, 1.0, 2.0],
            Axis::Signal,
            vec![Column::new("v", vec![3.0, 4.0, 5.0])],
        )
        .unwrap()
    }

    #[test]
    fn shifts_are_additive() {
        let none = SmoothingSpec::none();
        let twice = shift(&shift(&table(), &TimeShift::new(1.5), &none), &TimeShift::new(-0.25), &none);
        let once = shift(&table(), &TimeShift::new(1.25), &none);
        assert_eq!(twice.index(), once.index());
        assert_eq!(once.index(), &[1.25, 2.25, 3.25]);
    }

    #[test]
    fn input_is_untouched() {
        let original = table();
        let shifted = shift(&original, &TimeShift::new(-10.0), &SmoothingSpec::none());
        assert_eq!(original.index(), &[0.0, 1.0, 2.0]);
        assert_eq!(shifted.index(), &[-10.0, -9.0, -8.0]);
        assert_eq!(shifted.columns(), original.columns());
    }

    #[test]
    fn autocorrect_only_compensates_trailing_windows() {
        let trailing = SmoothingSpec::trailing(5, SmoothingMode::Mean);
        let centered = SmoothingSpec::centered(5, SmoothingMode::Mean);
        let fix = TimeShift::autocorrected(2.0);
        assert_eq!(fix.offset(&trailing), 7.0);
        assert_eq!(fix.offset(&centered), 2.0);
        assert_eq!(fix.offset(&SmoothingSpec::none()), 2.0);
        assert_eq!(TimeShift::new(2.0).offset(&trailing), 2.0);
    }

    #[test]
    fn shift_all_keeps_series_aligned() {
        let other = table().map_index(|t| t * 2.0);
        let shifted = shift_all(&[table(), other], &TimeShift::new(3.0), &SmoothingSpec::none());
        assert_eq!(shifted[0].index(), &[3.0, 4.0, 5.0]);
        assert_eq!(shifted[1].index(), &[3.0, 5.0, 7.0]);
    }
}
