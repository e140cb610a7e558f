//! Moving-window smoothing along the row index of a [`Table`].
//!
//! Two alignments are supported:
//!
//! * **Trailing** – the table is traversed backwards in time and each value
//!   summarises the `window` samples that precede it on that reversed
//!   traversal, the sample itself excluded. In forward time a value at `t`
//!   therefore summarises the samples after `t`; [`WindowEdge::Inclusive`]
//!   lets the window include `t`, and [`shift`](super::shift) can move the
//!   label to the end of the window afterwards.
//! * **Leading-centred** – a window of `window` samples ending at row
//!   `i + k` with `k = window / 2 - 1`, i.e. rows
//!   `[i + window / 2 - window, i + window / 2 - 1]`, reported at row `i`.
//!
//! Rows are never dropped. Windows cut short by either end of the table use
//! whatever samples are available; a window without a single defined sample
//! yields `NaN`. A window of one sample is the identity.

use serde::{Deserialize, Serialize};

use crate::data::model::Table;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMode {
    #[default]
    Mean,
    Median,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    #[default]
    Trailing,
    LeadingCentered,
}

/// Whether a trailing window includes the sample it is reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowEdge {
    /// The window closes just before the current sample (closed-left).
    #[default]
    Exclusive,
    Inclusive,
}

/// Window size in samples plus how to aggregate and align it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmoothingSpec {
    pub window: usize,
    #[serde(default)]
    pub mode: SmoothingMode,
    #[serde(default)]
    pub alignment: Alignment,
    /// Only consulted for [`Alignment::Trailing`].
    #[serde(default)]
    pub edge: WindowEdge,
}

impl Default for SmoothingSpec {
    fn default() -> Self {
        SmoothingSpec::none()
    }
}

impl SmoothingSpec {
    /// No smoothing.
    pub fn none() -> Self {
        SmoothingSpec {
            window: 1,
            mode: SmoothingMode::Mean,
            alignment: Alignment::Trailing,
            edge: WindowEdge::Exclusive,
        }
    }

    pub fn trailing(window: usize, mode: SmoothingMode) -> Self {
        SmoothingSpec {
            window,
            mode,
            alignment: Alignment::Trailing,
            edge: WindowEdge::Exclusive,
        }
    }

    pub fn centered(window: usize, mode: SmoothingMode) -> Self {
        SmoothingSpec {
            window,
            mode,
            alignment: Alignment::LeadingCentered,
            edge: WindowEdge::Exclusive,
        }
    }

    pub fn with_edge(self, edge: WindowEdge) -> Self {
        SmoothingSpec { edge, ..self }
    }

    pub fn validate(&self) -> Result<()> {
        if self.window < 1 {
            return Err(Error::InvalidWindow(self.window));
        }
        Ok(())
    }
}

/// Smooth every column of `table` along its rows.
///
/// The index is kept as is; see [`shift`](super::shift::shift) for moving
/// labels to compensate for the window lag.
pub fn resample(table: &Table, spec: &SmoothingSpec) -> Result<Table> {
    spec.validate()?;
    if spec.window == 1 {
        return Ok(table.clone());
    }
    table.map_columns(|column| resample_values(&column.values, spec))
}

/// Smooth one column. `spec.window` must be at least 1.
pub fn resample_values(values: &[f64], spec: &SmoothingSpec) -> Vec<f64> {
    if spec.window <= 1 {
        return values.to_vec();
    }
    match spec.alignment {
        Alignment::Trailing => trailing(values, spec),
        Alignment::LeadingCentered => centered(values, spec),
    }
}

fn trailing(values: &[f64], spec: &SmoothingSpec) -> Vec<f64> {
    let reversed: Vec<f64> = values.iter().rev().copied().collect();
    let w = spec.window;

    let mut out: Vec<f64> = (0..reversed.len())
        .map(|j| {
            let (start, end) = match spec.edge {
                WindowEdge::Inclusive => ((j + 1).saturating_sub(w), j + 1),
                WindowEdge::Exclusive => (j.saturating_sub(w), j),
            };
            aggregate(&reversed[start..end], spec.mode)
        })
        .collect();
    out.reverse();
    out
}

fn centered(values: &[f64], spec: &SmoothingSpec) -> Vec<f64> {
    let n = values.len();
    let w = spec.window;
    let ahead = w / 2;

    (0..n)
        .map(|i| {
            let end = (i + ahead).min(n);
            let start = (i + ahead).saturating_sub(w).min(end);
            aggregate(&values[start..end], spec.mode)
        })
        .collect()
}

/// Mean or median over the defined samples of a window.
fn aggregate(window: &[f64], mode: SmoothingMode) -> f64 {
    let mut defined: Vec<f64> = window.iter().copied().filter(|v| !v.is_nan()).collect();
    if defined.is_empty() {
        return f64::NAN;
    }
    match mode {
        SmoothingMode::Mean => defined.iter().sum::<f64>() / defined.len() as f64,
        SmoothingMode::Median => {
            defined.sort_by(f64::total_cmp);
            let mid = defined.len() / 2;
            if defined.len() % 2 == 0 {
                (defined[mid - 1] + defined[mid]) / 2.0
            } else {
                defined[mid]
            }
        }
    }
}
