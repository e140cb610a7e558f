use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Label – a column key
// ---------------------------------------------------------------------------

/// A column key. Geometry columns (line, layer, LED id, sensor position) are
/// integers, height columns are floats, instrument columns are names.
#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    Int(i64),
    Float(f64),
    Name(String),
}

// -- Manual Eq/Ord so labels can key a BTreeMap --

impl Eq for Label {}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        use Label::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b).then(Ordering::Less),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)).then(Ordering::Greater),
            (Name(a), Name(b)) => a.cmp(b),
            (Name(_), _) => Ordering::Greater,
            (_, Name(_)) => Ordering::Less,
        }
    }
}

impl std::hash::Hash for Label {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Label::Int(i) => i.hash(state),
            Label::Float(f) => f.to_bits().hash(state),
            Label::Name(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(i) => write!(f, "{i}"),
            Label::Float(v) => write!(f, "{v:.4}"),
            Label::Name(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label::Name(s.to_string())
    }
}

impl From<i64> for Label {
    fn from(i: i64) -> Self {
        Label::Int(i)
    }
}

impl Label {
    /// Numeric view of the label, used when a column key becomes a row index.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Label::Int(i) => Some(*i as f64),
            Label::Float(v) => Some(*v),
            Label::Name(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Axes and channels
// ---------------------------------------------------------------------------

/// Spatial axes that can label the rows or columns of a query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryAxis {
    Line,
    Layer,
    Height,
    LedId,
}

/// What the row index or the column keys of a [`Table`] mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Experiment time in seconds.
    Time,
    Geometry(GeometryAxis),
    /// Sensor position along the temperature array.
    Position,
    /// Named instrument signals.
    Signal,
}

impl From<GeometryAxis> for Axis {
    fn from(axis: GeometryAxis) -> Self {
        Axis::Geometry(axis)
    }
}

/// Colour or sensor channel, one of 0, 1, 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u8);

impl ChannelId {
    pub const ALL: [ChannelId; 3] = [ChannelId(0), ChannelId(1), ChannelId(2)];

    pub fn new(channel: u8) -> Result<Self> {
        if channel <= 2 {
            Ok(ChannelId(channel))
        } else {
            Err(Error::UnknownChannel(channel))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u8> for ChannelId {
    type Error = Error;

    fn try_from(channel: u8) -> Result<Self> {
        ChannelId::new(channel)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TimeAxis – normalised experiment time
// ---------------------------------------------------------------------------

/// Non-decreasing experiment time stamps in seconds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeAxis(Vec<f64>);

impl TimeAxis {
    /// Elapsed seconds since the earliest millisecond stamp.
    pub fn from_millis(stamps: &[i64]) -> Self {
        let Some(&start) = stamps.iter().min() else {
            return TimeAxis::default();
        };
        TimeAxis(
            stamps
                .iter()
                .map(|&ms| (ms - start) as f64 / 1000.0)
                .collect(),
        )
    }

    /// Takes an existing seconds column as is.
    pub fn from_seconds(seconds: Vec<f64>) -> Self {
        TimeAxis(seconds)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    /// Row of the exact time stamp `t`.
    pub fn position(&self, t: f64) -> Option<usize> {
        self.0.iter().position(|&v| v == t)
    }

    pub fn shifted(&self, delta: f64) -> Self {
        TimeAxis(self.0.iter().map(|t| t + delta).collect())
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }
}

// ---------------------------------------------------------------------------
// Column / Table
// ---------------------------------------------------------------------------

/// One value column of a [`Table`]. Undefined cells are `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub label: Label,
    pub values: Vec<f64>,
}

impl Column {
    pub fn new(label: impl Into<Label>, values: Vec<f64>) -> Self {
        Column {
            label: label.into(),
            values,
        }
    }
}

/// Columns sharing one numeric row index.
///
/// Tables are values: every transform in the crate returns a new table and
/// leaves its input untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    index_axis: Axis,
    index: Vec<f64>,
    column_axis: Axis,
    columns: Vec<Column>,
}

impl Table {
    /// Build a table, checking that every column matches the index length.
    pub fn new(
        index_axis: Axis,
        index: Vec<f64>,
        column_axis: Axis,
        columns: Vec<Column>,
    ) -> Result<Self> {
        if let Some(bad) = columns.iter().find(|c| c.values.len() != index.len()) {
            return Err(Error::ShapeMismatch {
                label: bad.label.to_string(),
                expected: index.len(),
                found: bad.values.len(),
            });
        }
        Ok(Table {
            index_axis,
            index,
            column_axis,
            columns,
        })
    }

    pub fn index_axis(&self) -> Axis {
        self.index_axis
    }

    pub fn column_axis(&self) -> Axis {
        self.column_axis
    }

    pub fn index(&self) -> &[f64] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.columns.iter().map(|c| &c.label)
    }

    pub fn column(&self, label: &Label) -> Option<&Column> {
        self.columns.iter().find(|c| &c.label == label)
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Row holding the exact index value `key`.
    pub fn row_position(&self, key: f64) -> Option<usize> {
        self.index.iter().position(|&v| v == key)
    }

    /// Values of one row, in column order.
    pub fn row(&self, pos: usize) -> Option<Vec<f64>> {
        if pos >= self.n_rows() {
            return None;
        }
        Some(self.columns.iter().map(|c| c.values[pos]).collect())
    }

    /// Same columns, index values passed through `f`.
    pub fn map_index(&self, f: impl Fn(f64) -> f64) -> Table {
        Table {
            index: self.index.iter().map(|&v| f(v)).collect(),
            ..self.clone()
        }
    }

    /// Same index, each column's values replaced by `f(column)`.
    ///
    /// `f` must keep the column length.
    pub fn map_columns(&self, f: impl Fn(&Column) -> Vec<f64>) -> Result<Table> {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                label: c.label.clone(),
                values: f(c),
            })
            .collect();
        Table::new(self.index_axis, self.index.clone(), self.column_axis, columns)
    }

    /// Relabel the index and its axis.
    pub fn with_index(self, index_axis: Axis, index: Vec<f64>) -> Result<Table> {
        Table::new(index_axis, index, self.column_axis, self.columns)
    }

    /// Relabel the column keys and their axis.
    pub fn with_labels(mut self, column_axis: Axis, labels: Vec<Label>) -> Result<Table> {
        if labels.len() != self.columns.len() {
            return Err(Error::ShapeMismatch {
                label: format!("{column_axis:?}"),
                expected: self.columns.len(),
                found: labels.len(),
            });
        }
        for (column, label) in self.columns.iter_mut().zip(labels) {
            column.label = label;
        }
        self.column_axis = column_axis;
        Ok(self)
    }

    /// Keep only the first `len` rows.
    pub fn head(&self, len: usize) -> Table {
        let len = len.min(self.n_rows());
        Table {
            index_axis: self.index_axis,
            index: self.index[..len].to_vec(),
            column_axis: self.column_axis,
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    label: c.label.clone(),
                    values: c.values[..len].to_vec(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_sort_numbers_before_names() {
        let mut labels = vec![
            Label::from("Balance"),
            Label::Float(2.5),
            Label::Int(3),
            Label::Int(1),
        ];
        labels.sort();
        assert_eq!(
            labels,
            vec![
                Label::Int(1),
                Label::Float(2.5),
                Label::Int(3),
                Label::from("Balance"),
            ]
        );
    }

    #[test]
    fn time_axis_from_millis_starts_at_zero() {
        let axis = TimeAxis::from_millis(&[5_000, 5_500, 7_000]);
        assert_eq!(axis.as_slice(), &[0.0, 0.5, 2.0]);
        assert_eq!(axis.position(0.5), Some(1));
        assert_eq!(axis.position(0.75), None);
    }

    #[test]
    fn channel_outside_range_is_rejected() {
        assert!(ChannelId::new(2).is_ok());
        assert!(matches!(ChannelId::new(3), Err(Error::UnknownChannel(3))));
    }

    #[test]
    fn table_rejects_ragged_columns() {
        let err = Table::new(
            Axis::Time,
            vec![0.0, 1.0],
            Axis::Signal,
            vec![Column::new("a", vec![1.0])],
        )
        .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 2, found: 1, .. }));
    }

    #[test]
    fn row_lookup_is_exact() {
        let table = Table::new(
            Axis::Time,
            vec![0.0, 1.0, 2.0],
            Axis::Signal,
            vec![Column::new("a", vec![1.0, 2.0, 3.0]), Column::new("b", vec![4.0, 5.0, 6.0])],
        )
        .unwrap();
        assert_eq!(table.row_position(1.0), Some(1));
        assert_eq!(table.row(1), Some(vec![2.0, 5.0]));
        assert_eq!(table.row_position(1.5), None);
        assert_eq!(table.head(2).n_rows(), 2);
    }
}
