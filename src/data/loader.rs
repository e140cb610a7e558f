use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array, UInt32Array, UInt64Array};
use arrow::datatypes::DataType;
use log::{debug, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Delimited text
// ---------------------------------------------------------------------------

/// How a delimited instrument log is laid out.
#[derive(Debug, Clone, Copy)]
pub struct Delimited {
    pub delimiter: u8,
    /// Free-form preamble lines before the header (or the first record).
    pub skip_lines: usize,
    pub has_headers: bool,
}

impl Delimited {
    pub fn csv() -> Self {
        Delimited {
            delimiter: b',',
            skip_lines: 0,
            has_headers: true,
        }
    }
}

/// Raw cells of a delimited file, still as text.
#[derive(Debug, Clone, Default)]
pub struct DelimitedText {
    /// Header names, untrimmed. Empty when the file has no header row.
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DelimitedText {
    /// Position of the header whose trimmed text equals `name` trimmed.
    ///
    /// Instrument logs pad their column names with spaces, so the comparison
    /// ignores surrounding whitespace.
    pub fn position(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.headers.iter().position(|h| h.trim() == name)
    }

    /// Like [`position`](Self::position) but a missing column is an input error.
    pub fn require(&self, path: &Path, name: &str) -> Result<usize> {
        self.position(name)
            .ok_or_else(|| Error::malformed(path, format!("missing column '{}'", name.trim())))
    }

    /// Parse one column as numbers. Blank cells become `NaN`.
    pub fn numeric_column(&self, path: &Path, idx: usize) -> Result<Vec<f64>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(row_no, row)| {
                let cell = row.get(idx).map(String::as_str).unwrap_or("");
                parse_cell(cell).ok_or_else(|| {
                    Error::malformed(path, format!("row {row_no}, column {idx}: '{cell}' is not a number"))
                })
            })
            .collect()
    }

    /// Text of one column, blank where a row is short.
    pub fn text_column(&self, idx: usize) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.get(idx).cloned().unwrap_or_default())
            .collect()
    }
}

/// Read a whole text file, dropping bytes that are not valid UTF-8.
pub fn read_text_lossy(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            let text = String::from_utf8_lossy(err.as_bytes())
                .chars()
                .filter(|&c| c != char::REPLACEMENT_CHARACTER)
                .collect();
            warn!("{}: dropped undecodable bytes", path.display());
            Ok(text)
        }
    }
}

/// Read a delimited file into text cells.
pub fn read_delimited(path: &Path, layout: Delimited) -> Result<DelimitedText> {
    let text = read_text_lossy(path)?;
    let body = skip_lines(&text, layout.skip_lines);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(layout.delimiter)
        .has_headers(layout.has_headers)
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers = if layout.has_headers {
        reader.headers()?.iter().map(|h| h.to_string()).collect()
    } else {
        Vec::new()
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|c| c.to_string()).collect());
    }
    debug!(
        "{}: {} header columns, {} rows",
        path.display(),
        headers.len(),
        rows.len()
    );
    Ok(DelimitedText { headers, rows })
}

fn skip_lines(text: &str, n: usize) -> &str {
    let mut rest = text;
    for _ in 0..n {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return "",
        }
    }
    rest
}

/// Parse a numeric cell. Blank cells are `NaN`; anything else that is not a
/// number is `None`.
pub fn parse_cell(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(i as f64);
    }
    s.parse::<f64>().ok()
}

// ---------------------------------------------------------------------------
// Column tables (Parquet / CSV)
// ---------------------------------------------------------------------------

/// Named numeric columns of equal length.
#[derive(Debug, Clone, Default)]
pub struct NumericColumns {
    pub names: Vec<String>,
    pub columns: Vec<Vec<f64>>,
}

impl NumericColumns {
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n.trim() == name.trim())
            .map(|i| self.columns[i].as_slice())
    }

    pub fn require(&self, path: &Path, name: &str) -> Result<&[f64]> {
        self.get(name)
            .ok_or_else(|| Error::malformed(path, format!("missing column '{name}'")))
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }
}

/// Load a table of numeric columns. Dispatch by extension.
///
/// * `.parquet` – every numeric column; text columns are skipped
/// * `.csv`     – header row, every column must parse as numbers
pub fn load_numeric_columns(path: &Path) -> Result<NumericColumns> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "csv" => load_csv_columns(path),
        other => Err(Error::malformed(path, format!("unsupported file extension: .{other}"))),
    }
}

fn load_csv_columns(path: &Path) -> Result<NumericColumns> {
    let text = read_delimited(path, Delimited::csv())?;
    let columns = (0..text.headers.len())
        .map(|idx| text.numeric_column(path, idx))
        .collect::<Result<Vec<_>>>()?;
    Ok(NumericColumns {
        names: text.headers.iter().map(|h| h.trim().to_string()).collect(),
        columns,
    })
}

fn load_parquet(path: &Path) -> Result<NumericColumns> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut out = NumericColumns::default();
    let mut numeric_idx: Vec<usize> = Vec::new();

    for (batch_no, batch_result) in reader.enumerate() {
        let batch = batch_result?;
        let schema = batch.schema();

        if batch_no == 0 {
            for (i, field) in schema.fields().iter().enumerate() {
                if is_numeric(field.data_type()) {
                    numeric_idx.push(i);
                    out.names.push(field.name().clone());
                    out.columns.push(Vec::new());
                } else {
                    debug!("{}: skipping non-numeric column '{}'", path.display(), field.name());
                }
            }
        }

        for (slot, &col_idx) in numeric_idx.iter().enumerate() {
            let col = batch.column(col_idx);
            for row in 0..batch.num_rows() {
                out.columns[slot].push(extract_f64(col, row));
            }
        }
    }

    debug!("{}: {} numeric columns, {} rows", path.display(), out.names.len(), out.n_rows());
    Ok(out)
}

// -- Arrow helpers --

fn is_numeric(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int32
            | DataType::Int64
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
            | DataType::Boolean
    )
}

/// Extract a single numeric cell from an Arrow column. Nulls are `NaN`.
fn extract_f64(col: &Arc<dyn Array>, row: usize) -> f64 {
    if col.is_null(row) {
        return f64::NAN;
    }
    let any = col.as_any();
    if let Some(arr) = any.downcast_ref::<Float64Array>() {
        arr.value(row)
    } else if let Some(arr) = any.downcast_ref::<Float32Array>() {
        arr.value(row) as f64
    } else if let Some(arr) = any.downcast_ref::<Int64Array>() {
        arr.value(row) as f64
    } else if let Some(arr) = any.downcast_ref::<Int32Array>() {
        arr.value(row) as f64
    } else if let Some(arr) = any.downcast_ref::<UInt64Array>() {
        arr.value(row) as f64
    } else if let Some(arr) = any.downcast_ref::<UInt32Array>() {
        arr.value(row) as f64
    } else if let Some(arr) = any.downcast_ref::<BooleanArray>() {
        if arr.value(row) {
            1.0
        } else {
            0.0
        }
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    #[test]
    fn skips_preamble_and_matches_padded_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "preamble\nmore\nTime\tMIREX    \n0\t1.5\n1\t\n").unwrap();

        let text = read_delimited(
            &path,
            Delimited {
                delimiter: b'\t',
                skip_lines: 2,
                has_headers: true,
            },
        )
        .unwrap();
        let idx = text.require(&path, "MIREX").unwrap();
        assert_eq!(idx, 1);
        let values = text.numeric_column(&path, idx).unwrap();
        assert_eq!(values[0], 1.5);
        assert!(values[1].is_nan());
        assert!(matches!(
            text.require(&path, "Balance"),
            Err(Error::MalformedInput { .. })
        ));
    }

    #[test]
    fn undecodable_bytes_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.txt");
        std::fs::write(&path, b"a\xffb\n").unwrap();
        assert_eq!(read_text_lossy(&path).unwrap(), "ab\n");
    }

    #[test]
    fn garbled_cell_is_malformed() {
        assert_eq!(parse_cell(" 42 "), Some(42.0));
        assert!(parse_cell("").unwrap().is_nan());
        assert_eq!(parse_cell("abc"), None);
    }

    #[test]
    fn parquet_numeric_columns_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.parquet");

        let schema = Arc::new(Schema::new(vec![
            Field::new("img_id", DataType::Int64, false),
            Field::new("note", DataType::Utf8, false),
            Field::new("sum_col_val", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![0, 1])),
                Arc::new(StringArray::from(vec!["a", "b"])),
                Arc::new(Float64Array::from(vec![Some(2.5), None])),
            ],
        )
        .unwrap();
        let file = File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_numeric_columns(&path).unwrap();
        assert_eq!(table.names, vec!["img_id", "sum_col_val"]);
        assert_eq!(table.get("img_id").unwrap(), &[0.0, 1.0]);
        let vals = table.get("sum_col_val").unwrap();
        assert_eq!(vals[0], 2.5);
        assert!(vals[1].is_nan());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = load_numeric_columns(Path::new("params.h5")).unwrap_err();
        assert!(matches!(err, Error::MalformedInput { .. }));
    }
}
