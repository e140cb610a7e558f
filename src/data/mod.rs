/// Data layer: core types, loading, resampling and queries.
///
/// Architecture:
/// ```text
///  .csv / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → DelimitedText / NumericColumns
///   └──────────┘
///        │
///        ▼
///   ┌──────────────────┐
///   │ store             │  ExtcoTable, LedParamsTable per channel
///   └──────────────────┘
///        │
///        ▼
///   ┌──────────┐     ┌───────────┐     ┌─────────┐
///   │  query    │ ──▶ │ resample  │ ──▶ │  shift   │  Table on experiment time
///   └──────────┘     └───────────┘     └─────────┘
/// ```

pub mod calibration;
pub mod loader;
pub mod model;
pub mod query;
pub mod resample;
pub mod shift;
pub mod store;
