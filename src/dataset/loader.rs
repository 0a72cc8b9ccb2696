//! File loaders for the in-memory store.

use crate::error::{InsightError, Result};
use polars::prelude::*;
use std::path::Path;
use tracing::info;

/// Load a CSV or Parquet file into a frame, keyed by the file stem.
pub fn load_table(path: &Path) -> Result<(String, DataFrame)> {
    if !path.exists() {
        return Err(InsightError::Dataset(format!(
            "Table file not found: {}",
            path.display()
        )));
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .ok_or_else(|| InsightError::Dataset(format!("Bad table path: {}", path.display())))?;

    let df = match path.extension().and_then(|s| s.to_str()) {
        Some("csv") => LazyCsvReader::new(path)
            .with_has_header(true)
            .with_try_parse_dates(true)
            .with_infer_schema_length(Some(1000))
            .finish()
            .map_err(|e| InsightError::Dataset(format!("Failed to scan CSV {}: {}", name, e)))?
            .collect()
            .map_err(|e| InsightError::Dataset(format!("Failed to collect CSV {}: {}", name, e)))?,
        Some("parquet") => LazyFrame::scan_parquet(path, ScanArgsParquet::default())
            .map_err(|e| InsightError::Dataset(format!("Failed to scan {}: {}", name, e)))?
            .collect()
            .map_err(|e| InsightError::Dataset(format!("Failed to collect {}: {}", name, e)))?,
        other => {
            return Err(InsightError::Dataset(format!(
                "Unsupported table format {:?} for {}",
                other,
                path.display()
            )))
        }
    };

    info!("Loaded table '{}': {} rows x {} columns", name, df.height(), df.width());
    Ok((name, df))
}
