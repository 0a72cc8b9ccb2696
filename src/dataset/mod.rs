//! Dataset access
//!
//! The pipeline works on a [`DatasetSnapshot`]: an immutable, versioned view
//! of the named tables plus their schema description. Snapshots are cheap to
//! clone (`Arc`s all the way down) and nothing can mutate a frame that a
//! snapshot references.

pub mod loader;
pub mod schema;

pub use schema::{ColumnKind, ColumnSchema, SchemaDescription, TableSchema};

use crate::error::{InsightError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::info;

#[derive(Debug, Clone)]
pub struct DatasetSnapshot {
    version: u64,
    primary: String,
    tables: Arc<BTreeMap<String, Arc<DataFrame>>>,
    schema: Arc<SchemaDescription>,
    taken_at: DateTime<Utc>,
}

impl DatasetSnapshot {
    pub fn new(primary: &str, tables: Vec<(String, DataFrame)>) -> Result<Self> {
        Self::with_version(0, primary, tables)
    }

    fn with_version(version: u64, primary: &str, tables: Vec<(String, DataFrame)>) -> Result<Self> {
        let tables: BTreeMap<String, Arc<DataFrame>> = tables
            .into_iter()
            .map(|(name, df)| (name, Arc::new(df)))
            .collect();
        if !tables.contains_key(primary) {
            return Err(InsightError::Dataset(format!(
                "primary table '{}' is not among the loaded tables",
                primary
            )));
        }
        let schema = SchemaDescription::describe(
            tables.iter().map(|(name, df)| (name.as_str(), df.as_ref())),
        )?;
        Ok(Self {
            version,
            primary: primary.to_string(),
            tables: Arc::new(tables),
            schema: Arc::new(schema),
            taken_at: Utc::now(),
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn primary_table(&self) -> &str {
        &self.primary
    }

    pub fn table(&self, name: &str) -> Option<Arc<DataFrame>> {
        self.tables.get(name).cloned()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn schema(&self) -> &SchemaDescription {
        &self.schema
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Overview of the loaded data for readiness reports.
    pub fn summary(&self) -> DataSummary {
        let primary = self.schema.table(&self.primary);
        DataSummary {
            version: self.version,
            primary_table: self.primary.clone(),
            tables: self
                .schema
                .tables
                .iter()
                .map(|t| TableSummary { name: t.name.clone(), row_count: t.row_count })
                .collect(),
            row_count: primary.map_or(0, |t| t.row_count),
            time_range: primary.and_then(|t| t.time_range.clone()),
            taken_at: self.taken_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub name: String,
    pub row_count: usize,
}

/// Row counts and time coverage of one snapshot. `row_count` and
/// `time_range` describe the primary table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSummary {
    pub version: u64,
    pub primary_table: String,
    pub tables: Vec<TableSummary>,
    pub row_count: usize,
    pub time_range: Option<(String, String)>,
    pub taken_at: DateTime<Utc>,
}

/// Source of dataset snapshots.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Current snapshot. A store that cannot serve data returns
    /// [`InsightError::DatasetUnavailable`].
    async fn snapshot(&self) -> Result<DatasetSnapshot>;

    async fn health_check(&self) -> bool;
}

/// Holds the current snapshot in memory. `replace` publishes a new version;
/// snapshots already handed out keep seeing the old frames.
pub struct InMemoryDatasetStore {
    current: RwLock<DatasetSnapshot>,
}

impl InMemoryDatasetStore {
    pub fn new(primary: &str, tables: Vec<(String, DataFrame)>) -> Result<Self> {
        let snapshot = DatasetSnapshot::new(primary, tables)?;
        info!(
            "Dataset loaded: primary table '{}', {} table(s)",
            snapshot.primary_table(),
            snapshot.tables.len()
        );
        Ok(Self {
            current: RwLock::new(snapshot),
        })
    }

    pub fn from_snapshot(snapshot: DatasetSnapshot) -> Self {
        Self {
            current: RwLock::new(snapshot),
        }
    }

    pub fn replace(&self, primary: &str, tables: Vec<(String, DataFrame)>) -> Result<u64> {
        let next_version = self.read()?.version + 1;
        let snapshot = DatasetSnapshot::with_version(next_version, primary, tables)?;
        let mut guard = self
            .current
            .write()
            .map_err(|_| InsightError::DatasetUnavailable("dataset lock poisoned".to_string()))?;
        *guard = snapshot;
        info!("Dataset replaced, now at version {}", next_version);
        Ok(next_version)
    }

    fn read(&self) -> Result<DatasetSnapshot> {
        self.current
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| InsightError::DatasetUnavailable("dataset lock poisoned".to_string()))
    }
}

#[async_trait]
impl DatasetStore for InMemoryDatasetStore {
    async fn snapshot(&self) -> Result<DatasetSnapshot> {
        self.read()
    }

    async fn health_check(&self) -> bool {
        self.read().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn frame(value: f64) -> DataFrame {
        df!["Year" => [2024i64], "Net_Amount_BDT" => [value]].unwrap()
    }

    #[test]
    fn test_primary_must_exist() {
        let err = DatasetSnapshot::new("missing", vec![("sales".to_string(), frame(1.0))]);
        assert!(matches!(err, Err(InsightError::Dataset(_))));
    }

    #[test]
    fn test_summary_describes_primary_table() {
        let lookup = df!["Division_Name" => ["Cement", "Steel"]].unwrap();
        let sales = df!["Year" => [2022i64, 2024, 2023], "Net_Amount_BDT" => [1.0, 2.0, 3.0]].unwrap();
        let snapshot = DatasetSnapshot::new(
            "sales",
            vec![("sales".to_string(), sales), ("divisions".to_string(), lookup)],
        )
        .unwrap();

        let summary = snapshot.summary();
        assert_eq!(summary.primary_table, "sales");
        assert_eq!(summary.row_count, 3);
        assert_eq!(summary.time_range, Some(("2022".to_string(), "2024".to_string())));
        assert_eq!(
            summary.tables,
            vec![
                TableSummary { name: "divisions".into(), row_count: 2 },
                TableSummary { name: "sales".into(), row_count: 3 },
            ]
        );
        assert_eq!(summary.taken_at, snapshot.taken_at());
    }

    #[tokio::test]
    async fn test_replace_does_not_affect_existing_snapshot() {
        let store = InMemoryDatasetStore::new("sales", vec![("sales".to_string(), frame(1.0))]).unwrap();
        let before = store.snapshot().await.unwrap();

        let version = store.replace("sales", vec![("sales".to_string(), frame(2.0))]).unwrap();
        assert_eq!(version, 1);

        let old = before.table("sales").unwrap();
        assert_eq!(old.column("Net_Amount_BDT").unwrap().f64().unwrap().get(0), Some(1.0));

        let after = store.snapshot().await.unwrap();
        assert_eq!(after.version(), 1);
        let new = after.table("sales").unwrap();
        assert_eq!(new.column("Net_Amount_BDT").unwrap().f64().unwrap().get(0), Some(2.0));
    }
}
