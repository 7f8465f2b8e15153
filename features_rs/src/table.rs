use chrono::NaiveDate;
use gainsmith_rs::{FeatureError, FeatureResult};
use polars::prelude::*;

use crate::schema::{DATE_COLUMN, is_target_column};

/// Column-major feature table aligned 1:1 with the input price series.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    timestamps: Vec<NaiveDate>,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

/// One row of a [`FeatureTable`], borrowed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow<'a> {
    pub timestamp: NaiveDate,
    pub values: Vec<(&'a str, f64)>,
}

impl FeatureRow<'_> {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(column, _)| *column == name)
            .map(|(_, value)| *value)
    }
}

impl FeatureTable {
    pub fn new(
        timestamps: Vec<NaiveDate>,
        names: Vec<String>,
        columns: Vec<Vec<f64>>,
    ) -> FeatureResult<Self> {
        let expected = timestamps.len();
        if names.len() != columns.len() {
            return Err(FeatureError::LengthMismatch {
                column: "<names>".to_string(),
                len: names.len(),
                expected: columns.len(),
            });
        }
        for (name, column) in names.iter().zip(&columns) {
            if column.len() != expected {
                return Err(FeatureError::LengthMismatch {
                    column: name.clone(),
                    len: column.len(),
                    expected,
                });
            }
        }
        Ok(Self {
            timestamps,
            names,
            columns,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Number of columns, targets included.
    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn timestamps(&self) -> &[NaiveDate] {
        &self.timestamps
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|column| column == name)
            .map(|idx| self.columns[idx].as_slice())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> + '_ {
        self.names
            .iter()
            .zip(&self.columns)
            .map(|(name, column)| (name.as_str(), column.as_slice()))
    }

    pub fn has_targets(&self) -> bool {
        self.names.iter().any(|name| is_target_column(name))
    }

    pub fn row(&self, index: usize) -> Option<FeatureRow<'_>> {
        let timestamp = *self.timestamps.get(index)?;
        let values = self
            .names
            .iter()
            .zip(&self.columns)
            .map(|(name, column)| (name.as_str(), column[index]))
            .collect();
        Some(FeatureRow { timestamp, values })
    }

    /// The newest row, the one a live prediction is made from.
    pub fn last_row(&self) -> Option<FeatureRow<'_>> {
        self.len().checked_sub(1).and_then(|idx| self.row(idx))
    }

    /// Rows `start..` as a new table.
    pub fn slice_from(&self, start: usize) -> Self {
        let start = start.min(self.len());
        Self {
            timestamps: self.timestamps[start..].to_vec(),
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c[start..].to_vec()).collect(),
        }
    }

    /// Keep only rows where every column is finite.
    ///
    /// Warm-up rows and, in training mode, the tail rows without a future
    /// bar are removed.
    pub fn drop_undefined_rows(&self) -> Self {
        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| self.columns.iter().all(|column| column[i].is_finite()))
            .collect();
        Self {
            timestamps: keep.iter().map(|&i| self.timestamps[i]).collect(),
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|column| keep.iter().map(|&i| column[i]).collect())
                .collect(),
        }
    }

    pub fn to_frame(&self) -> FeatureResult<DataFrame> {
        let mut series = Vec::with_capacity(self.width() + 1);
        series.push(
            DateChunked::from_naive_date(DATE_COLUMN, self.timestamps.iter().copied())
                .into_series(),
        );
        for (name, column) in self.columns() {
            series.push(Series::new(name, column));
        }
        Ok(DataFrame::new(series)?)
    }
}
