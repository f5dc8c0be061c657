//! Forward-only cursor over the user-supplied input query
//!
//! The input query is free-form text executed on the metadata connection.
//! Rows are pulled one at a time so memory stays bounded regardless of how
//! many input rows the query yields. The column-name set is captured once,
//! before iteration begins, and only the first result set is consumed.

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use tiberius::{QueryItem, QueryStream};

use crate::config::SqlClient;
use crate::error::RoutineDiffError;
use crate::value::SqlValue;

/// One row of the input cursor: the shared column-name set plus the raw
/// cell values in column order.
#[derive(Debug, Clone)]
pub struct InputRow {
    columns: Arc<Vec<String>>,
    values: Vec<SqlValue>,
}

impl InputRow {
    pub(crate) fn new(columns: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Look up a cell by column name.
    pub fn value(&self, column: &str) -> Option<&SqlValue> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.values.get(index)
    }
}

/// Lazy, finite, non-restartable sequence of input rows.
pub struct InputRowSource<'a> {
    stream: QueryStream<'a>,
    columns: Arc<Vec<String>>,
    pending: Option<InputRow>,
    done: bool,
}

impl<'a> InputRowSource<'a> {
    /// Execute the input query and capture the first result set's column
    /// names. The timeout covers query dispatch and the first response.
    pub async fn open(
        client: &'a mut SqlClient,
        query: &str,
        limit: Duration,
    ) -> Result<InputRowSource<'a>, RoutineDiffError> {
        let timed_out = |_| RoutineDiffError::Timeout {
            phase: "input parameter query".to_string(),
            seconds: limit.as_secs(),
        };
        let failed = |source| RoutineDiffError::InputQuery { source };

        let mut stream = tokio::time::timeout(limit, client.simple_query(query.to_string()))
            .await
            .map_err(timed_out)?
            .map_err(failed)?;

        let first = tokio::time::timeout(limit, stream.try_next())
            .await
            .map_err(timed_out)?
            .map_err(failed)?;

        let (columns, pending, done) = match first {
            Some(QueryItem::Metadata(meta)) => {
                let columns: Vec<String> =
                    meta.columns().iter().map(|c| c.name().to_string()).collect();
                (Arc::new(columns), None, false)
            }
            Some(QueryItem::Row(row)) => {
                // Metadata normally precedes rows; recover the column names
                // from the row itself if the stream starts with one.
                let columns: Vec<String> =
                    row.columns().iter().map(|c| c.name().to_string()).collect();
                let columns = Arc::new(columns);
                let pending = Some(row_to_input(&columns, row));
                (columns, pending, false)
            }
            None => (Arc::new(Vec::new()), None, true),
        };

        Ok(InputRowSource {
            stream,
            columns,
            pending,
            done,
        })
    }

    /// Column names of the input cursor, available before iteration.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Pull the next row, or `None` once the first result set is exhausted.
    pub async fn next_row(&mut self) -> Result<Option<InputRow>, RoutineDiffError> {
        if self.done {
            return Ok(None);
        }
        if let Some(row) = self.pending.take() {
            return Ok(Some(row));
        }

        match self
            .stream
            .try_next()
            .await
            .map_err(|source| RoutineDiffError::InputQuery { source })?
        {
            Some(QueryItem::Row(row)) => Ok(Some(row_to_input(&self.columns, row))),
            // A second metadata item marks the start of another result set;
            // the cursor only ever serves the first one.
            Some(QueryItem::Metadata(_)) | None => {
                self.done = true;
                Ok(None)
            }
        }
    }
}

fn row_to_input(columns: &Arc<Vec<String>>, row: tiberius::Row) -> InputRow {
    InputRow::new(
        Arc::clone(columns),
        row.into_iter().map(SqlValue::from_column_data).collect(),
    )
}
