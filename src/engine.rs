//! The comparison engine
//!
//! Orchestrates a full differential run: resolve and compare the two
//! routines' parameter signatures, then stream the input rows and, for each
//! one, bind identical parameters, execute both routines inside a
//! rollback-only transaction on the execution connection, and compare the
//! outputs. The first divergence ends the run.
//!
//! Ordering guarantees: the first routine always executes and is fully
//! consumed before the second starts; rows are processed strictly in cursor
//! order; cancellation is observed only at row boundaries, never while a
//! pair of executions is in flight.

use std::time::Duration;

use futures::TryStreamExt;
use tiberius::{ColumnData, IntoSql, Query, QueryItem};
use tokio_util::sync::CancellationToken;

use crate::catalog;
use crate::compare::tables_equal;
use crate::config::SqlClient;
use crate::error::{root_cause, RoutineDiffError};
use crate::input::{InputRow, InputRowSource};
use crate::typemap::{SqlParamType, TypeMap};
use crate::types::{
    ComparisonOutcome, ComparisonVerdict, ExecutionResult, ParameterSignature, ResultTable,
    RoutineIdentifier, RoutineKind,
};
use crate::util::bracket_qualified;
use crate::value::SqlValue;
use crate::CompareOptions;

/// Caller-supplied observer invoked with the running row count after each
/// fully processed row.
pub type ProgressObserver<'a> = &'a mut (dyn FnMut(usize) + Send);

/// One parameter ready for binding. Each routine gets its own binding
/// object: an execution may write into its parameters (output values), so
/// sharing one object between both calls would corrupt the second.
#[derive(Debug, Clone)]
pub struct ParameterBinding {
    pub name: String,
    pub param_type: SqlParamType,
    pub precision: u8,
    pub scale: u8,
    pub value: SqlValue,
    pub is_output: bool,
}

impl<'a> IntoSql<'a> for &'a ParameterBinding {
    fn into_sql(self) -> ColumnData<'a> {
        self.value.as_column_data().clone()
    }
}

/// Build two independent binding lists from one input row. A descriptor
/// participates only if its name appears among the cursor's columns; the
/// provider type comes from the type map and an unmapped engine type aborts
/// the run.
pub fn build_bindings(
    signature: &ParameterSignature,
    columns: &[String],
    row: &InputRow,
    type_map: &TypeMap,
    outputs_active: bool,
) -> Result<(Vec<ParameterBinding>, Vec<ParameterBinding>), RoutineDiffError> {
    let mut first = Vec::new();
    let mut second = Vec::new();

    for descriptor in &signature.parameters {
        if !columns.iter().any(|c| c == &descriptor.name) {
            continue;
        }
        let value = row
            .value(&descriptor.name)
            .cloned()
            .unwrap_or_else(SqlValue::null);
        let param_type = type_map.resolve(&descriptor.engine_type)?;
        let is_output = outputs_active && descriptor.is_output;

        first.push(ParameterBinding {
            name: descriptor.name.clone(),
            param_type,
            precision: descriptor.precision,
            scale: descriptor.scale,
            value: value.clone(),
            is_output,
        });
        second.push(ParameterBinding {
            name: descriptor.name.clone(),
            param_type,
            precision: descriptor.precision,
            scale: descriptor.scale,
            value,
            is_output,
        });
    }

    Ok((first, second))
}

/// Render the invocation batch for one routine.
///
/// Stored procedures are called by name with named arguments. Output
/// parameters have no direct surface in the TDS query path, so the batch
/// declares a local variable per output parameter, passes it with `OUTPUT`,
/// and appends a trailing `SELECT` of those variables in declaration order;
/// the engine strips that trailing result set off again after execution.
/// Functions are embedded in parameterized `SELECT` expressions.
pub fn build_invocation_sql(
    kind: RoutineKind,
    routine: &RoutineIdentifier,
    bindings: &[ParameterBinding],
) -> String {
    let qualified = bracket_qualified(&routine.schema, &routine.name);

    match kind {
        RoutineKind::StoredProcedure => {
            let mut declarations = String::new();
            let mut arguments = Vec::with_capacity(bindings.len());
            let mut output_names = Vec::new();
            let mut placeholder = 0;

            for binding in bindings {
                if binding.is_output {
                    declarations.push_str(&format!(
                        "DECLARE {} {}; ",
                        binding.name,
                        binding.param_type.declared_type(binding.precision, binding.scale)
                    ));
                    arguments.push(format!("{} = {} OUTPUT", binding.name, binding.name));
                    output_names.push(binding.name.clone());
                } else {
                    placeholder += 1;
                    arguments.push(format!("{} = @P{}", binding.name, placeholder));
                }
            }

            let mut sql = format!("{}EXEC {}", declarations, qualified);
            if !arguments.is_empty() {
                sql.push(' ');
                sql.push_str(&arguments.join(", "));
            }
            if !output_names.is_empty() {
                sql.push_str("; SELECT ");
                let selects: Vec<String> = output_names
                    .iter()
                    .map(|name| format!("{} AS [{}]", name, name))
                    .collect();
                sql.push_str(&selects.join(", "));
            }
            sql
        }
        RoutineKind::TableValuedFunction => {
            format!("SELECT * FROM {}({})", qualified, placeholders(bindings.len()))
        }
        RoutineKind::ScalarValuedFunction => {
            format!("SELECT {}({})", qualified, placeholders(bindings.len()))
        }
    }
}

fn count_label(count: usize) -> String {
    match count {
        1 => "1 parameter".to_string(),
        n => format!("{} parameters", n),
    }
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|n| format!("@P{}", n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format bound parameters for a divergence diagnostic, one per line.
pub fn format_bindings(bindings: &[ParameterBinding]) -> String {
    let mut formatted = String::new();
    for binding in bindings {
        if binding.is_output {
            formatted.push_str(&format!("\n{} = (output)", binding.name));
        } else {
            formatted.push_str(&format!("\n{} = {}", binding.name, binding.value));
        }
    }
    formatted
}

enum RowOutcome {
    Match,
    Divergence {
        verdict: ComparisonVerdict,
        message: String,
    },
}

/// Orchestrates one comparison run. Holds no connection state of its own;
/// the two clients are supplied per run and nothing outlives it.
pub struct ComparisonEngine<'a> {
    type_map: &'a TypeMap,
    options: &'a CompareOptions,
}

impl<'a> ComparisonEngine<'a> {
    pub fn new(type_map: &'a TypeMap, options: &'a CompareOptions) -> Self {
        Self { type_map, options }
    }

    fn outputs_active(&self) -> bool {
        self.options.compare_output_parameters
            && self.options.kind == RoutineKind::StoredProcedure
    }

    /// Run the comparison to a final verdict. Engine-phase errors are
    /// flattened to their root cause here, at the reporting boundary; the
    /// source chain stays intact everywhere below.
    pub async fn run(
        &self,
        metadata_client: &mut SqlClient,
        execution_client: &mut SqlClient,
        cancellation: &CancellationToken,
        mut progress: Option<ProgressObserver<'_>>,
    ) -> ComparisonOutcome {
        let mut rows_processed = 0;
        let result = self
            .run_inner(
                metadata_client,
                execution_client,
                cancellation,
                &mut progress,
                &mut rows_processed,
            )
            .await;

        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                ComparisonOutcome::new(ComparisonVerdict::Error, root_cause(&err), rows_processed)
            }
        }
    }

    async fn run_inner(
        &self,
        metadata_client: &mut SqlClient,
        execution_client: &mut SqlClient,
        cancellation: &CancellationToken,
        progress: &mut Option<ProgressObserver<'_>>,
        rows_processed: &mut usize,
    ) -> Result<ComparisonOutcome, RoutineDiffError> {
        let options = self.options;
        let outputs_active = self.outputs_active();
        let metadata_limit = options.timeouts.metadata;

        let first_signature = catalog::resolve_signature(
            metadata_client,
            &options.first,
            outputs_active,
            metadata_limit,
        )
        .await?;
        let second_signature = catalog::resolve_signature(
            metadata_client,
            &options.second,
            outputs_active,
            metadata_limit,
        )
        .await?;

        // An empty signature is ambiguous: a parameterless routine and a
        // missing one both resolve to zero descriptors. Probe existence so a
        // missing routine fails here rather than at execution time.
        for (routine, signature) in [
            (&options.first, &first_signature),
            (&options.second, &second_signature),
        ] {
            if signature.is_empty()
                && !catalog::routine_exists(metadata_client, routine, metadata_limit).await?
            {
                return Err(RoutineDiffError::RoutineNotFound {
                    schema: routine.schema.clone(),
                    name: routine.name.clone(),
                });
            }
        }

        if first_signature != second_signature {
            return Ok(ComparisonOutcome::new(
                ComparisonVerdict::ParameterMismatch,
                format!(
                    "failed to proceed: the two SQL routines have different parameters \
                     ({} declares {}, {} declares {})",
                    options.first,
                    count_label(first_signature.len()),
                    options.second,
                    count_label(second_signature.len())
                ),
                0,
            ));
        }
        let signature = first_signature;

        let mut source =
            InputRowSource::open(metadata_client, &options.input_query, metadata_limit).await?;
        let columns = source.columns().to_vec();

        loop {
            if cancellation.is_cancelled() {
                return Ok(ComparisonOutcome::new(
                    ComparisonVerdict::Terminated,
                    "terminated by user",
                    *rows_processed,
                ));
            }

            let Some(row) = source.next_row().await? else {
                break;
            };

            let outcome = self
                .process_row(execution_client, &signature, &columns, &row, outputs_active)
                .await?;
            *rows_processed += 1;
            // The diverging row was still fully processed, so the observer
            // sees it too.
            if let Some(observer) = progress.as_mut() {
                observer(*rows_processed);
            }

            match outcome {
                RowOutcome::Match => {
                    log::debug!("row {} matched", rows_processed);
                }
                RowOutcome::Divergence { verdict, message } => {
                    return Ok(ComparisonOutcome::new(verdict, message, *rows_processed));
                }
            }
        }

        if *rows_processed == 0 {
            return Ok(ComparisonOutcome::new(
                ComparisonVerdict::NoRowsProcessed,
                "unable to perform any comparison based on the given inputs",
                0,
            ));
        }

        Ok(ComparisonOutcome::new(
            ComparisonVerdict::Identical,
            "the two SQL routines generate the same results based on the given inputs",
            *rows_processed,
        ))
    }

    /// Execute both routines for one input row inside a rollback-only
    /// transaction and compare their outputs. The transaction is rolled back
    /// on every exit path before the row's outcome is reported, and a
    /// rollback failure never masks an execution failure.
    async fn process_row(
        &self,
        execution_client: &mut SqlClient,
        signature: &ParameterSignature,
        columns: &[String],
        row: &InputRow,
        outputs_active: bool,
    ) -> Result<RowOutcome, RoutineDiffError> {
        let (first_bindings, second_bindings) =
            build_bindings(signature, columns, row, self.type_map, outputs_active)?;

        execution_client
            .execute("BEGIN TRANSACTION", &[])
            .await
            .map_err(|source| RoutineDiffError::BeginTransaction { source })?;

        let executed = self
            .execute_pair(execution_client, &first_bindings, &second_bindings)
            .await;

        let rollback = execution_client
            .execute("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION", &[])
            .await;

        let (first_result, second_result) = match executed {
            Ok(pair) => pair,
            Err(err) => {
                if let Err(rollback_err) = rollback {
                    log::warn!(
                        "rollback failed after execution error: {}",
                        rollback_err
                    );
                }
                return Err(err);
            }
        };
        rollback.map_err(|source| RoutineDiffError::Rollback { source })?;

        let bound_parameters = format_bindings(&first_bindings);

        if first_result.tables.len() != second_result.tables.len() {
            return Ok(RowOutcome::Divergence {
                verdict: ComparisonVerdict::TableCountMismatch,
                message: format!(
                    "the two SQL routines returned a different number of result tables \
                     ({} vs {}) with the following input parameters:{}",
                    first_result.tables.len(),
                    second_result.tables.len(),
                    bound_parameters
                ),
            });
        }

        if outputs_active && first_result.output_values != second_result.output_values {
            return Ok(RowOutcome::Divergence {
                verdict: ComparisonVerdict::OutputParameterMismatch,
                message: format!(
                    "the two SQL routines generate different output parameter values \
                     with the following input parameters:{}",
                    bound_parameters
                ),
            });
        }

        for (first_table, second_table) in
            first_result.tables.iter().zip(second_result.tables.iter())
        {
            if !tables_equal(Some(first_table), Some(second_table)) {
                return Ok(RowOutcome::Divergence {
                    verdict: ComparisonVerdict::RowValueMismatch,
                    message: format!(
                        "the two SQL routines generate different results \
                         with the following input parameters:{}",
                        bound_parameters
                    ),
                });
            }
        }

        Ok(RowOutcome::Match)
    }

    /// Execute routine A, then routine B, strictly in that order on the same
    /// transaction.
    async fn execute_pair(
        &self,
        execution_client: &mut SqlClient,
        first_bindings: &[ParameterBinding],
        second_bindings: &[ParameterBinding],
    ) -> Result<(ExecutionResult, ExecutionResult), RoutineDiffError> {
        let options = self.options;

        let first = execute_routine(
            execution_client,
            options.kind,
            &options.first,
            first_bindings,
            options.timeouts.first_routine,
        )
        .await?;

        let second = execute_routine(
            execution_client,
            options.kind,
            &options.second,
            second_bindings,
            options.timeouts.second_routine,
        )
        .await?;

        Ok((first, second))
    }
}

/// Execute one routine invocation and collect every result table it
/// produced. When output parameters were declared, the trailing result set
/// carries their values and is split off into `output_values`.
async fn execute_routine(
    client: &mut SqlClient,
    kind: RoutineKind,
    routine: &RoutineIdentifier,
    bindings: &[ParameterBinding],
    limit: Duration,
) -> Result<ExecutionResult, RoutineDiffError> {
    let sql = build_invocation_sql(kind, routine, bindings);
    let capture_outputs = bindings.iter().any(|b| b.is_output);

    let mut query = Query::new(sql);
    for binding in bindings.iter().filter(|b| !b.is_output) {
        query.bind(binding);
    }

    let work = async {
        let mut stream = query.query(client).await?;
        let mut tables: Vec<ResultTable> = Vec::new();
        while let Some(item) = stream.try_next().await? {
            match item {
                QueryItem::Metadata(meta) => {
                    let columns = meta.columns().iter().map(|c| c.name().to_string()).collect();
                    tables.push(ResultTable::with_columns(columns));
                }
                QueryItem::Row(row) => {
                    let values = row.into_iter().map(SqlValue::from_column_data).collect();
                    if let Some(table) = tables.last_mut() {
                        table.rows.push(values);
                    }
                }
            }
        }
        Ok::<_, tiberius::error::Error>(tables)
    };

    let mut tables = tokio::time::timeout(limit, work)
        .await
        .map_err(|_| RoutineDiffError::Timeout {
            phase: format!("execution of {}", routine),
            seconds: limit.as_secs(),
        })?
        .map_err(|source| RoutineDiffError::Execution {
            routine: routine.to_string(),
            source,
        })?;

    let output_values = if capture_outputs {
        let output_table = tables.pop().unwrap_or_default();
        output_table.rows.into_iter().next().unwrap_or_default()
    } else {
        Vec::new()
    };

    Ok(ExecutionResult {
        tables,
        output_values,
    })
}
