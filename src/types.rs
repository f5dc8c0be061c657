//! Core data model for routine comparison

use std::fmt;
use std::str::FromStr;

use crate::value::SqlValue;

/// Invocation shape of a SQL routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineKind {
    StoredProcedure,
    TableValuedFunction,
    ScalarValuedFunction,
}

impl FromStr for RoutineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "procedure" | "stored-procedure" | "proc" => Ok(RoutineKind::StoredProcedure),
            "table-valued-function" | "tvf" => Ok(RoutineKind::TableValuedFunction),
            "scalar-valued-function" | "scalar-function" | "svf" => {
                Ok(RoutineKind::ScalarValuedFunction)
            }
            other => Err(format!(
                "unknown routine kind '{}' (expected procedure, table-valued-function or scalar-valued-function)",
                other
            )),
        }
    }
}

impl fmt::Display for RoutineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutineKind::StoredProcedure => write!(f, "stored procedure"),
            RoutineKind::TableValuedFunction => write!(f, "table-valued function"),
            RoutineKind::ScalarValuedFunction => write!(f, "scalar-valued function"),
        }
    }
}

/// Schema-qualified routine name. Both routines in a comparison share one
/// [`RoutineKind`], so the kind lives on the options, not the identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineIdentifier {
    pub schema: String,
    pub name: String,
}

impl RoutineIdentifier {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RoutineIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// One declared parameter of a routine, as reported by the catalog.
///
/// The name includes the leading `@`, exactly as `sys.parameters` stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub engine_type: String,
    pub precision: u8,
    pub scale: u8,
    pub is_output: bool,
}

/// Ordered parameter list of one routine. Position is part of the equality
/// contract: two signatures match only if every descriptor matches at the
/// same index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParameterSignature {
    pub parameters: Vec<ParameterDescriptor>,
}

impl ParameterSignature {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }
}

/// One tabular result of a routine invocation.
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl ResultTable {
    pub fn with_columns(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }
}

/// Everything one routine invocation produced: result tables in arrival
/// order, plus captured output parameter values in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub tables: Vec<ResultTable>,
    pub output_values: Vec<SqlValue>,
}

/// Final classification of a comparison run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonVerdict {
    /// Every input row produced identical results from both routines
    Identical,
    /// The input query yielded no rows, so nothing was compared
    NoRowsProcessed,
    /// The routines declare different parameter signatures
    ParameterMismatch,
    /// The routines returned a different number of result tables for a row
    TableCountMismatch,
    /// The routines produced different output parameter values for a row
    OutputParameterMismatch,
    /// A pair of result tables differed for a row
    RowValueMismatch,
    /// Cancellation was requested at a row boundary
    Terminated,
    /// A fatal error aborted the run
    Error,
}

impl ComparisonVerdict {
    /// True only when the run completed and found no divergence.
    pub fn is_identical(&self) -> bool {
        matches!(self, ComparisonVerdict::Identical)
    }
}

impl fmt::Display for ComparisonVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ComparisonVerdict::Identical => "identical",
            ComparisonVerdict::NoRowsProcessed => "no rows processed",
            ComparisonVerdict::ParameterMismatch => "parameter mismatch",
            ComparisonVerdict::TableCountMismatch => "table count mismatch",
            ComparisonVerdict::OutputParameterMismatch => "output parameter mismatch",
            ComparisonVerdict::RowValueMismatch => "row value mismatch",
            ComparisonVerdict::Terminated => "terminated",
            ComparisonVerdict::Error => "error",
        };
        write!(f, "{}", label)
    }
}

/// Verdict plus diagnostic message and the number of input rows that were
/// fully processed before the run ended.
#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
    pub verdict: ComparisonVerdict,
    pub message: String,
    pub rows_processed: usize,
}

impl ComparisonOutcome {
    pub fn new(
        verdict: ComparisonVerdict,
        message: impl Into<String>,
        rows_processed: usize,
    ) -> Self {
        Self {
            verdict,
            message: message.into(),
            rows_processed,
        }
    }
}
