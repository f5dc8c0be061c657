//! sql-routine-diff: differential testing for SQL Server routines
//!
//! Given two routines believed to be semantically equivalent (typically an
//! original and its refactor), this library invokes both with identical,
//! correctly-typed parameters for every row of a user-supplied input query
//! and asserts that their result tables (and optionally output parameters)
//! are exactly identical. Every execution happens inside a rollback-only
//! transaction, so routines with side effects leave no durable trace.

pub mod catalog;
pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod typemap;
pub mod types;
pub mod util;
pub mod value;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

pub use config::{connect, ConnectionSettings, SqlClient, Timeouts};
pub use engine::{ComparisonEngine, ProgressObserver};
pub use error::RoutineDiffError;
pub use typemap::TypeMap;
pub use types::{ComparisonOutcome, ComparisonVerdict, RoutineIdentifier, RoutineKind};

/// What to compare and how.
#[derive(Debug, Clone)]
pub struct CompareOptions {
    /// The first routine (executed first for every row)
    pub first: RoutineIdentifier,
    /// The second routine
    pub second: RoutineIdentifier,
    /// Invocation shape shared by both routines
    pub kind: RoutineKind,
    /// Free-form query whose columns (named like the parameters, including
    /// the `@`) supply the input parameter values, one comparison per row
    pub input_query: String,
    /// Also compare output parameter values (stored procedures only)
    pub compare_output_parameters: bool,
    /// Per-phase timeouts
    pub timeouts: Timeouts,
}

/// Run a full comparison: open the two connections, resolve signatures,
/// stream the input rows and return the final verdict.
///
/// Configuration and connection failures surface as `Err` before the engine
/// starts; everything after that is folded into the returned outcome, with
/// errors reported as the [`ComparisonVerdict::Error`] verdict.
pub async fn run_comparison(
    settings: &ConnectionSettings,
    type_map: &TypeMap,
    options: &CompareOptions,
    cancellation: &CancellationToken,
    progress: Option<ProgressObserver<'_>>,
) -> Result<ComparisonOutcome> {
    options.timeouts.validate()?;

    let mut metadata_client = connect(settings).await?;
    let mut execution_client = connect(settings).await?;

    let engine = ComparisonEngine::new(type_map, options);
    let outcome = engine
        .run(
            &mut metadata_client,
            &mut execution_client,
            cancellation,
            progress,
        )
        .await;

    Ok(outcome)
}
