//! Error types for sql-routine-diff

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while comparing two SQL routines
#[derive(Error, Debug)]
pub enum RoutineDiffError {
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    #[error("Failed to read type mapping file: {path}")]
    TypeMapRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed type mapping line {line}: expected 'engine_type{delimiter}provider_type'")]
    TypeMapFormat { line: usize, delimiter: char },

    #[error("Unknown provider type name: {name}")]
    UnknownProviderType { name: String },

    #[error("No provider type mapping for engine type: {engine_type}")]
    UnmappedEngineType { engine_type: String },

    #[error("Failed to connect to SQL Server at {host}:{port}")]
    Connection {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("SQL Server handshake failed")]
    Handshake {
        #[source]
        source: tiberius::error::Error,
    },

    #[error("Catalog query failed for routine {schema}.{name}")]
    Catalog {
        schema: String,
        name: String,
        #[source]
        source: tiberius::error::Error,
    },

    #[error("Routine {schema}.{name} does not exist")]
    RoutineNotFound { schema: String, name: String },

    #[error("Unexpected catalog row shape for routine {schema}.{name}: {message}")]
    CatalogRow {
        schema: String,
        name: String,
        message: String,
    },

    #[error("Failed to execute the input parameter query")]
    InputQuery {
        #[source]
        source: tiberius::error::Error,
    },

    #[error("Execution of {routine} failed")]
    Execution {
        routine: String,
        #[source]
        source: tiberius::error::Error,
    },

    #[error("Failed to begin the row transaction")]
    BeginTransaction {
        #[source]
        source: tiberius::error::Error,
    },

    #[error("Failed to roll back the row transaction")]
    Rollback {
        #[source]
        source: tiberius::error::Error,
    },

    #[error("{phase} timed out after {seconds}s")]
    Timeout { phase: String, seconds: u64 },
}

/// Walk an error's `source()` chain and return the message of the innermost
/// cause. Used only at the reporting boundary; internal propagation keeps the
/// full chain intact.
pub fn root_cause(err: &dyn std::error::Error) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}
