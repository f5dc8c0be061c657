//! Routine metadata resolution against the SQL Server catalog
//!
//! A routine's parameter signature is read with a single parameterized query
//! over `sys.parameters`, ordered by declaration position. Schema and name
//! are always bound, never interpolated. The optional `is_output` column is
//! selected only when output-parameter comparison is active, so both
//! routines in a run are resolved with the same query template.

use std::time::Duration;

use tiberius::Query;

use crate::config::SqlClient;
use crate::error::RoutineDiffError;
use crate::types::{ParameterDescriptor, ParameterSignature, RoutineIdentifier};

/// One descriptor row per declared parameter, in declaration order.
/// Procedures report all parameters; functions report only their inputs
/// (the return value of a scalar function is an output row in
/// `sys.parameters` and is excluded).
fn parameter_query(include_output_flag: bool) -> String {
    let output_column = if include_output_flag {
        ", sp.is_output"
    } else {
        ""
    };
    format!(
        "SELECT sp.name, type_name(sp.user_type_id), sp.precision, sp.scale{} \
         FROM sys.objects so \
         INNER JOIN sys.parameters sp ON sp.object_id = so.object_id \
         INNER JOIN sys.types ty ON ty.system_type_id = sp.system_type_id \
             AND ty.user_type_id = sp.user_type_id \
         INNER JOIN sys.schemas smas ON smas.schema_id = so.schema_id \
         WHERE smas.name = @P1 AND so.name = @P2 \
             AND (so.type = 'P' OR (so.type IN ('FN', 'IF', 'TF') AND sp.is_output = 0)) \
         ORDER BY sp.parameter_id",
        output_column
    )
}

const EXISTENCE_QUERY: &str = "SELECT COUNT(*) \
     FROM sys.objects so \
     INNER JOIN sys.schemas smas ON smas.schema_id = so.schema_id \
     WHERE smas.name = @P1 AND so.name = @P2 \
         AND so.type IN ('P', 'FN', 'IF', 'TF')";

/// Resolve the ordered parameter signature of one routine.
pub async fn resolve_signature(
    client: &mut SqlClient,
    routine: &RoutineIdentifier,
    include_output_flag: bool,
    limit: Duration,
) -> Result<ParameterSignature, RoutineDiffError> {
    let sql = parameter_query(include_output_flag);
    let fetch = async {
        let mut query = Query::new(sql);
        query.bind(routine.schema.as_str());
        query.bind(routine.name.as_str());
        let stream = query.query(client).await?;
        stream.into_first_result().await
    };

    let rows = tokio::time::timeout(limit, fetch)
        .await
        .map_err(|_| RoutineDiffError::Timeout {
            phase: format!("catalog query for {}", routine),
            seconds: limit.as_secs(),
        })?
        .map_err(|source| RoutineDiffError::Catalog {
            schema: routine.schema.clone(),
            name: routine.name.clone(),
            source,
        })?;

    let mut parameters = Vec::with_capacity(rows.len());
    for row in rows {
        let malformed = |message: &str| RoutineDiffError::CatalogRow {
            schema: routine.schema.clone(),
            name: routine.name.clone(),
            message: message.to_string(),
        };

        let name = row
            .get::<&str, _>(0)
            .ok_or_else(|| malformed("parameter name is missing"))?
            .to_string();
        let engine_type = row
            .get::<&str, _>(1)
            .ok_or_else(|| malformed("engine type name is missing"))?
            .to_string();
        let precision = row
            .get::<u8, _>(2)
            .ok_or_else(|| malformed("precision is missing"))?;
        let scale = row
            .get::<u8, _>(3)
            .ok_or_else(|| malformed("scale is missing"))?;
        let is_output = if include_output_flag {
            row.get::<bool, _>(4)
                .ok_or_else(|| malformed("output flag is missing"))?
        } else {
            false
        };

        parameters.push(ParameterDescriptor {
            name,
            engine_type,
            precision,
            scale,
            is_output,
        });
    }

    Ok(ParameterSignature { parameters })
}

/// Whether a routine of any supported kind exists under the given schema
/// and name. Used to distinguish a parameterless routine from a missing one,
/// since both resolve to an empty signature.
pub async fn routine_exists(
    client: &mut SqlClient,
    routine: &RoutineIdentifier,
    limit: Duration,
) -> Result<bool, RoutineDiffError> {
    let fetch = async {
        let mut query = Query::new(EXISTENCE_QUERY);
        query.bind(routine.schema.as_str());
        query.bind(routine.name.as_str());
        let stream = query.query(client).await?;
        stream.into_row().await
    };

    let row = tokio::time::timeout(limit, fetch)
        .await
        .map_err(|_| RoutineDiffError::Timeout {
            phase: format!("existence check for {}", routine),
            seconds: limit.as_secs(),
        })?
        .map_err(|source| RoutineDiffError::Catalog {
            schema: routine.schema.clone(),
            name: routine.name.clone(),
            source,
        })?;

    Ok(row.and_then(|r| r.get::<i32, _>(0)).unwrap_or(0) > 0)
}
