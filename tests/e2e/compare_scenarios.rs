//! Differential comparison scenarios against a live SQL Server
//!
//! Each test provisions its own scratch database, creates the two routines
//! under test and runs a full comparison through the public API.
//!
//! Prerequisites:
//! - SQL Server running (configured via .env or environment variables)
//!
//! Environment variables (with defaults):
//! - SQL_SERVER_HOST (default: localhost)
//! - SQL_SERVER_PORT (default: 1433)
//! - SQL_SERVER_USER (default: sa)
//! - SQL_SERVER_PASSWORD
//!
//! Run with: cargo test --test e2e_tests -- --ignored

use tokio_util::sync::CancellationToken;

use sql_routine_diff::{
    connect, run_comparison, CompareOptions, ComparisonOutcome, ComparisonVerdict,
    ConnectionSettings, RoutineIdentifier, RoutineKind, SqlClient, Timeouts, TypeMap,
};

/// Load environment variables from .env file (if present)
fn load_env() {
    let _ = dotenvy::dotenv();
}

fn server_settings(database: Option<&str>) -> ConnectionSettings {
    load_env();
    let mut settings = ConnectionSettings::from_env();
    settings.database = database.map(|d| d.to_string());
    settings.ado_string = None;
    settings
}

async fn connect_to(database: Option<&str>) -> SqlClient {
    connect(&server_settings(database))
        .await
        .expect("Failed to connect to SQL Server")
}

async fn exec(client: &mut SqlClient, sql: &str) {
    client
        .execute(sql, &[])
        .await
        .unwrap_or_else(|e| panic!("Failed to execute batch:\n{}\n{}", sql, e));
}

async fn recreate_database(name: &str) {
    let mut master = connect_to(None).await;
    exec(
        &mut master,
        &format!(
            "IF EXISTS (SELECT 1 FROM sys.databases WHERE name = '{n}') \
             BEGIN \
                 ALTER DATABASE [{n}] SET SINGLE_USER WITH ROLLBACK IMMEDIATE; \
                 DROP DATABASE [{n}]; \
             END",
            n = name
        ),
    )
    .await;
    exec(&mut master, &format!("CREATE DATABASE [{}]", name)).await;
}

async fn drop_database(name: &str) {
    let mut master = connect_to(None).await;
    exec(
        &mut master,
        &format!(
            "IF EXISTS (SELECT 1 FROM sys.databases WHERE name = '{n}') \
             BEGIN \
                 ALTER DATABASE [{n}] SET SINGLE_USER WITH ROLLBACK IMMEDIATE; \
                 DROP DATABASE [{n}]; \
             END",
            n = name
        ),
    )
    .await;
}

fn options(first: &str, second: &str, kind: RoutineKind, input_query: &str) -> CompareOptions {
    CompareOptions {
        first: RoutineIdentifier::new("dbo", first),
        second: RoutineIdentifier::new("dbo", second),
        kind,
        input_query: input_query.to_string(),
        compare_output_parameters: false,
        timeouts: Timeouts::from_secs(30, 60, 60),
    }
}

async fn run(database: &str, options: &CompareOptions) -> ComparisonOutcome {
    run_comparison(
        &server_settings(Some(database)),
        &TypeMap::builtin(),
        options,
        &CancellationToken::new(),
        None,
    )
    .await
    .expect("Comparison should reach a verdict")
}

const THREE_ROWS: &str = "SELECT v AS [@x] FROM (VALUES (1), (2), (3)) AS t(v)";

#[tokio::test]
#[ignore]
async fn test_e2e_identical_procedures_over_three_rows() {
    let db = "RoutineDiffE2E_Identical";
    recreate_database(db).await;
    {
        let mut client = connect_to(Some(db)).await;
        exec(
            &mut client,
            "CREATE PROCEDURE dbo.AddOneA @x INT AS SELECT @x + 1 AS result",
        )
        .await;
        exec(
            &mut client,
            "CREATE PROCEDURE dbo.AddOneB @x INT AS SELECT @x + 1 AS result",
        )
        .await;

        let outcome = run(
            db,
            &options("AddOneA", "AddOneB", RoutineKind::StoredProcedure, THREE_ROWS),
        )
        .await;
        assert_eq!(outcome.verdict, ComparisonVerdict::Identical, "{}", outcome.message);
        assert_eq!(outcome.rows_processed, 3);
    }
    drop_database(db).await;
}

#[tokio::test]
#[ignore]
async fn test_e2e_parameter_type_mismatch_executes_no_rows() {
    let db = "RoutineDiffE2E_ParamMismatch";
    recreate_database(db).await;
    {
        let mut client = connect_to(Some(db)).await;
        exec(
            &mut client,
            "CREATE PROCEDURE dbo.IntProc @x INT AS SELECT @x AS v",
        )
        .await;
        exec(
            &mut client,
            "CREATE PROCEDURE dbo.BigIntProc @x BIGINT AS SELECT @x AS v",
        )
        .await;

        let outcome = run(
            db,
            &options("IntProc", "BigIntProc", RoutineKind::StoredProcedure, THREE_ROWS),
        )
        .await;
        assert_eq!(outcome.verdict, ComparisonVerdict::ParameterMismatch);
        assert_eq!(outcome.rows_processed, 0);
        assert!(
            outcome.message.contains("dbo.IntProc declares 1 parameter")
                && outcome.message.contains("dbo.BigIntProc declares 1 parameter"),
            "diagnostic should name both routines and their parameter counts: {}",
            outcome.message
        );
    }
    drop_database(db).await;
}

#[tokio::test]
#[ignore]
async fn test_e2e_empty_input_yields_no_rows_processed() {
    let db = "RoutineDiffE2E_EmptyInput";
    recreate_database(db).await;
    {
        let mut client = connect_to(Some(db)).await;
        exec(
            &mut client,
            "CREATE PROCEDURE dbo.Echo @x INT AS SELECT @x AS v",
        )
        .await;

        let outcome = run(
            db,
            &options(
                "Echo",
                "Echo",
                RoutineKind::StoredProcedure,
                "SELECT v AS [@x] FROM (VALUES (1)) AS t(v) WHERE 1 = 0",
            ),
        )
        .await;
        assert_eq!(outcome.verdict, ComparisonVerdict::NoRowsProcessed);
        assert_eq!(outcome.rows_processed, 0);
    }
    drop_database(db).await;
}

#[tokio::test]
#[ignore]
async fn test_e2e_table_count_mismatch_aborts_after_first_row() {
    let db = "RoutineDiffE2E_TableCount";
    recreate_database(db).await;
    {
        let mut client = connect_to(Some(db)).await;
        exec(
            &mut client,
            "CREATE PROCEDURE dbo.TwoTables @x INT AS BEGIN SELECT @x AS v; SELECT @x AS w; END",
        )
        .await;
        exec(
            &mut client,
            "CREATE PROCEDURE dbo.OneTable @x INT AS SELECT @x AS v",
        )
        .await;

        let mut seen = Vec::new();
        let mut observer = |rows: usize| seen.push(rows);

        let outcome = run_comparison(
            &server_settings(Some(db)),
            &TypeMap::builtin(),
            &options("TwoTables", "OneTable", RoutineKind::StoredProcedure, THREE_ROWS),
            &CancellationToken::new(),
            Some(&mut observer),
        )
        .await
        .expect("Comparison should reach a verdict");

        assert_eq!(outcome.verdict, ComparisonVerdict::TableCountMismatch);
        assert_eq!(outcome.rows_processed, 1);
        assert!(
            outcome.message.contains("@x = 1"),
            "diagnostic should list the triggering input values: {}",
            outcome.message
        );
        assert_eq!(seen, vec![1], "the diverging row counts as processed");
    }
    drop_database(db).await;
}

#[tokio::test]
#[ignore]
async fn test_e2e_output_parameter_mismatch() {
    let db = "RoutineDiffE2E_OutputParams";
    recreate_database(db).await;
    {
        let mut client = connect_to(Some(db)).await;
        exec(
            &mut client,
            "CREATE PROCEDURE dbo.SetsFive @x INT, @out INT OUTPUT AS SET @out = 5",
        )
        .await;
        exec(
            &mut client,
            "CREATE PROCEDURE dbo.SetsSix @x INT, @out INT OUTPUT AS SET @out = 6",
        )
        .await;

        let mut options = options(
            "SetsFive",
            "SetsSix",
            RoutineKind::StoredProcedure,
            "SELECT 1 AS [@x], CAST(NULL AS INT) AS [@out]",
        );
        options.compare_output_parameters = true;

        let outcome = run(db, &options).await;
        assert_eq!(outcome.verdict, ComparisonVerdict::OutputParameterMismatch);
        assert!(
            outcome.message.contains("@x = 1"),
            "diagnostic should list the bound input values: {}",
            outcome.message
        );
    }
    drop_database(db).await;
}

#[tokio::test]
#[ignore]
async fn test_e2e_rollback_leaves_no_durable_writes() {
    let db = "RoutineDiffE2E_Rollback";
    recreate_database(db).await;
    {
        let mut client = connect_to(Some(db)).await;
        exec(&mut client, "CREATE TABLE dbo.AuditLog (v INT NOT NULL)").await;
        exec(
            &mut client,
            "CREATE PROCEDURE dbo.WriteA @x INT AS \
             BEGIN INSERT INTO dbo.AuditLog (v) VALUES (@x); SELECT 1 AS ok; END",
        )
        .await;
        exec(
            &mut client,
            "CREATE PROCEDURE dbo.WriteB @x INT AS \
             BEGIN INSERT INTO dbo.AuditLog (v) VALUES (@x); SELECT 1 AS ok; END",
        )
        .await;

        let outcome = run(
            db,
            &options("WriteA", "WriteB", RoutineKind::StoredProcedure, THREE_ROWS),
        )
        .await;
        assert_eq!(outcome.verdict, ComparisonVerdict::Identical, "{}", outcome.message);

        let row = client
            .simple_query("SELECT COUNT(*) FROM dbo.AuditLog")
            .await
            .expect("count query")
            .into_row()
            .await
            .expect("count row");
        let count = row.and_then(|r| r.get::<i32, _>(0)).unwrap_or(-1);
        assert_eq!(count, 0, "every row transaction must be rolled back");
    }
    drop_database(db).await;
}

#[tokio::test]
#[ignore]
async fn test_e2e_cancellation_before_first_row() {
    let db = "RoutineDiffE2E_Cancelled";
    recreate_database(db).await;
    {
        let mut client = connect_to(Some(db)).await;
        exec(
            &mut client,
            "CREATE PROCEDURE dbo.Echo @x INT AS SELECT @x AS v",
        )
        .await;

        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let outcome = run_comparison(
            &server_settings(Some(db)),
            &TypeMap::builtin(),
            &options("Echo", "Echo", RoutineKind::StoredProcedure, THREE_ROWS),
            &cancellation,
            None,
        )
        .await
        .expect("Comparison should reach a verdict");

        assert_eq!(outcome.verdict, ComparisonVerdict::Terminated);
        assert_eq!(outcome.rows_processed, 0);
    }
    drop_database(db).await;
}

#[tokio::test]
#[ignore]
async fn test_e2e_cancellation_between_rows_keeps_completed_count() {
    let db = "RoutineDiffE2E_CancelMidRun";
    recreate_database(db).await;
    {
        let mut client = connect_to(Some(db)).await;
        exec(
            &mut client,
            "CREATE PROCEDURE dbo.Echo @x INT AS SELECT @x AS v",
        )
        .await;

        let cancellation = CancellationToken::new();
        let trigger = cancellation.clone();
        let mut observer = move |rows: usize| {
            if rows == 1 {
                trigger.cancel();
            }
        };

        let outcome = run_comparison(
            &server_settings(Some(db)),
            &TypeMap::builtin(),
            &options("Echo", "Echo", RoutineKind::StoredProcedure, THREE_ROWS),
            &cancellation,
            Some(&mut observer),
        )
        .await
        .expect("Comparison should reach a verdict");

        assert_eq!(outcome.verdict, ComparisonVerdict::Terminated);
        assert_eq!(
            outcome.rows_processed, 1,
            "only the row completed before cancellation counts"
        );
    }
    drop_database(db).await;
}

#[tokio::test]
#[ignore]
async fn test_e2e_missing_routine_is_reported_at_resolution_time() {
    let db = "RoutineDiffE2E_Missing";
    recreate_database(db).await;
    {
        let outcome = run(
            db,
            &options(
                "DoesNotExistA",
                "DoesNotExistB",
                RoutineKind::StoredProcedure,
                THREE_ROWS,
            ),
        )
        .await;
        assert_eq!(outcome.verdict, ComparisonVerdict::Error);
        assert_eq!(outcome.rows_processed, 0);
        assert!(
            outcome.message.contains("does not exist"),
            "unexpected message: {}",
            outcome.message
        );
    }
    drop_database(db).await;
}

#[tokio::test]
#[ignore]
async fn test_e2e_scalar_functions_identical() {
    let db = "RoutineDiffE2E_Scalar";
    recreate_database(db).await;
    {
        let mut client = connect_to(Some(db)).await;
        exec(
            &mut client,
            "CREATE FUNCTION dbo.FnAddA (@x INT) RETURNS INT AS BEGIN RETURN @x + 1 END",
        )
        .await;
        exec(
            &mut client,
            "CREATE FUNCTION dbo.FnAddB (@x INT) RETURNS INT AS BEGIN RETURN (@x * 1) + 1 END",
        )
        .await;

        let outcome = run(
            db,
            &options("FnAddA", "FnAddB", RoutineKind::ScalarValuedFunction, THREE_ROWS),
        )
        .await;
        assert_eq!(outcome.verdict, ComparisonVerdict::Identical, "{}", outcome.message);
        assert_eq!(outcome.rows_processed, 3);
    }
    drop_database(db).await;
}

#[tokio::test]
#[ignore]
async fn test_e2e_table_valued_functions_identical() {
    let db = "RoutineDiffE2E_Tvf";
    recreate_database(db).await;
    {
        let mut client = connect_to(Some(db)).await;
        exec(
            &mut client,
            "CREATE FUNCTION dbo.RangeA (@n INT) RETURNS TABLE AS RETURN \
             (SELECT v FROM (VALUES (1), (2), (3)) AS t(v) WHERE v <= @n)",
        )
        .await;
        exec(
            &mut client,
            "CREATE FUNCTION dbo.RangeB (@n INT) RETURNS TABLE AS RETURN \
             (SELECT v FROM (VALUES (1), (2), (3)) AS t(v) WHERE v < @n + 1)",
        )
        .await;

        let outcome = run(
            db,
            &options("RangeA", "RangeB", RoutineKind::TableValuedFunction, THREE_ROWS),
        )
        .await;
        assert_eq!(outcome.verdict, ComparisonVerdict::Identical, "{}", outcome.message);
    }
    drop_database(db).await;
}

#[tokio::test]
#[ignore]
async fn test_e2e_null_result_does_not_equal_empty_string() {
    let db = "RoutineDiffE2E_NullVsEmpty";
    recreate_database(db).await;
    {
        let mut client = connect_to(Some(db)).await;
        exec(
            &mut client,
            "CREATE PROCEDURE dbo.ReturnsNull @x INT AS SELECT CAST(NULL AS NVARCHAR(10)) AS v",
        )
        .await;
        exec(
            &mut client,
            "CREATE PROCEDURE dbo.ReturnsEmpty @x INT AS SELECT CAST('' AS NVARCHAR(10)) AS v",
        )
        .await;

        let outcome = run(
            db,
            &options(
                "ReturnsNull",
                "ReturnsEmpty",
                RoutineKind::StoredProcedure,
                "SELECT 1 AS [@x]",
            ),
        )
        .await;
        assert_eq!(outcome.verdict, ComparisonVerdict::RowValueMismatch);
        assert_eq!(outcome.rows_processed, 1);
    }
    drop_database(db).await;
}

#[tokio::test]
#[ignore]
async fn test_e2e_progress_observer_sees_every_row() {
    let db = "RoutineDiffE2E_Progress";
    recreate_database(db).await;
    {
        let mut client = connect_to(Some(db)).await;
        exec(
            &mut client,
            "CREATE PROCEDURE dbo.Echo @x INT AS SELECT @x AS v",
        )
        .await;

        let mut seen = Vec::new();
        let mut observer = |rows: usize| seen.push(rows);

        let outcome = run_comparison(
            &server_settings(Some(db)),
            &TypeMap::builtin(),
            &options("Echo", "Echo", RoutineKind::StoredProcedure, THREE_ROWS),
            &CancellationToken::new(),
            Some(&mut observer),
        )
        .await
        .expect("Comparison should reach a verdict");

        assert_eq!(outcome.verdict, ComparisonVerdict::Identical, "{}", outcome.message);
        assert_eq!(seen, vec![1, 2, 3]);
    }
    drop_database(db).await;
}
