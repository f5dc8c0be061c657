//! Invocation SQL construction tests

use pretty_assertions::assert_eq;

use sql_routine_diff::engine::{build_invocation_sql, format_bindings, ParameterBinding};
use sql_routine_diff::typemap::SqlParamType;
use sql_routine_diff::types::{RoutineIdentifier, RoutineKind};
use sql_routine_diff::value::SqlValue;

fn input(name: &str, param_type: SqlParamType, value: SqlValue) -> ParameterBinding {
    ParameterBinding {
        name: name.to_string(),
        param_type,
        precision: 0,
        scale: 0,
        value,
        is_output: false,
    }
}

#[test]
fn test_procedure_call_uses_named_arguments_in_declaration_order() {
    let bindings = vec![
        input("@customer_id", SqlParamType::Int, SqlValue::int(42)),
        input("@since", SqlParamType::Date, SqlValue::null()),
        input("@limit", SqlParamType::Int, SqlValue::int(10)),
    ];
    let sql = build_invocation_sql(
        RoutineKind::StoredProcedure,
        &RoutineIdentifier::new("sales", "GetRecentOrders"),
        &bindings,
    );
    assert_eq!(
        sql,
        "EXEC [sales].[GetRecentOrders] @customer_id = @P1, @since = @P2, @limit = @P3"
    );
}

#[test]
fn test_output_parameters_declare_and_select_trailing_values() {
    let mut total = input("@total", SqlParamType::Decimal, SqlValue::null());
    total.precision = 18;
    total.scale = 2;
    total.is_output = true;

    let mut label = input("@label", SqlParamType::NVarChar, SqlValue::null());
    label.is_output = true;

    let bindings = vec![
        input("@id", SqlParamType::Int, SqlValue::int(1)),
        total,
        label,
    ];
    let sql = build_invocation_sql(
        RoutineKind::StoredProcedure,
        &RoutineIdentifier::new("dbo", "Summarize"),
        &bindings,
    );
    assert_eq!(
        sql,
        "DECLARE @total decimal(18,2); DECLARE @label nvarchar(max); \
         EXEC [dbo].[Summarize] @id = @P1, @total = @total OUTPUT, @label = @label OUTPUT; \
         SELECT @total AS [@total], @label AS [@label]"
    );
}

#[test]
fn test_function_calls_embed_positional_placeholders() {
    let bindings = vec![
        input("@a", SqlParamType::Int, SqlValue::int(1)),
        input("@b", SqlParamType::Int, SqlValue::int(2)),
    ];

    let tvf = build_invocation_sql(
        RoutineKind::TableValuedFunction,
        &RoutineIdentifier::new("dbo", "Range"),
        &bindings,
    );
    assert_eq!(tvf, "SELECT * FROM [dbo].[Range](@P1, @P2)");

    let scalar = build_invocation_sql(
        RoutineKind::ScalarValuedFunction,
        &RoutineIdentifier::new("dbo", "Add"),
        &bindings,
    );
    assert_eq!(scalar, "SELECT [dbo].[Add](@P1, @P2)");
}

#[test]
fn test_parameterless_invocations() {
    let sql = build_invocation_sql(
        RoutineKind::StoredProcedure,
        &RoutineIdentifier::new("dbo", "Heartbeat"),
        &[],
    );
    assert_eq!(sql, "EXEC [dbo].[Heartbeat]");

    let tvf = build_invocation_sql(
        RoutineKind::TableValuedFunction,
        &RoutineIdentifier::new("dbo", "AllRows"),
        &[],
    );
    assert_eq!(tvf, "SELECT * FROM [dbo].[AllRows]()");
}

#[test]
fn test_format_bindings_shows_values_and_output_markers() {
    let mut out = input("@out", SqlParamType::Int, SqlValue::null());
    out.is_output = true;
    let bindings = vec![
        input("@x", SqlParamType::Int, SqlValue::int(3)),
        input("@name", SqlParamType::NVarChar, SqlValue::string("abc")),
        out,
    ];
    assert_eq!(
        format_bindings(&bindings),
        "\n@x = 3\n@name = abc\n@out = (output)"
    );
}
