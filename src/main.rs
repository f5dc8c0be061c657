use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use sql_routine_diff::{
    run_comparison, CompareOptions, ConnectionSettings, RoutineIdentifier, RoutineKind, Timeouts,
    TypeMap,
};

#[derive(Parser)]
#[command(name = "sql-routine-diff")]
#[command(author, version, about = "Differential testing for SQL Server routines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two routines row by row over the same inputs
    Compare {
        /// Schema of the first routine
        #[arg(long, default_value = "dbo")]
        first_schema: String,

        /// Name of the first routine
        #[arg(long)]
        first_routine: String,

        /// Schema of the second routine
        #[arg(long, default_value = "dbo")]
        second_schema: String,

        /// Name of the second routine
        #[arg(long)]
        second_routine: String,

        /// Routine kind: procedure, table-valued-function or scalar-valued-function
        #[arg(long, default_value = "procedure")]
        kind: String,

        /// Query supplying the input parameter values; alias its columns
        /// after the parameters, including the @ (e.g. SELECT Id AS [@id] ...)
        #[arg(long, conflicts_with = "input_query_file")]
        input_query: Option<String>,

        /// Read the input query from a file instead
        #[arg(long)]
        input_query_file: Option<PathBuf>,

        /// Also compare output parameter values (stored procedures only)
        #[arg(long)]
        compare_output_parameters: bool,

        /// Timeout in seconds for metadata resolution and the input query
        #[arg(long, default_value_t = 30)]
        metadata_timeout: u64,

        /// Timeout in seconds for each execution of the first routine
        #[arg(long, default_value_t = 300)]
        first_timeout: u64,

        /// Timeout in seconds for each execution of the second routine
        #[arg(long, default_value_t = 300)]
        second_timeout: u64,

        /// Delimited engine-type to provider-type mapping file
        /// (uses the built-in SQL Server mapping when omitted)
        #[arg(long)]
        type_map: Option<PathBuf>,

        /// Field delimiter of the type mapping file
        #[arg(long, default_value_t = ',')]
        type_map_delimiter: char,

        /// Header lines to skip in the type mapping file
        #[arg(long, default_value_t = 0)]
        type_map_skip: usize,

        /// SQL Server host (falls back to SQL_SERVER_HOST)
        #[arg(long)]
        host: Option<String>,

        /// SQL Server port (falls back to SQL_SERVER_PORT)
        #[arg(long)]
        port: Option<u16>,

        /// Database name (falls back to SQL_SERVER_DATABASE)
        #[arg(long)]
        database: Option<String>,

        /// Login user (falls back to SQL_SERVER_USER)
        #[arg(long)]
        user: Option<String>,

        /// Login password (falls back to SQL_SERVER_PASSWORD)
        #[arg(long)]
        password: Option<String>,

        /// Full ADO.NET connection string; overrides the individual flags
        #[arg(long)]
        connection_string: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compare {
            first_schema,
            first_routine,
            second_schema,
            second_routine,
            kind,
            input_query,
            input_query_file,
            compare_output_parameters,
            metadata_timeout,
            first_timeout,
            second_timeout,
            type_map,
            type_map_delimiter,
            type_map_skip,
            host,
            port,
            database,
            user,
            password,
            connection_string,
        } => {
            let kind: RoutineKind = kind.parse().map_err(anyhow::Error::msg)?;

            let input_query = match (input_query, input_query_file) {
                (Some(query), None) => query,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read input query from {}", path.display()))?,
                _ => bail!("either --input-query or --input-query-file is required"),
            };
            if input_query.trim().is_empty() {
                bail!("the input query must not be empty");
            }

            let type_map = match type_map {
                Some(path) => {
                    TypeMap::from_delimited_file(&path, type_map_delimiter, type_map_skip)?
                }
                None => TypeMap::builtin(),
            };

            let mut settings = ConnectionSettings::from_env();
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            if let Some(database) = database {
                settings.database = Some(database);
            }
            if let Some(user) = user {
                settings.user = user;
            }
            if let Some(password) = password {
                settings.password = password;
            }
            if let Some(connection_string) = connection_string {
                settings.ado_string = Some(connection_string);
            }

            let options = CompareOptions {
                first: RoutineIdentifier::new(first_schema, first_routine),
                second: RoutineIdentifier::new(second_schema, second_routine),
                kind,
                input_query,
                compare_output_parameters,
                timeouts: Timeouts::from_secs(metadata_timeout, first_timeout, second_timeout),
            };

            let cancellation = CancellationToken::new();
            let signal_token = cancellation.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("cancellation requested; finishing the current row");
                    signal_token.cancel();
                }
            });

            let mut progress = |rows: usize| {
                eprintln!("finished {} comparisons", rows);
            };

            let outcome = run_comparison(
                &settings,
                &type_map,
                &options,
                &cancellation,
                Some(&mut progress),
            )
            .await?;

            println!("{}", outcome.message);
            println!(
                "verdict: {} ({} rows processed)",
                outcome.verdict, outcome.rows_processed
            );

            if !outcome.verdict.is_identical() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
