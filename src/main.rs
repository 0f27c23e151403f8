//! steward - supervised MySQL statements and resumable SQL imports.

mod cli;

use cli::{Cli, Command};
use db_steward::config::{Config, ConnectionConfig};
use db_steward::connection::ConnectionRegistry;
use db_steward::db::{MySqlConnector, ResultMode};
use db_steward::error::{Result, StewardError};
use db_steward::import::ResumableImporter;
use db_steward::logging;
use db_steward::query::{Execution, QueryExecutor};
use serde_json::json;
use tracing::{error, info};

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();

    match cli.log_target() {
        Some(path) => logging::init_file_logging(&path),
        None => logging::init_stderr_logging(),
    }

    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{}: {}", e.category(), e);
            eprintln!("{}: {}", e.category(), e);
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<i32> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let connection = resolve_connection(cli, &config)?.ok_or_else(|| {
        StewardError::config(
            "No database connection configured. Use --help for usage information.",
        )
    })?;
    info!("Connection: {}", connection.display_string());

    let mut registry = ConnectionRegistry::new(MySqlConnector::new()?);
    let executor = registry.get_or_create(&connection)?;

    let outcome = match &cli.command {
        Command::Import { file } => {
            let report = ResumableImporter::new(file).run(executor);
            print_json(&json!(report))?;
            Ok(if report.is_success() { 0 } else { 1 })
        }
        Command::Exec {
            sql,
            unbuffered,
            fetch_mode,
        } => {
            executor.set_fetch_mode(cli::parse_fetch_mode(fetch_mode)?);
            let mode = if *unbuffered {
                ResultMode::Use
            } else {
                ResultMode::Store
            };
            executor
                .execute_with_mode(sql, mode)
                .and_then(|execution| print_json(&execution_json(&execution, executor)))
                .map(|()| 0)
        }
    };

    registry.close_all();
    outcome
}

/// Resolves the final connection configuration from CLI args, config file, and environment.
///
/// Precedence: CLI arguments, `DATABASE_URL`, named connection, default connection.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<Option<ConnectionConfig>> {
    let mut connection = cli.to_connection_config()?;

    if connection.is_none() {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            connection = Some(ConnectionConfig::from_connection_string(&url)?);
        }
    }

    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = config.get_connection(Some(name)).cloned();
            if connection.is_none() {
                return Err(StewardError::config(format!(
                    "Connection '{}' not found in config file",
                    name
                )));
            }
        }
    }

    if connection.is_none() {
        connection = config.get_connection(None).cloned();
    }

    if let Some(ref mut conn) = connection {
        conn.apply_env_defaults();
    }

    Ok(connection)
}

fn execution_json<C: db_steward::db::Connector>(
    execution: &Execution,
    executor: &QueryExecutor<C>,
) -> serde_json::Value {
    match execution {
        Execution::Rows(rows) => json!({ "rows": rows, "num_rows": rows.len() }),
        Execution::Affected(count) => json!({
            "affected_rows": count,
            "insert_id": executor.insert_id(),
        }),
        Execution::Raw(_) => json!({ "result": "ok" }),
        Execution::Empty => json!({ "rows": null }),
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| StewardError::internal(format!("Failed to render JSON: {e}")))?;
    println!("{text}");
    Ok(())
}
