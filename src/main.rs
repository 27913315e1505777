//! db-offload - Main entry point.
//!
//! Runs one SQL statement through an adapted dialect on a single-threaded
//! async runtime and prints the result as JSON.

use clap::Parser;
use db_offload::config::Config;
use db_offload::error::OffloadError;
use db_offload::models::{ColumnDescription, Row};
use db_offload::{adapters, pool};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr so stdout carries only the query result.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[derive(Debug, Serialize)]
struct QueryOutput {
    columns: Vec<ColumnDescription>,
    rows: Vec<Row>,
    rowcount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    lastrowid: Option<i64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);
    config.validate()?;

    pool::configure_default_pool_size(config.pool_size);

    info!(
        pool_size = config.pool_size,
        "Starting db-offload v{}",
        env!("CARGO_PKG_VERSION")
    );

    if config.list {
        for dialect in adapters().dialects() {
            println!("{}\t{}", dialect.key(), dialect.name());
        }
        return Ok(());
    }

    let url = config.database_url()?;
    let dialect = adapters()
        .get(&url.key())
        .ok_or_else(|| OffloadError::dialect_not_found(url.key()))?;
    info!(dialect = %dialect.name(), single_thread = dialect.context().is_single_thread(), "Using dialect");

    let dbapi = dialect.dbapi()?;
    let conn = dbapi.connect(url.params.clone()).await?;

    let result = run(&config, &conn).await;
    if let Err(e) = &result {
        error!(error = %e, "Statement failed");
        if let Err(rollback) = conn.rollback().await {
            error!(error = %rollback, "Rollback failed");
        }
    }
    conn.close().await?;

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    info!("Done");
    Ok(())
}

async fn run(
    config: &Config,
    conn: &db_offload::ConnectionProxy,
) -> Result<QueryOutput, OffloadError> {
    let cursor = conn.cursor().await?;
    let rows = cursor
        .execute(config.execute.as_str(), config.statement_params())
        .await?
        .fetchall()
        .await?;

    let output = QueryOutput {
        columns: cursor.description().unwrap_or_default(),
        rows,
        rowcount: cursor.rowcount(),
        lastrowid: cursor.lastrowid(),
    };
    cursor.close().await?;

    if config.commit {
        conn.commit().await?;
    }
    Ok(output)
}
