//! nested-tx-pool - run SQL statements inside a single transaction.
//!
//! Every statement runs in order on one pooled connection inside one
//! transaction. Rows are printed to stdout as JSON lines once the transaction
//! has been committed, or rolled back with `--disable-commits`.

use clap::Parser;
use futures_util::FutureExt;
use nested_tx_pool::config::{Config, mask_url};
use nested_tx_pool::db::connect;
use nested_tx_pool::error::{DbError, DbResult};
use nested_tx_pool::models::QueryResult;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // stdout carries the result rows
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
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(config: &Config) -> DbResult<Vec<QueryResult>> {
    let db_config = config.database_config()?;
    info!(
        database = %mask_url(&db_config.connection_string),
        statements = config.statements.len(),
        dry_run = db_config.pool.disable_commits,
        "Starting nested-tx-pool v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = connect(&db_config).await?;
    let statements = config.statements.clone();

    let results = pool
        .transaction(
            move |conn| {
                async move {
                    let mut results = Vec::with_capacity(statements.len());
                    for sql in &statements {
                        results.push(conn.query(sql, &[]).await?);
                    }
                    Ok::<_, DbError>(results)
                }
                .boxed()
            },
            None,
        )
        .await;

    pool.close().await;
    results
}

fn print_results(results: &[QueryResult]) -> serde_json::Result<()> {
    for result in results {
        debug!(
            rows = result.row_count(),
            rows_affected = result.rows_affected,
            "Statement result"
        );
        if result.rows.is_empty() {
            println!(
                "{}",
                serde_json::json!({
                    "rows_affected": result.rows_affected,
                    "last_insert_id": result.last_insert_id,
                })
            );
            continue;
        }
        for row in &result.rows {
            println!("{}", serde_json::to_string(row)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration from command line and environment
    let config = Config::parse();

    init_tracing(&config);

    match run(&config).await {
        Ok(results) => match print_results(&results) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "Failed to write results");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!(error = %e, "Transaction failed");
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Error: {}\n  hint: {}", e, suggestion);
            } else {
                eprintln!("Error: {}", e);
            }
            ExitCode::FAILURE
        }
    }
}
