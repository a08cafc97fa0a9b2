//! mysql-kit - Main entry point.
//!
//! A small command-line front end over the client: prints connection strings,
//! executes statements, and runs document inserts, upserts and queries.

use clap::Parser;
use mysql_kit::config::{Command, Config};
use mysql_kit::{Client, Ctx, DbResult, Record, Value};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // Logs go to stderr so query output on stdout stays machine-readable.
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

fn parse_args(args: &[String]) -> Vec<Value> {
    args.iter().map(|a| Value::parse_arg(a)).collect()
}

fn parse_document(raw: &str) -> DbResult<serde_json::Value> {
    serde_json::from_str(raw).map_err(|e| {
        mysql_kit::DbError::decode(format!("Invalid JSON document '{}': {}", raw, e))
    })
}

fn print_record(record: &Record) -> DbResult<()> {
    let line = serde_json::to_string(record)
        .map_err(|e| mysql_kit::DbError::decode(format!("Failed to encode record: {}", e)))?;
    println!("{}", line);
    Ok(())
}

async fn run(config: &Config) -> DbResult<()> {
    let options = config.client_options()?;

    if let Command::Dsn { show_password } = &config.command {
        println!(
            "{}",
            if *show_password {
                options.dsn()
            } else {
                options.masked_dsn()
            }
        );
        return Ok(());
    }

    let ctx = Ctx::background().with_timeout(config.timeout_duration());
    let client = Client::connect(&ctx, options).await?;
    let result = dispatch(&client, &ctx, &config.command).await;
    client.close().await;
    result
}

async fn dispatch(client: &Client, ctx: &Ctx, command: &Command) -> DbResult<()> {
    match command {
        Command::Dsn { .. } => Ok(()),
        Command::Exec { sql, args } => {
            let result = client.exec(ctx, sql, &parse_args(args)).await?;
            println!("rows_affected: {}", result.rows_affected()?);
            if let Ok(id) = result.last_insert_id() {
                println!("last_insert_id: {}", id);
            }
            Ok(())
        }
        Command::Query { sql, args } => {
            let mut cursor = client.finds(ctx, sql, &parse_args(args)).await?;
            let mut count = 0usize;
            while let Some(record) = cursor.next().await? {
                print_record(&record)?;
                count += 1;
            }
            info!(rows = count, "Query complete");
            Ok(())
        }
        Command::Exists {
            table,
            where_clause,
            args,
        } => {
            let found = client
                .exists(ctx, table, where_clause, &parse_args(args))
                .await?;
            println!("{}", found);
            Ok(())
        }
        Command::Insert { table, documents } => {
            let documents = documents
                .iter()
                .map(|d| parse_document(d))
                .collect::<DbResult<Vec<_>>>()?;
            let result = client.insert(ctx, table, &documents).await?;
            println!("rows_affected: {}", result.rows_affected()?);
            if let Ok(id) = result.last_insert_id() {
                println!("last_insert_id: {}", id);
            }
            Ok(())
        }
        Command::Upsert {
            table,
            document,
            where_clause,
            args,
        } => {
            let document = parse_document(document)?;
            let result = client
                .upsert(ctx, table, &document, where_clause, &parse_args(args))
                .await?;
            println!("rows_affected: {}", result.rows_affected()?);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    info!("Starting mysql-kit v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&config).await {
        match e.suggestion() {
            Some(suggestion) => error!(error = %e, suggestion = %suggestion, "Command failed"),
            None => error!(error = %e, "Command failed"),
        }
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
