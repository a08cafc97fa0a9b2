//! Statement execution.
//!
//! Runs built or caller-supplied SQL against a pool under a [`Ctx`], binding
//! [`Value`] arguments positionally.

use crate::context::Ctx;
use crate::db::params::bind_all;
use crate::error::{DbError, DbResult};
use crate::models::{ExecResult, Value};
use sqlx::{Executor, MySqlPool};
use std::time::Instant;
use tracing::debug;

/// Execute a write statement.
pub async fn execute(
    pool: &MySqlPool,
    ctx: &Ctx,
    operation: &str,
    sql: &str,
    args: &[Value],
) -> DbResult<ExecResult> {
    let start = Instant::now();

    debug!(
        operation = %operation,
        sql = %sql,
        params = args.len(),
        "Executing statement"
    );

    let result = ctx
        .run(operation, async {
            // Without arguments, run as a plain text query; some statements
            // (CREATE PROCEDURE, LOCK TABLES) cannot be prepared.
            let result = if args.is_empty() {
                pool.execute(sql).await
            } else {
                bind_all(sql, args).execute(pool).await
            };
            result.map_err(DbError::from)
        })
        .await?;

    let result = ExecResult::from(result);
    debug!(
        operation = %operation,
        result = ?result,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Statement executed"
    );
    Ok(result)
}

/// Run a query and report whether it produced at least one row.
pub async fn fetch_exists(
    pool: &MySqlPool,
    ctx: &Ctx,
    sql: &str,
    args: &[Value],
) -> DbResult<bool> {
    debug!(sql = %sql, params = args.len(), "Checking existence");

    ctx.run("exists", async {
        bind_all(sql, args)
            .fetch_optional(pool)
            .await
            .map(|row| row.is_some())
            .map_err(DbError::from)
    })
    .await
}
