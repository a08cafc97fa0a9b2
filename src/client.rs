//! The client facade.
//!
//! A [`Client`] owns a MySQL pool for its whole lifetime and turns documents
//! into INSERT / UPDATE statements, runs existence checks, and opens
//! [`RowCursor`]s over arbitrary queries. Once closed, every operation fails
//! with [`DbError::ClientClosed`].

use crate::config::ClientOptions;
use crate::context::Ctx;
use crate::db::builder::{
    build_insert, build_insert_from_rows, build_update, ensure_where, exists_sql,
};
use crate::db::cursor::RowCursor;
use crate::db::executor::{execute, fetch_exists};
use crate::db::pool::{self, ConnectedPool};
use crate::db::proxy::ProxyTunnel;
use crate::error::{DbError, DbResult};
use crate::models::{Document, ExecResult, Record, Value};
use sqlx::MySqlPool;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Client {
    pool: MySqlPool,
    options: ClientOptions,
    closed: AtomicBool,
    tunnel: Option<ProxyTunnel>,
    /// Parent of every open cursor's shutdown token
    cursors: CancellationToken,
}

impl Client {
    /// Connect using `options` and ping the server once.
    pub async fn connect(ctx: &Ctx, options: ClientOptions) -> DbResult<Self> {
        let ConnectedPool { pool, tunnel } = pool::connect(ctx, &options).await?;
        Ok(Self {
            pool,
            options,
            closed: AtomicBool::new(false),
            tunnel,
            cursors: CancellationToken::new(),
        })
    }

    /// Wrap an existing pool. The client closes it on [`close`](Self::close).
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self::from_pool_with_options(pool, ClientOptions::default())
    }

    /// Wrap an existing pool, keeping `options` for statement behavior
    /// such as `insert_ignore`.
    pub fn from_pool_with_options(pool: MySqlPool, options: ClientOptions) -> Self {
        Self {
            pool,
            options,
            closed: AtomicBool::new(false),
            tunnel: None,
            cursors: CancellationToken::new(),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> DbResult<()> {
        if self.is_closed() {
            return Err(DbError::ClientClosed);
        }
        Ok(())
    }

    /// Insert one or more documents in a single statement.
    ///
    /// Columns are the union of the documents' keys; missing keys insert
    /// NULL. Uses INSERT IGNORE when the client was configured for it.
    pub async fn insert<D: Document>(
        &self,
        ctx: &Ctx,
        table: &str,
        documents: &[D],
    ) -> DbResult<ExecResult> {
        self.ensure_open()?;
        let statement = build_insert(documents)?;
        let sql = statement.to_sql(table, self.options.insert_ignore);
        execute(&self.pool, ctx, "insert", &sql, &statement.args).await
    }

    /// Insert positional rows without a column list.
    pub async fn insert_with_values(
        &self,
        ctx: &Ctx,
        table: &str,
        rows: &[Vec<Value>],
    ) -> DbResult<ExecResult> {
        self.ensure_open()?;
        let statement = build_insert_from_rows(rows)?;
        let sql = statement.to_sql(table, false);
        execute(&self.pool, ctx, "insert", &sql, &statement.args).await
    }

    /// Update the rows matching `where_clause` with the document's fields.
    pub async fn update<D: Document + ?Sized>(
        &self,
        ctx: &Ctx,
        table: &str,
        document: &D,
        where_clause: &str,
        args: &[Value],
    ) -> DbResult<ExecResult> {
        ensure_where(where_clause, "update")?;
        self.ensure_open()?;
        let statement = build_update(document, where_clause, args)?;
        let sql = statement.to_sql(table, where_clause);
        execute(&self.pool, ctx, "update", &sql, &statement.args).await
    }

    /// Update the matching rows, or insert the document when none exist.
    ///
    /// Runs as three separate statements: a row inserted concurrently between
    /// the existence check and the insert is not detected.
    pub async fn upsert<D: Document + ?Sized>(
        &self,
        ctx: &Ctx,
        table: &str,
        document: &D,
        where_clause: &str,
        args: &[Value],
    ) -> DbResult<ExecResult> {
        ensure_where(where_clause, "upsert")?;

        let updated = self.update(ctx, table, document, where_clause, args).await?;
        if updated.rows_affected()? > 0 {
            return Ok(updated);
        }

        // Zero rows affected also happens when the row exists unchanged.
        if self.exists(ctx, table, where_clause, args).await? {
            debug!(table = %table, "Upsert matched an unchanged row");
            return Ok(updated);
        }

        debug!(table = %table, "Upsert found no row, inserting");
        self.insert(ctx, table, &[document]).await
    }

    /// Whether at least one row of `table` matches `where_clause`.
    pub async fn exists(
        &self,
        ctx: &Ctx,
        table: &str,
        where_clause: &str,
        args: &[Value],
    ) -> DbResult<bool> {
        ensure_where(where_clause, "exists")?;
        self.ensure_open()?;
        fetch_exists(&self.pool, ctx, &exists_sql(table, where_clause), args).await
    }

    /// Run a query and return a cursor over its rows.
    ///
    /// The cursor keeps a clone of `ctx`; cancelling it stops the cursor.
    /// Closing the client stops it too.
    pub async fn finds(&self, ctx: &Ctx, query: &str, args: &[Value]) -> DbResult<RowCursor> {
        self.ensure_open()?;
        RowCursor::open(
            self.pool.clone(),
            ctx,
            self.cursors.child_token(),
            query.to_string(),
            args.to_vec(),
        )
        .await
    }

    /// Run a query and collect every row.
    pub async fn find_all(&self, ctx: &Ctx, query: &str, args: &[Value]) -> DbResult<Vec<Record>> {
        self.finds(ctx, query, args).await?.collect().await
    }

    /// Execute an arbitrary statement.
    pub async fn exec(&self, ctx: &Ctx, query: &str, args: &[Value]) -> DbResult<ExecResult> {
        self.ensure_open()?;
        execute(&self.pool, ctx, "exec", query, args).await
    }

    /// Stop open cursors, close the pool and stop the proxy forwarder.
    /// Closing twice is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Closing client");
        // Cursor producers hold pooled connections until stopped
        self.cursors.cancel();
        self.pool.close().await;
        if let Some(tunnel) = &self.tunnel {
            tunnel.stop();
        }
    }
}
