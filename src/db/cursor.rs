//! Forward-only result cursor.
//!
//! A query's rows are streamed by a producer task that owns a pooled
//! connection. Rows cross a channel of capacity one, so the producer never
//! runs more than a row ahead of the reader. Each row is decoded into a
//! [`Record`] on the reader's side.

use crate::context::Ctx;
use crate::db::params::bind_all;
use crate::db::types::{RowToRecord, column_metadata, log_unsupported_columns};
use crate::error::{DbError, DbResult};
use crate::models::{ColumnMetadata, Record, Value};
use futures_util::{Stream, StreamExt};
use sqlx::mysql::MySqlRow;
use sqlx::{Executor, MySqlPool, Statement};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Open,
    Exhausted,
    Closed,
}

/// Single-pass iterator over the rows of one query.
#[derive(Debug)]
pub struct RowCursor {
    columns: Vec<ColumnMetadata>,
    rows: mpsc::Receiver<DbResult<MySqlRow>>,
    producer: Option<JoinHandle<()>>,
    state: CursorState,
    ctx: Ctx,
    shutdown: CancellationToken,
}

impl RowCursor {
    /// Start streaming `sql` and wait for its column metadata.
    ///
    /// Cancelling `shutdown` stops the producer and returns its connection;
    /// the owning client does this on close.
    pub(crate) async fn open(
        pool: MySqlPool,
        ctx: &Ctx,
        shutdown: CancellationToken,
        sql: String,
        args: Vec<Value>,
    ) -> DbResult<Self> {
        debug!(sql = %sql, params = args.len(), "Opening cursor");

        let (columns_tx, columns_rx) = oneshot::channel();
        let (rows_tx, rows_rx) = mpsc::channel(1);

        let task_ctx = ctx.clone();
        let task_shutdown = shutdown.clone();
        let producer = tokio::spawn(async move {
            tokio::select! {
                _ = task_ctx.done("finds") => {}
                _ = task_shutdown.cancelled() => {}
                _ = produce(pool, sql, args, columns_tx, rows_tx) => {}
            }
        });

        let mut cursor = Self {
            columns: Vec::new(),
            rows: rows_rx,
            producer: Some(producer),
            state: CursorState::Open,
            ctx: ctx.clone(),
            shutdown,
        };

        let columns = ctx
            .run("finds", async {
                match columns_rx.await {
                    Ok(columns) => columns,
                    Err(_) if cursor.shutdown.is_cancelled() => Err(DbError::ClientClosed),
                    Err(_) => Err(DbError::scan("row producer stopped before the query started")),
                }
            })
            .await;

        match columns {
            Ok(columns) => {
                log_unsupported_columns(&columns);
                cursor.columns = columns;
                Ok(cursor)
            }
            Err(e) => {
                cursor.close();
                Err(e)
            }
        }
    }

    /// Column metadata captured when the statement was prepared.
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    /// Whether `close` was called or a read failed.
    pub fn is_closed(&self) -> bool {
        self.state == CursorState::Closed
    }

    /// Read the next record.
    ///
    /// Returns `None` once the rows run out, and keeps returning `None`
    /// afterwards. Any error closes the cursor; reading a closed cursor is a
    /// scan error.
    pub async fn next(&mut self) -> DbResult<Option<Record>> {
        match self.state {
            CursorState::Closed => return Err(DbError::scan("cursor is closed")),
            CursorState::Exhausted => return Ok(None),
            CursorState::Open => {}
        }

        let received = tokio::select! {
            biased;
            err = self.ctx.done("cursor read") => Err(err),
            _ = self.shutdown.cancelled() => Err(DbError::ClientClosed),
            row = self.rows.recv() => Ok(row),
        };

        let row = match received {
            Ok(Some(Ok(row))) => row,
            Ok(None) => {
                self.release(CursorState::Exhausted);
                return Ok(None);
            }
            Ok(Some(Err(e))) | Err(e) => {
                self.close();
                return Err(e);
            }
        };

        row.to_record(&self.columns).map(Some).inspect_err(|_| {
            self.close();
        })
    }

    /// Release the producer. Further reads fail.
    pub fn close(&mut self) {
        self.release(CursorState::Closed);
    }

    fn release(&mut self, state: CursorState) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        self.rows.close();
        if self.state != CursorState::Closed {
            self.state = state;
        }
    }

    /// Consume the cursor as a stream of records. The stream ends after the
    /// first error.
    pub fn into_stream(self) -> impl Stream<Item = DbResult<Record>> + Send {
        futures_util::stream::unfold(Some(self), |cursor| async move {
            let mut cursor = cursor?;
            match cursor.next().await {
                Ok(Some(record)) => Some((Ok(record), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    /// Read every remaining record.
    pub async fn collect(mut self) -> DbResult<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }
}

impl Drop for RowCursor {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

/// Producer task body: prepare, report columns, then stream rows until the
/// reader goes away or the rows run out.
async fn produce(
    pool: MySqlPool,
    sql: String,
    args: Vec<Value>,
    columns_tx: oneshot::Sender<DbResult<Vec<ColumnMetadata>>>,
    rows_tx: mpsc::Sender<DbResult<MySqlRow>>,
) {
    let mut conn = match pool.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            let _ = columns_tx.send(Err(DbError::from(e)));
            return;
        }
    };

    let columns = match (&mut *conn).prepare(sql.as_str()).await {
        Ok(statement) => column_metadata(statement.columns()),
        Err(e) => {
            let _ = columns_tx.send(Err(DbError::from(e)));
            return;
        }
    };

    if columns_tx.send(Ok(columns)).is_err() {
        return;
    }

    let mut rows = bind_all(&sql, &args).fetch(&mut *conn);
    while let Some(row) = rows.next().await {
        let failed = row.is_err();
        if rows_tx.send(row.map_err(DbError::from)).await.is_err() || failed {
            return;
        }
    }
}
