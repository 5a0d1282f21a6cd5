//! Query execution entry points.
//!
//! [`QueryClient`] owns the session pool and exposes three surfaces: one-shot
//! [`exec`](QueryClient::exec), the fluent [`query`](QueryClient::query)
//! builder, and [`tx`](QueryClient::tx) for multi-statement transactions.
//! Derived handles (`online_read_only()` and friends) change the default
//! transaction mode without touching the shared pool.

pub mod result;
pub mod session;
pub mod transaction;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::error::Error;
use crate::pool::{CreateFn, Pool, PoolConfig};
use crate::query::result::{QueryResult, RowSink};
use crate::query::session::Session;
use crate::query::transaction::{Transaction, TxMode};
use crate::transport::dispatcher::Dispatcher;
use crate::ydb::query::TransactionControl;
use crate::ydb::value::{TypedValue, Value};

const MAX_QUERY_LOG_LENGTH: usize = 1000;

/// Session-pool parameters handed down from the client configuration.
pub(crate) struct QueryClientConfig {
    pub session_pool_size: usize,
    pub session_create_timeout: Duration,
    pub session_lifetime: Duration,
    pub session_recycle_window: Duration,
    pub pool_ready_high_pct: u8,
    pub pool_ready_low_pct: u8,
    pub default_tx_mode: TxMode,
    pub default_query_timeout: Option<Duration>,
}

#[derive(Clone)]
pub struct QueryClient {
    pool: Pool<Session>,
    mode: TxMode,
    query_timeout: Option<Duration>,
}

impl QueryClient {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>, cfg: QueryClientConfig) -> Self {
        let create_fn: CreateFn<Session> = Arc::new(move |timeout| {
            let dispatcher = dispatcher.clone();
            Box::pin(async move { Session::create(dispatcher, timeout).await })
        });

        let pool = Pool::new(PoolConfig {
            create_fn,
            create_timeout: cfg.session_create_timeout,
            item_lifetime: cfg.session_lifetime,
            recycle_window: cfg.session_recycle_window,
            pool_size: cfg.session_pool_size,
            ready_high_pct: cfg.pool_ready_high_pct,
            ready_low_pct: cfg.pool_ready_low_pct,
        });

        Self {
            pool,
            mode: cfg.default_tx_mode,
            query_timeout: cfg.default_query_timeout,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_pool(pool: Pool<Session>, mode: TxMode) -> Self {
        Self {
            pool,
            mode,
            query_timeout: None,
        }
    }

    /// True once enough sessions are alive; see the pool readiness
    /// thresholds in the client configuration.
    pub fn ready(&self) -> bool {
        self.pool.ready()
    }

    fn derived(&self, mode: TxMode) -> Self {
        Self {
            pool: self.pool.clone(),
            mode,
            query_timeout: self.query_timeout,
        }
    }

    /// Handle with serializable read-write as the default mode.
    pub fn serializable_read_write(&self) -> Self {
        self.derived(TxMode::SerializableReadWrite)
    }

    /// Handle with online read-only as the default mode.
    pub fn online_read_only(&self) -> Self {
        self.derived(TxMode::OnlineReadOnly {
            allow_inconsistent: false,
        })
    }

    /// Handle with inconsistent online read-only as the default mode.
    pub fn online_read_only_inconsistent(&self) -> Self {
        self.derived(TxMode::OnlineReadOnly {
            allow_inconsistent: true,
        })
    }

    /// Handle with snapshot read-only as the default mode.
    pub fn snapshot_read_only(&self) -> Self {
        self.derived(TxMode::SnapshotReadOnly)
    }

    /// Handle with stale read-only as the default mode.
    pub fn stale_read_only(&self) -> Self {
        self.derived(TxMode::StaleReadOnly)
    }

    /// Executes a statement outside any client-tracked transaction, e.g.
    /// DDL. No transaction control is attached.
    pub async fn exec(&self, text: impl Into<String>) -> Result<QueryResult, Error> {
        self.exec_with_control(text.into(), HashMap::new(), None, None, None)
            .await
    }

    /// Starts building a query executed in a one-shot transaction of the
    /// default mode, committed inline.
    pub fn query(&self, text: impl Into<String>) -> Query<'_> {
        Query {
            client: self,
            text: text.into(),
            params: HashMap::new(),
            collect: None,
            timeout: None,
        }
    }

    /// Begins a multi-statement transaction in the default mode, holding one
    /// session until the transaction finishes.
    pub async fn tx(&self) -> Result<Transaction, Error> {
        let sess = self
            .pool
            .acquire()
            .await
            .ok_or_else(|| Error::Session("no session".into()))?;
        Ok(Transaction::new(
            self.pool.clone(),
            sess,
            self.mode.clone(),
            self.query_timeout,
        ))
    }

    async fn exec_with_control(
        &self,
        text: String,
        params: HashMap<String, TypedValue>,
        collect: Option<RowSink>,
        timeout: Option<Duration>,
        tx_control: Option<TransactionControl>,
    ) -> Result<QueryResult, Error> {
        let sess = self
            .pool
            .acquire()
            .await
            .ok_or_else(|| Error::Session("no session".into()))?;

        trace!(query = %strip(&text), "executing query");

        let run = async {
            let mut res = sess.exec(text, params, tx_control, collect).await?;
            res.receive().await?;
            Ok::<QueryResult, Error>(res)
        };
        let outcome = match timeout.or(self.query_timeout) {
            Some(deadline) => tokio::time::timeout(deadline, run)
                .await
                .map_err(|_| Error::Exec("query deadline exceeded".into()))
                .and_then(|res| res),
            None => run.await,
        };

        self.pool.release(sess);
        outcome
    }

    pub(crate) async fn close(&self) {
        self.pool.close().await;
    }
}

/// Builder for a one-shot query. Runs in an inline-committed transaction of
/// the client's default mode.
pub struct Query<'a> {
    client: &'a QueryClient,
    text: String,
    params: HashMap<String, TypedValue>,
    collect: Option<RowSink>,
    timeout: Option<Duration>,
}

impl Query<'_> {
    pub fn param(mut self, name: impl Into<String>, value: TypedValue) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn params(mut self, params: HashMap<String, TypedValue>) -> Self {
        self.params = params;
        self
    }

    /// Streams rows to `sink` instead of buffering them in the result.
    pub fn collect<F>(mut self, sink: F) -> Self
    where
        F: FnMut(Vec<Value>) -> Result<(), Error> + Send + 'static,
    {
        self.collect = Some(Box::new(sink));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn exec(self) -> Result<QueryResult, Error> {
        let control = self.client.mode.autocommit_control();
        self.client
            .exec_with_control(self.text, self.params, self.collect, self.timeout, Some(control))
            .await
    }
}

/// Truncates long statements for logging.
fn strip(text: &str) -> &str {
    if text.len() <= MAX_QUERY_LOG_LENGTH {
        return text;
    }
    let mut cut = MAX_QUERY_LOG_LENGTH;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Connection;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn detached_session_pool(size: usize) -> Pool<Session> {
        let next = Arc::new(AtomicU64::new(1));
        let create_fn: CreateFn<Session> = Arc::new(move |_timeout| {
            let next = next.clone();
            Box::pin(async move {
                let conn = Arc::new(
                    Connection::open_lazy("127.0.0.1:1", false, None, "/local/testdb", 1)
                        .expect("lazy connection"),
                );
                let id = format!("sess-{}", next.fetch_add(1, Ordering::SeqCst));
                Ok(Session::detached(&id, conn, false))
            })
        });
        Pool::new(PoolConfig {
            create_fn,
            create_timeout: Duration::from_secs(1),
            item_lifetime: Duration::ZERO,
            recycle_window: Duration::ZERO,
            pool_size: size,
            ready_high_pct: 50,
            ready_low_pct: 0,
        })
    }

    #[test]
    fn test_strip_long_queries() {
        let short = "SELECT 1;";
        assert_eq!(strip(short), short);

        let long = "x".repeat(2000);
        assert_eq!(strip(&long).len(), MAX_QUERY_LOG_LENGTH);

        // Never cuts through a multi-byte character.
        let unicode = "я".repeat(800);
        let cut = strip(&unicode);
        assert!(cut.len() <= MAX_QUERY_LOG_LENGTH);
        assert!(unicode.starts_with(cut));
    }

    #[tokio::test]
    async fn test_derived_handles_change_only_the_mode() {
        let qc = QueryClient::with_pool(detached_session_pool(1), TxMode::SerializableReadWrite);
        assert_eq!(
            qc.online_read_only().mode,
            TxMode::OnlineReadOnly {
                allow_inconsistent: false
            }
        );
        assert_eq!(
            qc.online_read_only_inconsistent().mode,
            TxMode::OnlineReadOnly {
                allow_inconsistent: true
            }
        );
        assert_eq!(qc.snapshot_read_only().mode, TxMode::SnapshotReadOnly);
        assert_eq!(qc.stale_read_only().mode, TxMode::StaleReadOnly);
        assert_eq!(
            qc.stale_read_only().serializable_read_write().mode,
            TxMode::SerializableReadWrite
        );
        // The original handle is untouched.
        assert_eq!(qc.mode, TxMode::SerializableReadWrite);
        qc.close().await;
    }

    /// A finished transaction rejects every further operation.
    #[tokio::test]
    async fn test_finished_transaction_rejects_operations() {
        let qc = QueryClient::with_pool(detached_session_pool(1), TxMode::SerializableReadWrite);
        let mut tx = qc.tx().await.expect("acquire transaction");

        // No statement ran yet, so commit is purely local and finishes the
        // transaction.
        tx.commit().await.expect("empty commit");

        assert!(matches!(tx.commit().await, Err(Error::TxFinished)));
        assert!(matches!(tx.rollback().await, Err(Error::TxFinished)));
        let err = tx.query("SELECT 1;").exec().await.unwrap_err();
        assert!(matches!(err, Error::TxFinished));

        qc.close().await;
    }

    /// A hard statement failure finishes the transaction and returns the
    /// session to the pool.
    #[tokio::test]
    async fn test_failed_statement_finishes_transaction() {
        let qc = QueryClient::with_pool(detached_session_pool(1), TxMode::SerializableReadWrite);
        let mut tx = qc.tx().await.expect("acquire transaction");

        // The detached session's transport points at an unreachable
        // loopback port, so the statement fails to start.
        let err = tx.query("SELECT 1;").exec().await.unwrap_err();
        assert!(matches!(err, Error::Exec(_)));

        assert!(matches!(
            tx.query("SELECT 2;").exec().await,
            Err(Error::TxFinished)
        ));

        // The session went back to the pool: another transaction can start.
        let tx2 = qc.tx().await;
        assert!(tx2.is_ok());
        drop(tx2);

        qc.close().await;
    }

    #[tokio::test]
    async fn test_dropped_transaction_returns_its_session() {
        let qc = QueryClient::with_pool(detached_session_pool(1), TxMode::SerializableReadWrite);

        let tx = qc.tx().await.expect("acquire transaction");
        drop(tx);

        // Pool of one: acquiring again only works if drop released it.
        let tx = tokio::time::timeout(Duration::from_secs(1), qc.tx())
            .await
            .expect("session must be back in the pool")
            .expect("transaction");
        drop(tx);

        qc.close().await;
    }
}
