//! Server-side query sessions.
//!
//! A session is created through the balanced transport and stays pinned to
//! the connection the create call landed on; every follow-up RPC for the
//! session must use that same connection or the server answers BAD_REQUEST.
//! After creation the client attaches to the session and waits for the first
//! SUCCESS state frame. The attach mechanism is non-blocking on the server
//! side: handing the session out before that frame races the server's state
//! transition and the first query may fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::codec::Streaming;
use tracing::{debug, error, trace};

use crate::error::{render_issues, Error};
use crate::hashing::stable_hash;
use crate::pool::PoolItem;
use crate::query::result::{QueryResult, RowSink};
use crate::transport::dispatcher::Dispatcher;
use crate::transport::Connection;
use crate::ydb::method;
use crate::ydb::query::{
    execute_query_request, AttachSessionRequest, CommitTransactionRequest,
    CommitTransactionResponse, CreateSessionRequest, CreateSessionResponse, DeleteSessionRequest,
    DeleteSessionResponse, ExecMode, ExecuteQueryRequest, QueryContent,
    RollbackTransactionRequest, RollbackTransactionResponse, SessionState, StatsMode, Syntax,
    TransactionControl,
};
use crate::ydb::status::StatusCode;
use crate::ydb::value::TypedValue;

const CLEANUP_TIMEOUT: Duration = Duration::from_secs(3);

pub struct Session {
    id: String,
    id_hash: u64,
    node_id: i64,

    conn: Arc<Connection>,

    cancel: CancellationToken,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,

    shutdown: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl Session {
    /// Creates and attaches a session through a balanced connection. The
    /// connection the create call lands on is captured and pinned.
    ///
    /// An empty grid propagates [`Error::LocalFailure`] untouched so the
    /// pool spawner can back off.
    pub(crate) async fn create(dispatcher: Arc<Dispatcher>, timeout: Duration) -> Result<Self, Error> {
        let conn = dispatcher.get_conn()?;

        let response: CreateSessionResponse = tokio::time::timeout(
            timeout,
            conn.invoke(method::CREATE_SESSION, CreateSessionRequest {}),
        )
        .await
        .map_err(|_| Error::Session("session create timed out".into()))?
        .map_err(|err| Error::Session(format!("session create failed: {err}")))?;

        let status = StatusCode::from_raw(response.status);
        if status != StatusCode::Success {
            return Err(Error::Session(format!(
                "session create status {status:?}: {}",
                render_issues(&response.issues)
            )));
        }

        let id = response.session_id;
        let id_hash = stable_hash(&id);
        let node_id = response.node_id;

        let stream: Streaming<SessionState> = match conn
            .new_stream(
                method::ATTACH_SESSION,
                AttachSessionRequest {
                    session_id: id.clone(),
                },
            )
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                delete_session(&conn, &id).await;
                return Err(Error::Session(format!("session attach failed: {err}")));
            }
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let (attached_tx, attached_rx) = oneshot::channel();
        let reader = tokio::spawn(Self::read_states(
            stream,
            cancel.clone(),
            shutdown.clone(),
            attached_tx,
            id.clone(),
        ));

        // The sender is dropped if the stream dies before the first SUCCESS
        // frame; both that and the timeout fail creation.
        match tokio::time::timeout(timeout, attached_rx).await {
            Ok(Ok(())) => {}
            _ => {
                cancel.cancel();
                let _ = reader.await;
                delete_session(&conn, &id).await;
                return Err(Error::Session(
                    "no SUCCESS state observed on attach stream".into(),
                ));
            }
        }

        trace!(id = %id, node_id, "attached to session");

        Ok(Self {
            id,
            id_hash,
            node_id,
            conn,
            cancel,
            reader: parking_lot::Mutex::new(Some(reader)),
            shutdown,
            closed: AtomicBool::new(false),
        })
    }

    async fn read_states(
        mut stream: Streaming<SessionState>,
        cancel: CancellationToken,
        shutdown: Arc<AtomicBool>,
        attached: oneshot::Sender<()>,
        id: String,
    ) {
        let mut attached = Some(attached);
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = stream.message() => message,
            };
            match message {
                Ok(Some(state)) => {
                    let status = StatusCode::from_raw(state.status);
                    debug!(id = %id, status = ?status, "session state changed");
                    if status == StatusCode::Success {
                        if let Some(attached) = attached.take() {
                            let _ = attached.send(());
                        }
                    }
                }
                Ok(None) => {
                    debug!(id = %id, "session state stream ended");
                    break;
                }
                Err(status) if status.code() == tonic::Code::Cancelled => {
                    trace!(id = %id, "session state stream cancelled");
                    break;
                }
                Err(status) => {
                    error!(id = %id, error = %status, "session state stream error");
                    break;
                }
            }
        }
        shutdown.store(true, Ordering::SeqCst);
        // Dropping the stream here tears down the attach RPC.
    }

    /// The node this session is bound to.
    #[allow(dead_code)]
    pub fn node_id(&self) -> i64 {
        self.node_id
    }

    pub fn alive(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst)
    }

    /// Starts query execution on this session and returns the result bound
    /// to the response stream. The stream is not consumed yet; the caller
    /// drives [`QueryResult::receive`].
    pub(crate) async fn exec(
        &self,
        text: impl Into<String>,
        params: HashMap<String, TypedValue>,
        tx_control: Option<TransactionControl>,
        collect: Option<RowSink>,
    ) -> Result<QueryResult, Error> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(Error::Shutdown);
        }

        let request = ExecuteQueryRequest {
            session_id: self.id.clone(),
            exec_mode: ExecMode::Execute as i32,
            tx_control,
            query: Some(execute_query_request::Query::QueryContent(QueryContent {
                syntax: Syntax::YqlV1 as i32,
                text: text.into(),
            })),
            parameters: params,
            stats_mode: StatsMode::Basic as i32,
            concurrent_result_sets: false,
        };

        let stream = self
            .conn
            .new_stream(method::EXECUTE_QUERY, request)
            .await
            .map_err(|err| Error::Exec(format!("unable to start query stream: {err}")))?;

        Ok(QueryResult::new(stream, collect))
    }

    pub(crate) async fn commit_tx(&self, tx_id: &str) -> Result<(), Error> {
        let response: CommitTransactionResponse = self
            .conn
            .invoke(
                method::COMMIT_TRANSACTION,
                CommitTransactionRequest {
                    session_id: self.id.clone(),
                    tx_id: tx_id.to_string(),
                },
            )
            .await
            .map_err(|err| Error::Exec(format!("transaction commit failed: {err}")))?;

        let status = StatusCode::from_raw(response.status);
        if status != StatusCode::Success {
            return Err(Error::Exec(format!(
                "transaction commit status {status:?}: {}",
                render_issues(&response.issues)
            )));
        }
        Ok(())
    }

    pub(crate) async fn rollback_tx(&self, tx_id: &str) -> Result<(), Error> {
        let response: RollbackTransactionResponse = self
            .conn
            .invoke(
                method::ROLLBACK_TRANSACTION,
                RollbackTransactionRequest {
                    session_id: self.id.clone(),
                    tx_id: tx_id.to_string(),
                },
            )
            .await
            .map_err(|err| Error::Exec(format!("transaction rollback failed: {err}")))?;

        let status = StatusCode::from_raw(response.status);
        if status != StatusCode::Success {
            return Err(Error::Exec(format!(
                "transaction rollback status {status:?}: {}",
                render_issues(&response.issues)
            )));
        }
        Ok(())
    }

    /// Cancels the attach stream, waits for the reader to exit and deletes
    /// the server-side session. Safe to call more than once.
    pub(crate) async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.store(true, Ordering::SeqCst);
        self.cancel.cancel();

        let reader = self.reader.lock().take();
        if let Some(handle) = reader {
            let _ = handle.await;
        }

        delete_session(&self.conn, &self.id).await;
        debug!(id = %self.id, "session closed");
    }

    /// Test constructor bypassing the create/attach RPCs.
    #[cfg(test)]
    pub(crate) fn detached(id: &str, conn: Arc<Connection>, shut: bool) -> Self {
        Self {
            id: id.to_string(),
            id_hash: stable_hash(id),
            node_id: 1,
            conn,
            cancel: CancellationToken::new(),
            reader: parking_lot::Mutex::new(None),
            shutdown: Arc::new(AtomicBool::new(shut)),
            closed: AtomicBool::new(false),
        }
    }
}

async fn delete_session(conn: &Connection, id: &str) {
    let deleted = tokio::time::timeout(
        CLEANUP_TIMEOUT,
        conn.invoke::<DeleteSessionRequest, DeleteSessionResponse>(
            method::DELETE_SESSION,
            DeleteSessionRequest {
                session_id: id.to_string(),
            },
        ),
    )
    .await;

    match deleted {
        Ok(Ok(response)) if StatusCode::from_raw(response.status) == StatusCode::Success => {}
        Ok(Ok(response)) => debug!(
            id = %id,
            status = ?StatusCode::from_raw(response.status),
            "session delete refused"
        ),
        Ok(Err(err)) => debug!(id = %id, error = %err, "session delete failed"),
        Err(_) => debug!(id = %id, "session delete timed out"),
    }
}

#[async_trait]
impl PoolItem for Session {
    fn id(&self) -> u64 {
        self.id_hash
    }

    fn alive(&self) -> bool {
        Session::alive(self)
    }

    async fn close(&self) {
        Session::close(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy_conn() -> Arc<Connection> {
        Arc::new(
            Connection::open_lazy("127.0.0.1:1", false, None, "/local/testdb", 1)
                .expect("lazy connection"),
        )
    }

    #[tokio::test]
    async fn test_exec_on_shut_down_session() {
        let sess = Session::detached("sess-1", lazy_conn(), true);
        let err = sess
            .exec("SELECT 1;", HashMap::new(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Shutdown));
    }

    #[tokio::test]
    async fn test_pool_identity_is_the_id_hash() {
        let sess = Session::detached("sess-1", lazy_conn(), false);
        assert_eq!(PoolItem::id(&sess), stable_hash("sess-1"));
        assert!(sess.alive());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let sess = Session::detached("sess-1", lazy_conn(), false);
        // The delete RPC fails fast against an unreachable loopback port;
        // the second close must return immediately without another attempt.
        sess.close().await;
        assert!(!sess.alive());
        sess.close().await;
    }
}
