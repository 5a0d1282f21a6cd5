//! Multi-statement transactions pinned to one pooled session.

use std::collections::HashMap;
use std::time::Duration;

use tracing::trace;

use crate::error::Error;
use crate::pool::Pool;
use crate::query::result::{QueryResult, RowSink};
use crate::query::session::Session;
use crate::ydb::query::{
    transaction_control, transaction_settings, OnlineModeSettings, SerializableModeSettings,
    SnapshotModeSettings, StaleModeSettings, TransactionControl, TransactionSettings,
};
use crate::ydb::value::{TypedValue, Value};

/// Transaction isolation mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TxMode {
    #[default]
    SerializableReadWrite,
    OnlineReadOnly {
        allow_inconsistent: bool,
    },
    SnapshotReadOnly,
    StaleReadOnly,
}

impl TxMode {
    pub(crate) fn to_settings(&self) -> TransactionSettings {
        let tx_mode = match self {
            TxMode::SerializableReadWrite => {
                transaction_settings::TxMode::SerializableReadWrite(SerializableModeSettings {})
            }
            TxMode::OnlineReadOnly { allow_inconsistent } => {
                transaction_settings::TxMode::OnlineReadOnly(OnlineModeSettings {
                    allow_inconsistent_reads: *allow_inconsistent,
                })
            }
            TxMode::SnapshotReadOnly => {
                transaction_settings::TxMode::SnapshotReadOnly(SnapshotModeSettings {})
            }
            TxMode::StaleReadOnly => {
                transaction_settings::TxMode::StaleReadOnly(StaleModeSettings {})
            }
        };
        TransactionSettings {
            tx_mode: Some(tx_mode),
        }
    }

    /// Transaction control for a one-shot statement: begin in this mode and
    /// commit in the same call.
    pub(crate) fn autocommit_control(&self) -> TransactionControl {
        TransactionControl {
            commit_tx: true,
            tx_selector: Some(transaction_control::TxSelector::BeginTx(self.to_settings())),
        }
    }
}

/// A transaction owns one session until committed, rolled back, a statement
/// fails hard, or the transaction is dropped. The transaction id is assigned
/// by the server on the first statement.
pub struct Transaction {
    pool: Pool<Session>,
    sess: Option<Session>,
    mode: TxMode,
    id: String,
    finished: bool,
    default_timeout: Option<Duration>,
}

impl Transaction {
    pub(crate) fn new(
        pool: Pool<Session>,
        sess: Session,
        mode: TxMode,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            pool,
            sess: Some(sess),
            mode,
            id: String::new(),
            finished: false,
            default_timeout,
        }
    }

    /// Server-assigned transaction id; empty until the first statement's
    /// response arrives.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Starts building a statement inside this transaction.
    pub fn query(&mut self, text: impl Into<String>) -> TxQuery<'_> {
        TxQuery {
            tx: self,
            text: text.into(),
            params: HashMap::new(),
            collect: None,
            timeout: None,
            commit: false,
        }
    }

    /// Commits the transaction and releases its session. A failed commit
    /// leaves the transaction open so the caller may still roll back.
    pub async fn commit(&mut self) -> Result<(), Error> {
        if self.finished {
            return Err(Error::TxFinished);
        }
        if !self.id.is_empty() {
            let sess = self.sess.as_ref().ok_or(Error::TxFinished)?;
            sess.commit_tx(&self.id).await?;
        }
        self.finish();
        Ok(())
    }

    /// Rolls the transaction back and releases its session.
    pub async fn rollback(&mut self) -> Result<(), Error> {
        if self.finished {
            return Err(Error::TxFinished);
        }
        if !self.id.is_empty() {
            let sess = self.sess.as_ref().ok_or(Error::TxFinished)?;
            sess.rollback_tx(&self.id).await?;
        }
        self.finish();
        Ok(())
    }

    async fn exec_statement(
        &mut self,
        text: String,
        params: HashMap<String, TypedValue>,
        collect: Option<RowSink>,
        timeout: Option<Duration>,
        commit: bool,
    ) -> Result<QueryResult, Error> {
        if self.finished {
            return Err(Error::TxFinished);
        }
        let sess = self.sess.as_ref().ok_or(Error::TxFinished)?;

        let control = TransactionControl {
            commit_tx: commit,
            tx_selector: Some(if self.id.is_empty() {
                transaction_control::TxSelector::BeginTx(self.mode.to_settings())
            } else {
                transaction_control::TxSelector::TxId(self.id.clone())
            }),
        };

        let run = async {
            let mut res = sess.exec(text, params, Some(control), collect).await?;
            res.receive().await?;
            Ok::<QueryResult, Error>(res)
        };
        let outcome = match timeout.or(self.default_timeout) {
            Some(deadline) => tokio::time::timeout(deadline, run)
                .await
                .map_err(|_| Error::Exec("query deadline exceeded".into()))
                .and_then(|res| res),
            None => run.await,
        };

        match outcome {
            Ok(res) => {
                self.id = res.tx_id().to_string();
                trace!(tx_id = %self.id, "received tx result");
                if commit {
                    self.finish();
                }
                Ok(res)
            }
            Err(err) => {
                // A hard statement failure finishes the transaction.
                self.finish();
                Err(err)
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(sess) = self.sess.take() {
            self.pool.release(sess);
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // End of the owning scope returns the session to the pool; the
        // server expires the transaction itself.
        if let Some(sess) = self.sess.take() {
            self.pool.release(sess);
        }
    }
}

/// One statement inside a transaction. `commit()` makes this the final
/// statement, committing inline.
pub struct TxQuery<'a> {
    tx: &'a mut Transaction,
    text: String,
    params: HashMap<String, TypedValue>,
    collect: Option<RowSink>,
    timeout: Option<Duration>,
    commit: bool,
}

impl TxQuery<'_> {
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

    /// Commit the transaction together with this statement.
    pub fn commit(mut self) -> Self {
        self.commit = true;
        self
    }

    pub async fn exec(self) -> Result<QueryResult, Error> {
        self.tx
            .exec_statement(self.text, self.params, self.collect, self.timeout, self.commit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ydb::query::transaction_settings::TxMode as WireTxMode;

    #[test]
    fn test_mode_settings_shapes() {
        assert!(matches!(
            TxMode::SerializableReadWrite.to_settings().tx_mode,
            Some(WireTxMode::SerializableReadWrite(_))
        ));
        assert!(matches!(
            TxMode::SnapshotReadOnly.to_settings().tx_mode,
            Some(WireTxMode::SnapshotReadOnly(_))
        ));
        assert!(matches!(
            TxMode::StaleReadOnly.to_settings().tx_mode,
            Some(WireTxMode::StaleReadOnly(_))
        ));

        match (TxMode::OnlineReadOnly {
            allow_inconsistent: true,
        })
        .to_settings()
        .tx_mode
        {
            Some(WireTxMode::OnlineReadOnly(settings)) => {
                assert!(settings.allow_inconsistent_reads);
            }
            other => panic!("expected online read only, got {other:?}"),
        }
    }

    #[test]
    fn test_autocommit_control() {
        let control = TxMode::SerializableReadWrite.autocommit_control();
        assert!(control.commit_tx);
        assert!(matches!(
            control.tx_selector,
            Some(transaction_control::TxSelector::BeginTx(_))
        ));
    }
}
