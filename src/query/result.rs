//! Streamed query result assembly.
//!
//! Result parts arrive on a server stream. Parts are folded into one
//! [`QueryResult`]: issues accumulate across parts, columns are captured
//! from the first result set, rows either go to a caller-supplied sink or
//! into an internal buffer, and execution stats mark the final part. The
//! result stays readable after the stream is done.

use futures::{Stream, StreamExt};
use tonic::codec::Streaming;
use tracing::trace;

use crate::error::{render_issues, Error};
use crate::ydb::issue::IssueMessage;
use crate::ydb::query::{Column, ExecuteQueryResponsePart, QueryStats};
use crate::ydb::status::StatusCode;
use crate::ydb::value::Value;

/// Caller-supplied row sink, invoked once per result part with that part's
/// rows. Returning an error aborts the stream.
pub type RowSink = Box<dyn FnMut(Vec<Value>) -> Result<(), Error> + Send>;

pub struct QueryResult<S = Streaming<ExecuteQueryResponsePart>> {
    stream: Option<S>,
    collect: Option<RowSink>,

    cols: Vec<Column>,
    rows: Vec<Value>,
    issues: Vec<IssueMessage>,
    stats: Option<QueryStats>,
    tx_id: String,
    err: Option<Error>,
}

impl<S> std::fmt::Debug for QueryResult<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResult")
            .field("cols", &self.cols)
            .field("rows", &self.rows)
            .field("issues", &self.issues)
            .field("stats", &self.stats)
            .field("tx_id", &self.tx_id)
            .field("err", &self.err)
            .finish()
    }
}

impl<S> QueryResult<S>
where
    S: Stream<Item = Result<ExecuteQueryResponsePart, tonic::Status>> + Unpin,
{
    pub(crate) fn new(stream: S, collect: Option<RowSink>) -> Self {
        Self {
            stream: Some(stream),
            collect,
            cols: Vec::new(),
            rows: Vec::new(),
            issues: Vec::new(),
            stats: None,
            tx_id: String::new(),
            err: None,
        }
    }

    /// Reads parts until completion. Parts arrive sequentially, since
    /// concurrent result sets are disabled on the request.
    ///
    /// Transport problems reading the stream are returned; server-reported
    /// problems (part status, issues) are recorded and exposed via
    /// [`err`](Self::err).
    pub(crate) async fn receive(&mut self) -> Result<(), Error> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };

        loop {
            let part = match stream.next().await {
                None => {
                    self.stop();
                    return Err(Error::Stream("unexpected end of stream".into()));
                }
                Some(Err(status)) => {
                    self.stop();
                    return Err(Error::Stream(status.to_string()));
                }
                Some(Ok(part)) => part,
            };
            trace!(status = part.status, "received result part");

            self.issues.extend(part.issues.iter().cloned());

            let status = StatusCode::from_raw(part.status);
            if status != StatusCode::Success {
                self.err = Some(Error::PartStatus {
                    status,
                    issues: render_issues(&part.issues),
                });
                break;
            }

            if let Some(tx_meta) = &part.tx_meta {
                self.tx_id = tx_meta.id.clone();
            }

            if !part.issues.is_empty() {
                self.err = Some(Error::Issues(render_issues(&self.issues)));
            }

            if let Some(result_set) = part.result_set {
                if self.cols.is_empty() && !result_set.columns.is_empty() {
                    self.cols = result_set.columns;
                }
                if !result_set.rows.is_empty() {
                    if let Some(sink) = self.collect.as_mut() {
                        if let Err(err) = sink(result_set.rows) {
                            self.err = Some(err);
                            break;
                        }
                    } else {
                        self.rows.extend(result_set.rows);
                    }
                }
            }

            if let Some(stats) = part.exec_stats {
                // Stats mark the last part.
                self.stats = Some(stats);
                break;
            }
        }

        self.stop();
        Ok(())
    }

    /// Drops the stream, cancelling the underlying RPC. Collected data stays
    /// readable.
    fn stop(&mut self) {
        self.stream = None;
    }
}

impl<S> QueryResult<S> {
    pub fn cols(&self) -> &[Column] {
        &self.cols
    }

    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Value> {
        self.rows
    }

    pub fn issues(&self) -> &[IssueMessage] {
        &self.issues
    }

    pub fn stats(&self) -> Option<&QueryStats> {
        self.stats.as_ref()
    }

    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    /// Server-reported failure of an otherwise completed result: a part
    /// arrived with non-SUCCESS status, or issues were attached.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }
}
