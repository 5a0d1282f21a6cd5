//! Periodic endpoint discovery.
//!
//! The service lists cluster endpoints on a fixed interval (shortened after
//! failures), filters the listing, diffs it against the current endpoint set
//! and announces the changes. Failures are logged and retried; they never
//! reach the announcement consumer.

pub mod endpoints;

use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{render_issues, Error};
use crate::transport::Connection;
use crate::ydb::discovery::{ListEndpointsRequest, ListEndpointsResponse, ListEndpointsResult};
use crate::ydb::method;
use crate::ydb::status::StatusCode;

use endpoints::{Announcement, EndpointInfo, EndpointSet, Filter};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(3);
const DISCOVERY_INTERVAL: Duration = Duration::from_secs(30);
const DISCOVERY_ERR_RETRY: Duration = Duration::from_secs(2);

const LIST_ENDPOINTS_RESULT_TYPE: &str = "Ydb.Discovery.ListEndpointsResult";

pub struct Discovery {
    conn: Arc<Connection>,
    db: String,
    filter: Filter,
    set: EndpointSet,
    announce_tx: mpsc::Sender<Announcement>,
}

impl Discovery {
    /// Creates the service together with the announcement receiver consumed
    /// by the dispatcher. The channel holds one in-flight announcement; the
    /// loop blocks on the send until the consumer catches up.
    pub fn new(
        conn: Arc<Connection>,
        db: impl Into<String>,
        prefer_locations: Vec<String>,
    ) -> (Self, mpsc::Receiver<Announcement>) {
        let (announce_tx, announce_rx) = mpsc::channel(1);
        let svc = Self {
            conn,
            db: db.into(),
            filter: Filter::new()
                .with_query_service()
                .prefer_locations(prefer_locations),
            set: EndpointSet::default(),
            announce_tx,
        };
        (svc, announce_rx)
    }

    /// Snapshot of the currently known endpoints.
    pub fn endpoints(&self) -> Vec<EndpointInfo> {
        self.set.snapshot()
    }

    pub async fn run(&self, cancel: CancellationToken) {
        debug!("discovery started");
        loop {
            let interval = self.tick(&cancel).await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        debug!("discovery stopped");
    }

    /// One listing round; returns the delay before the next one.
    async fn tick(&self, cancel: &CancellationToken) -> Duration {
        let listed = tokio::time::timeout(DISCOVERY_TIMEOUT, self.list_endpoints()).await;
        match listed {
            Err(_) => {
                error!(db = %self.db, "endpoints listing timed out");
                DISCOVERY_ERR_RETRY
            }
            Ok(Err(err)) => {
                error!(db = %self.db, error = %err, "endpoints listing failed");
                DISCOVERY_ERR_RETRY
            }
            Ok(Ok(listing)) => {
                debug!(count = listing.len(), "endpoints listing succeeded");
                self.update_and_announce(cancel, listing).await;
                DISCOVERY_INTERVAL
            }
        }
    }

    async fn list_endpoints(&self) -> Result<Vec<EndpointInfo>, Error> {
        let response: ListEndpointsResponse = self
            .conn
            .invoke(
                method::LIST_ENDPOINTS,
                ListEndpointsRequest {
                    database: self.db.clone(),
                },
            )
            .await
            .map_err(|err| Error::Discovery(format!("unable to get endpoints: {err}")))?;

        let operation = response
            .operation
            .ok_or_else(|| Error::Discovery("response carries no operation".into()))?;
        if operation.status() != StatusCode::Success {
            return Err(Error::Discovery(format!(
                "operation status {:?}: {}",
                operation.status(),
                render_issues(&operation.issues)
            )));
        }

        let any = operation
            .result
            .ok_or_else(|| Error::Discovery("operation carries no result".into()))?;
        if !any.type_url.ends_with(LIST_ENDPOINTS_RESULT_TYPE) {
            return Err(Error::Discovery(format!(
                "unexpected result type: {}",
                any.type_url
            )));
        }
        let result = ListEndpointsResult::decode(any.value.as_slice())
            .map_err(|err| Error::Discovery(format!("unable to unmarshal endpoints: {err}")))?;

        let (preferred, fallback) = self.filter.split(&result.endpoints);
        if preferred.is_empty() {
            // Degraded mode: no preferred endpoint survived the filter.
            return Ok(fallback);
        }
        Ok(preferred)
    }

    async fn update_and_announce(&self, cancel: &CancellationToken, listing: Vec<EndpointInfo>) {
        if self.set.matches(&listing) {
            return;
        }

        let was = self.set.len();
        let announcement = self.set.replace(listing);
        info!(
            was,
            now = self.set.len(),
            added = announcement.add.len(),
            removed = announcement.del.len(),
            "endpoints changed"
        );

        if announcement.is_empty() {
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = self.announce_tx.send(announcement) => {}
        }
    }
}
