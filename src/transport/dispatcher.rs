//! Glue between discovery and the balancing grid.
//!
//! The dispatcher consumes endpoint announcements, opening and closing grid
//! connections accordingly, and doubles as the transport for callers that
//! want any balanced connection. When the grid has nothing alive, calls fail
//! with [`Error::LocalFailure`] so the session spawner backs off instead of
//! spinning.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::discovery::endpoints::Announcement;
use crate::error::Error;
use crate::transport::balancing::{Grid, GridConfig};
use crate::transport::{Authenticator, Connection};

pub struct Dispatcher {
    grid: Grid<Connection>,
    db: String,
    tls: bool,
    auth: Option<Arc<dyn Authenticator>>,
}

impl Dispatcher {
    pub fn new(
        grid_cfg: GridConfig,
        db: impl Into<String>,
        tls: bool,
        auth: Option<Arc<dyn Authenticator>>,
    ) -> Self {
        Self {
            grid: Grid::new(grid_cfg),
            db: db.into(),
            tls,
            auth,
        }
    }

    /// Selects a balanced connection. The caller may pin the returned
    /// connection for follow-up calls that must land on the same node.
    pub fn get_conn(&self) -> Result<Arc<Connection>, Error> {
        self.grid.get_conn().ok_or(Error::LocalFailure)
    }

    /// Unary call over any balanced connection.
    #[allow(dead_code)]
    pub async fn invoke<Req, Resp>(&self, method: &'static str, message: Req) -> Result<Resp, Error>
    where
        Req: prost::Message + 'static,
        Resp: prost::Message + Default + 'static,
    {
        self.get_conn()?.invoke(method, message).await
    }

    /// Server-streaming call over any balanced connection.
    #[allow(dead_code)]
    pub async fn new_stream<Req, Resp>(
        &self,
        method: &'static str,
        message: Req,
    ) -> Result<tonic::codec::Streaming<Resp>, Error>
    where
        Req: prost::Message + 'static,
        Resp: prost::Message + Default + 'static,
    {
        self.get_conn()?.new_stream(method, message).await
    }

    /// Announcement loop: feeds the grid until cancelled.
    pub async fn run(
        &self,
        mut announcements: mpsc::Receiver<Announcement>,
        cancel: CancellationToken,
    ) {
        debug!("dispatcher started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = announcements.recv() => {
                    let Some(announcement) = received else { break };
                    self.process(announcement);
                }
            }
        }
        debug!("dispatcher stopped");
    }

    fn process(&self, announcement: Announcement) {
        for ep in &announcement.add {
            let address = ep.full_address();
            let created = self.grid.add(&ep.location, || {
                Connection::open_lazy(
                    &address,
                    self.tls,
                    self.auth.clone(),
                    self.db.clone(),
                    ep.address_hash,
                )
                .map(Arc::new)
            });
            match created {
                Ok(()) => debug!(address = %address, location = %ep.location, "endpoint added"),
                Err(err) => error!(address = %address, error = %err, "unable to add endpoint"),
            }
        }

        for ep in &announcement.del {
            let address = ep.full_address();
            match self.grid.delete(&ep.location, ep.address_hash) {
                Ok(()) => debug!(address = %address, location = %ep.location, "endpoint deleted"),
                Err(err) => error!(address = %address, error = %err, "unable to delete endpoint"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::endpoints::EndpointInfo;
    use crate::hashing::stable_hash;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            GridConfig {
                location_preference: vec!["zone-a".to_string()],
                connections_per_endpoint: 2,
                ignore_locations: false,
            },
            "/local/testdb",
            false,
            None,
        )
    }

    fn endpoint(node_id: u32, address: &str, location: &str) -> EndpointInfo {
        EndpointInfo {
            node_id,
            address: address.to_string(),
            port: 2136,
            location: location.to_string(),
            address_hash: stable_hash(&format!("{address}:2136")),
        }
    }

    #[test]
    fn test_empty_grid_is_a_local_failure() {
        let d = dispatcher();
        let err = d.get_conn().unwrap_err();
        assert!(err.is_local_failure());
    }

    /// The transport façade fails locally before anything goes on the wire.
    #[tokio::test]
    async fn test_facade_calls_fail_locally_on_empty_grid() {
        use crate::ydb::method;
        use crate::ydb::query::{
            AttachSessionRequest, CreateSessionRequest, CreateSessionResponse, SessionState,
        };

        let d = dispatcher();
        let err = d
            .invoke::<CreateSessionRequest, CreateSessionResponse>(
                method::CREATE_SESSION,
                CreateSessionRequest {},
            )
            .await
            .unwrap_err();
        assert!(err.is_local_failure());

        let err = d
            .new_stream::<AttachSessionRequest, SessionState>(
                method::ATTACH_SESSION,
                AttachSessionRequest {
                    session_id: "sess".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_local_failure());
    }

    #[tokio::test]
    async fn test_announcements_populate_and_drain_the_grid() {
        let d = dispatcher();
        let ep = endpoint(1, "node-a", "zone-a");

        d.process(Announcement {
            add: vec![ep.clone()],
            del: vec![],
        });
        let conn = d.get_conn().expect("connection after add");
        assert_eq!(conn.id(), ep.address_hash);

        d.process(Announcement {
            add: vec![],
            del: vec![ep],
        });
        assert!(d.get_conn().unwrap_err().is_local_failure());
    }

    #[test]
    fn test_delete_of_unknown_endpoint_is_logged_not_fatal() {
        let d = dispatcher();
        // Must not panic; the error is swallowed after logging.
        d.process(Announcement {
            add: vec![],
            del: vec![endpoint(9, "gone", "zone-a")],
        });
    }
}
