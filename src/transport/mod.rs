//! Low-level gRPC plumbing: one [`Connection`] per endpoint channel.
//!
//! Every outgoing call is decorated with the database header and, when an
//! authenticator is configured, the auth ticket. Calls are issued through
//! [`tonic::client::Grpc`] directly so a single connection type serves every
//! service without generated client stubs.

pub mod auth;
pub mod balancing;
pub mod dispatcher;
pub mod tls;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tonic::client::Grpc;
use tonic::codec::{ProstCodec, Streaming};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::transport::{Channel, Endpoint};
use tracing::trace;

use crate::error::Error;
use crate::transport::balancing::BalancedItem;

const HEADER_DATABASE: &str = "x-ydb-database";
const HEADER_AUTH_TICKET: &str = "x-ydb-auth-ticket";

/// Read-side of the token cache. Implementations must be cheap to call;
/// connections consult it on every RPC.
pub trait Authenticator: Send + Sync + 'static {
    fn token(&self) -> String;
}

/// Normalizes an endpoint address into a channel URI. Addresses may come
/// with an explicit scheme (`grpc://`, `grpcs://`, `http://`, `https://`)
/// or as a bare `host:port`.
pub(crate) fn endpoint_uri(address: &str, tls: bool) -> String {
    if let Some(rest) = address.strip_prefix("grpc://") {
        return format!("http://{rest}");
    }
    if let Some(rest) = address.strip_prefix("grpcs://") {
        return format!("https://{rest}");
    }
    if address.starts_with("http://") || address.starts_with("https://") {
        return address.to_string();
    }
    if tls {
        format!("https://{address}")
    } else {
        format!("http://{address}")
    }
}

fn endpoint_for(address: &str, tls: bool) -> Result<Endpoint, Error> {
    let uri = endpoint_uri(address, tls);
    let endpoint = Endpoint::from_shared(uri)?;
    if tls {
        return Ok(endpoint.tls_config(tls::client_tls())?);
    }
    Ok(endpoint)
}

/// Dials `address`, verifying reachability before returning the channel.
/// Used for the bootstrap transport where a dead node must be skipped.
pub(crate) async fn dial(address: &str, tls: bool) -> Result<Channel, Error> {
    Ok(endpoint_for(address, tls)?.connect().await?)
}

/// Dials the initial nodes in order and returns the first one that answers.
pub(crate) async fn dial_any(
    addresses: &[String],
    tls: bool,
) -> Result<(String, Channel), Error> {
    for address in addresses {
        match dial(address, tls).await {
            Ok(channel) => return Ok((address.clone(), channel)),
            Err(err) => {
                tracing::warn!(address = %address, error = %err, "initial node unreachable");
            }
        }
    }
    Err(Error::Transport("unable to reach any initial node".into()))
}

/// A persistent streaming channel to one endpoint.
///
/// The channel reconnects internally; `alive` turns false only once the
/// connection is closed by its owner (the balancer grid on endpoint removal,
/// or client shutdown). Per-call failures propagate to the caller instead of
/// flipping liveness, and cluster health is driven by discovery announcements.
pub struct Connection {
    channel: Channel,
    auth: Option<Arc<dyn Authenticator>>,
    db: String,
    id: u64,
    closed: AtomicBool,
}

impl Connection {
    /// Wraps an already-dialed channel.
    pub(crate) fn from_channel(
        channel: Channel,
        auth: Option<Arc<dyn Authenticator>>,
        db: impl Into<String>,
        id: u64,
    ) -> Self {
        Self {
            channel,
            auth,
            db: db.into(),
            id,
            closed: AtomicBool::new(false),
        }
    }

    /// Creates a connection with a lazily-dialed channel. The dial happens
    /// on first use, which keeps endpoint addition cheap and non-blocking.
    pub(crate) fn open_lazy(
        address: &str,
        tls: bool,
        auth: Option<Arc<dyn Authenticator>>,
        db: impl Into<String>,
        id: u64,
    ) -> Result<Self, Error> {
        let channel = endpoint_for(address, tls)?.connect_lazy();
        Ok(Self::from_channel(channel, auth, db, id))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn alive(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            trace!(id = self.id, "connection closed");
        }
    }

    fn call_metadata(&self) -> Result<MetadataMap, Error> {
        let mut md = MetadataMap::new();
        let db = MetadataValue::try_from(self.db.as_str())
            .map_err(|_| Error::Transport(format!("invalid database header: {}", self.db)))?;
        md.insert(HEADER_DATABASE, db);

        if let Some(auth) = &self.auth {
            let token = auth.token();
            if token.is_empty() {
                return Err(Error::NoToken);
            }
            let ticket = MetadataValue::try_from(token.as_str())
                .map_err(|_| Error::Transport("invalid auth ticket value".into()))?;
            md.insert(HEADER_AUTH_TICKET, ticket);
        }

        Ok(md)
    }

    fn request_for<Req>(&self, message: Req) -> Result<tonic::Request<Req>, Error> {
        let mut request = tonic::Request::new(message);
        *request.metadata_mut() = self.call_metadata()?;
        Ok(request)
    }

    /// Issues a unary call on this connection.
    pub async fn invoke<Req, Resp>(&self, method: &'static str, message: Req) -> Result<Resp, Error>
    where
        Req: prost::Message + 'static,
        Resp: prost::Message + Default + 'static,
    {
        let request = self.request_for(message)?;
        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|err| Error::Transport(format!("channel not ready: {err}")))?;
        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        let response = grpc
            .unary(request, PathAndQuery::from_static(method), codec)
            .await?;
        Ok(response.into_inner())
    }

    /// Opens a server-streaming call on this connection. Dropping the
    /// returned stream cancels the RPC.
    pub async fn new_stream<Req, Resp>(
        &self,
        method: &'static str,
        message: Req,
    ) -> Result<Streaming<Resp>, Error>
    where
        Req: prost::Message + 'static,
        Resp: prost::Message + Default + 'static,
    {
        let request = self.request_for(message)?;
        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|err| Error::Transport(format!("channel not ready: {err}")))?;
        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        let response = grpc
            .server_streaming(request, PathAndQuery::from_static(method), codec)
            .await?;
        Ok(response.into_inner())
    }
}

impl BalancedItem for Connection {
    fn id(&self) -> u64 {
        self.id
    }

    fn alive(&self) -> bool {
        Connection::alive(self)
    }

    fn close(&self) {
        Connection::close(self)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("db", &self.db)
            .field("id", &self.id)
            .field("alive", &self.alive())
            .finish()
    }
}
