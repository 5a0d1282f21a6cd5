//! Client assembly: wires discovery, the dispatcher grid, authentication and
//! the session pool together and owns every background task.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{Config, Credentials};
use crate::discovery::endpoints::EndpointInfo;
use crate::discovery::Discovery;
use crate::error::Error;
use crate::hashing::stable_hash;
use crate::query::{QueryClient, QueryClientConfig};
use crate::transport::auth::{Auth, UserPass};
use crate::transport::balancing::GridConfig;
use crate::transport::dispatcher::Dispatcher;
use crate::transport::{self, Authenticator, Connection};

/// An open client: discovery, balancing and the session pool are running in
/// the background, and [`query`](Client::query) hands out the execution
/// surface.
pub struct Client {
    discovery: Arc<Discovery>,
    query: QueryClient,

    cancel: CancellationToken,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    close_lock: tokio::sync::Mutex<bool>,
}

impl Client {
    /// Validates the configuration, dials the initial nodes for a bootstrap
    /// transport, acquires the first auth token when credentials are
    /// configured and starts the background loops.
    ///
    /// The returned client is live but possibly not yet ready: sessions are
    /// created asynchronously as discovery fills the balancer. Use
    /// [`wait_ready`](Client::wait_ready) to block until the pool reports
    /// readiness.
    pub async fn connect(cfg: Config) -> Result<Self, Error> {
        cfg.validate()?;

        let cancel = CancellationToken::new();

        let (bootstrap_addr, channel) = transport::dial_any(&cfg.initial_nodes, cfg.tls).await?;
        debug!(address = %bootstrap_addr, "bootstrap transport established");

        let auth = match &cfg.credentials {
            Credentials::Anonymous => None,
            Credentials::UserPass { username, password } => {
                // Login goes over the bootstrap channel without a ticket.
                let login_conn = Arc::new(Connection::from_channel(
                    channel.clone(),
                    None,
                    cfg.db.clone(),
                    stable_hash(&bootstrap_addr),
                ));
                let auth = Arc::new(Auth::new(Box::new(UserPass::new(
                    login_conn,
                    username.clone(),
                    password.clone(),
                ))));
                auth.init(&cancel).await?;
                Some(auth)
            }
        };
        let authenticator: Option<Arc<dyn Authenticator>> =
            auth.clone().map(|a| a as Arc<dyn Authenticator>);

        let bootstrap_conn = Arc::new(Connection::from_channel(
            channel,
            authenticator.clone(),
            cfg.db.clone(),
            stable_hash(&bootstrap_addr),
        ));

        let (discovery, announcements) = Discovery::new(
            bootstrap_conn,
            cfg.db.clone(),
            cfg.location_preference.clone(),
        );
        let discovery = Arc::new(discovery);

        let dispatcher = Arc::new(Dispatcher::new(
            GridConfig {
                location_preference: cfg.location_preference.clone(),
                connections_per_endpoint: cfg.connections_per_endpoint,
                ignore_locations: false,
            },
            cfg.db.clone(),
            cfg.tls,
            authenticator,
        ));

        let query = QueryClient::new(
            dispatcher.clone(),
            QueryClientConfig {
                session_pool_size: cfg.session_pool_size,
                session_create_timeout: cfg.session_create_timeout,
                session_lifetime: cfg.session_lifetime,
                session_recycle_window: cfg.session_recycle_window,
                pool_ready_high_pct: cfg.pool_ready_high_pct,
                pool_ready_low_pct: cfg.pool_ready_low_pct,
                default_tx_mode: cfg.tx_mode,
                default_query_timeout: cfg.query_timeout,
            },
        );

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn({
            let discovery = discovery.clone();
            let token = cancel.child_token();
            async move { discovery.run(token).await }
        }));
        tasks.push(tokio::spawn({
            let dispatcher = dispatcher.clone();
            let token = cancel.child_token();
            async move { dispatcher.run(announcements, token).await }
        }));
        if let Some(auth) = auth {
            tasks.push(tokio::spawn({
                let token = cancel.child_token();
                async move { auth.run(token).await }
            }));
        }

        Ok(Self {
            discovery,
            query,
            cancel,
            tasks: parking_lot::Mutex::new(tasks),
            close_lock: tokio::sync::Mutex::new(false),
        })
    }

    /// The query execution surface.
    pub fn query(&self) -> &QueryClient {
        &self.query
    }

    /// Session pool readiness.
    pub fn ready(&self) -> bool {
        self.query.ready()
    }

    /// Waits until the session pool reports readiness; false on timeout.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while !self.ready() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Snapshot of the currently discovered endpoints.
    pub fn endpoints(&self) -> Vec<EndpointInfo> {
        self.discovery.endpoints()
    }

    /// Stops every background loop, closes the session pool and joins the
    /// tasks. Safe to call more than once.
    pub async fn close(&self) {
        let mut guard = self.close_lock.lock().await;
        if *guard {
            return;
        }
        *guard = true;

        self.cancel.cancel();
        self.query.close().await;

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }

        debug!("client closed");
    }
}
