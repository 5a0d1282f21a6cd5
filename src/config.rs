//! Client configuration.

use std::time::Duration;

use crate::error::Error;
use crate::query::transaction::TxMode;

const DEFAULT_SESSION_CREATE_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_SESSION_POOL_SIZE: usize = 10;
const DEFAULT_CONNECTIONS_PER_ENDPOINT: usize = 2;
const DEFAULT_POOL_READY_HIGH_PCT: u8 = 50;
const DEFAULT_POOL_READY_LOW_PCT: u8 = 0;

/// Authentication choice for the cluster.
#[derive(Debug, Clone, Default)]
pub enum Credentials {
    /// No auth ticket is attached to calls.
    #[default]
    Anonymous,
    /// `AuthService.Login` with background token renewal.
    UserPass { username: String, password: String },
}

/// Configuration for [`Client::connect`](crate::Client::connect).
///
/// ```
/// use std::time::Duration;
/// use ydb_connect::Config;
///
/// let cfg = Config::new(["grpc://localhost:2136"], "/local/testdb")
///     .with_location_preference(["zone-a", "zone-b"])
///     .with_session_pool_size(24)
///     .with_query_timeout(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) initial_nodes: Vec<String>,
    pub(crate) db: String,

    pub(crate) location_preference: Vec<String>,
    pub(crate) connections_per_endpoint: usize,

    pub(crate) session_pool_size: usize,
    pub(crate) session_create_timeout: Duration,
    pub(crate) session_lifetime: Duration,
    pub(crate) session_recycle_window: Duration,
    pub(crate) pool_ready_high_pct: u8,
    pub(crate) pool_ready_low_pct: u8,

    pub(crate) query_timeout: Option<Duration>,

    pub(crate) tls: bool,
    pub(crate) credentials: Credentials,
    pub(crate) tx_mode: TxMode,
}

impl Config {
    /// Seed addresses for initial discovery plus the database path attached
    /// to every request.
    pub fn new(
        initial_nodes: impl IntoIterator<Item = impl Into<String>>,
        db: impl Into<String>,
    ) -> Self {
        Self {
            initial_nodes: initial_nodes.into_iter().map(Into::into).collect(),
            db: db.into(),
            location_preference: Vec::new(),
            connections_per_endpoint: DEFAULT_CONNECTIONS_PER_ENDPOINT,
            session_pool_size: DEFAULT_SESSION_POOL_SIZE,
            session_create_timeout: DEFAULT_SESSION_CREATE_TIMEOUT,
            session_lifetime: Duration::ZERO,
            session_recycle_window: Duration::ZERO,
            pool_ready_high_pct: DEFAULT_POOL_READY_HIGH_PCT,
            pool_ready_low_pct: DEFAULT_POOL_READY_LOW_PCT,
            query_timeout: Some(DEFAULT_QUERY_TIMEOUT),
            tls: false,
            credentials: Credentials::default(),
            tx_mode: TxMode::default(),
        }
    }

    /// Ordered list of locations preferred by the balancer and the
    /// discovery filter.
    pub fn with_location_preference(
        mut self,
        locations: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.location_preference = locations.into_iter().map(Into::into).collect();
        self
    }

    /// Connections opened per discovered endpoint. Values below one are
    /// ignored.
    pub fn with_connections_per_endpoint(mut self, connections: usize) -> Self {
        if connections > 0 {
            self.connections_per_endpoint = connections;
        }
        self
    }

    pub fn with_session_pool_size(mut self, size: usize) -> Self {
        self.session_pool_size = size;
        self
    }

    pub fn with_session_create_timeout(mut self, timeout: Duration) -> Self {
        self.session_create_timeout = timeout;
        self
    }

    /// Recycle sessions after `lifetime`, spread by `window` noise.
    pub fn with_session_lifetime(mut self, lifetime: Duration, window: Duration) -> Self {
        self.session_lifetime = lifetime;
        self.session_recycle_window = window;
        self
    }

    /// Readiness hysteresis thresholds in percent of the pool size.
    pub fn with_session_pool_ready_thresholds(mut self, high: u8, low: u8) -> Self {
        self.pool_ready_high_pct = high;
        self.pool_ready_low_pct = low;
        self
    }

    /// Default deadline applied to every query; individual queries may
    /// override it.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Disables the default per-query deadline.
    pub fn without_query_timeout(mut self) -> Self {
        self.query_timeout = None;
        self
    }

    pub fn with_tls(mut self) -> Self {
        self.tls = true;
        self
    }

    pub fn with_user_pass(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Credentials::UserPass {
            username: username.into(),
            password: password.into(),
        };
        self
    }

    /// Default transaction mode for queries and transactions.
    pub fn with_tx_mode(mut self, mode: TxMode) -> Self {
        self.tx_mode = mode;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.initial_nodes.is_empty() {
            return Err(Error::Config("no initial nodes were provided".into()));
        }
        if self.db.is_empty() {
            return Err(Error::Config("db is empty".into()));
        }
        Ok(())
    }
}
