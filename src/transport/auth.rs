//! Token acquisition and renewal.
//!
//! [`Auth`] caches the current token behind a RwLock so connections can read
//! it on every call, and renews it in the background: at half the remaining
//! validity after a success, 10 s after a failure. The first token is
//! acquired before the client goes live, retrying every second.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use prost::Message;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{render_issues, Error};
use crate::transport::{Authenticator, Connection};
use crate::ydb::auth::{LoginRequest, LoginResponse, LoginResult};
use crate::ydb::method;
use crate::ydb::status::StatusCode;

const TOKEN_CALL_TIMEOUT: Duration = Duration::from_secs(5);
const TOKEN_RENEW_FAIL_INTERVAL: Duration = Duration::from_secs(10);
const TOKEN_INITIAL_RETRY: Duration = Duration::from_secs(1);

/// Issues a fresh token together with its expiry moment.
#[async_trait]
pub trait TokenProvider: Send + Sync + 'static {
    async fn fetch(&self) -> Result<(String, Instant), Error>;
}

/// Token cache shared between the renew loop and every connection.
pub struct Auth {
    provider: Box<dyn TokenProvider>,
    token: RwLock<String>,
    renew_in: Mutex<Duration>,
}

impl Auth {
    pub fn new(provider: Box<dyn TokenProvider>) -> Self {
        Self {
            provider,
            token: RwLock::new(String::new()),
            renew_in: Mutex::new(TOKEN_RENEW_FAIL_INTERVAL),
        }
    }

    /// Acquires the first token, retrying every second until success or
    /// cancellation.
    pub async fn init(&self, cancel: &CancellationToken) -> Result<(), Error> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Auth("cancelled before first token".into()));
            }
            match self.tick().await {
                Ok(renew) => {
                    *self.renew_in.lock() = renew;
                    return Ok(());
                }
                Err(_) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(Error::Auth("cancelled before first token".into()));
                        }
                        _ = tokio::time::sleep(TOKEN_INITIAL_RETRY) => {}
                    }
                }
            }
        }
    }

    /// Background renew loop.
    pub async fn run(&self, cancel: CancellationToken) {
        debug!("auth token renew started");
        let mut delay = *self.renew_in.lock();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {
                    delay = self.tick().await.unwrap_or(TOKEN_RENEW_FAIL_INTERVAL);
                }
            }
        }
        debug!("auth token renew stopped");
    }

    /// One acquisition attempt; returns the delay until the next renewal.
    async fn tick(&self) -> Result<Duration, Error> {
        let fetched = tokio::time::timeout(TOKEN_CALL_TIMEOUT, self.provider.fetch())
            .await
            .map_err(|_| Error::Auth("token call timed out".into()))
            .and_then(|res| res);

        let (token, expires) = match fetched {
            Ok(pair) => pair,
            Err(err) => {
                error!(error = %err, "token error");
                return Err(err);
            }
        };

        *self.token.write() = token;

        let renew = expires.saturating_duration_since(Instant::now()) / 2;
        info!(renew_in = ?renew, "token retrieved successfully");

        Ok(renew)
    }
}

impl Authenticator for Auth {
    fn token(&self) -> String {
        self.token.read().clone()
    }
}

/// User/password provider backed by `AuthService.Login`. The server does not
/// report validity, so a 12 h lifetime is assumed.
pub struct UserPass {
    conn: Arc<Connection>,
    user: String,
    pass: String,
}

const USERPASS_TOKEN_VALIDITY: Duration = Duration::from_secs(12 * 60 * 60);

impl UserPass {
    pub fn new(conn: Arc<Connection>, user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            conn,
            user: user.into(),
            pass: pass.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for UserPass {
    async fn fetch(&self) -> Result<(String, Instant), Error> {
        let response: LoginResponse = self
            .conn
            .invoke(
                method::LOGIN,
                LoginRequest {
                    user: self.user.clone(),
                    password: self.pass.clone(),
                },
            )
            .await
            .map_err(|err| Error::Auth(format!("login request failed: {err}")))?;

        let operation = response
            .operation
            .ok_or_else(|| Error::Auth("login response carries no operation".into()))?;
        match operation.status() {
            StatusCode::Success => {}
            StatusCode::Unauthorized => return Err(Error::Auth("unauthorized".into())),
            status => {
                return Err(Error::Auth(format!(
                    "login status {status:?}: {}",
                    render_issues(&operation.issues)
                )))
            }
        }

        let any = operation
            .result
            .ok_or_else(|| Error::Auth("login response carries no result".into()))?;
        let result = LoginResult::decode(any.value.as_slice())
            .map_err(|err| Error::Auth(format!("login result unmarshal failed: {err}")))?;

        Ok((result.token, Instant::now() + USERPASS_TOKEN_VALIDITY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct ScriptedProvider {
        calls: AtomicU64,
        fail_first: u64,
    }

    #[async_trait]
    impl TokenProvider for ScriptedProvider {
        async fn fetch(&self) -> Result<(String, Instant), Error> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(Error::Auth("provider unavailable".into()));
            }
            Ok((
                format!("token-{call}"),
                Instant::now() + Duration::from_secs(3600),
            ))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_retries_until_first_token() {
        let auth = Auth::new(Box::new(ScriptedProvider {
            calls: AtomicU64::new(0),
            fail_first: 2,
        }));
        let cancel = CancellationToken::new();

        auth.init(&cancel).await.expect("init succeeds eventually");
        assert_eq!(auth.token(), "token-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_cancelled() {
        let auth = Auth::new(Box::new(ScriptedProvider {
            calls: AtomicU64::new(0),
            fail_first: u64::MAX,
        }));
        let cancel = CancellationToken::new();

        let child = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            child.cancel();
        });

        let err = auth.init(&cancel).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(auth.token().is_empty());
    }

    /// Renewal fires at half the remaining validity: a 3600 s token acquired
    /// at init is refreshed roughly 1800 s later.
    #[tokio::test(start_paused = true)]
    async fn test_renew_at_half_validity() {
        let auth = Arc::new(Auth::new(Box::new(ScriptedProvider {
            calls: AtomicU64::new(0),
            fail_first: 0,
        })));
        let cancel = CancellationToken::new();
        auth.init(&cancel).await.expect("first token");
        assert_eq!(auth.token(), "token-0");

        let runner = auth.clone();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { runner.run(run_cancel).await });

        tokio::time::sleep(Duration::from_secs(1801)).await;
        assert_eq!(auth.token(), "token-1");

        cancel.cancel();
        handle.await.expect("renew loop exits");
    }
}
