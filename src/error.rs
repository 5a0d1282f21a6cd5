use thiserror::Error;

use crate::ydb::issue::IssueMessage;
use crate::ydb::status::StatusCode;

/// All errors surfaced by this crate.
///
/// Variants follow the failure domains of the client: configuration,
/// transport, discovery, session lifecycle, query execution and result
/// streaming. Background loops never return these to the caller directly
/// (they log and retry), so every variant here is reachable from a public
/// operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    /// The authenticator returned an empty token. The call is failed locally
    /// instead of being sent unauthenticated.
    #[error("authenticator did not provide token")]
    NoToken,

    /// No alive connection in the balancer. Distinguished from [`Transport`]
    /// so the session spawner can back off instead of hot-looping.
    ///
    /// [`Transport`]: Error::Transport
    #[error("no alive connections")]
    LocalFailure,

    #[error("discovery error: {0}")]
    Discovery(String),

    #[error("session error: {0}")]
    Session(String),

    /// The session was marked shut down before the operation started.
    #[error("session is shut down")]
    Shutdown,

    #[error("query execution failed: {0}")]
    Exec(String),

    #[error("result stream error: {0}")]
    Stream(String),

    /// A result part arrived with a non-SUCCESS status.
    #[error("result part status {status:?}: {issues}")]
    PartStatus { status: StatusCode, issues: String },

    /// The query completed but the server attached issues to the result.
    #[error("query result has issues: {0}")]
    Issues(String),

    #[error("transaction already finished")]
    TxFinished,

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl Error {
    /// True for errors that originate on this side of the wire without any
    /// request having been sent.
    pub fn is_local_failure(&self) -> bool {
        matches!(self, Error::LocalFailure)
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Error::Transport(status.to_string())
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<tonic::codegen::http::uri::InvalidUri> for Error {
    fn from(err: tonic::codegen::http::uri::InvalidUri) -> Self {
        Error::Config(format!("invalid endpoint uri: {err}"))
    }
}

/// Renders server issues into a single log-friendly line.
pub(crate) fn render_issues(issues: &[IssueMessage]) -> String {
    issues
        .iter()
        .map(|issue| issue.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_converts_to_transport() {
        let status = tonic::Status::unavailable("backend is down");
        let err = Error::from(status);
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.to_string().contains("backend is down"));
    }

    #[test]
    fn test_local_failure_is_distinguished() {
        assert!(Error::LocalFailure.is_local_failure());
        assert!(!Error::Transport("x".into()).is_local_failure());
        assert!(!Error::NoToken.is_local_failure());
    }

    #[test]
    fn test_render_issues_joins_messages() {
        let issues = vec![
            IssueMessage {
                message: "first".into(),
                issue_code: 1,
                severity: 1,
                issues: vec![],
            },
            IssueMessage {
                message: "second".into(),
                issue_code: 2,
                severity: 1,
                issues: vec![],
            },
        ];
        assert_eq!(render_issues(&issues), "first; second");
    }
}
