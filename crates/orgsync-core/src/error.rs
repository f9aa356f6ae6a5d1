// ── Core error types ──
//
// Errors consumers of the sync engine see. HTTP details are folded into
// a human-readable message; the `From<orgsync_api::Error>` impl does the
// translation.

use orgsync_api::EntityKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach server at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Push channel is not connected")]
    NotConnected,

    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    /// The server's message, e.g. "Organization not found".
    #[error("{message}")]
    NotFound { message: String },

    /// A non-success response. `message` is the server's text or
    /// `Error Code: <status>`.
    #[error("{message}")]
    Api { message: String, status: Option<u16> },

    #[error("Failed to refresh {entity} records: {message}")]
    RefreshFailed { entity: EntityKind, message: String },

    // ── Local errors ─────────────────────────────────────────────────
    #[error("Shared storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<orgsync_api::Error> for CoreError {
    fn from(err: orgsync_api::Error) -> Self {
        use orgsync_api::Error as Api;

        match err {
            Api::Http {
                status: 404,
                message,
            } => CoreError::NotFound { message },
            Api::Http { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            Api::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            Api::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Unexpected response: {message}"))
            }
            Api::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            Api::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            Api::Protocol(msg) => CoreError::Internal(format!("Protocol error: {msg}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_404_becomes_not_found_with_server_text() {
        let err = CoreError::from(orgsync_api::Error::Http {
            status: 404,
            message: "Staff member not found".into(),
        });
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Staff member not found");
    }

    #[test]
    fn other_statuses_keep_message_and_code() {
        let err = CoreError::from(orgsync_api::Error::Http {
            status: 500,
            message: "Error Code: 500".into(),
        });
        assert!(matches!(err, CoreError::Api { status: Some(500), .. }));
        assert_eq!(err.to_string(), "Error Code: 500");
    }

    #[test]
    fn refresh_failure_names_the_entity() {
        let err = CoreError::RefreshFailed {
            entity: EntityKind::Staff,
            message: "Error Code: 503".into(),
        };
        assert_eq!(err.to_string(), "Failed to refresh staff records: Error Code: 503");
    }
}
