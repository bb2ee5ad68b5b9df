//! Client error types.

use xmlrpc_model::Fault;
use xmlrpc_xml::XmlRpcError;

/// Errors returned by [`Client`](crate::Client).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The configuration cannot produce a usable client.
    #[error("invalid client configuration: {0}")]
    Config(String),

    /// The HTTP exchange failed (connect, timeout, body read).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success HTTP status.
    #[error("HTTP status {status}")]
    Status {
        /// Response status.
        status: reqwest::StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },

    /// Encoding the call or decoding the response failed, or the server
    /// returned a fault.
    #[error(transparent)]
    Rpc(#[from] XmlRpcError),
}

impl ClientError {
    /// Returns the application fault, if the server sent one.
    #[must_use]
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Rpc(e) => e.as_fault(),
            _ => None,
        }
    }
}
