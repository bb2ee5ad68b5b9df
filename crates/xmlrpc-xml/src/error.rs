//! Error types for XML-RPC encoding and decoding.
//!
//! The variants separate malformed XML (reported by the tokenizer) from XML
//! that is well-formed but violates the XML-RPC typing rules or envelope
//! structure, and both from a well-formed fault sent by the remote side.

use std::io;

use xmlrpc_model::Fault;

/// Errors produced while encoding or decoding XML-RPC documents.
#[derive(Debug, thiserror::Error)]
pub enum XmlRpcError {
    /// The document is not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// An I/O error while writing XML.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A protocol element carried text that is not valid for its type, or
    /// an element outside the XML-RPC vocabulary.
    #[error("parse error: {0}")]
    Parse(String),

    /// The document is valid XML-RPC vocabulary but the wrong envelope.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A `dateTime.iso8601` value does not match the accepted format.
    #[error("format error: {0}")]
    Format(String),

    /// The remote side answered with a fault.
    #[error(transparent)]
    Fault(#[from] Fault),

    /// The serializer was given a value the wire format cannot carry.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),
}

impl XmlRpcError {
    /// Returns the fault if this error is an application-level fault.
    #[must_use]
    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            Self::Fault(f) => Some(f),
            _ => None,
        }
    }
}

/// Convenience result type for codec operations.
pub type XmlRpcResult<T> = Result<T, XmlRpcError>;
