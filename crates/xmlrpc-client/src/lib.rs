//! Async XML-RPC client.
//!
//! A [`Client`] POSTs `methodCall` documents over HTTP with `reqwest` and
//! decodes the `methodResponse`. Faults come back as
//! [`ClientError::Rpc`] and are reachable through [`ClientError::fault`].
//!
//! ```no_run
//! use xmlrpc_client::{Client, ClientConfig};
//! use xmlrpc_model::Value;
//!
//! # async fn run() -> Result<(), xmlrpc_client::ClientError> {
//! let client = Client::new(&ClientConfig::for_url("http://localhost:8080/RPC2"))?;
//! let sum = client.method_call("sample.add", &[Value::Int(2), Value::Int(3)]).await?;
//! assert_eq!(sum.as_i32(), Some(5));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;

pub use client::Client;
pub use config::ClientConfig;
pub use error::ClientError;
