//! XML-RPC model types.
//!
//! This crate holds the language-side half of the protocol: the closed
//! [`Value`] union, the [`Fault`] returned by remote servers, and the
//! [`Envelope`] a decoded document is classified into. It has no XML
//! dependency; the wire codec lives in `xmlrpc-xml`.

pub mod envelope;
pub mod value;

pub use envelope::{Envelope, FAULT_CODE, FAULT_STRING, Fault, MethodCall};
pub use value::{Struct, Value};
