//! XML-RPC wire codec.
//!
//! This crate converts between [`xmlrpc_model`] types and the XML-RPC wire
//! format. Neither direction recurses over nested values, so arbitrarily
//! deep arrays and structs are handled without growing the call stack.
//!
//! # Key components
//!
//! - [`Encoder`] and the `encode_*` functions for writing `methodCall`,
//!   `methodResponse` and fault documents
//! - [`ResponseDecoder`], a streaming decoder fed with tag and text events,
//!   and [`Decoder`] / the `decode_*` functions that drive it over a document
//! - [`decode_iso8601`] / [`encode_iso8601`] for `dateTime.iso8601` values
//!
//! # XML-RPC conventions
//!
//! - XML declaration: `<?xml version="1.0"?>`
//! - Booleans: `0` / `1`
//! - `<nil/>` is accepted and emitted
//! - `<i8>` is accepted and kept as text; `<int>` / `<i4>` are 32-bit
//! - Tag names are matched case-insensitively when decoding

pub mod datetime;
pub mod deserialize;
pub mod error;
pub mod serialize;

pub use datetime::{Iso8601Options, Zone, decode_iso8601, encode_iso8601};
pub use deserialize::{
    Decoder, ResponseDecoder, decode_envelope, decode_method_call, decode_method_response,
};
pub use error::{XmlRpcError, XmlRpcResult};
pub use serialize::{
    Encoder, ValueSerializer, encode_fault, encode_method_call, encode_method_response,
    encode_value,
};
