//! Decoded XML-RPC messages and faults.

use std::fmt;

use crate::value::Value;

/// Conventional fault member carrying the code.
pub const FAULT_CODE: &str = "faultCode";

/// Conventional fault member carrying the message.
pub const FAULT_STRING: &str = "faultString";

/// An application-level fault returned by the remote side.
///
/// The code is kept as text: servers send it as `<int>` or `<string>`, and
/// the decoder renders either form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fault {
    /// The `faultCode` member.
    pub code: String,
    /// The `faultString` member.
    pub string: String,
}

impl Fault {
    /// Create a fault from a code and message.
    #[must_use]
    pub fn new(code: impl Into<String>, string: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            string: string.into(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.string.is_empty() {
            f.write_str("XML-RPC fault")
        } else {
            write!(f, "XML-RPC fault: {}", self.string)
        }
    }
}

impl std::error::Error for Fault {}

/// A decoded `methodCall`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    /// The `methodName` text.
    pub name: String,
    /// Parameters in argument order.
    pub params: Vec<Value>,
}

/// The classified result of decoding a full XML-RPC document.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// A `methodCall` document.
    MethodCall(MethodCall),
    /// A `methodResponse` carrying `params`.
    MethodResponse {
        /// Decoded parameters; a well-formed response has exactly one.
        params: Vec<Value>,
    },
    /// A `methodResponse` carrying a `fault`.
    Fault(Fault),
}

impl Envelope {
    /// Short name of the envelope kind, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MethodCall(_) => "methodCall",
            Self::MethodResponse { .. } => "methodResponse",
            Self::Fault(_) => "fault",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_format_fault_message() {
        let fault = Fault::new("4", "bad");
        assert_eq!(fault.to_string(), "XML-RPC fault: bad");
    }

    #[test]
    fn test_should_format_fault_without_string() {
        let fault = Fault::new("4", "");
        assert_eq!(fault.to_string(), "XML-RPC fault");
    }

    #[test]
    fn test_should_name_envelope_kinds() {
        let call = Envelope::MethodCall(MethodCall {
            name: "ping".to_owned(),
            params: vec![],
        });
        assert_eq!(call.kind(), "methodCall");
        assert_eq!(Envelope::MethodResponse { params: vec![] }.kind(), "methodResponse");
        assert_eq!(Envelope::Fault(Fault::default()).kind(), "fault");
    }
}
