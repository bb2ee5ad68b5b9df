//! XML-RPC deserialization: rebuilding [`Value`]s from XML-RPC documents.
//!
//! [`ResponseDecoder`] is a push-driven state machine fed with open-tag,
//! close-tag and text notifications. Finished values are kept on a flat
//! stack; when an `<array>` or `<struct>` opens, the current stack length is
//! recorded as a mark, and when it closes everything above the mark is folded
//! into a single compound value. Nothing recurses, so nesting depth is
//! bounded by memory only.
//!
//! [`Decoder`] drives a `quick_xml::Reader` over a whole document and feeds
//! its events to a fresh `ResponseDecoder`.

use base64::Engine;
use bytes::Bytes;
use quick_xml::Reader;
use quick_xml::events::{BytesRef, Event};
use xmlrpc_model::{Envelope, FAULT_CODE, FAULT_STRING, Fault, MethodCall, Struct, Value};

use crate::datetime::{Zone, decode_iso8601};
use crate::error::{XmlRpcError, XmlRpcResult};

/// Elements of the XML-RPC vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    MethodCall,
    MethodName,
    MethodResponse,
    Params,
    Param,
    Fault,
    Value,
    Array,
    Data,
    Struct,
    Member,
    Name,
    Nil,
    Boolean,
    Int,
    I4,
    I8,
    Double,
    String,
    Base64,
    DateTime,
}

impl Tag {
    const ALL: [(&'static str, Tag); 21] = [
        ("methodCall", Tag::MethodCall),
        ("methodName", Tag::MethodName),
        ("methodResponse", Tag::MethodResponse),
        ("params", Tag::Params),
        ("param", Tag::Param),
        ("fault", Tag::Fault),
        ("value", Tag::Value),
        ("array", Tag::Array),
        ("data", Tag::Data),
        ("struct", Tag::Struct),
        ("member", Tag::Member),
        ("name", Tag::Name),
        ("nil", Tag::Nil),
        ("boolean", Tag::Boolean),
        ("int", Tag::Int),
        ("i4", Tag::I4),
        ("i8", Tag::I8),
        ("double", Tag::Double),
        ("string", Tag::String),
        ("base64", Tag::Base64),
        ("dateTime.iso8601", Tag::DateTime),
    ];

    /// Look up a tag name, ignoring ASCII case.
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, tag)| *tag)
    }
}

/// Which top-level element the document closed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageKind {
    Call,
    Response,
}

/// What a `methodResponse` carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseKind {
    Params,
    Fault,
}

/// Streaming XML-RPC decoder.
///
/// One instance decodes one document: feed it notifications in document
/// order, then call [`finish`](Self::finish). The first error is latched and
/// every later notification is ignored.
#[derive(Debug)]
pub struct ResponseDecoder {
    zone: Zone,
    /// Finished values in document order.
    stack: Vec<Value>,
    /// Stack lengths at which the currently open compounds began.
    marks: Vec<usize>,
    /// Text of the current element; cleared at every open tag.
    text: String,
    /// Set while directly inside a `<value>` with no typed child yet.
    in_value: bool,
    kind: Option<MessageKind>,
    response: Option<ResponseKind>,
    method_name: Option<String>,
    error: Option<XmlRpcError>,
}

impl ResponseDecoder {
    /// Create a decoder interpreting offset-less dates in `zone`.
    #[must_use]
    pub fn new(zone: Zone) -> Self {
        Self {
            zone,
            stack: Vec::new(),
            marks: Vec::new(),
            text: String::new(),
            in_value: false,
            kind: None,
            response: None,
            method_name: None,
            error: None,
        }
    }

    /// Whether an error has been latched.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// An element opened.
    pub fn open(&mut self, name: &str) {
        if self.is_failed() {
            return;
        }
        let tag = Tag::from_name(name);
        if matches!(tag, Some(Tag::Array | Tag::Struct)) {
            self.marks.push(self.stack.len());
        }
        self.text.clear();
        self.in_value = tag == Some(Tag::Value);
    }

    /// Character data inside the current element.
    pub fn text(&mut self, chunk: &str) {
        if !self.is_failed() {
            self.text.push_str(chunk);
        }
    }

    /// A CDATA section; accumulated exactly like plain text.
    pub fn cdata(&mut self, chunk: &str) {
        self.text(chunk);
    }

    /// An element closed.
    pub fn close(&mut self, name: &str) {
        if self.is_failed() {
            return;
        }
        let text = std::mem::take(&mut self.text);
        let result = match Tag::from_name(name) {
            Some(tag) => self.end_element(tag, text),
            None => Err(XmlRpcError::Parse(format!("unknown XML-RPC tag '{name}'"))),
        };
        if let Err(e) = result {
            self.fail(e);
        }
    }

    /// Latch an error. Only the first one is kept.
    pub fn fail(&mut self, error: XmlRpcError) {
        if self.error.is_none() {
            tracing::debug!(error = %error, "XML-RPC decoding failed");
            self.error = Some(error);
        }
    }

    /// Classify the document once input has ended.
    ///
    /// # Errors
    ///
    /// Returns the latched error if any; `XmlRpcError::Protocol` if the
    /// document is not a complete call or response, or a fault body is not a
    /// struct.
    pub fn finish(self) -> XmlRpcResult<Envelope> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let kind = match self.kind {
            Some(kind) if self.marks.is_empty() => kind,
            _ => return Err(XmlRpcError::Protocol("invalid message".to_owned())),
        };

        let envelope = if self.response == Some(ResponseKind::Fault) {
            Envelope::Fault(fault_from_stack(self.stack)?)
        } else {
            match kind {
                MessageKind::Call => {
                    let name = self.method_name.ok_or_else(|| {
                        XmlRpcError::Protocol(
                            "method call did not contain a method name".to_owned(),
                        )
                    })?;
                    Envelope::MethodCall(MethodCall {
                        name,
                        params: self.stack,
                    })
                }
                MessageKind::Response => {
                    if self.response.is_none() {
                        return Err(XmlRpcError::Protocol(
                            "invalid method response".to_owned(),
                        ));
                    }
                    Envelope::MethodResponse { params: self.stack }
                }
            }
        };

        tracing::debug!(kind = envelope.kind(), "decoded XML-RPC envelope");
        Ok(envelope)
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
        self.in_value = false;
    }

    fn pop_mark(&mut self, tag: &str) -> XmlRpcResult<usize> {
        self.marks
            .pop()
            .ok_or_else(|| XmlRpcError::Parse(format!("unbalanced </{tag}>")))
    }

    fn end_element(&mut self, tag: Tag, text: String) -> XmlRpcResult<()> {
        match tag {
            Tag::Nil => self.push(Value::Nil),
            Tag::Boolean => match text.as_str() {
                "1" => self.push(Value::Bool(true)),
                "0" => self.push(Value::Bool(false)),
                _ => {
                    return Err(XmlRpcError::Parse(format!(
                        "illegal boolean value '{text}'"
                    )));
                }
            },
            Tag::Int | Tag::I4 => {
                let value = text.trim().parse::<i32>().map_err(|_| {
                    XmlRpcError::Parse(format!("expected an integer but got '{text}'"))
                })?;
                self.push(Value::Int(value));
            }
            Tag::I8 => {
                if !is_integer_text(&text) {
                    return Err(XmlRpcError::Parse(format!(
                        "expected an integer (i8) but got '{text}'"
                    )));
                }
                self.push(Value::Text(text));
            }
            Tag::Double => {
                let value = text
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|d| d.is_finite())
                    .ok_or_else(|| {
                        XmlRpcError::Parse(format!("expected a double but got '{text}'"))
                    })?;
                self.push(Value::Double(value));
            }
            Tag::String | Tag::Name => self.push(Value::Text(text)),
            Tag::Base64 => {
                let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(compact)
                    .map_err(|e| XmlRpcError::Parse(format!("invalid base64: {e}")))?;
                self.push(Value::Binary(Bytes::from(decoded)));
            }
            Tag::DateTime => {
                let value = decode_iso8601(&text, self.zone)?;
                self.push(Value::DateTime(value));
            }
            Tag::Array => {
                let mark = self.pop_mark("array")?;
                let items = self.stack.split_off(mark);
                self.push(Value::Array(items));
            }
            Tag::Struct => {
                let mark = self.pop_mark("struct")?;
                let items = self.stack.split_off(mark);
                let members = fold_members(items)?;
                self.push(Value::Struct(members));
            }
            Tag::Value => {
                if self.in_value {
                    self.push(Value::Text(text));
                }
            }
            Tag::Params => self.response = Some(ResponseKind::Params),
            Tag::Fault => self.response = Some(ResponseKind::Fault),
            Tag::MethodResponse => self.kind = Some(MessageKind::Response),
            Tag::MethodCall => self.kind = Some(MessageKind::Call),
            Tag::MethodName => self.method_name = Some(text),
            Tag::Data | Tag::Param | Tag::Member => {}
        }
        Ok(())
    }
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new(Zone::default())
    }
}

/// Pair up `name, value, name, value, ...` into struct members.
fn fold_members(items: Vec<Value>) -> XmlRpcResult<Struct> {
    let mut members = Struct::with_capacity(items.len() / 2);
    let mut items = items.into_iter();
    while let Some(key) = items.next() {
        let Value::Text(key) = key else {
            return Err(XmlRpcError::Parse(format!(
                "expected string struct key but got {}",
                key.type_name()
            )));
        };
        let value = items
            .next()
            .ok_or_else(|| XmlRpcError::Parse(format!("struct member '{key}' has no value")))?;
        members.insert(key, value);
    }
    Ok(members)
}

/// Build a [`Fault`] from the `faultCode` / `faultString` struct.
fn fault_from_stack(stack: Vec<Value>) -> XmlRpcResult<Fault> {
    match stack.into_iter().next() {
        Some(Value::Struct(members)) => Ok(Fault {
            code: fault_text(members.get(FAULT_CODE)),
            string: fault_text(members.get(FAULT_STRING)),
        }),
        Some(other) => Err(XmlRpcError::Protocol(format!(
            "fault body must be a struct, got {}",
            other.type_name()
        ))),
        None => Err(XmlRpcError::Protocol("fault without a value".to_owned())),
    }
}

fn fault_text(value: Option<&Value>) -> String {
    match value {
        None => String::new(),
        Some(Value::Text(s)) => s.clone(),
        Some(Value::Int(i)) => i.to_string(),
        Some(other) => other.to_string(),
    }
}

/// An optionally signed, non-empty run of ASCII digits.
fn is_integer_text(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Decodes complete XML-RPC documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    zone: Zone,
}

impl Decoder {
    /// Create a decoder interpreting offset-less dates in `zone`.
    #[must_use]
    pub fn new(zone: Zone) -> Self {
        Self { zone }
    }

    /// Decode and classify a whole document.
    ///
    /// # Errors
    ///
    /// Returns `XmlRpcError::Xml` for malformed XML, `Parse` / `Format` for
    /// invalid element content, and `Protocol` for incomplete envelopes.
    pub fn envelope(&self, xml: &str) -> XmlRpcResult<Envelope> {
        let mut decoder = ResponseDecoder::new(self.zone);
        let mut reader = Reader::from_str(xml);
        // `<nil/>`, `<string/>` and `<struct/>` arrive as Start + End.
        reader.config_mut().expand_empty_elements = true;

        if let Err(e) = feed(&mut reader, &mut decoder) {
            decoder.fail(e);
        }
        decoder.finish()
    }

    /// Decode a `methodResponse` and return its single parameter.
    ///
    /// # Errors
    ///
    /// Returns `XmlRpcError::Fault` when the server answered with a fault,
    /// `XmlRpcError::Protocol` when the document is not a response or does
    /// not carry exactly one parameter, or any error from [`Self::envelope`].
    pub fn method_response(&self, xml: &str) -> XmlRpcResult<Value> {
        match self.envelope(xml)? {
            Envelope::MethodResponse { params } => {
                let count = params.len();
                let mut params = params.into_iter();
                match (params.next(), count) {
                    (Some(value), 1) => Ok(value),
                    (None, _) => Err(XmlRpcError::Protocol(
                        "response has no param".to_owned(),
                    )),
                    (Some(_), _) => Err(XmlRpcError::Protocol(
                        "response has more than one param".to_owned(),
                    )),
                }
            }
            Envelope::Fault(fault) => Err(XmlRpcError::Fault(fault)),
            Envelope::MethodCall(_) => {
                Err(XmlRpcError::Protocol("not a method response".to_owned()))
            }
        }
    }

    /// Decode a `methodCall` and return its name and first parameter
    /// (`Nil` when there is none).
    ///
    /// # Errors
    ///
    /// Returns `XmlRpcError::Protocol` when the document is not a method call
    /// or has no method name, or any error from [`Self::envelope`].
    pub fn method_call(&self, xml: &str) -> XmlRpcResult<(String, Value)> {
        match self.envelope(xml)? {
            Envelope::MethodCall(MethodCall { name, params }) => {
                let first = params.into_iter().next().unwrap_or(Value::Nil);
                Ok((name, first))
            }
            Envelope::Fault(fault) => Err(XmlRpcError::Fault(fault)),
            Envelope::MethodResponse { .. } => {
                Err(XmlRpcError::Protocol("not a method call".to_owned()))
            }
        }
    }
}

/// Decode and classify a whole document, reading offset-less dates in the
/// host's local time.
///
/// # Errors
///
/// See [`Decoder::envelope`].
pub fn decode_envelope(xml: &str) -> XmlRpcResult<Envelope> {
    Decoder::default().envelope(xml)
}

/// Decode a `methodResponse` and return its single parameter.
///
/// # Errors
///
/// See [`Decoder::method_response`].
pub fn decode_method_response(xml: &str) -> XmlRpcResult<Value> {
    Decoder::default().method_response(xml)
}

/// Decode a `methodCall` into its name and first parameter.
///
/// # Errors
///
/// See [`Decoder::method_call`].
pub fn decode_method_call(xml: &str) -> XmlRpcResult<(String, Value)> {
    Decoder::default().method_call(xml)
}

// ---------------------------------------------------------------------------
// Tokenizer driving
// ---------------------------------------------------------------------------

/// Feed reader events to `decoder` until end of input or the first error.
fn feed(reader: &mut Reader<&[u8]>, decoder: &mut ResponseDecoder) -> XmlRpcResult<()> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                decoder.open(element_name(name.as_ref())?);
            }
            Event::End(e) => {
                let name = e.name();
                decoder.close(element_name(name.as_ref())?);
            }
            Event::Text(e) => {
                let decoded = e
                    .decode()
                    .map_err(|err| XmlRpcError::Parse(err.to_string()))?;
                let unescaped = quick_xml::escape::unescape(&decoded)
                    .map_err(|err| XmlRpcError::Parse(err.to_string()))?;
                decoder.text(&unescaped);
            }
            Event::CData(e) => {
                let content = std::str::from_utf8(&e)
                    .map_err(|err| XmlRpcError::Parse(err.to_string()))?;
                decoder.cdata(content);
            }
            Event::GeneralRef(e) => decoder.text(&resolve_reference(&e)?),
            Event::Eof => return Ok(()),
            // Declaration, comments, processing instructions, doctype.
            _ => {}
        }
        if decoder.is_failed() {
            return Ok(());
        }
    }
}

fn element_name(raw: &[u8]) -> XmlRpcResult<&str> {
    std::str::from_utf8(raw).map_err(|e| XmlRpcError::Parse(e.to_string()))
}

/// Resolve a character reference or one of the predefined XML entities.
fn resolve_reference(reference: &BytesRef<'_>) -> XmlRpcResult<String> {
    if let Some(c) = reference
        .resolve_char_ref()
        .map_err(|err| XmlRpcError::Parse(err.to_string()))?
    {
        return Ok(c.to_string());
    }
    let name = reference
        .decode()
        .map_err(|err| XmlRpcError::Parse(err.to_string()))?;
    quick_xml::escape::resolve_predefined_entity(&name)
        .map(str::to_owned)
        .ok_or_else(|| XmlRpcError::Parse(format!("unknown entity '&{name};'")))
}
