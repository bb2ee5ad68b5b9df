//! XML-RPC serialization: converting [`Value`]s to XML-RPC documents.
//!
//! [`ValueSerializer`] writes a single `<value>` element. Nested arrays and
//! structs are walked with an explicit stack of [`Frame`]s rather than by
//! recursion, so nesting depth is bounded by memory only. [`Encoder`] wraps
//! the serializer into complete `methodCall` / `methodResponse` documents.
//!
//! Conventions:
//!
//! - XML declaration: `<?xml version="1.0"?>`, no indentation
//! - Booleans: `0` / `1`
//! - Empty strings: `<string/>`; strings containing markup go into CDATA
//! - Dates: compact local time without offset (see [`Iso8601Options`])

use std::io::{self, Write};

use base64::Engine;
use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use xmlrpc_model::{FAULT_CODE, FAULT_STRING, Fault, Struct, Value};

use crate::datetime::{Iso8601Options, encode_iso8601};
use crate::error::{XmlRpcError, XmlRpcResult};

/// One unit of pending work for [`ValueSerializer::write_value`].
#[derive(Debug)]
enum Frame<'a> {
    /// A value whose element has not been written yet.
    Pending(&'a Value),
    /// An array whose `<value><array><data>` prefix is written.
    Array { items: &'a [Value], index: usize },
    /// A struct whose `<value><struct>` prefix is written.
    Struct { members: &'a Struct, index: usize },
    /// Closes the `<member>` opened for the value just completed.
    EndMember,
}

/// Writes one [`Value`] as a self-contained `<value>` element.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueSerializer {
    datetime: Iso8601Options,
}

impl ValueSerializer {
    /// Create a serializer using the given date formatting options.
    #[must_use]
    pub fn new(datetime: Iso8601Options) -> Self {
        Self { datetime }
    }

    /// Write `value` as a `<value>` element.
    ///
    /// # Errors
    ///
    /// Returns `XmlRpcError::UnsupportedValue` for values the wire format
    /// cannot carry (non-finite doubles, text with characters XML forbids),
    /// or `XmlRpcError::Io` if the writer fails.
    pub fn write_value<W: Write>(&self, writer: &mut Writer<W>, value: &Value) -> XmlRpcResult<()> {
        let mut stack = vec![Frame::Pending(value)];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Pending(value) => self.open_value(writer, value, &mut stack)?,
                Frame::Array { items, index } => {
                    if let Some(item) = items.get(index) {
                        stack.push(Frame::Array {
                            items,
                            index: index + 1,
                        });
                        stack.push(Frame::Pending(item));
                    } else {
                        write_end(writer, "data")?;
                        write_end(writer, "array")?;
                        write_end(writer, "value")?;
                    }
                }
                Frame::Struct { members, index } => {
                    if let Some((name, member)) = members.get_index(index) {
                        check_xml_text(name, "struct member name")?;
                        write_start(writer, "member")?;
                        write_text_element(writer, "name", name)?;
                        stack.push(Frame::Struct {
                            members,
                            index: index + 1,
                        });
                        stack.push(Frame::EndMember);
                        stack.push(Frame::Pending(member));
                    } else {
                        write_end(writer, "struct")?;
                        write_end(writer, "value")?;
                    }
                }
                Frame::EndMember => write_end(writer, "member")?,
            }
        }

        Ok(())
    }

    /// Write the opening of a value; leaves are written completely, compounds
    /// push an iterating frame.
    fn open_value<'a, W: Write>(
        &self,
        writer: &mut Writer<W>,
        value: &'a Value,
        stack: &mut Vec<Frame<'a>>,
    ) -> XmlRpcResult<()> {
        write_start(writer, "value")?;
        match value {
            Value::Nil => writer.write_event(Event::Empty(BytesStart::new("nil")))?,
            Value::Bool(b) => write_text_element(writer, "boolean", if *b { "1" } else { "0" })?,
            Value::Int(i) => write_text_element(writer, "int", &i.to_string())?,
            Value::Double(d) => {
                if !d.is_finite() {
                    return Err(XmlRpcError::UnsupportedValue(format!(
                        "non-finite double {d}"
                    )));
                }
                write_text_element(writer, "double", &d.to_string())?;
            }
            Value::Text(s) => write_string(writer, s)?,
            Value::DateTime(dt) => write_text_element(
                writer,
                "dateTime.iso8601",
                &encode_iso8601(dt, &self.datetime)?,
            )?,
            Value::Binary(b) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(b);
                write_text_element(writer, "base64", &encoded)?;
            }
            Value::Array(items) => {
                write_start(writer, "array")?;
                write_start(writer, "data")?;
                stack.push(Frame::Array { items, index: 0 });
                return Ok(());
            }
            Value::Struct(members) => {
                write_start(writer, "struct")?;
                stack.push(Frame::Struct { members, index: 0 });
                return Ok(());
            }
        }
        write_end(writer, "value")?;
        Ok(())
    }
}

/// Builds complete XML-RPC documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder {
    serializer: ValueSerializer,
}

impl Encoder {
    /// Create an encoder using the given date formatting options.
    #[must_use]
    pub fn new(datetime: Iso8601Options) -> Self {
        Self {
            serializer: ValueSerializer::new(datetime),
        }
    }

    /// Encode a `methodCall` document with one `<param>` per argument.
    ///
    /// # Errors
    ///
    /// Returns `XmlRpcError::UnsupportedValue` if the method name or any
    /// parameter cannot be represented.
    pub fn method_call(&self, method: &str, params: &[Value]) -> XmlRpcResult<String> {
        check_xml_text(method, "method name")?;

        let xml = write_document(|w| {
            write_start(w, "methodCall")?;
            write_text_element(w, "methodName", method)?;
            write_start(w, "params")?;
            for param in params {
                write_start(w, "param")?;
                self.serializer.write_value(w, param)?;
                write_end(w, "param")?;
            }
            write_end(w, "params")?;
            write_end(w, "methodCall")?;
            Ok(())
        })?;

        tracing::trace!(method, params = params.len(), bytes = xml.len(), "encoded method call");
        Ok(xml)
    }

    /// Encode a successful `methodResponse` carrying `value`.
    ///
    /// # Errors
    ///
    /// Returns `XmlRpcError::UnsupportedValue` if the value cannot be represented.
    pub fn method_response(&self, value: &Value) -> XmlRpcResult<String> {
        write_document(|w| {
            write_start(w, "methodResponse")?;
            write_start(w, "params")?;
            write_start(w, "param")?;
            self.serializer.write_value(w, value)?;
            write_end(w, "param")?;
            write_end(w, "params")?;
            write_end(w, "methodResponse")?;
            Ok(())
        })
    }

    /// Encode a fault `methodResponse`.
    ///
    /// The code is sent as `<int>` when it is numeric, as `<string>` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `XmlRpcError::UnsupportedValue` if the fault text cannot be represented.
    pub fn fault(&self, fault: &Fault) -> XmlRpcResult<String> {
        let code = fault
            .code
            .parse::<i32>()
            .map_or_else(|_| Value::Text(fault.code.clone()), Value::Int);
        let mut members = Struct::new();
        members.insert(FAULT_CODE.to_owned(), code);
        members.insert(FAULT_STRING.to_owned(), Value::Text(fault.string.clone()));
        let body = Value::Struct(members);

        write_document(|w| {
            write_start(w, "methodResponse")?;
            write_start(w, "fault")?;
            self.serializer.write_value(w, &body)?;
            write_end(w, "fault")?;
            write_end(w, "methodResponse")?;
            Ok(())
        })
    }

    /// Encode a bare `<value>` fragment without an XML declaration.
    ///
    /// # Errors
    ///
    /// Returns `XmlRpcError::UnsupportedValue` if the value cannot be represented.
    pub fn value(&self, value: &Value) -> XmlRpcResult<String> {
        let mut buf = Vec::with_capacity(128);
        let mut writer = Writer::new(&mut buf);
        self.serializer.write_value(&mut writer, value)?;
        into_string(buf)
    }
}

/// Encode a `methodCall` with default options.
///
/// # Errors
///
/// See [`Encoder::method_call`].
pub fn encode_method_call(method: &str, params: &[Value]) -> XmlRpcResult<String> {
    Encoder::default().method_call(method, params)
}

/// Encode a successful `methodResponse` with default options.
///
/// # Errors
///
/// See [`Encoder::method_response`].
pub fn encode_method_response(value: &Value) -> XmlRpcResult<String> {
    Encoder::default().method_response(value)
}

/// Encode a fault `methodResponse`.
///
/// # Errors
///
/// See [`Encoder::fault`].
pub fn encode_fault(fault: &Fault) -> XmlRpcResult<String> {
    Encoder::default().fault(fault)
}

/// Encode a bare `<value>` fragment with default options.
///
/// # Errors
///
/// See [`Encoder::value`].
pub fn encode_value(value: &Value) -> XmlRpcResult<String> {
    Encoder::default().value(value)
}

// ---------------------------------------------------------------------------
// Helper functions for writing common XML patterns
// ---------------------------------------------------------------------------

/// Write the XML declaration followed by `body`.
fn write_document<F>(body: F) -> XmlRpcResult<String>
where
    F: FnOnce(&mut Writer<&mut Vec<u8>>) -> XmlRpcResult<()>,
{
    let mut buf = Vec::with_capacity(512);
    let mut writer = Writer::new(&mut buf);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;
    body(&mut writer)?;
    into_string(buf)
}

fn into_string(buf: Vec<u8>) -> XmlRpcResult<String> {
    String::from_utf8(buf).map_err(|e| XmlRpcError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

fn write_start<W: Write>(writer: &mut Writer<W>, tag: &str) -> io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))
}

fn write_end<W: Write>(writer: &mut Writer<W>, tag: &str) -> io::Result<()> {
    writer.write_event(Event::End(BytesEnd::new(tag)))
}

/// Write a simple `<tag>text</tag>` element.
fn write_text_element<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> io::Result<()> {
    writer
        .create_element(tag)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

/// Write a `<string>` element.
///
/// Text with markup characters is wrapped in CDATA unless it contains the
/// CDATA terminator, in which case it is escaped like any other text.
fn write_string<W: Write>(writer: &mut Writer<W>, text: &str) -> XmlRpcResult<()> {
    check_xml_text(text, "string")?;

    if text.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new("string")))?;
    } else if (text.contains('<') || text.contains('&')) && !text.contains("]]>") {
        write_start(writer, "string")?;
        writer.write_event(Event::CData(BytesCData::new(text)))?;
        write_end(writer, "string")?;
    } else {
        write_text_element(writer, "string", text)?;
    }
    Ok(())
}

/// Reject text containing characters XML 1.0 cannot carry.
fn check_xml_text(text: &str, what: &str) -> XmlRpcResult<()> {
    match text.chars().find(|c| !is_xml_char(*c)) {
        Some(c) => Err(XmlRpcError::UnsupportedValue(format!(
            "{what} contains U+{:04X}, which XML cannot represent",
            u32::from(c)
        ))),
        None => Ok(()),
    }
}

fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::FixedOffset;

    use super::*;
    use crate::datetime::{Zone, decode_iso8601};

    fn value_xml(value: &Value) -> String {
        encode_value(value).expect("serialization should succeed")
    }

    #[test]
    fn test_should_encode_method_call_with_ordered_params() {
        let xml = encode_method_call("math.add", &[Value::Int(1), Value::Double(2.5)])
            .expect("serialization should succeed");
        assert_eq!(
            xml,
            "<?xml version=\"1.0\"?><methodCall><methodName>math.add</methodName><params>\
             <param><value><int>1</int></value></param>\
             <param><value><double>2.5</double></value></param>\
             </params></methodCall>"
        );
    }

    #[test]
    fn test_should_encode_empty_param_list() {
        let xml = encode_method_call("ping", &[]).expect("serialization should succeed");
        assert!(xml.ends_with("<methodName>ping</methodName><params></params></methodCall>"));
    }

    #[test]
    fn test_should_encode_scalars() {
        assert_eq!(value_xml(&Value::Nil), "<value><nil/></value>");
        assert_eq!(
            value_xml(&Value::Bool(true)),
            "<value><boolean>1</boolean></value>"
        );
        assert_eq!(
            value_xml(&Value::Bool(false)),
            "<value><boolean>0</boolean></value>"
        );
        assert_eq!(value_xml(&Value::Int(-42)), "<value><int>-42</int></value>");
        assert_eq!(
            value_xml(&Value::Double(1.0)),
            "<value><double>1</double></value>"
        );
        assert_eq!(
            value_xml(&Value::Binary(Bytes::from_static(b"hello"))),
            "<value><base64>aGVsbG8=</base64></value>"
        );
    }

    #[test]
    fn test_should_encode_strings_by_content() {
        assert_eq!(
            value_xml(&Value::Text(String::new())),
            "<value><string/></value>"
        );
        assert_eq!(
            value_xml(&Value::Text("plain".to_owned())),
            "<value><string>plain</string></value>"
        );
        assert_eq!(
            value_xml(&Value::Text("a < b & c".to_owned())),
            "<value><string><![CDATA[a < b & c]]></string></value>"
        );
        assert_eq!(
            value_xml(&Value::Text("x]]>y".to_owned())),
            "<value><string>x]]&gt;y</string></value>"
        );
    }

    #[test]
    fn test_should_encode_nested_compounds() {
        let value: Value = [
            ("list", Value::Array(vec![Value::Int(1), Value::Array(vec![])])),
            ("empty", Value::Struct(Struct::new())),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            value_xml(&value),
            "<value><struct>\
             <member><name>list</name><value><array><data>\
             <value><int>1</int></value>\
             <value><array><data></data></array></value>\
             </data></array></value></member>\
             <member><name>empty</name><value><struct></struct></value></member>\
             </struct></value>"
        );
    }

    #[test]
    fn test_should_keep_struct_insertion_order() {
        let value: Value = [("b", 1), ("a", 2)].into_iter().collect();
        let xml = value_xml(&value);
        let b = xml.find("<name>b</name>").expect("member b");
        let a = xml.find("<name>a</name>").expect("member a");
        assert!(b < a);
    }

    #[test]
    fn test_should_encode_datetime_with_options() {
        let zone = Zone::Fixed(FixedOffset::east_opt(3600).expect("valid offset"));
        let dt = decode_iso8601("20231225T09:00:00", zone).expect("decode");
        let encoder = Encoder::new(Iso8601Options {
            zone,
            ..Iso8601Options::default()
        });
        assert_eq!(
            encoder.value(&Value::DateTime(dt)).expect("serialize"),
            "<value><dateTime.iso8601>20231225T09:00:00</dateTime.iso8601></value>"
        );
    }

    #[test]
    fn test_should_reject_datetime_beyond_year_9999() {
        let dt = decode_iso8601("99991231T23:00:00Z", Zone::utc())
            .expect("decode")
            .checked_add_signed(chrono::TimeDelta::days(2))
            .expect("representable instant");
        let err = encode_method_call("m", &[Value::Array(vec![Value::DateTime(dt)])])
            .expect_err("five-digit year");
        assert!(matches!(err, XmlRpcError::UnsupportedValue(_)), "{err}");
    }

    #[test]
    fn test_should_encode_deeply_nested_arrays() {
        let depth = 2_000;
        let mut value = Value::Int(7);
        for _ in 0..depth {
            value = Value::Array(vec![value]);
        }
        let xml = value_xml(&value);
        assert_eq!(xml.matches("<array>").count(), depth);
        assert!(xml.contains("<int>7</int>"));
    }

    #[test]
    fn test_should_encode_method_response() {
        let xml = encode_method_response(&Value::Text("ok".to_owned())).expect("serialize");
        assert_eq!(
            xml,
            "<?xml version=\"1.0\"?><methodResponse><params><param>\
             <value><string>ok</string></value></param></params></methodResponse>"
        );
    }

    #[test]
    fn test_should_encode_fault_with_numeric_code() {
        let xml = encode_fault(&Fault::new("4", "Too many parameters")).expect("serialize");
        assert!(xml.contains("<fault><value><struct>"));
        assert!(xml.contains("<member><name>faultCode</name><value><int>4</int></value></member>"));
        assert!(xml.contains(
            "<member><name>faultString</name><value><string>Too many parameters</string></value></member>"
        ));
    }

    #[test]
    fn test_should_encode_fault_with_text_code() {
        let xml = encode_fault(&Fault::new("E_AUTH", "denied")).expect("serialize");
        assert!(xml.contains("<value><string>E_AUTH</string></value>"));
    }

    #[test]
    fn test_should_reject_non_finite_double() {
        for d in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = encode_method_call("m", &[Value::Array(vec![Value::Double(d)])])
                .expect_err("non-finite double");
            assert!(matches!(err, XmlRpcError::UnsupportedValue(_)), "{err}");
        }
    }

    #[test]
    fn test_should_reject_characters_xml_cannot_carry() {
        let err = encode_value(&Value::Text("bell\u{7}".to_owned())).expect_err("control char");
        assert!(matches!(err, XmlRpcError::UnsupportedValue(_)));

        let value: Value = [("bad\u{0}", 1)].into_iter().collect();
        let err = encode_value(&value).expect_err("control char in member name");
        assert!(matches!(err, XmlRpcError::UnsupportedValue(_)));

        let err = encode_method_call("m\u{1}", &[]).expect_err("control char in method name");
        assert!(matches!(err, XmlRpcError::UnsupportedValue(_)));
    }

    #[test]
    fn test_should_allow_whitespace_controls_in_text() {
        assert_eq!(
            value_xml(&Value::Text("a\tb\nc".to_owned())),
            "<value><string>a\tb\nc</string></value>"
        );
    }
}
