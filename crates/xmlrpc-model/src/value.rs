//! XML-RPC `Value` type.
//!
//! `Value` is a closed tagged union over the protocol's type vocabulary. Each
//! variant maps to exactly one wire element, so integers and doubles are
//! distinguished by the variant rather than by inspecting the number.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Members of an XML-RPC struct, in encounter order.
pub type Struct = IndexMap<String, Value>;

/// XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `<nil/>`.
    Nil,
    /// `<boolean>`, `0` or `1` on the wire.
    Bool(bool),
    /// `<int>` / `<i4>`.
    Int(i32),
    /// `<double>`.
    Double(f64),
    /// `<string>`, a bare `<value>` text, or a validated `<i8>`.
    Text(String),
    /// `<dateTime.iso8601>`.
    DateTime(DateTime<FixedOffset>),
    /// `<base64>`.
    Binary(Bytes),
    /// `<array>`; elements need not share a type.
    Array(Vec<Value>),
    /// `<struct>`; member names are unique.
    Struct(Struct),
}

impl Value {
    /// Returns `true` if this is `Nil`.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Returns the boolean if this is a `Bool` variant.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer if this is an `Int` variant.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the number if this is a `Double` variant.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the string if this is a `Text` variant.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the timestamp if this is a `DateTime` variant.
    #[must_use]
    pub fn as_datetime(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// Returns the bytes if this is a `Binary` variant.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the elements if this is an `Array` variant.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the members if this is a `Struct` variant.
    #[must_use]
    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a struct member by name. Returns `None` for non-struct values.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.as_struct().and_then(|s| s.get(name))
    }

    /// Returns the wire element name for this variant (e.g. `"int"`, `"struct"`).
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::Text(_) => "string",
            Self::DateTime(_) => "dateTime.iso8601",
            Self::Binary(_) => "base64",
            Self::Array(_) => "array",
            Self::Struct(_) => "struct",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Self::Array(a) => write!(f, "[{} items]", a.len()),
            Self::Struct(s) => write!(f, "{{{} members}}", s.len()),
        }
    }
}

/// Natural JSON-like shape: binary becomes base64, timestamps RFC 3339.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Nil => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i32(*i),
            Self::Double(d) => serializer.serialize_f64(*d),
            Self::Text(s) => serializer.serialize_str(s),
            Self::DateTime(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            Self::Binary(b) => {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(b);
                serializer.serialize_str(&encoded)
            }
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Struct(members) => {
                let mut map = serializer.serialize_map(Some(members.len()))?;
                for (name, value) in members {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Self::DateTime(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Self::Binary(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(v)
    }
}

impl From<Struct> for Value {
    fn from(v: Struct) -> Self {
        Self::Struct(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Nil, Into::into)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Struct(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_convert_from_native_types() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(7), Value::Int(7));
        assert_eq!(Value::from(1.5), Value::Double(1.5));
        assert_eq!(Value::from("hi"), Value::Text("hi".to_owned()));
        assert_eq!(Value::from(None::<i32>), Value::Nil);
        assert_eq!(Value::from(Some(3)), Value::Int(3));
    }

    #[test]
    fn test_should_keep_struct_member_order() {
        let v: Value = [("b", 1), ("a", 2)].into_iter().collect();
        let names: Vec<&str> = v
            .as_struct()
            .expect("struct")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(v.get("a"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_should_report_wire_type_names() {
        assert_eq!(Value::Nil.type_name(), "nil");
        assert_eq!(Value::Int(1).type_name(), "int");
        assert_eq!(Value::Array(vec![]).type_name(), "array");
        assert_eq!(
            Value::Binary(Bytes::from_static(b"x")).type_name(),
            "base64"
        );
    }

    #[test]
    fn test_should_serialize_as_plain_json() {
        let v = Value::Array(vec![
            Value::Nil,
            Value::Int(1),
            Value::Text("a".to_owned()),
            Value::Binary(Bytes::from_static(b"hi")),
            [("k", true)].into_iter().collect(),
        ]);
        let json = serde_json::to_string(&v).expect("test serialization");
        assert_eq!(json, r#"[null,1,"a","aGk=",{"k":true}]"#);
    }

    #[test]
    fn test_should_display_compact_summary() {
        assert_eq!(Value::Text("x".to_owned()).to_string(), "\"x\"");
        assert_eq!(Value::Array(vec![Value::Nil]).to_string(), "[1 items]");
        assert_eq!(Value::Binary(Bytes::from_static(b"abc")).to_string(), "<3 bytes>");
    }
}
