//! Message - decoded inbound control message
//!
//! An addressed payload: slash-delimited address plus ordered typed arguments.
//! Immutable once received; fan-out shares it behind an `Arc`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed message argument
///
/// Serialized untagged so JSON renders plain values
/// (`1`, `0.5`, `"text"`, `true`, `null`, `[1, 2]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OscArg {
    /// OSC `T` / `F`
    Bool(bool),
    /// OSC `i`
    Int(i32),
    /// OSC `h`
    Long(i64),
    /// OSC `f`
    Float(f32),
    /// OSC `d`
    Double(f64),
    /// OSC `s`
    String(String),
    /// OSC `b`
    Blob(#[serde(with = "serde_bytes")] Vec<u8>),
    /// OSC `N`
    Nil,
}

impl OscArg {
    /// OSC type tag character for this argument
    pub fn type_tag(&self) -> char {
        match self {
            Self::Bool(true) => 'T',
            Self::Bool(false) => 'F',
            Self::Int(_) => 'i',
            Self::Long(_) => 'h',
            Self::Float(_) => 'f',
            Self::Double(_) => 'd',
            Self::String(_) => 's',
            Self::Blob(_) => 'b',
            Self::Nil => 'N',
        }
    }

    /// Numeric view of the argument, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(f64::from(*v)),
            Self::Long(v) => Some(*v as f64),
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

impl From<i32> for OscArg {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for OscArg {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for OscArg {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for OscArg {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for OscArg {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for OscArg {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Decoded control message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Destination address (e.g. `/4/toggle1`)
    pub address: String,

    /// Ordered arguments
    #[serde(default, rename = "arguments", alias = "args")]
    pub args: Vec<OscArg>,
}

impl Message {
    /// Create a message from an address and arguments
    pub fn new(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// Create a message without arguments
    pub fn bare(address: impl Into<String>) -> Self {
        Self::new(address, Vec::new())
    }

    /// OSC type tag string, including the leading comma (e.g. `",if"`)
    pub fn type_tags(&self) -> String {
        std::iter::once(',')
            .chain(self.args.iter().map(OscArg::type_tag))
            .collect()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.address, self.type_tags())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags() {
        let msg = Message::new(
            "/4/toggle1",
            vec![1.0f32.into(), 3.into(), "x".into(), true.into(), OscArg::Nil],
        );
        assert_eq!(msg.type_tags(), ",fisTN");
        assert_eq!(Message::bare("/ping").type_tags(), ",");
    }

    #[test]
    fn test_json_shape() {
        let msg = Message::new("/4/fader1", vec![OscArg::Float(0.5), "on".into()]);
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"address":"/4/fader1","arguments":[0.5,"on"]}"#);
    }

    #[test]
    fn test_json_args_alias_and_inference() {
        let msg: Message =
            serde_json::from_str(r#"{"address":"/a","args":[1, 2.5, "s", false, null]}"#).unwrap();
        assert_eq!(
            msg.args,
            vec![
                OscArg::Int(1),
                OscArg::Float(2.5),
                OscArg::String("s".into()),
                OscArg::Bool(false),
                OscArg::Nil,
            ]
        );
    }

    #[test]
    fn test_large_integer_becomes_long() {
        let msg: Message =
            serde_json::from_str(r#"{"address":"/a","arguments":[5000000000]}"#).unwrap();
        assert_eq!(msg.args, vec![OscArg::Long(5_000_000_000)]);
    }

    #[test]
    fn test_missing_args_defaults_to_empty() {
        let msg: Message = serde_json::from_str(r#"{"address":"/a"}"#).unwrap();
        assert!(msg.args.is_empty());
    }
}
