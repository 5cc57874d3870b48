//! Open key/value payloads and their RPC wire representation.
//!
//! Callers build message payloads as [`PayloadValue`] trees. Before a payload
//! crosses the RPC boundary it is converted explicitly into the structured
//! value format ([`WireValue`] / [`WireStruct`]), where every node carries its
//! kind:
//!
//! ```text
//! {"fields": {"alt": {"numberValue": 1200.0},
//!             "tags": {"listValue": {"values": [{"stringValue": "hostile"}]}},
//!             "ack":  "nullValue"}}
//! ```
//!
//! The two conversions are inverses of each other. Numbers are IEEE doubles on
//! both sides; NaN and infinities cannot be represented in JSON and are
//! rejected on the way out.

use crate::error::{PluginError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Open payload map keyed by field name.
pub type PayloadMap = BTreeMap<String, PayloadValue>;

/// A payload value as callers see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<PayloadValue>),
    Map(PayloadMap),
}

impl PayloadValue {
    /// Build from arbitrary JSON. Integers beyond 2^53 lose precision.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => PayloadValue::Null,
            serde_json::Value::Bool(b) => PayloadValue::Bool(b),
            serde_json::Value::Number(n) => PayloadValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => PayloadValue::String(s),
            serde_json::Value::Array(items) => {
                PayloadValue::List(items.into_iter().map(PayloadValue::from_json).collect())
            }
            serde_json::Value::Object(fields) => PayloadValue::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, PayloadValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Render as JSON. Non-finite numbers become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PayloadValue::Null => serde_json::Value::Null,
            PayloadValue::Bool(b) => serde_json::Value::Bool(*b),
            PayloadValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PayloadValue::String(s) => serde_json::Value::String(s.clone()),
            PayloadValue::List(items) => {
                serde_json::Value::Array(items.iter().map(PayloadValue::to_json).collect())
            }
            PayloadValue::Map(fields) => serde_json::Value::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<bool> for PayloadValue {
    fn from(value: bool) -> Self {
        PayloadValue::Bool(value)
    }
}

impl From<f64> for PayloadValue {
    fn from(value: f64) -> Self {
        PayloadValue::Number(value)
    }
}

impl From<i32> for PayloadValue {
    fn from(value: i32) -> Self {
        PayloadValue::Number(f64::from(value))
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        PayloadValue::String(value.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        PayloadValue::String(value)
    }
}

impl From<Vec<PayloadValue>> for PayloadValue {
    fn from(value: Vec<PayloadValue>) -> Self {
        PayloadValue::List(value)
    }
}

impl From<PayloadMap> for PayloadValue {
    fn from(value: PayloadMap) -> Self {
        PayloadValue::Map(value)
    }
}

/// Structured value as carried on the RPC wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WireValue {
    NullValue,
    BoolValue(bool),
    NumberValue(f64),
    StringValue(String),
    ListValue(WireList),
    StructValue(WireStruct),
}

/// Ordered list of wire values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireList {
    #[serde(default)]
    pub values: Vec<WireValue>,
}

/// Field map of wire values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireStruct {
    #[serde(default)]
    pub fields: BTreeMap<String, WireValue>,
}

/// Convert a payload map into its wire struct.
///
/// Fails on NaN or infinite numbers, naming the offending field path.
pub fn to_wire_struct(payload: &PayloadMap) -> Result<WireStruct> {
    map_to_wire(payload, "")
}

/// Convert a wire struct back into a payload map.
pub fn from_wire_struct(wire: &WireStruct) -> PayloadMap {
    wire.fields
        .iter()
        .map(|(k, v)| (k.clone(), from_wire_value(v)))
        .collect()
}

/// Convert one payload value into a wire value.
pub fn to_wire_value(value: &PayloadValue) -> Result<WireValue> {
    value_to_wire(value, "")
}

/// Convert one wire value into a payload value.
pub fn from_wire_value(value: &WireValue) -> PayloadValue {
    match value {
        WireValue::NullValue => PayloadValue::Null,
        WireValue::BoolValue(b) => PayloadValue::Bool(*b),
        WireValue::NumberValue(n) => PayloadValue::Number(*n),
        WireValue::StringValue(s) => PayloadValue::String(s.clone()),
        WireValue::ListValue(list) => {
            PayloadValue::List(list.values.iter().map(from_wire_value).collect())
        }
        WireValue::StructValue(st) => PayloadValue::Map(from_wire_struct(st)),
    }
}

fn map_to_wire(payload: &PayloadMap, prefix: &str) -> Result<WireStruct> {
    let mut fields = BTreeMap::new();
    for (key, value) in payload {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        fields.insert(key.clone(), value_to_wire(value, &path)?);
    }
    Ok(WireStruct { fields })
}

fn value_to_wire(value: &PayloadValue, path: &str) -> Result<WireValue> {
    Ok(match value {
        PayloadValue::Null => WireValue::NullValue,
        PayloadValue::Bool(b) => WireValue::BoolValue(*b),
        PayloadValue::Number(n) => {
            if !n.is_finite() {
                return Err(PluginError::InvalidPayload {
                    path: display_path(path),
                    message: format!("number {} cannot be encoded", n),
                });
            }
            WireValue::NumberValue(*n)
        }
        PayloadValue::String(s) => WireValue::StringValue(s.clone()),
        PayloadValue::List(items) => {
            let values = items
                .iter()
                .enumerate()
                .map(|(i, item)| value_to_wire(item, &format!("{}[{}]", path, i)))
                .collect::<Result<Vec<_>>>()?;
            WireValue::ListValue(WireList { values })
        }
        PayloadValue::Map(fields) => WireValue::StructValue(map_to_wire(fields, path)?),
    })
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}
