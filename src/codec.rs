//! Record codec: raw response payloads to typed records and back.
//!
//! Byte fields travel as base64 strings. Decoding turns them into JSON byte
//! arrays so they deserialize straight into `Vec<u8>`.

use crate::error::{ClientError, Result};
use crate::schema::{CollectionSchema, Primitive, Property, Type};
use crate::types::{CollectionList, RecordSnapshot};
use base64::{engine::general_purpose, Engine as _};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// One argument of a constructor or method call.
#[derive(Clone, Debug, PartialEq)]
pub enum CallArg {
    Value(Value),
    Bytes(Vec<u8>),
}

impl From<Value> for CallArg {
    fn from(v: Value) -> Self {
        CallArg::Value(v)
    }
}

impl From<Vec<u8>> for CallArg {
    fn from(v: Vec<u8>) -> Self {
        CallArg::Bytes(v)
    }
}

impl From<&[u8]> for CallArg {
    fn from(v: &[u8]) -> Self {
        CallArg::Bytes(v.to_vec())
    }
}

impl From<&str> for CallArg {
    fn from(v: &str) -> Self {
        CallArg::Value(Value::String(v.to_string()))
    }
}

impl From<String> for CallArg {
    fn from(v: String) -> Self {
        CallArg::Value(Value::String(v))
    }
}

impl From<i64> for CallArg {
    fn from(v: i64) -> Self {
        CallArg::Value(Value::from(v))
    }
}

impl From<f64> for CallArg {
    fn from(v: f64) -> Self {
        CallArg::Value(Value::from(v))
    }
}

impl From<bool> for CallArg {
    fn from(v: bool) -> Self {
        CallArg::Value(Value::Bool(v))
    }
}

/// Encode call arguments for the wire; bytes become base64 strings.
pub fn encode_call_args(args: Vec<CallArg>) -> Vec<Value> {
    args.into_iter()
        .map(|arg| match arg {
            CallArg::Value(v) => v,
            CallArg::Bytes(b) => Value::String(general_purpose::STANDARD.encode(b)),
        })
        .collect()
}

/// Schema-aware decoder for record payloads.
#[derive(Clone, Debug, Default)]
pub struct RecordCodec {
    properties: Vec<Property>,
}

impl RecordCodec {
    pub fn new(properties: Vec<Property>) -> Self {
        Self { properties }
    }

    pub fn from_schema(schema: &CollectionSchema) -> Self {
        Self::new(schema.properties().cloned().collect())
    }

    /// Codec that only runs serde, for collections without byte fields.
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Rewrite base64 byte fields of a record's `data` in place.
    pub fn decode_fields(&self, data: &mut Value) -> Result<()> {
        decode_properties(&self.properties, data, "")
    }

    /// Decode `{ data, block }`.
    pub fn decode_record<T: DeserializeOwned>(&self, mut raw: Value) -> Result<RecordSnapshot<T>> {
        if let Some(data) = raw.get_mut("data") {
            self.decode_fields(data)?;
        }
        Ok(serde_json::from_value(raw)?)
    }

    /// Decode `{ data: [{ data, block }], cursor }`.
    pub fn decode_list<T: DeserializeOwned>(&self, mut raw: Value) -> Result<CollectionList<T>> {
        if let Some(Value::Array(records)) = raw.get_mut("data") {
            for record in records {
                if let Some(data) = record.get_mut("data") {
                    self.decode_fields(data)?;
                }
            }
        }
        Ok(serde_json::from_value(raw)?)
    }
}

fn decode_properties(properties: &[Property], data: &mut Value, path: &str) -> Result<()> {
    let Some(object) = data.as_object_mut() else {
        return Ok(());
    };
    for property in properties {
        if let Some(value) = object.get_mut(&property.name) {
            let field_path = if path.is_empty() {
                property.name.clone()
            } else {
                format!("{}.{}", path, property.name)
            };
            decode_value(&property.ty, value, &field_path)?;
        }
    }
    Ok(())
}

fn decode_value(ty: &Type, value: &mut Value, path: &str) -> Result<()> {
    match ty {
        Type::Primitive {
            value: Primitive::Bytes,
        } => {
            if let Value::String(encoded) = value {
                let bytes = general_purpose::STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                    ClientError::Deserialization(format!("field '{}' is not valid base64: {}", path, e))
                })?;
                *value = Value::Array(bytes.into_iter().map(Value::from).collect());
            }
        }
        Type::Array { value: inner } => {
            if let Value::Array(items) = value {
                for item in items {
                    decode_value(inner, item, path)?;
                }
            }
        }
        Type::Map { value: inner, .. } => {
            if let Value::Object(entries) = value {
                for (_, v) in entries.iter_mut() {
                    decode_value(inner, v, path)?;
                }
            }
        }
        Type::Object { fields } => decode_properties(fields, value, path)?,
        _ => {}
    }
    Ok(())
}
