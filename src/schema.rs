//! Typed collection schemas and record validation.
//!
//! A collection's schema ships as a JSON AST inside its [`CollectionMeta`].
//! It is parsed once into a [`CollectionSchema`]; validators work on the
//! typed form.
//!
//! [`CollectionMeta`]: crate::types::CollectionMeta

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the meta-collection holding every collection's schema.
pub const META_COLLECTION: &str = "Collection";

/// Top-level AST node. Only collections are of interest.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum Node {
    Collection(CollectionSchema),
    #[serde(other)]
    Other,
}

/// Parsed schema of one collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Attribute {
    Property(Property),
    Directive(Directive),
    Method(MethodDef),
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default)]
    pub required: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<MethodAttribute>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MethodAttribute {
    Parameter(Property),
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Type {
    Primitive { value: Primitive },
    Array { value: Box<Type> },
    Map { key: Box<Type>, value: Box<Type> },
    Object { fields: Vec<Property> },
    ForeignRecord { collection: String },
    PublicKey,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    String,
    Number,
    Boolean,
    Bytes,
}

impl CollectionSchema {
    /// Find the schema of `collection_id` in a JSON-encoded AST.
    ///
    /// Collections are matched by the last `/`-separated segment of the id.
    pub fn from_ast(ast: &str, collection_id: &str) -> Result<Self> {
        let nodes: Vec<Node> = serde_json::from_str(ast)
            .map_err(|e| ClientError::Schema(format!("invalid AST for {}: {}", collection_id, e)))?;
        let name = short_name(collection_id);
        nodes
            .into_iter()
            .find_map(|node| match node {
                Node::Collection(schema) if schema.name == name => Some(schema),
                _ => None,
            })
            .ok_or_else(|| {
                ClientError::Schema(format!("collection {} not found in AST", collection_id))
            })
    }

    /// Built-in schema of the meta-collection.
    pub fn meta_collection() -> Self {
        let string = || Type::Primitive {
            value: Primitive::String,
        };
        Self {
            name: META_COLLECTION.to_string(),
            attributes: vec![
                Attribute::Property(Property {
                    name: "id".into(),
                    ty: string(),
                    required: true,
                }),
                Attribute::Property(Property {
                    name: "ast".into(),
                    ty: string(),
                    required: true,
                }),
                Attribute::Directive(Directive {
                    name: "public".into(),
                    arguments: Vec::new(),
                }),
            ],
        }
    }

    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.attributes.iter().filter_map(|a| match a {
            Attribute::Property(p) => Some(p),
            _ => None,
        })
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties().find(|p| p.name == name)
    }

    pub fn directives(&self) -> impl Iterator<Item = &Directive> {
        self.attributes.iter().filter_map(|a| match a {
            Attribute::Directive(d) => Some(d),
            _ => None,
        })
    }

    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::Method(m) if m.name == name => Some(m),
            _ => None,
        })
    }

    /// Readable without a signature: `@public`, or `@read` with no arguments.
    pub fn is_publicly_accessible(&self) -> bool {
        self.directives().any(|d| {
            d.name == "public" || (d.name == "read" && d.arguments.is_empty())
        })
    }
}

impl MethodDef {
    pub fn parameters(&self) -> impl Iterator<Item = &Property> {
        self.attributes.iter().filter_map(|a| match a {
            MethodAttribute::Parameter(p) => Some(p),
            MethodAttribute::Other => None,
        })
    }
}

/// Last `/`-separated segment of a collection id.
pub fn short_name(collection_id: &str) -> &str {
    collection_id.rsplit('/').next().unwrap_or(collection_id)
}

/// Structural validation of writes against a schema.
pub trait Validator: Send + Sync {
    /// Check a full record payload.
    fn validate_set(&self, schema: &CollectionSchema, data: &Value) -> Result<()>;

    /// Check the (already encoded) arguments of a method call.
    fn validate_call(&self, schema: &CollectionSchema, method: &str, args: &[Value]) -> Result<()>;
}

/// [`Validator`] that checks presence and JSON shape of every field.
#[derive(Clone, Copy, Debug, Default)]
pub struct SchemaValidator;

impl Validator for SchemaValidator {
    fn validate_set(&self, schema: &CollectionSchema, data: &Value) -> Result<()> {
        let object = data
            .as_object()
            .ok_or_else(|| ClientError::Validation("record must be an object".into()))?;

        for property in schema.properties() {
            match object.get(&property.name) {
                None | Some(Value::Null) if property.required => {
                    return Err(ClientError::Validation(format!(
                        "missing required field '{}'",
                        property.name
                    )));
                }
                None | Some(Value::Null) => {}
                Some(value) => check_type(&property.ty, value, &property.name)?,
            }
        }

        if let Some(unknown) = object.keys().find(|k| schema.property(k).is_none()) {
            return Err(ClientError::Validation(format!("unexpected field '{}'", unknown)));
        }

        Ok(())
    }

    fn validate_call(&self, schema: &CollectionSchema, method: &str, args: &[Value]) -> Result<()> {
        let def = schema.method(method).ok_or_else(|| {
            ClientError::Validation(format!("{} has no method '{}'", schema.name, method))
        })?;
        let params: Vec<&Property> = def.parameters().collect();

        if args.len() > params.len() {
            return Err(ClientError::Validation(format!(
                "{} takes {} arguments, got {}",
                method,
                params.len(),
                args.len()
            )));
        }

        for (i, param) in params.iter().enumerate() {
            match args.get(i) {
                None | Some(Value::Null) if param.required => {
                    return Err(ClientError::Validation(format!(
                        "missing argument '{}' to {}",
                        param.name, method
                    )));
                }
                None | Some(Value::Null) => {}
                Some(value) => check_type(&param.ty, value, &param.name)?,
            }
        }

        Ok(())
    }
}

fn check_type(ty: &Type, value: &Value, path: &str) -> Result<()> {
    let ok = match ty {
        Type::Primitive { value: p } => match p {
            Primitive::String => value.is_string(),
            Primitive::Number => value.is_number(),
            Primitive::Boolean => value.is_boolean(),
            // base64 on the wire, byte array once decoded
            Primitive::Bytes => value.is_string() || is_byte_array(value),
        },
        Type::Array { value: inner } => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    check_type(inner, item, &format!("{}[{}]", path, i))?;
                }
                true
            }
            None => false,
        },
        Type::Map { value: inner, .. } => match value.as_object() {
            Some(entries) => {
                for (k, v) in entries {
                    check_type(inner, v, &format!("{}.{}", path, k))?;
                }
                true
            }
            None => false,
        },
        Type::Object { fields } => match value.as_object() {
            Some(object) => {
                for field in fields {
                    let field_path = format!("{}.{}", path, field.name);
                    match object.get(&field.name) {
                        None | Some(Value::Null) if field.required => {
                            return Err(ClientError::Validation(format!(
                                "missing required field '{}'",
                                field_path
                            )));
                        }
                        None | Some(Value::Null) => {}
                        Some(v) => check_type(&field.ty, v, &field_path)?,
                    }
                }
                true
            }
            None => false,
        },
        Type::ForeignRecord { .. } => value
            .get("id")
            .map(Value::is_string)
            .unwrap_or(false),
        Type::PublicKey => value.is_object() || value.is_string(),
        Type::Unknown => true,
    };

    if ok {
        Ok(())
    } else {
        Err(ClientError::Validation(format!(
            "field '{}' has the wrong type: {}",
            path, value
        )))
    }
}

fn is_byte_array(value: &Value) -> bool {
    value
        .as_array()
        .map(|items| items.iter().all(|v| v.as_u64().map(|n| n <= 255).unwrap_or(false)))
        .unwrap_or(false)
}
