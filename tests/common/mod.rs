//! In-memory record store shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use live_records::{
    Client, ClientConfig, ClientError, Method, RequestDescriptor, Response, Result, SendOptions,
    Transport,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub age: i64,
}

#[derive(Clone, Debug)]
pub struct Sent {
    pub method: Method,
    pub path: String,
    pub options: SendOptions,
}

/// Transport answering from an in-memory map of records.
#[derive(Default)]
pub struct MemoryTransport {
    asts: Mutex<HashMap<String, String>>,
    records: Mutex<BTreeMap<(String, String), Value>>,
    failures: Mutex<Vec<ClientError>>,
    sent: Mutex<Vec<Sent>>,
}

pub fn schema_ast() -> String {
    let string = json!({ "kind": "primitive", "value": "string" });
    let number = json!({ "kind": "primitive", "value": "number" });
    json!([
        {
            "kind": "collection",
            "name": "users",
            "attributes": [
                { "kind": "property", "name": "id", "type": string, "required": true },
                { "kind": "property", "name": "age", "type": number, "required": true },
                { "kind": "directive", "name": "read", "arguments": [] },
                {
                    "kind": "method",
                    "name": "constructor",
                    "attributes": [
                        { "kind": "parameter", "name": "id", "type": string, "required": true },
                        { "kind": "parameter", "name": "age", "type": number, "required": true }
                    ]
                },
                { "kind": "method", "name": "birthday", "attributes": [] }
            ]
        },
        {
            "kind": "collection",
            "name": "secrets",
            "attributes": [
                { "kind": "property", "name": "id", "type": string, "required": true },
                { "kind": "property", "name": "age", "type": number, "required": true },
                { "kind": "directive", "name": "read", "arguments": ["owner"] }
            ]
        }
    ])
    .to_string()
}

impl MemoryTransport {
    /// Store knowing `app/users` (public) and `app/secrets` (signed reads).
    pub fn new() -> Arc<Self> {
        let transport = Self::default();
        {
            let mut asts = transport.asts.lock();
            asts.insert("app/users".to_string(), schema_ast());
            asts.insert("app/secrets".to_string(), schema_ast());
        }
        Arc::new(transport)
    }

    pub fn insert(&self, collection: &str, id: &str, age: i64) {
        self.records.lock().insert(
            (collection.to_string(), id.to_string()),
            json!({ "id": id, "age": age }),
        );
    }

    /// Fail the next send with `error`.
    pub fn fail_next(&self, error: ClientError) {
        self.failures.lock().push(error);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|s| s.method == method && s.path == path)
            .count()
    }

    pub fn last_to(&self, method: Method, path: &str) -> Option<Sent> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|s| s.method == method && s.path == path)
            .cloned()
    }
}

fn record(data: &Value) -> Value {
    json!({ "data": data, "block": { "hash": "0x01" } })
}

fn not_found(collection: &str, id: &str) -> ClientError {
    ClientError::RecordNotFound(format!("{}/{}", collection, id))
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, descriptor: &RequestDescriptor, options: SendOptions) -> Result<Response> {
        self.sent.lock().push(Sent {
            method: descriptor.method(),
            path: descriptor.path(),
            options,
        });
        if let Some(error) = self.failures.lock().pop() {
            return Err(error);
        }

        let segments: Vec<&str> = descriptor.segments().iter().map(String::as_str).collect();
        let args = descriptor
            .body()
            .and_then(|b| b.get("args"))
            .cloned()
            .unwrap_or(Value::Null);
        let mut records = self.records.lock();

        match (descriptor.method(), segments.as_slice()) {
            (Method::Get, ["collections", "Collection", "records", id]) => {
                let ast = self.asts.lock().get(*id).cloned();
                match ast {
                    Some(ast) => Ok(Response::ok(json!({ "data": { "id": id, "ast": ast } }))),
                    None => Err(not_found("Collection", id)),
                }
            }
            (Method::Get, ["collections", c, "records"]) => {
                let data: Vec<Value> = records
                    .iter()
                    .filter(|((collection, _), _)| collection.as_str() == *c)
                    .map(|(_, v)| record(v))
                    .collect();
                Ok(Response::ok(json!({ "data": data })))
            }
            (Method::Get, ["collections", c, "records", id]) => records
                .get(&(c.to_string(), id.to_string()))
                .map(|v| Response::ok(record(v)))
                .ok_or_else(|| not_found(c, id)),
            (Method::Post, ["collections", c, "records"]) => {
                let id = args[0].as_str().unwrap_or_default().to_string();
                let data = json!({ "id": id, "age": args[1] });
                records.insert((c.to_string(), id), data.clone());
                Ok(Response::ok(record(&data)))
            }
            (Method::Put, ["collections", c, "records", id]) => {
                let data = descriptor.body().cloned().unwrap_or(Value::Null);
                records.insert((c.to_string(), id.to_string()), data.clone());
                Ok(Response::ok(record(&data)))
            }
            (Method::Delete, ["collections", c, "records", id]) => {
                records
                    .remove(&(c.to_string(), id.to_string()))
                    .ok_or_else(|| not_found(c, id))?;
                Ok(Response::ok(Value::Null))
            }
            (Method::Post, ["collections", c, "records", id, "call", "birthday"]) => {
                let data = records
                    .get_mut(&(c.to_string(), id.to_string()))
                    .ok_or_else(|| not_found(c, id))?;
                data["age"] = json!(data["age"].as_i64().unwrap_or(0) + 1);
                Ok(Response::ok(record(data)))
            }
            _ => Err(ClientError::Status {
                status: 404,
                reason: "route/not-found".into(),
                message: descriptor.to_string(),
            }),
        }
    }
}

pub fn client(transport: &Arc<MemoryTransport>) -> Client {
    Client::with_transport(ClientConfig::default(), Arc::clone(transport) as Arc<dyn Transport>)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
