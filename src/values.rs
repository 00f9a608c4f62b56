//! Runtime value types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::ErrorInfo;

/// Runtime value type
///
/// Promises and closures are represented by registry ids rather than inline
/// handles so that values stay serializable and comparable; the `Runtime`
/// owns the cells the ids refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Val {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Val>),
    Obj(HashMap<String, Val>),
    /// Pending or settled awaitable, by promise id
    Promise(String),
    /// Async closure instance, by instance id
    Closure(String),
    /// Error value with code and message
    Error(ErrorInfo),
}

impl Val {
    /// Check if value is truthy (for conditionals)
    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Bool(b) => *b,
            Val::Null => false,
            Val::Num(n) => *n != 0.0,
            Val::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "null",
            Val::Bool(_) => "bool",
            Val::Num(_) => "number",
            Val::Str(_) => "string",
            Val::List(_) => "list",
            Val::Obj(_) => "object",
            Val::Promise(_) => "promise",
            Val::Closure(_) => "closure",
            Val::Error(_) => "error",
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Val {
        Val::Error(ErrorInfo::new(code, message))
    }
}

/// Convert plain (untagged) JSON into a value, for host inputs
pub fn json_to_val(json: &serde_json::Value) -> Val {
    match json {
        serde_json::Value::Null => Val::Null,
        serde_json::Value::Bool(b) => Val::Bool(*b),
        serde_json::Value::Number(n) => Val::Num(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Val::Str(s.clone()),
        serde_json::Value::Array(items) => Val::List(items.iter().map(json_to_val).collect()),
        serde_json::Value::Object(map) => Val::Obj(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_val(v)))
                .collect(),
        ),
    }
}

/// Convert a value to plain JSON, for host outputs. Promises and closures
/// render as their display form; errors as a code/message object.
pub fn val_to_json(value: &Val) -> serde_json::Value {
    match value {
        Val::Null => serde_json::Value::Null,
        Val::Bool(b) => serde_json::json!(b),
        Val::Num(n) => serde_json::json!(n),
        Val::Str(s) => serde_json::json!(s),
        Val::List(items) => serde_json::Value::Array(items.iter().map(val_to_json).collect()),
        Val::Obj(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), val_to_json(v)))
                .collect(),
        ),
        Val::Promise(_) | Val::Closure(_) => serde_json::json!(value.to_string()),
        Val::Error(info) => serde_json::json!({
            "code": info.code,
            "message": info.message,
        }),
    }
}

impl std::fmt::Display for Val {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Val::Null => write!(f, "null"),
            Val::Bool(b) => write!(f, "{}", b),
            Val::Num(n) => write!(f, "{}", n),
            Val::Str(s) => write!(f, "{}", s),
            Val::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Val::Obj(map) => {
                let mut keys: Vec<_> = map.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, map[*key])?;
                }
                write!(f, "}}")
            }
            Val::Promise(id) => write!(f, "[promise {}]", id),
            Val::Closure(id) => write!(f, "[closure {}]", id),
            Val::Error(info) => write!(f, "[{}]", info),
        }
    }
}
