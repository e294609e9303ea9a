//! Runtime values of the workflow DSL

use std::fmt;
use std::sync::Arc;

use super::ast::Sexpr;
use super::env::Environment;

/// A user-defined function with its captured environment
#[derive(Debug, Clone)]
pub struct Closure {
    pub params: Vec<String>,
    pub body: Vec<Sexpr>,
    pub env: Arc<Environment>,
}

/// An evaluated value
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// A quoted symbol
    Symbol(String),
    Closure(Arc<Closure>),
    /// Opaque reference to a registered template, tool, or executor
    TemplateRef(String),
}

impl Value {
    /// Lisp-style truthiness: only `nil` and `false` are false
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Symbol(_) => "symbol",
            Value::Closure(_) => "closure",
            Value::TemplateRef(_) => "template",
        }
    }

    /// Convert a quoted datum into a value, structurally
    pub fn from_datum(datum: &Sexpr) -> Value {
        match datum {
            Sexpr::Symbol(name) => Value::Symbol(name.clone()),
            Sexpr::Str(s) => Value::Str(s.clone()),
            Sexpr::Int(n) => Value::Int(*n),
            Sexpr::Float(x) => Value::Float(*x),
            Sexpr::Bool(b) => Value::Bool(*b),
            Sexpr::Nil => Value::Nil,
            Sexpr::List(items) => Value::List(items.iter().map(Value::from_datum).collect()),
        }
    }

    /// Convert a JSON payload into a value
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(_) => Value::Str(json.to_string()),
        }
    }

    /// JSON rendering used for task inputs and result payloads
    ///
    /// Closures and template references degrade to descriptive strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Nil => serde_json::Value::Null,
            Value::Bool(b) => serde_json::json!(b),
            Value::Int(n) => serde_json::json!(n),
            Value::Float(x) => serde_json::json!(x),
            Value::Str(s) => serde_json::json!(s),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Symbol(name) => serde_json::json!(name),
            Value::Closure(_) => serde_json::json!("<closure>"),
            Value::TemplateRef(name) => serde_json::json!(format!("<template {}>", name)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            (Value::TemplateRef(a), Value::TemplateRef(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Symbol(name) => write!(f, "{}", name),
            Value::List(_) => write!(f, "{}", self.to_json()),
            Value::Closure(c) => write!(f, "<closure/{}>", c.params.len()),
            Value::TemplateRef(name) => write!(f, "<template {}>", name),
        }
    }
}
