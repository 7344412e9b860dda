//! Primitive helpers shared by the converter and the scope resolver.

use serde_json::{Map, Number, Value};

use super::ConvertError;

/// How a leaf value is transformed when it crosses between the trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coercion {
    #[default]
    Verbatim,
    /// Terraform holds a number, the API model transmits it as a string.
    NumberAsString,
}

impl Coercion {
    pub fn to_model(self, value: &Value, tf_path: &str) -> Result<Value, ConvertError> {
        match (self, value) {
            (Coercion::Verbatim, v) => Ok(v.clone()),
            (Coercion::NumberAsString, Value::Number(n)) => Ok(Value::String(n.to_string())),
            (Coercion::NumberAsString, Value::String(s)) if parse_number(s).is_some() => {
                Ok(Value::String(s.clone()))
            }
            (Coercion::NumberAsString, other) => Err(ConvertError::TypeMismatch {
                path: tf_path.to_string(),
                message: format!("expected a number, found {}", kind_of(other)),
            }),
        }
    }

    pub fn to_tf(self, value: &Value, model_path: &str) -> Result<Value, ConvertError> {
        match (self, value) {
            (Coercion::Verbatim, v) => Ok(v.clone()),
            (Coercion::NumberAsString, Value::Number(n)) => Ok(Value::Number(n.clone())),
            (Coercion::NumberAsString, Value::String(s)) => {
                parse_number(s).map(Value::Number).ok_or_else(|| ConvertError::TypeMismatch {
                    path: model_path.to_string(),
                    message: format!("{:?} is not a numeric string", s),
                })
            }
            (Coercion::NumberAsString, other) => Err(ConvertError::TypeMismatch {
                path: model_path.to_string(),
                message: format!("expected a numeric string, found {}", kind_of(other)),
            }),
        }
    }
}

fn parse_number(s: &str) -> Option<Number> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// False for null and for the zero value of each kind, mirroring how the
/// SDK reports unset attributes.
pub fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// The object behind a singleton nested block. Blocks arrive either as a
/// one-element list or as a bare object; a longer list is not a block.
pub fn block_object(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Array(items) if items.len() == 1 => items[0].as_object(),
        Value::Array(_) => None,
        Value::Object(map) => Some(map),
        _ => None,
    }
}

pub fn get_str<'a>(block: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    block.get(key).and_then(Value::as_str)
}

pub fn get_string(block: &Map<String, Value>, key: &str) -> String {
    get_str(block, key).unwrap_or_default().to_string()
}
