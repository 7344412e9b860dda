use serde_json::{Map, Value};

use crate::converter::value::{block_object, is_populated};
use crate::error::{ProviderError, ProviderResult};

/// Attribute tree of one resource instance for the duration of one operation.
///
/// Holds the prior state it was created from so `has_change` can compare.
#[derive(Debug, Clone, Default)]
pub struct ResourceData {
    id: String,
    attributes: Map<String, Value>,
    prior: Map<String, Value>,
    schema: Option<Vec<String>>,
}

impl ResourceData {
    pub fn new(id: impl Into<String>, attributes: Map<String, Value>) -> Self {
        ResourceData {
            id: id.into(),
            prior: attributes.clone(),
            attributes,
            schema: None,
        }
    }

    pub fn from_value(id: impl Into<String>, attributes: Value) -> ProviderResult<Self> {
        match attributes {
            Value::Object(map) => Ok(Self::new(id, map)),
            Value::Null => Ok(Self::new(id, Map::new())),
            other => Err(ProviderError::State {
                key: String::new(),
                reason: format!("resource attributes must be a map, got {}", other),
            }),
        }
    }

    /// Restricts `set` to the declared top-level attributes.
    pub fn with_schema(mut self, keys: &[&str]) -> Self {
        self.schema = Some(keys.iter().map(|k| k.to_string()).collect());
        self
    }

    /// Replaces the prior state used by `has_change`.
    pub fn with_prior(mut self, prior: Map<String, Value>) -> Self {
        self.prior = prior;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// The value when it is set to something other than its zero value.
    pub fn get_ok(&self, key: &str) -> Option<&Value> {
        self.get(key).filter(|v| is_populated(v))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// The object behind a singleton nested block attribute.
    pub fn get_block(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(block_object)
    }

    pub fn set(&mut self, key: &str, value: Value) -> ProviderResult<()> {
        if let Some(schema) = &self.schema {
            if !schema.iter().any(|k| k == key) {
                return Err(ProviderError::State {
                    key: key.to_string(),
                    reason: "attribute is not declared by the resource schema".into(),
                });
            }
        }
        self.attributes.insert(key.to_string(), value);
        Ok(())
    }

    /// Unsets a top-level attribute, returning its last value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    pub fn has_change(&self, key: &str) -> bool {
        self.attributes.get(key) != self.prior.get(key)
    }

    /// Drops the resource from state, as after a read finds it gone.
    pub fn clear(&mut self) {
        self.id.clear();
        self.attributes.clear();
    }

    pub fn is_cleared(&self) -> bool {
        self.id.is_empty()
    }
}
