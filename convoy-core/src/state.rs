// ABOUTME: Append-only key/value record threaded through a scenario's steps
// ABOUTME: Values are stored as JSON so any serializable service type can be recorded

use crate::error::StateError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Accumulated results of the steps run so far.
///
/// Keys are write-once: a later step can read what an earlier step recorded
/// but can never replace it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioState {
    values: BTreeMap<String, Value>,
}

impl ScenarioState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value under a new key
    pub fn insert<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), StateError> {
        let key = key.into();
        if self.values.contains_key(&key) {
            return Err(StateError::KeyExists(key));
        }
        let value = serde_json::to_value(value).map_err(|source| StateError::Encode {
            key: key.clone(),
            source,
        })?;
        self.values.insert(key, value);
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert) for step bodies
    pub fn with<T: Serialize + ?Sized>(
        mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Self, StateError> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Read a value back as a typed record
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, StateError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| StateError::Missing(key.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|source| StateError::Decode {
            key: key.to_string(),
            source,
        })
    }

    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// JSON object of every recorded key
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}
