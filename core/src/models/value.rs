// Copyright 2025 The TreeDb Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{collections::BTreeMap, sync::Arc};

use ordered_float::OrderedFloat;

/// A stored value. The absent value is modeled as `Option<Value>::None` at
/// the API boundary; everything that exists in the tree is one of these.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Float(OrderedFloat<f64>),
    Integer(i64),
    String(Arc<str>),
    List(Vec<Value>),
    Object(PropertyMap),
}

impl Value {
    /// Shape discriminator reported by the `$type` query modifier.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Float(_) | Value::Integer(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Object(_) => "object",
        }
    }

    /// Empty values act as tombstones when rows are folded into a tree.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::List(l) => l.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        }
    }

    pub fn as_object(&self) -> Option<&PropertyMap> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(f.into_inner()),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

/// True when the optional value is absent or empty.
pub fn is_empty(value: Option<&Value>) -> bool {
    value.map_or(true, Value::is_empty)
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(OrderedFloat(f))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<&Value> for serde_json::Value {
    fn from(val: &Value) -> Self {
        match val {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Float(f) => match serde_json::Number::from_f64(f.into_inner()) {
                Some(n) => serde_json::Value::Number(n),
                None => serde_json::Value::Null,
            },
            Value::Integer(i) => serde_json::Value::Number(serde_json::Number::from(*i)),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::List(l) => serde_json::Value::Array(l.iter().map(|x| x.into()).collect()),
            Value::Object(o) => serde_json::Value::Object(o.into()),
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(OrderedFloat(f))
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::String(Arc::from(s.as_str())),
            serde_json::Value::Array(a) => Value::List(a.iter().map(|x| x.into()).collect()),
            serde_json::Value::Object(o) => Value::Object(o.into()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        (&value).into()
    }
}

/// A string-keyed tree node. Child keys enumerate in sorted order.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct PropertyMap {
    values: BTreeMap<Arc<str>, Value>,
}

impl Default for PropertyMap {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyMap {
    pub fn new() -> Self {
        PropertyMap {
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.values.get_mut(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.values.insert(Arc::from(key), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Arc<str>> {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &Value)> {
        self.values.iter()
    }
}

impl From<BTreeMap<String, Value>> for PropertyMap {
    fn from(map: BTreeMap<String, Value>) -> Self {
        let mut values = BTreeMap::new();
        for (key, value) in map {
            values.insert(Arc::from(key.as_str()), value);
        }
        PropertyMap { values }
    }
}

impl From<&PropertyMap> for serde_json::Map<String, serde_json::Value> {
    fn from(val: &PropertyMap) -> Self {
        val.values
            .iter()
            .map(|(k, v)| (k.to_string(), v.into()))
            .collect()
    }
}

impl From<&serde_json::Map<String, serde_json::Value>> for PropertyMap {
    fn from(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let mut values = BTreeMap::new();
        for (key, value) in map.iter() {
            values.insert(Arc::from(key.as_str()), value.into());
        }
        PropertyMap { values }
    }
}

impl From<&serde_json::Value> for PropertyMap {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(o) => o.into(),
            _ => PropertyMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_roundtrip() {
        let json = json!({
            "name": "sensor-4",
            "online": true,
            "reading": 21.5,
            "count": 3,
            "tags": ["a", "b"],
            "nested": { "x": null }
        });
        let value: Value = (&json).into();
        let back: serde_json::Value = (&value).into();
        assert_eq!(json, back);
    }

    #[test]
    fn emptiness() {
        assert!(is_empty(None));
        assert!(Value::Null.is_empty());
        assert!(Value::Object(PropertyMap::new()).is_empty());
        assert!(Value::List(vec![]).is_empty());
        assert!(!Value::Bool(false).is_empty());
        assert!(!Value::Integer(0).is_empty());
        assert!(!Value::from("").is_empty());

        let mut map = PropertyMap::new();
        map.insert("a", Value::Null);
        assert!(!Value::Object(map).is_empty());
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::from(true).type_name(), "boolean");
        assert_eq!(Value::from(1i64).type_name(), "number");
        assert_eq!(Value::from(1.5).type_name(), "number");
        assert_eq!(Value::from("s").type_name(), "string");
        assert_eq!(Value::List(vec![]).type_name(), "list");
        assert_eq!(Value::Object(PropertyMap::new()).type_name(), "object");
    }

    #[test]
    fn property_map_sorted_keys() {
        let mut map = PropertyMap::new();
        map.insert("b", Value::from(2i64));
        map.insert("a", Value::from(1i64));
        let keys: Vec<&str> = map.keys().map(|k| k.as_ref()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn non_finite_float_serializes_as_null() {
        let value = Value::from(f64::NAN);
        let json: serde_json::Value = (&value).into();
        assert_eq!(json, serde_json::Value::Null);
    }
}
