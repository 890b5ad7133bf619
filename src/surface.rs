//! Output slots for computed values.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
    Array(Vec<f64>),
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        MetricValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

impl From<Vec<f64>> for MetricValue {
    fn from(v: Vec<f64>) -> Self {
        MetricValue::Array(v)
    }
}

/// Receiver of computed values. The agent's control system owns the real
/// slots; [`MetricStore`] is the in-process implementation.
pub trait MetricSink: Send + Sync {
    fn publish(&self, name: &str, value: MetricValue);
}

#[derive(Debug, Default)]
pub struct MetricStore {
    values: RwLock<BTreeMap<String, MetricValue>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<MetricValue> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Convenience for numeric slots.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            MetricValue::Float(v) => Some(v),
            MetricValue::Int(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, MetricValue> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot())
    }
}

impl MetricSink for MetricStore {
    fn publish(&self, name: &str, value: MetricValue) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_overwrites_slot() {
        let store = MetricStore::new();
        store.publish("system.cpu_total", 12.5.into());
        store.publish("system.cpu_total", (-1.0).into());
        assert_eq!(store.get_f64("system.cpu_total"), Some(-1.0));
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn snapshot_serializes_untagged() {
        let store = MetricStore::new();
        store.publish("a", 3u64.into());
        store.publish("b", vec![1.0, 2.5].into());
        store.publish("c", "up".into());
        store.publish("d", true.into());
        assert_eq!(
            store.to_json().unwrap(),
            r#"{"a":3,"b":[1.0,2.5],"c":"up","d":true}"#
        );
    }
}
