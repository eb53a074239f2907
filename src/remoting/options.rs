//! Connection creation options.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use tracing::warn;

/// Ordered option-name to string-value map with unique keys.
///
/// Writing an existing key replaces its value in place, keeping the
/// original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    entries: Vec<(String, String)>,
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse options from an intent or stored attribute.
    ///
    /// Accepts an object (`{"KEY": "value"}`) or a list of
    /// `{"name": .., "value": ..}` entries; `null` means no options.
    /// Entries without a key are dropped silently and entries with a null
    /// value are skipped with a warning. Numbers and booleans are
    /// stringified. Anything else is reported as a violation; all of them
    /// are collected.
    pub fn from_value(value: &Value) -> Result<Self, Vec<String>> {
        let mut options = Self::new();
        let mut violations = Vec::new();

        match value {
            Value::Null => {}
            Value::Object(map) => {
                for (key, value) in map {
                    options.accept(key, Some(value), &mut violations);
                }
            }
            Value::Array(entries) => {
                for (index, entry) in entries.iter().enumerate() {
                    let Some(entry) = entry.as_object() else {
                        violations.push(format!(
                            "connection-creation-options[{}] must be a {{name, value}} entry",
                            index
                        ));
                        continue;
                    };
                    match entry.get("name") {
                        None | Some(Value::Null) => continue,
                        Some(Value::String(key)) => {
                            options.accept(key, entry.get("value"), &mut violations)
                        }
                        Some(_) => violations.push(format!(
                            "connection-creation-options[{}].name must be a string",
                            index
                        )),
                    }
                }
            }
            _ => violations.push(
                "connection-creation-options must be a map or a list of {name, value} entries"
                    .to_string(),
            ),
        }

        if violations.is_empty() {
            Ok(options)
        } else {
            Err(violations)
        }
    }

    fn accept(&mut self, key: &str, value: Option<&Value>, violations: &mut Vec<String>) {
        match value {
            None | Some(Value::Null) => {
                warn!(option = %key, "Skipping connection option with no value");
            }
            Some(Value::String(s)) => {
                self.insert(key, s.as_str());
            }
            Some(v @ (Value::Number(_) | Value::Bool(_))) => {
                self.insert(key, v.to_string());
            }
            Some(_) => violations.push(format!(
                "connection-creation-options '{}' must have a scalar value",
                key
            )),
        }
    }

    /// Storage form: a list of `{name, value}` entries, which keeps order.
    pub fn to_value(&self) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|(k, v)| json!({"name": k, "value": v}))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConnectionOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (k, v) in iter {
            options.insert(k, v);
        }
        options
    }
}

impl Serialize for ConnectionOptions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_in_place() {
        let mut options = ConnectionOptions::new();
        options.insert("A", "1");
        options.insert("B", "2");
        assert_eq!(options.insert("A", "3"), Some("1".to_string()));
        let pairs: Vec<_> = options.iter().collect();
        assert_eq!(pairs, vec![("A", "3"), ("B", "2")]);
    }

    #[test]
    fn test_from_object_stringifies_scalars() {
        let options =
            ConnectionOptions::from_value(&json!({"RECONNECT_TASKS": 3, "SASL": true, "X": "y"}))
                .unwrap();
        assert_eq!(options.get("RECONNECT_TASKS"), Some("3"));
        assert_eq!(options.get("SASL"), Some("true"));
        assert_eq!(options.get("X"), Some("y"));
    }

    #[test]
    fn test_from_list_drops_missing_keys_and_null_values() {
        let options = ConnectionOptions::from_value(&json!([
            {"name": "KEEP", "value": "1"},
            {"name": null, "value": "dropped"},
            {"value": "dropped"},
            {"name": "NULL_VALUE", "value": null},
            {"name": "KEEP", "value": "2"}
        ]))
        .unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options.get("KEEP"), Some("2"));
    }

    #[test]
    fn test_null_and_empty_are_valid() {
        assert!(ConnectionOptions::from_value(&Value::Null).unwrap().is_empty());
        assert!(ConnectionOptions::from_value(&json!({})).unwrap().is_empty());
        assert!(ConnectionOptions::from_value(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn test_bad_containers_collect_every_violation() {
        let err = ConnectionOptions::from_value(&json!([
            "not-an-entry",
            {"name": 7, "value": "x"},
            {"name": "NESTED", "value": {"a": 1}}
        ]))
        .unwrap_err();
        assert_eq!(err.len(), 3);

        assert!(ConnectionOptions::from_value(&json!("RECONNECT_TASKS=3")).is_err());
    }

    #[test]
    fn test_storage_form_round_trips_in_order() {
        let options: ConnectionOptions = [("Z", "1"), ("A", "2")].into_iter().collect();
        let parsed = ConnectionOptions::from_value(&options.to_value()).unwrap();
        assert_eq!(parsed, options);
        assert_eq!(
            serde_json::to_string(&options).unwrap(),
            r#"{"Z":"1","A":"2"}"#
        );
    }

    #[test]
    fn test_from_object_keeps_submission_order() {
        let options = ConnectionOptions::from_value(&json!({"ZETA": "1", "ALPHA": "2"})).unwrap();
        let keys: Vec<&str> = options.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["ZETA", "ALPHA"]);
    }
}
