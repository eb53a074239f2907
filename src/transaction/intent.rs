//! Configuration change requests.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::ResourceAddress;

/// Kind of change an intent requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Add,
    Remove,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Add => write!(f, "add"),
            OperationKind::Remove => write!(f, "remove"),
        }
    }
}

/// A structured request to change one configuration node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub op: OperationKind,
    pub address: ResourceAddress,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Intent {
    pub fn add(address: ResourceAddress) -> Self {
        Self {
            op: OperationKind::Add,
            address,
            attributes: Map::new(),
        }
    }

    pub fn remove(address: ResourceAddress) -> Self {
        Self {
            op: OperationKind::Remove,
            address,
            attributes: Map::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Type of the targeted resource (last address element).
    pub fn resource_type(&self) -> Option<&str> {
        self.address.resource_type()
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intent_from_json() {
        let intent: Intent = serde_json::from_value(json!({
            "op": "add",
            "address": "/subsystem=remoting/local-outbound-connection=to-node2",
            "attributes": {"socket-binding-reference": "node2-binding"}
        }))
        .unwrap();
        assert_eq!(intent.op, OperationKind::Add);
        assert_eq!(intent.resource_type(), Some("local-outbound-connection"));
        assert_eq!(
            intent.attribute("socket-binding-reference"),
            Some(&json!("node2-binding"))
        );
    }

    #[test]
    fn test_remove_has_no_attributes() {
        let intent: Intent = serde_json::from_value(json!({
            "op": "remove",
            "address": "/subsystem=remoting"
        }))
        .unwrap();
        assert!(intent.attributes.is_empty());
        assert_eq!(intent.to_string(), "/subsystem=remoting:remove");
    }
}
