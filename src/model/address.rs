//! Hierarchical resource addresses.
//!
//! An address is a path of `type=value` elements, written
//! `/subsystem=remoting/local-outbound-connection=to-node2`. The empty path
//! is the model root and displays as `/`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};

/// One `type=value` step of a [`ResourceAddress`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathElement {
    pub key: String,
    pub value: String,
}

impl PathElement {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Address of one node in the configuration model.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceAddress {
    elements: Vec<PathElement>,
}

impl ResourceAddress {
    /// The model root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Build an address from `(type, value)` pairs.
    pub fn of(pairs: &[(&str, &str)]) -> Self {
        Self {
            elements: pairs.iter().map(|(k, v)| PathElement::new(*k, *v)).collect(),
        }
    }

    /// Address of the remoting subsystem.
    pub fn remoting_subsystem() -> Self {
        Self::of(&[("subsystem", "remoting")])
    }

    /// Parse `/type=value/type=value`. A lone `/` is the root.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let Some(body) = trimmed.strip_prefix('/') else {
            return Err(ProvisionError::Validation(vec![format!(
                "Address '{}' must start with '/'",
                raw
            )]));
        };
        if body.is_empty() {
            return Ok(Self::root());
        }

        let mut elements = Vec::new();
        let mut violations = Vec::new();
        for step in body.split('/') {
            match step.split_once('=') {
                Some((key, value)) if !key.is_empty() && !value.is_empty() => {
                    elements.push(PathElement::new(key, value));
                }
                _ => violations.push(format!(
                    "Address '{}' has malformed element '{}' (expected type=value)",
                    raw, step
                )),
            }
        }
        if !violations.is_empty() {
            return Err(ProvisionError::Validation(violations));
        }
        Ok(Self { elements })
    }

    /// Child address with one more element.
    pub fn append(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut elements = self.elements.clone();
        elements.push(PathElement::new(key, value));
        Self { elements }
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.elements.split_last()?;
        Some(Self {
            elements: rest.to_vec(),
        })
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    pub fn is_root(&self) -> bool {
        self.elements.is_empty()
    }

    /// Type of the last element (e.g. `local-outbound-connection`).
    pub fn resource_type(&self) -> Option<&str> {
        self.elements.last().map(|e| e.key.as_str())
    }

    /// Value of the last element (e.g. `to-node2`).
    pub fn name(&self) -> Option<&str> {
        self.elements.last().map(|e| e.value.as_str())
    }

    /// True if `other` is a direct child of this address.
    pub fn is_parent_of(&self, other: &ResourceAddress) -> bool {
        other.elements.len() == self.elements.len() + 1
            && other.elements.starts_with(&self.elements)
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.elements.is_empty() {
            return f.write_str("/");
        }
        for element in &self.elements {
            write!(f, "/{}", element)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ResourceAddress {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceAddress {
    type Error = ProvisionError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ResourceAddress> for String {
    fn from(address: ResourceAddress) -> Self {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let raw = "/subsystem=remoting/local-outbound-connection=to-node2";
        let address = ResourceAddress::parse(raw).unwrap();
        assert_eq!(address.elements().len(), 2);
        assert_eq!(address.resource_type(), Some("local-outbound-connection"));
        assert_eq!(address.name(), Some("to-node2"));
        assert_eq!(address.to_string(), raw);
    }

    #[test]
    fn test_root() {
        let root = ResourceAddress::parse("/").unwrap();
        assert!(root.is_root());
        assert_eq!(root.to_string(), "/");
        assert!(root.parent().is_none());
        assert!(root.name().is_none());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ResourceAddress::parse("subsystem=remoting").is_err());
        match ResourceAddress::parse("/subsystem/x=").unwrap_err() {
            ProvisionError::Validation(v) => assert_eq!(v.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_append_and_parent() {
        let subsystem = ResourceAddress::remoting_subsystem();
        let conn = subsystem.append("remote-outbound-connection", "to-node3");
        assert_eq!(conn.parent(), Some(subsystem.clone()));
        assert!(subsystem.is_parent_of(&conn));
        assert!(!conn.is_parent_of(&subsystem));
        assert!(!ResourceAddress::root().is_parent_of(&conn));
    }

    #[test]
    fn test_serde_as_string() {
        let address = ResourceAddress::of(&[("subsystem", "remoting")]);
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, "\"/subsystem=remoting\"");
        let back: ResourceAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
        assert!(serde_json::from_str::<ResourceAddress>("\"nope\"").is_err());
    }
}
