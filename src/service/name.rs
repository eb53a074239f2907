//! Hierarchical service identifiers.
//!
//! A [`ServiceName`] is a dotted path such as
//! `remoting.outbound-connection.to-node2`. Names are compared segment-wise,
//! so `a.b` is the parent of `a.b.c` but not of `a.bc`. A dot or backslash
//! inside a segment is written as `\.` or `\\` in the string form.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProvisionError, Result};

/// Base name of the remoting subsystem endpoint every connection depends on.
pub static SUBSYSTEM_ENDPOINT: Lazy<ServiceName> =
    Lazy::new(|| ServiceName::of(&["remoting", "endpoint", "subsystem"]));

/// Base name under which resolved outbound socket bindings are published.
pub static OUTBOUND_SOCKET_BINDING_BASE: Lazy<ServiceName> =
    Lazy::new(|| ServiceName::of(&["network", "outbound-socket-binding"]));

/// Generic base name shared by every outbound connection type.
pub static OUTBOUND_CONNECTION_BASE: Lazy<ServiceName> =
    Lazy::new(|| ServiceName::of(&["remoting", "outbound-connection"]));

/// Type-qualified alias base for local outbound connections.
pub static LOCAL_OUTBOUND_CONNECTION_BASE: Lazy<ServiceName> =
    Lazy::new(|| ServiceName::of(&["remoting", "local-outbound-connection"]));

/// Type-qualified alias base for remote outbound connections.
pub static REMOTE_OUTBOUND_CONNECTION_BASE: Lazy<ServiceName> =
    Lazy::new(|| ServiceName::of(&["remoting", "remote-outbound-connection"]));

/// A globally unique, hierarchical service identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceName {
    segments: Vec<String>,
}

impl ServiceName {
    /// Build a name from literal segments.
    ///
    /// Segments are taken as-is; use [`ServiceName::parse`] for untrusted input.
    pub fn of(segments: &[&str]) -> Self {
        Self {
            segments: segments.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Parse a dotted name. Empty names and empty segments are rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ProvisionError::Validation(vec![
                "service name cannot be empty".to_string(),
            ]));
        }
        let segments = split_segments(trimmed);
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ProvisionError::Validation(vec![format!(
                "service name '{}' contains an empty segment",
                trimmed
            )]));
        }
        Ok(Self { segments })
    }

    /// Return a child name with `segment` appended.
    ///
    /// The segment is kept whole even if it contains dots, so a connection
    /// named `a.b` still maps to exactly one child. The dot is escaped in
    /// the string form and [`ServiceName::parse`] reads it back.
    pub fn append(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// The parent name, or `None` for a single-segment name.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment of the name.
    pub fn simple_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// True when `other` lives strictly underneath this name.
    pub fn is_parent_of(&self, other: &ServiceName) -> bool {
        other.segments.len() > self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }
}

/// Split on unescaped dots, resolving `\.` and `\\` escapes.
fn split_segments(raw: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => current.push(chars.next().unwrap_or('\\')),
            '.' => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

fn escape_segment(segment: &str) -> String {
    segment.replace('\\', "\\\\").replace('.', "\\.")
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let escaped: Vec<String> = self.segments.iter().map(|s| escape_segment(s)).collect();
        write!(f, "{}", escaped.join("."))
    }
}

impl TryFrom<String> for ServiceName {
    type Error = ProvisionError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ServiceName> for String {
    fn from(name: ServiceName) -> Self {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let name = ServiceName::parse("remoting.outbound-connection.to-node2").unwrap();
        assert_eq!(name.segments().len(), 3);
        assert_eq!(name.to_string(), "remoting.outbound-connection.to-node2");
        assert_eq!(name.simple_name(), "to-node2");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(ServiceName::parse("").is_err());
        assert!(ServiceName::parse("   ").is_err());
        assert!(ServiceName::parse("a..b").is_err());
    }

    #[test]
    fn test_append_and_parent() {
        let child = OUTBOUND_CONNECTION_BASE.append("to-node2");
        assert_eq!(child.parent().as_ref(), Some(&*OUTBOUND_CONNECTION_BASE));
        assert!(OUTBOUND_CONNECTION_BASE.is_parent_of(&child));
        assert!(!child.is_parent_of(&OUTBOUND_CONNECTION_BASE));
        assert_eq!(ServiceName::of(&["root"]).parent(), None);
    }

    #[test]
    fn test_is_parent_of_is_segment_wise() {
        let a = ServiceName::of(&["a", "b"]);
        let not_child = ServiceName::of(&["a", "bc", "d"]);
        assert!(!a.is_parent_of(&not_child));
    }

    #[test]
    fn test_alias_bases_are_distinct() {
        let generic = OUTBOUND_CONNECTION_BASE.append("x");
        let local = LOCAL_OUTBOUND_CONNECTION_BASE.append("x");
        assert_ne!(generic, local);
        assert_eq!(generic.simple_name(), local.simple_name());
    }

    #[test]
    fn test_serde_as_string() {
        let name = SUBSYSTEM_ENDPOINT.clone();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"remoting.endpoint.subsystem\"");
        let back: ServiceName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
        assert!(serde_json::from_str::<ServiceName>("\"\"").is_err());
    }

    #[test]
    fn test_dotted_segment_survives_string_form() {
        let name = OUTBOUND_CONNECTION_BASE.append("eu.node2");
        assert_eq!(name.segments().len(), 3);
        assert_eq!(name.to_string(), r"remoting.outbound-connection.eu\.node2");
        assert_eq!(ServiceName::parse(&name.to_string()).unwrap(), name);

        let json = serde_json::to_string(&name).unwrap();
        let back: ServiceName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
        assert_eq!(back.simple_name(), "eu.node2");
    }

    #[test]
    fn test_backslash_segment_round_trips() {
        let name = ServiceName::of(&["a", r"b\", "c"]);
        assert_eq!(name.to_string(), r"a.b\\.c");
        assert_eq!(ServiceName::parse(&name.to_string()).unwrap(), name);
    }
}
