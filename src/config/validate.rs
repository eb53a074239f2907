//! Configuration validation with unknown field detection.

use serde_json::Value;
use std::collections::HashSet;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &["logging", "provisioning"];

/// Known fields for each section.
const KNOWN_LOGGING: &[&str] = &["format", "level", "file"];
const KNOWN_PROVISIONING: &[&str] = &["verification_timeout_ms"];

const KNOWN_LOG_FORMATS: &[&str] = &["pretty", "component", "json"];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut matrix = vec![vec![0usize; b.len() + 1]; a.len() + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, val) in matrix[0].iter_mut().enumerate() {
        *val = j;
    }

    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            matrix[i + 1][j + 1] = std::cmp::min(
                std::cmp::min(matrix[i][j + 1] + 1, matrix[i + 1][j] + 1),
                matrix[i][j] + cost,
            );
        }
    }
    matrix[a.len()][b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn unknown_field(path: String, key: &str, known: &[&str]) -> Diagnostic {
    let message = match suggest_field(key, known) {
        Some(suggestion) => format!("Unknown field '{}' ({})", key, suggestion),
        None => format!("Unknown field '{}'", key),
    };
    Diagnostic::new(DiagnosticLevel::Error, path, message)
}

/// Check one section's keys; returns true if any were unknown.
fn check_section(
    obj: &serde_json::Map<String, Value>,
    section: &str,
    known: &[&str],
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let Some(value) = obj.get(section) else {
        return false;
    };
    let Some(fields) = value.as_object() else {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            section,
            "Must be a JSON object",
        ));
        return false;
    };

    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut has_unknown = false;
    for key in fields.keys() {
        if !known_set.contains(key.as_str()) {
            has_unknown = true;
            diagnostics.push(unknown_field(format!("{}.{}", section, key), key, known));
        }
    }
    has_unknown
}

/// Validate a raw JSON config value against known field names.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "",
                "Config must be a JSON object",
            ));
            return diagnostics;
        }
    };

    diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON"));

    let known_set: HashSet<&str> = KNOWN_TOP_LEVEL.iter().copied().collect();
    let mut has_unknown = false;
    for key in obj.keys() {
        if !known_set.contains(key.as_str()) {
            has_unknown = true;
            diagnostics.push(unknown_field(key.clone(), key, KNOWN_TOP_LEVEL));
        }
    }
    has_unknown |= check_section(obj, "logging", KNOWN_LOGGING, &mut diagnostics);
    has_unknown |= check_section(obj, "provisioning", KNOWN_PROVISIONING, &mut diagnostics);

    if !has_unknown {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "All fields recognized",
        ));
    }

    if let Some(format) = obj
        .get("logging")
        .and_then(|v| v.get("format"))
        .and_then(|v| v.as_str())
    {
        if !KNOWN_LOG_FORMATS.contains(&format) {
            diagnostics.push(unknown_field(
                "logging.format".to_string(),
                format,
                KNOWN_LOG_FORMATS,
            ));
        }
    }

    if let Some(timeout) = obj
        .get("provisioning")
        .and_then(|v| v.get("verification_timeout_ms"))
    {
        match timeout.as_u64() {
            Some(0) => diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Warn,
                "provisioning.verification_timeout_ms",
                "Zero timeout; every install with a pending dependency will roll back",
            )),
            Some(_) => {}
            None => diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "provisioning.verification_timeout_ms",
                "Must be a non-negative integer",
            )),
        }
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("hello", "helo"), 1);
    }

    #[test]
    fn test_levenshtein_different() {
        assert!(levenshtein("hello", "world") > 3);
    }

    #[test]
    fn test_suggest_field_match() {
        let result = suggest_field("loging", KNOWN_TOP_LEVEL);
        assert_eq!(result.as_deref(), Some("did you mean 'logging'?"));
    }

    #[test]
    fn test_suggest_field_no_match() {
        assert!(suggest_field("xyzabc", KNOWN_TOP_LEVEL).is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        let raw = json!({
            "logging": {"format": "json", "level": "debug"},
            "provisioning": {"verification_timeout_ms": 2000}
        });
        let diags = validate_config(&raw);
        assert!(diags.iter().all(|d| d.level != DiagnosticLevel::Error));
        assert!(diags.iter().any(|d| d.message == "All fields recognized"));
    }

    #[test]
    fn test_validate_unknown_top_level() {
        let diags = validate_config(&json!({"provisoning": {}}));
        let err = diags
            .iter()
            .find(|d| d.level == DiagnosticLevel::Error)
            .unwrap();
        assert_eq!(err.path, "provisoning");
        assert!(err.message.contains("did you mean 'provisioning'?"));
    }

    #[test]
    fn test_validate_unknown_nested_field() {
        let diags = validate_config(&json!({
            "provisioning": {"verification_timeout": 100}
        }));
        assert!(diags.iter().any(|d| {
            d.level == DiagnosticLevel::Error
                && d.path == "provisioning.verification_timeout"
                && d.message.contains("verification_timeout_ms")
        }));
    }

    #[test]
    fn test_validate_bad_log_format() {
        let diags = validate_config(&json!({"logging": {"format": "jsn"}}));
        assert!(diags
            .iter()
            .any(|d| d.level == DiagnosticLevel::Error && d.path == "logging.format"));
    }

    #[test]
    fn test_validate_zero_timeout_warns() {
        let diags = validate_config(&json!({
            "provisioning": {"verification_timeout_ms": 0}
        }));
        assert!(diags.iter().any(|d| d.level == DiagnosticLevel::Warn));
        assert!(diags.iter().all(|d| d.level != DiagnosticLevel::Error));
    }

    #[test]
    fn test_validate_teardown_flag_is_unknown() {
        let diags = validate_config(&json!({
            "provisioning": {"teardown_on_rollback": false}
        }));
        assert!(diags.iter().any(|d| {
            d.level == DiagnosticLevel::Error && d.path == "provisioning.teardown_on_rollback"
        }));
    }

    #[test]
    fn test_validate_not_an_object() {
        let diags = validate_config(&json!("not an object"));
        assert!(diags.iter().any(|d| {
            d.level == DiagnosticLevel::Error && d.message.contains("must be a JSON object")
        }));
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::new(DiagnosticLevel::Warn, "logging.level", "odd");
        assert_eq!(d.to_string(), "[WARN] logging.level: odd");
        let d = Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON");
        assert_eq!(d.to_string(), "[OK] Valid JSON");
    }
}
