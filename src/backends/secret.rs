use std::fmt;

use serde_json::{Map, Value};

use super::error::{BackendError, Result};
use super::id::SecretId;
use crate::rotation::{generate_secret, ROTATE_KEYWORD};

/// A value bound to the id it was read or written under.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    id: SecretId,
    value: String,
}

impl Secret {
    pub fn new(id: SecretId, value: impl Into<String>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }

    pub fn id(&self) -> &SecretId {
        &self.id
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn into_value(self) -> String {
        self.value
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("id", &self.id)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// The desired value of a write.
#[derive(Clone, PartialEq, Eq)]
pub enum SecretValue {
    /// Overwrite with this value.
    Literal(String),
    /// Only written if nothing is stored yet.
    Initial(String),
    /// Replace with a freshly generated value.
    Rotate,
    /// Reset the stored value.
    Empty,
}

impl SecretValue {
    /// Interpret a caller-supplied string.
    pub fn parse(raw: &str) -> Self {
        if raw == ROTATE_KEYWORD {
            Self::Rotate
        } else if raw.is_empty() {
            Self::Empty
        } else {
            Self::Literal(raw.to_string())
        }
    }

    /// Whether writing this value over `current` would leave it unchanged.
    pub fn matches(&self, current: &str) -> bool {
        match self {
            Self::Literal(value) => value == current,
            Self::Initial(_) => !current.is_empty(),
            Self::Rotate => false,
            Self::Empty => current.is_empty(),
        }
    }

    /// Whether this value may replace one that is already stored.
    pub fn allow_change(&self) -> bool {
        !matches!(self, Self::Initial(_))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Literal(value) | Self::Initial(value) => value.is_empty(),
            Self::Rotate => false,
            Self::Empty => true,
        }
    }

    /// The literal content, if this value carries one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Literal(value) | Self::Initial(value) => Some(value),
            Self::Rotate | Self::Empty => None,
        }
    }

    /// Compute the value to store given what is stored now.
    ///
    /// Returns `None` when the stored value must be kept.
    pub fn resolve(&self, current: Option<&str>, secret_length: usize) -> Option<String> {
        let current = current.filter(|value| !value.is_empty());
        match self {
            Self::Initial(_) if current.is_some() => None,
            Self::Literal(value) | Self::Initial(value) => Some(value.clone()),
            Self::Rotate => Some(generate_secret(secret_length)),
            Self::Empty => Some(String::new()),
        }
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(_) => f.write_str("Literal(<redacted>)"),
            Self::Initial(_) => f.write_str("Initial(<redacted>)"),
            Self::Rotate => f.write_str("Rotate"),
            Self::Empty => f.write_str("Empty"),
        }
    }
}

/// Parse a structured secret into its fields. An empty value has no fields.
pub fn parse_fields(raw: &str) -> Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(BackendError::invalid_value(
            "structured secret is not a JSON object",
        )),
        Err(e) => Err(BackendError::invalid_value(format!(
            "structured secret is not valid JSON: {}",
            e
        ))),
    }
}

/// Read one field of a structured secret as a string.
pub fn read_field(raw: &str, field: &str) -> Result<Option<String>> {
    let fields = parse_fields(raw)?;
    Ok(fields.get(field).map(|value| match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }))
}

/// Serialize string fields into a structured secret.
pub fn fields_to_json<'a, I>(fields: I) -> Result<String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let map: Map<String, Value> = fields
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    serde_json::to_string(&map)
        .map_err(|e| BackendError::invalid_value(format!("failed to encode fields: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_redacts_value() {
        let secret = Secret::new(SecretId::new("dev", "", "", "zones", ""), "very-secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("<redacted>"));

        let debug = format!("{:?}", SecretValue::Literal("very-secret".to_string()));
        assert!(!debug.contains("very-secret"));
    }

    #[test]
    fn test_secret_value_parse() {
        assert_eq!(SecretValue::parse("rotate"), SecretValue::Rotate);
        assert_eq!(SecretValue::parse(""), SecretValue::Empty);
        assert_eq!(
            SecretValue::parse("s1"),
            SecretValue::Literal("s1".to_string())
        );
    }

    #[test]
    fn test_secret_value_matches() {
        assert!(SecretValue::Literal("a".to_string()).matches("a"));
        assert!(!SecretValue::Literal("a".to_string()).matches("b"));
        assert!(SecretValue::Initial("a".to_string()).matches("anything"));
        assert!(!SecretValue::Initial("a".to_string()).matches(""));
        assert!(!SecretValue::Rotate.matches("a"));
        assert!(SecretValue::Empty.matches(""));
    }

    #[test]
    fn test_secret_value_resolve() {
        let initial = SecretValue::Initial("{}".to_string());
        assert_eq!(initial.resolve(None, 32), Some("{}".to_string()));
        assert_eq!(initial.resolve(Some(""), 32), Some("{}".to_string()));
        assert_eq!(initial.resolve(Some("existing"), 32), None);

        let literal = SecretValue::Literal("new".to_string());
        assert_eq!(literal.resolve(Some("old"), 32), Some("new".to_string()));

        let rotated = SecretValue::Rotate.resolve(Some("old"), 24).unwrap();
        assert_eq!(rotated.len(), 24);

        assert_eq!(SecretValue::Empty.resolve(Some("old"), 32), Some(String::new()));
    }

    #[test]
    fn test_fields() {
        let raw = r#"{"key1":"value1","port":8080}"#;
        assert_eq!(read_field(raw, "key1").unwrap(), Some("value1".to_string()));
        assert_eq!(read_field(raw, "port").unwrap(), Some("8080".to_string()));
        assert_eq!(read_field(raw, "missing").unwrap(), None);
        assert!(parse_fields("").unwrap().is_empty());
        assert!(parse_fields("[1,2]").is_err());
        assert!(parse_fields("not json").is_err());

        let json = fields_to_json([("region", "europe"), ("dc", "fra")]).unwrap();
        assert_eq!(read_field(&json, "region").unwrap(), Some("europe".to_string()));
    }
}
