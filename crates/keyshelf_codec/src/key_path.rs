//! Key paths: locating keys inside JSON records.

use crate::error::{CodecError, CodecResult};
use crate::key::Key;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Describes where a key lives inside a record.
///
/// A [`KeyPath::Path`] is a dotted path such as `"id"` or `"owner.email"`;
/// the empty path `""` denotes the record itself. A [`KeyPath::Sequence`]
/// evaluates several paths and combines the results into an array key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPath {
    /// A single dotted path.
    Path(String),
    /// Several dotted paths forming a compound key.
    Sequence(Vec<String>),
}

impl KeyPath {
    /// Returns true if every path is empty or a dot-separated list of
    /// identifiers.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            KeyPath::Path(path) => is_valid_path(path),
            KeyPath::Sequence(paths) => {
                !paths.is_empty() && paths.iter().all(|p| is_valid_path(p))
            }
        }
    }

    /// Evaluates the key path against a record.
    ///
    /// Returns `None` if any component is missing or does not hold a valid
    /// key.
    #[must_use]
    pub fn evaluate(&self, record: &Value) -> Option<Key> {
        match self {
            KeyPath::Path(path) => resolve(record, path).and_then(Key::from_value),
            KeyPath::Sequence(paths) => paths
                .iter()
                .map(|p| resolve(record, p).and_then(Key::from_value))
                .collect::<Option<Vec<_>>>()
                .map(Key::Array),
        }
    }

    /// Returns the raw value a single path points at.
    ///
    /// Sequence paths have no single location and always return `None`.
    #[must_use]
    pub fn locate<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        match self {
            KeyPath::Path(path) => resolve(record, path),
            KeyPath::Sequence(_) => None,
        }
    }

    /// Writes `key` into `record` at this path, creating intermediate
    /// objects as needed.
    ///
    /// # Errors
    ///
    /// Fails for sequence paths, the empty path, or when an intermediate
    /// component exists but is not an object.
    pub fn inject(&self, record: &mut Value, key: &Key) -> CodecResult<()> {
        let path = match self {
            KeyPath::Path(path) if !path.is_empty() => path,
            _ => {
                return Err(CodecError::invalid_key_path(
                    "a generated key can only be stored at a non-empty single key path",
                ))
            }
        };

        let mut components = path.split('.').peekable();
        let mut current = record;
        while let Some(component) = components.next() {
            let object = current.as_object_mut().ok_or_else(|| {
                CodecError::invalid_key_path(format!(
                    "cannot store key at '{path}': '{component}' is not inside an object"
                ))
            })?;
            if components.peek().is_none() {
                object.insert(component.to_string(), key.to_value());
                return Ok(());
            }
            current = object
                .entry(component.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        Ok(())
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::Path(path) => f.write_str(path),
            KeyPath::Sequence(paths) => write!(f, "[{}]", paths.join(", ")),
        }
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        KeyPath::Path(path.to_string())
    }
}

impl From<String> for KeyPath {
    fn from(path: String) -> Self {
        KeyPath::Path(path)
    }
}

impl From<Vec<&str>> for KeyPath {
    fn from(paths: Vec<&str>) -> Self {
        KeyPath::Sequence(paths.into_iter().map(String::from).collect())
    }
}

fn resolve<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(record);
    }
    path.split('.')
        .try_fold(record, |value, component| value.as_object()?.get(component))
}

fn is_valid_path(path: &str) -> bool {
    path.is_empty() || path.split('.').all(is_identifier)
}

fn is_identifier(component: &str) -> bool {
    let mut chars = component.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn evaluates_simple_and_nested_paths() {
        let record = json!({"id": 4, "owner": {"email": "a@b"}});
        assert_eq!(KeyPath::from("id").evaluate(&record), Some(Key::from(4)));
        assert_eq!(
            KeyPath::from("owner.email").evaluate(&record),
            Some(Key::from("a@b"))
        );
        assert_eq!(KeyPath::from("missing").evaluate(&record), None);
        assert_eq!(KeyPath::from("owner").evaluate(&record), None);
    }

    #[test]
    fn empty_path_is_the_record() {
        assert_eq!(KeyPath::from("").evaluate(&json!("k")), Some(Key::from("k")));
    }

    #[test]
    fn sequence_builds_array_key() {
        let record = json!({"last": "Doe", "first": "Jane"});
        let path = KeyPath::from(vec!["last", "first"]);
        assert_eq!(
            path.evaluate(&record),
            Some(Key::from(vec![Key::from("Doe"), Key::from("Jane")]))
        );
        assert_eq!(path.evaluate(&json!({"last": "Doe"})), None);
    }

    #[test]
    fn validity() {
        assert!(KeyPath::from("id").is_valid());
        assert!(KeyPath::from("a.b_c.$d").is_valid());
        assert!(KeyPath::from("").is_valid());
        assert!(!KeyPath::from("1abc").is_valid());
        assert!(!KeyPath::from("a..b").is_valid());
        assert!(!KeyPath::Sequence(vec![]).is_valid());
    }

    #[test]
    fn inject_creates_intermediate_objects() {
        let mut record = json!({"name": "x"});
        KeyPath::from("meta.id")
            .inject(&mut record, &Key::from(9))
            .unwrap();
        assert_eq!(record, json!({"name": "x", "meta": {"id": 9}}));
    }

    #[test]
    fn inject_rejects_non_object_parent() {
        let mut record = json!({"meta": 5});
        assert!(KeyPath::from("meta.id")
            .inject(&mut record, &Key::from(1))
            .is_err());
        let mut scalar = json!(3);
        assert!(KeyPath::from("id").inject(&mut scalar, &Key::from(1)).is_err());
    }
}
