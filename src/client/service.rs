//! Service description: the set of RPC method names a client exposes.
//!
//! Method names are supplied explicitly, either as a list or as a JSON
//! artifact produced alongside the service's generated stubs:
//!
//! ```json
//! { "name": "Calculator", "methods": ["add", "subtract"] }
//! ```

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// ServiceDescription
// ============================================================================

/// Named set of RPC methods.
///
/// Order of first appearance is kept; duplicate names collapse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawServiceDescription")]
pub struct ServiceDescription {
    name: String,
    methods: Vec<String>,
}

/// Unvalidated JSON form.
#[derive(Deserialize)]
struct RawServiceDescription {
    name: String,
    #[serde(default)]
    methods: Vec<String>,
}

impl From<RawServiceDescription> for ServiceDescription {
    fn from(raw: RawServiceDescription) -> Self {
        Self::new(raw.name, raw.methods)
    }
}

impl ServiceDescription {
    /// Creates a description from a list of method names.
    pub fn new<I, S>(name: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = FxHashSet::default();
        let methods = methods
            .into_iter()
            .map(Into::into)
            .filter(|method: &String| seen.insert(method.clone()))
            .collect();

        Self {
            name: name.into(),
            methods,
        }
    }

    /// Parses a JSON description.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the document is malformed
    /// - [`Error::Config`] if a method name is empty
    pub fn from_json(json: &str) -> Result<Self> {
        let description: Self = serde_json::from_str(json)?;

        if description.methods.iter().any(String::is_empty) {
            return Err(Error::config(format!(
                "service '{}' declares an empty method name",
                description.name
            )));
        }

        Ok(description)
    }

    /// Returns the service name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the method names.
    #[inline]
    #[must_use]
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    /// Returns `true` if the service declares `method`.
    #[must_use]
    pub fn contains(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }

    /// Returns the number of methods.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Returns `true` if the service declares no methods.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_keeps_order_and_dedups() {
        let service = ServiceDescription::new("Calculator", ["add", "subtract", "add"]);
        assert_eq!(service.name(), "Calculator");
        assert_eq!(service.methods(), ["add", "subtract"]);
        assert_eq!(service.len(), 2);
        assert!(service.contains("subtract"));
        assert!(!service.contains("divide"));
    }

    #[test]
    fn test_from_json() {
        let service =
            ServiceDescription::from_json(r#"{"name": "Calculator", "methods": ["add", "add", "ping"]}"#)
                .expect("parse");
        assert_eq!(service.methods(), ["add", "ping"]);
    }

    #[test]
    fn test_from_json_without_methods() {
        let service = ServiceDescription::from_json(r#"{"name": "Empty"}"#).expect("parse");
        assert!(service.is_empty());
    }

    #[test]
    fn test_from_json_rejects_empty_name() {
        let err = ServiceDescription::from_json(r#"{"name": "Bad", "methods": [""]}"#).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        let err = ServiceDescription::from_json("{").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
