//! Fingerprints for type definition integrity checks
//!
//! A fingerprint is a SHA256 over the canonical JSON of a TypeDef. Two
//! repositories that agree on a type's GUID, name and version but disagree
//! on its fingerprint have drifted, which reconciliation reports as a
//! conflict.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::typedefs::{AttributeTypeDef, TypeDef};

/// SHA256 fingerprint of a type definition's content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeFingerprint(String);

impl TypeFingerprint {
    /// Compute the fingerprint of a TypeDef from its canonical JSON.
    /// Serialization of the model is infallible, so this never errors.
    pub fn of_type_def(type_def: &TypeDef) -> Self {
        let canonical = serde_json::to_string(type_def).unwrap_or_default();
        Self::from_bytes(canonical.as_bytes())
    }

    pub fn of_attribute_type_def(attr_type_def: &AttributeTypeDef) -> Self {
        let canonical = serde_json::to_string(attr_type_def).unwrap_or_default();
        Self::from_bytes(canonical.as_bytes())
    }

    fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that a TypeDef matches this fingerprint
    pub fn matches(&self, type_def: &TypeDef) -> bool {
        *self == Self::of_type_def(type_def)
    }
}

impl fmt::Display for TypeFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TypeFingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TypeFingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_type_def_same_fingerprint() {
        let a = TypeDef::new_entity_def("g1", "Person", "archive");
        let b = TypeDef::new_entity_def("g1", "Person", "archive");
        assert_eq!(TypeFingerprint::of_type_def(&a), TypeFingerprint::of_type_def(&b));
    }

    #[test]
    fn test_content_change_changes_fingerprint() {
        let a = TypeDef::new_entity_def("g1", "Person", "archive");
        let b = a.clone().with_description("an individual");
        let fp = TypeFingerprint::of_type_def(&a);
        assert!(fp.matches(&a));
        assert!(!fp.matches(&b));
    }
}
