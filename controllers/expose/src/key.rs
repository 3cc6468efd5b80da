//! Object identity used as the queue key.

use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Namespace/name pair naming one namespaced object.
///
/// Immutable once constructed; equality and hashing are structural so the
/// pair serves as the queue's dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Extract a key from object metadata.
    ///
    /// Returns `None` when namespace or name is missing, which can happen for
    /// tombstoned delete notifications carrying partial metadata.
    pub fn from_meta(meta: &ObjectMeta) -> Option<Self> {
        let namespace = meta.namespace.as_deref()?;
        let name = meta.name.as_deref()?;
        Some(Self::new(namespace, name))
    }

    /// A key is well formed when both halves are non-empty.
    pub fn is_well_formed(&self) -> bool {
        !self.namespace.is_empty() && !self.name.is_empty()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_namespace_slash_name() {
        let key = ObjectKey::new("ns", "foo");
        assert_eq!(key.to_string(), "ns/foo");
    }

    #[test]
    fn test_from_meta_requires_identity() {
        let meta = ObjectMeta {
            name: Some("foo".to_string()),
            namespace: Some("ns".to_string()),
            ..ObjectMeta::default()
        };
        assert_eq!(ObjectKey::from_meta(&meta), Some(ObjectKey::new("ns", "foo")));

        let nameless = ObjectMeta {
            namespace: Some("ns".to_string()),
            ..ObjectMeta::default()
        };
        assert_eq!(ObjectKey::from_meta(&nameless), None);

        assert_eq!(ObjectKey::from_meta(&ObjectMeta::default()), None);
    }

    #[test]
    fn test_empty_halves_are_malformed() {
        assert!(ObjectKey::new("ns", "foo").is_well_formed());
        assert!(!ObjectKey::new("", "foo").is_well_formed());
        assert!(!ObjectKey::new("ns", "").is_well_formed());
    }
}
