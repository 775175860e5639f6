//! Namespace-scoped persistence keys.
//!
//! Every query instance persists under its own [`ScopedKey`]. The namespace
//! may not contain the separator, so the first separator in an encoded key
//! always splits namespace from query key and two distinct
//! `(namespace, query key)` pairs can never encode to the same string.

use kestrel_core::QueryKey;

/// Separator between namespace and query key.
pub const SEPARATOR: char = '/';

/// A persistence key scoped to a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedKey {
    namespace: String,
    key: QueryKey,
}

impl ScopedKey {
    /// Create a scoped key.
    ///
    /// Returns `None` if the namespace is empty or contains [`SEPARATOR`].
    pub fn new(namespace: impl Into<String>, key: QueryKey) -> Option<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() || namespace.contains(SEPARATOR) {
            return None;
        }
        Some(Self { namespace, key })
    }

    /// The namespace this key is scoped to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The query key inside the namespace.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Encode to the string form used by stores.
    ///
    /// Format: `{namespace}/{query key}`
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.namespace.len() + 1 + self.key.as_str().len());
        out.push_str(&self.namespace);
        out.push(SEPARATOR);
        out.push_str(self.key.as_str());
        out
    }

    /// Decode a key produced by [`ScopedKey::encode`].
    ///
    /// Returns `None` if there is no separator or the namespace is empty.
    pub fn decode(encoded: &str) -> Option<Self> {
        let (namespace, key) = encoded.split_once(SEPARATOR)?;
        Self::new(namespace, QueryKey::new(key))
    }

    /// Prefix matching every key in `namespace`.
    pub fn namespace_prefix(namespace: &str) -> String {
        format!("{namespace}{SEPARATOR}")
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn namespace_strategy() -> impl Strategy<Value = String> {
        "[a-z0-9-]{1,12}"
    }

    fn query_key_strategy() -> impl Strategy<Value = QueryKey> {
        ".{0,24}".prop_map(QueryKey::new)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Property: decoding an encoded key returns the original key.
        #[test]
        fn prop_encode_decode_roundtrip(ns in namespace_strategy(), key in query_key_strategy()) {
            let scoped = ScopedKey::new(ns, key).expect("valid namespace");
            let decoded = ScopedKey::decode(&scoped.encode());
            prop_assert_eq!(Some(scoped), decoded);
        }

        /// Property: distinct scoped keys have distinct encodings.
        #[test]
        fn prop_encoding_is_injective(
            ns1 in namespace_strategy(),
            ns2 in namespace_strategy(),
            k1 in query_key_strategy(),
            k2 in query_key_strategy(),
        ) {
            let a = ScopedKey::new(ns1, k1).expect("valid namespace");
            let b = ScopedKey::new(ns2, k2).expect("valid namespace");
            if a == b {
                prop_assert_eq!(a.encode(), b.encode());
            } else {
                prop_assert_ne!(a.encode(), b.encode());
            }
        }
    }
}
