//! Query keys.
//!
//! A [`QueryKey`] names exactly one fetch target. Two logically identical
//! requests must produce the same key and two distinct requests must never
//! share one, so keys built from structured parameters go through a
//! canonical JSON encoding with object fields sorted by name.

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryError;

/// Opaque identifier of one fetch target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(String);

impl QueryKey {
    /// Wrap a raw key string as-is.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Build a key from structured parameters.
    ///
    /// Field order in the source type does not matter: `{"a":1,"b":2}` and
    /// `{"b":2,"a":1}` encode to the same key.
    pub fn from_params<P: Serialize>(params: &P) -> Result<Self, QueryError> {
        let value = serde_json::to_value(params)?;
        let mut out = String::new();
        write_canonical(&value, &mut out);
        Ok(Self(out))
    }

    /// Decode parameters previously encoded with [`QueryKey::from_params`].
    pub fn params<P: DeserializeOwned>(&self) -> Result<P, QueryError> {
        Ok(serde_json::from_str(&self.0)?)
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for QueryKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&String> for QueryKey {
    fn from(raw: &String) -> Self {
        Self(raw.clone())
    }
}

impl AsRef<str> for QueryKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Serialize a JSON value with object keys in sorted order.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // String serialization cannot fail.
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct BalanceParams {
        address: String,
        denom: String,
    }

    #[derive(Serialize)]
    struct Reordered {
        denom: String,
        address: String,
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let a = QueryKey::from_params(&BalanceParams {
            address: "cosmos1abc".to_string(),
            denom: "uatom".to_string(),
        })
        .unwrap();
        let b = QueryKey::from_params(&Reordered {
            denom: "uatom".to_string(),
            address: "cosmos1abc".to_string(),
        })
        .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), r#"{"address":"cosmos1abc","denom":"uatom"}"#);
    }

    #[test]
    fn test_nested_objects_are_sorted() {
        let key = QueryKey::from_params(&json!({"z": {"b": 1, "a": [ {"y": 2, "x": 1} ]}, "a": null}))
            .unwrap();
        assert_eq!(key.as_str(), r#"{"a":null,"z":{"a":[{"x":1,"y":2}],"b":1}}"#);
    }

    #[test]
    fn test_params_roundtrip() {
        let params = BalanceParams {
            address: "osmo1xyz".to_string(),
            denom: "uosmo".to_string(),
        };
        let key = QueryKey::from_params(&params).unwrap();
        let decoded: BalanceParams = key.params().unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn test_raw_keys() {
        let key: QueryKey = "cosmos1abc".into();
        assert_eq!(key.to_string(), "cosmos1abc");
        assert!(!key.is_empty());
        assert!(QueryKey::new("").is_empty());
    }
}
