//! Fuzz test for canonical query keys
//!
//! Any JSON document must produce a key, the key must not depend on how
//! often it is computed, and re-encoding the decoded parameters must give
//! the same key back.
//!
//! Run with: cargo +nightly fuzz run query_key_fuzz -- -max_total_time=60

#![no_main]

use kestrel_core::QueryKey;
use libfuzzer_sys::fuzz_target;
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    let key = QueryKey::from_params(&value).expect("any JSON value encodes");
    let again = QueryKey::from_params(&value).expect("any JSON value encodes");
    assert_eq!(key, again, "encoding must be deterministic");

    let decoded: Value = key.params().expect("canonical keys decode");
    let reencoded = QueryKey::from_params(&decoded).expect("decoded params encode");
    assert_eq!(key, reencoded, "canonical encoding must be a fixed point");
});
