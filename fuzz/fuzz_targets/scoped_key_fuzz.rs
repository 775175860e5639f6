//! Fuzz test for persisted key decoding
//!
//! Keys are read back from a shared store, so decoding must accept any
//! string without panicking, and whatever it accepts must encode back to
//! the same bytes.
//!
//! Run with: cargo +nightly fuzz run scoped_key_fuzz -- -max_total_time=60

#![no_main]

use kestrel_storage::ScopedKey;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Some(key) = ScopedKey::decode(input) {
            assert_eq!(key.encode(), input, "decode/encode must be lossless");
            assert!(!key.namespace().is_empty());
            assert!(!key.namespace().contains('/'));

            let again = ScopedKey::decode(&key.encode());
            assert_eq!(again.as_ref(), Some(&key));
        }
    }
});
