//! Stable context fingerprinting for resolved-template cache keys.
//!
//! The fingerprint must be insensitive to map iteration order and sensitive
//! to every value change, so the writer sorts keys (at every nesting level)
//! before feeding the digest. Stability across process restarts is not
//! required, but SHA-256 provides it anyway.

use std::fmt::Write;

use sha2::{Digest, Sha256};

use crate::{context::Context, value::Value};

/// Length of the fingerprint in hex characters.
const FINGERPRINT_LEN: usize = 16;

/// Fingerprints a context's visible variables.
///
/// Empty contexts hash to the literal `"empty"` so cache keys stay readable
/// in the common render-without-variables case.
#[must_use]
pub fn hash_context(context: &Context) -> String {
    if context.is_empty() {
        return "empty".to_owned();
    }

    let mut canonical = String::new();
    let mut keys: Vec<&String> = context.all().keys().collect();
    keys.sort_unstable();
    for key in keys {
        let _ = write!(canonical, "{key}=");
        write_canonical(&context.all()[key], &mut canonical);
        canonical.push(';');
    }

    let digest = Sha256::digest(canonical.as_bytes());
    let mut out = String::with_capacity(FINGERPRINT_LEN);
    for byte in digest.iter().take(FINGERPRINT_LEN / 2) {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Deterministic value rendering for the digest. Dict keys are sorted at
/// every level; the type tag disambiguates values whose display forms
/// collide (`1` vs `"1"`).
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::List(items) => {
            out.push('[');
            for item in items {
                write_canonical(item, out);
                out.push(',');
            }
            out.push(']');
        }
        Value::Dict(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for key in keys {
                let _ = write!(out, "{key:?}:");
                write_canonical(&map[key], out);
                out.push(',');
            }
            out.push('}');
        }
        other => {
            let _ = write!(out, "{}({other})", other.type_name());
        }
    }
}
