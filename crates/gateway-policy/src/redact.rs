//! Deep-walk redaction over a `serde_json::Value` (spec.md §4.1's `REDACT`
//! handler). Grounded on `policy::Engine::scan_and_redact`, generalized
//! from a single hard-coded SSN regex to a loaded, enable/disable-able
//! pattern set.

use crate::rule::RedactionPattern;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;

/// A pattern compiled and ready to apply; invalid regexes never reach this
/// stage (they're skipped and logged by [`compile_patterns`]).
struct Compiled<'a> {
    regex: Regex,
    replacement: &'a str,
}

/// Compile the enabled subset of `patterns`, logging and skipping any whose
/// regex fails to compile.
fn compile_patterns(patterns: &[RedactionPattern]) -> Vec<Compiled<'_>> {
    patterns
        .iter()
        .filter(|p| p.enabled)
        .filter_map(|p| match Regex::new(&p.regex) {
            Ok(regex) => Some(Compiled { regex, replacement: &p.replacement }),
            Err(e) => {
                tracing::warn!(pattern_id = %p.id, error = %e, "skipping invalid redaction pattern");
                None
            }
        })
        .collect()
}

/// Deep-clone `value`, replacing every enabled pattern's matches in every
/// string leaf. Returns the (possibly unchanged) clone plus the set of
/// dotted paths whose value changed.
#[must_use]
pub fn redact(value: &Value, patterns: &[RedactionPattern]) -> (Value, BTreeSet<String>) {
    let compiled = compile_patterns(patterns);
    let mut changed = BTreeSet::new();
    let mut out = value.clone();
    walk(&mut out, String::new(), &compiled, &mut changed);
    (out, changed)
}

fn walk(value: &mut Value, path: String, patterns: &[Compiled<'_>], changed: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            let mut current = s.clone();
            let mut any = false;
            for p in patterns {
                let replaced = p.regex.replace_all(&current, p.replacement).into_owned();
                if replaced != current {
                    any = true;
                    current = replaced;
                }
            }
            if any {
                *s = current;
                changed.insert(if path.is_empty() { "$".to_string() } else { path });
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                let child_path = if path.is_empty() { i.to_string() } else { format!("{path}.{i}") };
                walk(item, child_path, patterns, changed);
            }
        }
        Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                let child_path = if path.is_empty() { k.clone() } else { format!("{path}.{k}") };
                walk(v, child_path, patterns, changed);
            }
        }
        _ => {}
    }
}
