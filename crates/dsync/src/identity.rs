//! 🔑 Identity: how two accounts that have never met agree on "the same thing".
//!
//! Platform-assigned ids differ between accounts, so identity comes from natural-key
//! fields: one field verbatim (`Simple`) or several glued with `:` (`Composite`).
//! Resolution is total. Missing fields become empty segments, so `":"` is a perfectly
//! legal (if sad) key. Nobody gets an error for showing up without a name tag. 🦆

use serde_json::Value;

/// 🧩 The separator. One character, infinite ambiguity.
pub const SEPARATOR: char = ':';

/// 🔍 Read a dotted path (`attributes.schema.name`) out of an instance as a string.
///
/// Strings come back verbatim, numbers and bools are rendered, and everything
/// else (absent, null, objects, arrays) is the empty string.
pub fn field_str(instance: &Value, path: &str) -> String {
    match lookup(instance, path) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// 🔍 Walk a dotted path through nested objects.
pub fn lookup<'a>(instance: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(instance, |current, segment| current.get(segment))
}

/// 🧩 Join parts with the separator. Empty parts still get their seat at the table.
pub fn join_composite<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string())
}

/// ✂️ Split a two-part composite on the FIRST separator only.
///
/// The second part may legitimately contain `:` (Slack channels do), so
/// `"workspace:#channel:with:colons"` is `("workspace", "#channel:with:colons")`.
/// No separator at all means there was no first part: `("", id)`.
pub fn split_composite(id: &str) -> (&str, &str) {
    id.split_once(SEPARATOR).unwrap_or(("", id))
}

/// 🧱 One segment of an identity key.
#[derive(Debug, Clone, Copy)]
pub enum KeyPart {
    /// A single dotted path.
    Field(&'static str),
    /// The first non-empty value among several paths, in order.
    FirstOf(&'static [&'static str]),
}

impl KeyPart {
    fn resolve(&self, instance: &Value) -> String {
        match self {
            KeyPart::Field(path) => field_str(instance, path),
            KeyPart::FirstOf(paths) => paths
                .iter()
                .map(|path| field_str(instance, path))
                .find(|value| !value.is_empty())
                .unwrap_or_default(),
        }
    }
}

/// 🔑 A declarative identity strategy. Pure function of the instance, never fails.
#[derive(Debug, Clone, Copy)]
pub enum IdentityResolver {
    Simple(KeyPart),
    Composite(&'static [KeyPart]),
}

impl IdentityResolver {
    pub fn resolve(&self, instance: &Value) -> String {
        match self {
            IdentityResolver::Simple(part) => part.resolve(instance),
            IdentityResolver::Composite(parts) => join_composite(
                &parts
                    .iter()
                    .map(|part| part.resolve(instance))
                    .collect::<Vec<_>>(),
            ),
        }
    }
}
