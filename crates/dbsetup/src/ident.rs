//! Class-name validation for generated context types.
//!
//! Context and setup-type names end up in generated Rust source and in
//! administrative SQL, so they are validated against a conservative
//! identifier grammar and the Rust keyword list before anything else
//! happens with them.

use regex::Regex;
use std::sync::OnceLock;

fn class_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_]\w*$").unwrap())
}

/// Rust keywords (strict and reserved). Compared case-insensitively so that
/// e.g. `Self` and `self` are both rejected as generated type names.
const RESERVED_KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl",
    "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "self", "static", "struct", "super", "trait", "true", "try", "type", "typeof",
    "union", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

/// Whether `name` is usable as a generated class/type name: non-empty,
/// matches `^[A-Za-z_]\w*$` and is not a reserved keyword.
pub fn is_valid_class_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    class_name_re().is_match(name) && !is_reserved_keyword(name)
}

fn is_reserved_keyword(name: &str) -> bool {
    let lowered = name.to_lowercase();
    RESERVED_KEYWORDS.contains(&lowered.as_str())
}
