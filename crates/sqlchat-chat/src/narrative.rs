//! Narrative normalizer.
//!
//! Cleans model-produced prose into a single display-ready string.

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));
static PERIOD_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.{2,}").expect("Invalid period regex"));
static NEWLINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("Invalid newline regex"));

/// Bullet delimiter models tend to emit.
const BULLET: char = '*';

/// Normalize a server-supplied narrative.
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    let stripped = text.replace('\r', "");
    let mut t = stripped.trim().to_string();
    if t.is_empty() {
        return t;
    }

    if t.contains(BULLET) {
        let parts: Vec<String> = t
            .split(BULLET)
            .map(|p| WHITESPACE_RUN.replace_all(p, " ").trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        t = if parts.len() > 1 {
            parts.join("\n")
        } else {
            parts.into_iter().next().unwrap_or_default()
        };
    }

    let t = WHITESPACE_RUN.replace_all(&t, " ");
    let t = PERIOD_RUN.replace_all(&t, ".");
    let t = t.trim();
    NEWLINE_RUN.replace_all(t, "\n").into_owned()
}
