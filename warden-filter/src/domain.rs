//! Domain name canonicalization and suffix matching.
//!
//! Every query is canonicalized exactly once on entry: lowercased, one
//! trailing dot stripped. IDN labels are left as received; no punycode
//! conversion happens here.

/// Canonical form of a queried name.
#[must_use]
pub fn canonicalize(name: &str) -> String {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    trimmed.to_ascii_lowercase()
}

/// Suffix match used by `MatchMode::Domain`: the canonical query `n` matches
/// pattern `p` iff `n == p` or `n` ends with `"." + p`.
#[must_use]
pub fn domain_matches(query: &str, pattern: &str) -> bool {
    if query == pattern {
        return true;
    }

    query
        .strip_suffix(pattern)
        .is_some_and(|prefix| prefix.ends_with('.'))
}
