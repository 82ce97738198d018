//! Domain normalization.
//!
//! Reduces a queried name to its *base domain*, the bucket used for device
//! and relationship tables:
//! - a.b.example.com -> example.com
//! - 44.8.0.10.in-addr.arpa -> in-addr.arpa (reverse zone, not resolved)
//! - localhost -> localhost (single label kept as-is)
//!
//! This is plain string manipulation: no Public Suffix List and no DNS
//! lookups, so `example.co.uk` reduces to `co.uk`.

/// Suffixes of reverse-DNS (PTR) query names.
const REVERSE_SUFFIXES: &[&str] = &[".in-addr.arpa", ".ip6.arpa"];

/// Clean a raw query name: trim, drop the root dot, lower-case.
///
/// Returns `None` when nothing is left.
pub fn clean_query_domain(raw: &str) -> Option<String> {
    let clean = raw.trim().trim_end_matches('.').trim().to_lowercase();
    if clean.is_empty() { None } else { Some(clean) }
}

/// Whether the name is a reverse-DNS lookup.
pub fn is_reverse_lookup(domain: &str) -> bool {
    reverse_zone(domain.trim_end_matches('.')).is_some()
}

/// Derive the base domain of a query name.
///
/// Reverse lookups collapse into their zone (`in-addr.arpa` / `ip6.arpa`).
/// Every other name keeps its last two labels, or is returned unchanged
/// when it has fewer than two. Empty input yields `None`.
pub fn normalize(query: &str) -> Option<String> {
    let query = query.trim().trim_end_matches('.');
    if query.is_empty() {
        return None;
    }

    if let Some(zone) = reverse_zone(query) {
        return Some(zone.to_string());
    }

    Some(last_two_labels(query).unwrap_or(query).to_string())
}

/// The `in-addr.arpa` / `ip6.arpa` tail of a reverse lookup, as written.
fn reverse_zone(query: &str) -> Option<&str> {
    let lower = query.to_ascii_lowercase();
    REVERSE_SUFFIXES
        .iter()
        .find(|suffix| lower.ends_with(*suffix))
        .map(|suffix| &query[query.len() - suffix.len() + 1..])
}

/// The trailing `label.label` slice of `name`, if it has two labels.
fn last_two_labels(name: &str) -> Option<&str> {
    let last_dot = name.rfind('.')?;
    let start = name[..last_dot].rfind('.').map(|i| i + 1).unwrap_or(0);
    let slice = &name[start..];
    // "a..b" or ".com" would yield an empty label
    if slice.starts_with('.') || slice.ends_with('.') {
        return None;
    }
    Some(slice)
}
