//! Application-identifier matching.
//!
//! Profiles carry identifiers such as `7V723M9SQ5.com.example.app` or the
//! wildcard form `7V723M9SQ5.com.example.*`; callers ask with a plain bundle
//! identifier (`com.example.app`).

const WILDCARD: char = '*';

/// Drops the leading team/prefix component up to and including the first `.`.
#[must_use]
pub fn strip_team_prefix(application_identifier: &str) -> &str {
    match application_identifier.find('.') {
        Some(dot) => &application_identifier[dot + 1..],
        None => application_identifier,
    }
}

/// Whether a profile's application identifier covers `bundle_identifier`.
///
/// A trailing wildcard turns the comparison into a prefix match; anything
/// else must match exactly.
#[must_use]
pub fn application_identifier_matches(
    application_identifier: &str,
    bundle_identifier: &str,
) -> bool {
    let id = strip_team_prefix(application_identifier);
    if id.ends_with(WILDCARD) {
        bundle_identifier.starts_with(id.trim_end_matches(WILDCARD))
    } else {
        id == bundle_identifier
    }
}
