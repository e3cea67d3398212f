//! Tagged secret references (`$<env:team:app:path:token>`).
//!
//! References are what callers store inside other configuration; untagged
//! strings are treated as raw identities.

use crate::backends::SecretId;

pub const START_TAG: &str = "$<";
pub const END_TAG: &str = ">";

/// Whether `value` is wrapped in reference tags.
pub fn is_ref(value: &str) -> bool {
    value.len() >= START_TAG.len() + END_TAG.len()
        && value.starts_with(START_TAG)
        && value.ends_with(END_TAG)
}

/// Wrap a raw identity in reference tags; tagged input is returned as-is.
pub fn to_ref(id: &str) -> String {
    if is_ref(id) {
        return id.to_string();
    }
    format!("{}{}{}", START_TAG, id, END_TAG)
}

/// The identity inside a reference, and whether the input was tagged.
pub fn from_ref(value: &str) -> (&str, bool) {
    match value
        .strip_prefix(START_TAG)
        .and_then(|inner| inner.strip_suffix(END_TAG))
    {
        Some(inner) => (inner, true),
        None => (value, false),
    }
}

/// Reference string for a secret identity.
pub fn secret_ref(id: &SecretId) -> String {
    to_ref(&id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_ref() {
        assert_eq!(to_ref("dev:team-x::clientSecret:abc"), "$<dev:team-x::clientSecret:abc>");
        assert_eq!(to_ref("$<dev:::zones:>"), "$<dev:::zones:>");
    }

    #[test]
    fn test_from_ref() {
        assert_eq!(from_ref("$<dev:::zones:>"), ("dev:::zones:", true));
        assert_eq!(from_ref("dev:::zones:"), ("dev:::zones:", false));
        assert_eq!(from_ref("$<dev:::zones:"), ("$<dev:::zones:", false));
    }

    #[test]
    fn test_is_ref() {
        assert!(is_ref("$<dev:::zones:>"));
        assert!(!is_ref("dev:::zones:"));
        assert!(!is_ref("$<"));
        assert!(!is_ref("plain value"));
    }

    #[test]
    fn test_secret_ref() {
        let id = SecretId::new("dev", "team-x", "", "clientSecret", "abc");
        let reference = secret_ref(&id);
        assert_eq!(reference, "$<dev:team-x::clientSecret:abc>");

        let (inner, tagged) = from_ref(&reference);
        assert!(tagged);
        assert_eq!(SecretId::parse(inner).unwrap(), id);
    }
}
