//! Vendor signature table.
//!
//! Signatures are evaluated top to bottom and the first match wins. Several
//! vendors share prefixes (Apple's `4c00` company id covers both AirTags and
//! generic Find My accessories, Samsung's `7500` covers SmartTags and phones),
//! so the order of [`BUILTIN_SIGNATURES`] is part of the classification result.

use std::fmt;

use once_cell::sync::Lazy;

use crate::classifier::{decode_smarttag_status, StatusDecoder};
use crate::types::TrackerKind;

/// Match rules for one vendor.
///
/// All prefixes are lower-case hex. Keywords are lower-case and matched as
/// substrings of the lower-cased local name.
#[derive(Clone, Copy)]
pub struct Signature {
    /// Substrings of the advertised local name.
    pub name_keywords: &'static [&'static str],

    /// Prefixes of the hex-encoded first two manufacturer data bytes.
    pub manufacturer_prefixes: &'static [&'static str],

    /// Prefixes of advertised service identifiers or service data keys.
    pub service_prefixes: &'static [&'static str],

    /// Decoder for the vendor's status bit-field, if the format is known.
    pub status_decoder: Option<StatusDecoder>,
}

impl Signature {
    /// A signature that only matches on name keywords.
    #[must_use]
    pub const fn named(name_keywords: &'static [&'static str]) -> Self {
        Self {
            name_keywords,
            manufacturer_prefixes: &[],
            service_prefixes: &[],
            status_decoder: None,
        }
    }

    /// Whether any keyword occurs in `lower_name`.
    #[must_use]
    pub fn matches_name(&self, lower_name: &str) -> bool {
        self.name_keywords
            .iter()
            .any(|keyword| lower_name.contains(keyword))
    }

    /// Whether `manufacturer_hex` starts with any manufacturer prefix.
    #[must_use]
    pub fn matches_manufacturer(&self, manufacturer_hex: &str) -> bool {
        self.manufacturer_prefixes
            .iter()
            .any(|prefix| manufacturer_hex.starts_with(prefix))
    }

    /// Whether any of the lower-cased `identifiers` starts with a service prefix.
    #[must_use]
    pub fn matches_service<S: AsRef<str>>(&self, identifiers: &[S]) -> bool {
        self.service_prefixes.iter().any(|prefix| {
            identifiers
                .iter()
                .any(|id| id.as_ref().starts_with(prefix))
        })
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("name_keywords", &self.name_keywords)
            .field("manufacturer_prefixes", &self.manufacturer_prefixes)
            .field("service_prefixes", &self.service_prefixes)
            .field("has_status_decoder", &self.status_decoder.is_some())
            .finish()
    }
}

/// Built-in signatures in evaluation order.
pub const BUILTIN_SIGNATURES: [(TrackerKind, Signature); 8] = [
    (
        TrackerKind::Airtag,
        Signature {
            name_keywords: &["airtag", "find my"],
            manufacturer_prefixes: &["4c00"],
            service_prefixes: &["7dfc9000"],
            status_decoder: None,
        },
    ),
    (
        TrackerKind::FindMy,
        Signature {
            name_keywords: &["findmy"],
            manufacturer_prefixes: &["4c00"],
            service_prefixes: &["7dfc9000"],
            status_decoder: None,
        },
    ),
    (
        TrackerKind::Smarttag,
        Signature {
            name_keywords: &["smarttag", "galaxy tag"],
            manufacturer_prefixes: &["7500"],
            service_prefixes: &["fd5a"],
            status_decoder: Some(decode_smarttag_status),
        },
    ),
    (
        TrackerKind::Tile,
        Signature {
            name_keywords: &["tile"],
            manufacturer_prefixes: &["e000"],
            service_prefixes: &["feed"],
            status_decoder: None,
        },
    ),
    (
        TrackerKind::Chipolo,
        Signature {
            name_keywords: &["chipolo"],
            manufacturer_prefixes: &["3301"],
            service_prefixes: &[],
            status_decoder: None,
        },
    ),
    (
        TrackerKind::Google,
        Signature {
            name_keywords: &["google"],
            manufacturer_prefixes: &[],
            service_prefixes: &["fea0", "feaa"],
            status_decoder: None,
        },
    ),
    (
        TrackerKind::Pebblebee,
        Signature {
            name_keywords: &["pebblebee"],
            manufacturer_prefixes: &[],
            service_prefixes: &["fd5b"],
            status_decoder: None,
        },
    ),
    (
        TrackerKind::FindMyMobile,
        Signature {
            name_keywords: &["findmymobile"],
            manufacturer_prefixes: &["7500"],
            service_prefixes: &[],
            status_decoder: None,
        },
    ),
];

static BUILTIN_TABLE: Lazy<SignatureTable> =
    Lazy::new(|| SignatureTable::new(BUILTIN_SIGNATURES.to_vec()));

/// Ordered list of signatures.
#[derive(Debug, Clone)]
pub struct SignatureTable {
    entries: Vec<(TrackerKind, Signature)>,
}

impl SignatureTable {
    /// Creates a table that is evaluated in the given order.
    #[must_use]
    pub const fn new(entries: Vec<(TrackerKind, Signature)>) -> Self {
        Self { entries }
    }

    /// The built-in vendor table.
    #[must_use]
    pub fn builtin() -> &'static Self {
        &BUILTIN_TABLE
    }

    /// Iterates entries in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &(TrackerKind, Signature)> {
        self.entries.iter()
    }

    /// Number of signatures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no signatures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SignatureTable {
    fn default() -> Self {
        Self::builtin().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order() {
        let kinds: Vec<TrackerKind> = SignatureTable::builtin().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                TrackerKind::Airtag,
                TrackerKind::FindMy,
                TrackerKind::Smarttag,
                TrackerKind::Tile,
                TrackerKind::Chipolo,
                TrackerKind::Google,
                TrackerKind::Pebblebee,
                TrackerKind::FindMyMobile,
            ]
        );
    }

    #[test]
    fn test_only_smarttag_has_decoder() {
        for (kind, signature) in SignatureTable::builtin().iter() {
            assert_eq!(
                signature.status_decoder.is_some(),
                *kind == TrackerKind::Smarttag,
                "unexpected decoder presence for {kind:?}"
            );
        }
    }

    #[test]
    fn test_prefixes_are_lowercase_hex() {
        for (_, signature) in SignatureTable::builtin().iter() {
            for prefix in signature
                .manufacturer_prefixes
                .iter()
                .chain(signature.service_prefixes)
            {
                assert!(prefix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
            }
        }
    }

    #[test]
    fn test_signature_predicates() {
        let sig = Signature {
            name_keywords: &["tile"],
            manufacturer_prefixes: &["e000"],
            service_prefixes: &["feed"],
            status_decoder: None,
        };
        assert!(sig.matches_name("my tile mate"));
        assert!(!sig.matches_name("chipolo"));
        assert!(sig.matches_manufacturer("e000"));
        assert!(!sig.matches_manufacturer("e001"));
        assert!(sig.matches_service(&["0000", "feedbeef"]));
        assert!(!sig.matches_service::<&str>(&[]));
    }

    #[test]
    fn test_named_signature_has_no_other_rules() {
        let sig = Signature::named(&["beacon"]);
        assert!(sig.manufacturer_prefixes.is_empty());
        assert!(sig.service_prefixes.is_empty());
        assert!(sig.status_decoder.is_none());
    }
}
