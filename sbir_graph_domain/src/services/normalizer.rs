// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Name and Address Normalization
//!
//! Deterministic canonicalization used before any identifier hashing or
//! fuzzy comparison. Every function here is pure: same input, same output,
//! because both the fallback organization identity and the fingerprint
//! system hash these outputs.
//!
//! ## Name Normalization
//!
//! Uppercase, strip legal suffixes (INC, LLC, CORP, LTD, CO, ...), collapse
//! whitespace, and drop non-alphanumerics except an internal ampersand
//! (`A&M` stays `A&M`; a trailing `&` does not survive).
//!
//! ## Address Normalization
//!
//! A rule-based tokenizer splitting street/city/state/postcode. US state
//! codes are enforced to two letters; postcodes are zero-padded to five
//! digits, with the +4 suffix kept when the source carries one.

use crate::entities::Address;

/// Legal-form suffixes stripped from the tail of a company name. Multi-word
/// suffixes are matched before their single-word prefixes.
const LEGAL_SUFFIXES: &[&str] = &[
    "INCORPORATED",
    "CORPORATION",
    "COMPANY",
    "LIMITED",
    "L L C",
    "LLC",
    "INC",
    "CORP",
    "LTD",
    "LLP",
    "L P",
    "LP",
    "PLLC",
    "CO",
];

/// Canonicalizes a company/organization name for matching and hashing.
pub fn normalize_name(raw: &str) -> String {
    // Uppercase; everything but alphanumerics and '&' becomes a space.
    let upper: String = raw
        .to_ascii_uppercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '&' { c } else { ' ' })
        .collect();

    // Tokenize, keeping '&' only when internal to a token ("A&M").
    let tokens: Vec<String> = upper
        .split_whitespace()
        .map(|t| t.trim_matches('&').to_string())
        .filter(|t| !t.is_empty())
        .collect();
    let mut name = tokens.join(" ");

    // Repeatedly strip trailing legal suffixes ("ACME HOLDINGS LLC INC").
    // A single-token name is never stripped to empty.
    'outer: loop {
        for suffix in LEGAL_SUFFIXES {
            let with_space = format!(" {}", suffix);
            if name.ends_with(&with_space) {
                name.truncate(name.len() - with_space.len());
                continue 'outer;
            }
        }
        break;
    }
    name
}

/// Known US state and territory codes.
const STATE_CODES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA", "KS",
    "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ", "NM", "NY",
    "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT", "VA", "WA", "WV",
    "WI", "WY", "DC", "PR", "VI", "GU", "AS", "MP",
];

/// Canonicalizes a two-letter US state code; `None` for anything else.
pub fn normalize_state(raw: &str) -> Option<String> {
    let upper = raw.trim().to_ascii_uppercase();
    if STATE_CODES.contains(&upper.as_str()) {
        Some(upper)
    } else {
        None
    }
}

/// Canonicalizes a US postcode: zero-padded 5-digit zip, keeping a +4 suffix
/// when present.
pub fn normalize_postcode(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '-').collect();
    let (zip, plus4) = match cleaned.split_once('-') {
        Some((z, p)) => (z.to_string(), Some(p.to_string())),
        None if cleaned.len() == 9 => (cleaned[..5].to_string(), Some(cleaned[5..].to_string())),
        None => (cleaned.clone(), None),
    };
    if zip.is_empty() || zip.len() > 5 || !zip.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{:0>5}", zip);
    match plus4 {
        Some(p) if p.len() == 4 && p.bytes().all(|b| b.is_ascii_digit()) => Some(format!("{}-{}", padded, p)),
        Some(_) => Some(padded),
        None => Some(padded),
    }
}

/// Five-digit zip prefix for proximity comparison, dropping any +4 suffix.
pub fn zip5(postcode: &str) -> &str {
    postcode.split('-').next().unwrap_or(postcode)
}

/// Rule-based address normalization into components.
pub fn normalize_address(street: &str, city: &str, state: &str, postcode: &str) -> Address {
    Address {
        street: non_empty(collapse_whitespace(&street.to_ascii_uppercase())),
        city: non_empty(collapse_whitespace(&city.to_ascii_uppercase())),
        state: normalize_state(state),
        postcode: normalize_postcode(postcode),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_name_strips_legal_suffixes() {
        assert_eq!(normalize_name("Acme Robotics LLC"), "ACME ROBOTICS");
        assert_eq!(normalize_name("ACME ROBOTICS L.L.C."), "ACME ROBOTICS");
        assert_eq!(normalize_name("Quantum Dynamics Incorporated"), "QUANTUM DYNAMICS");
        assert_eq!(normalize_name("Widget Co."), "WIDGET");
    }

    #[test]
    fn test_normalize_name_keeps_internal_ampersand() {
        assert_eq!(normalize_name("Texas A&M Research"), "TEXAS A&M RESEARCH");
        assert_eq!(normalize_name("Smith & Jones Inc"), "SMITH JONES");
    }

    #[test]
    fn test_normalize_name_collapses_punctuation() {
        assert_eq!(normalize_name("  Dyna-Corp   Systems,  Inc. "), "DYNA CORP SYSTEMS");
    }

    #[test]
    fn test_normalize_state() {
        assert_eq!(normalize_state("va"), Some("VA".to_string()));
        assert_eq!(normalize_state("Virginia"), None);
    }

    #[test]
    fn test_normalize_postcode_pads_and_keeps_plus4() {
        assert_eq!(normalize_postcode("2173"), Some("02173".to_string()));
        assert_eq!(normalize_postcode("94103-1234"), Some("94103-1234".to_string()));
        assert_eq!(normalize_postcode("941031234"), Some("94103-1234".to_string()));
        assert_eq!(normalize_postcode("abc"), None);
    }

    #[test]
    fn test_zip5() {
        assert_eq!(zip5("94103-1234"), "94103");
        assert_eq!(zip5("94103"), "94103");
    }

    proptest! {
        // Normalization must be idempotent: applying it twice changes nothing.
        #[test]
        fn prop_normalize_name_idempotent(s in ".{0,64}") {
            let once = normalize_name(&s);
            let twice = normalize_name(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
