// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! NAICS sector mapping. The two leading digits of a NAICS code name the
//! sector; the table below is the 2022 sector list. Codes whose prefix is
//! not in the table fall back to the same catch-all sector the enrichment
//! engine's last-resort strategy uses.

use sbir_graph_domain::value_objects::NaicsCode;
use serde::{Deserialize, Serialize};

/// Resolved sector for a NAICS code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorInfo {
    pub sector_code: String,
    pub sector_name: String,
    /// True when the prefix was unknown and the fallback applied.
    pub is_fallback: bool,
}

/// NAICS 2022 sectors. Ranges like 31-33 appear once per two-digit prefix.
const SECTORS: &[(&str, &str)] = &[
    ("11", "Agriculture, Forestry, Fishing and Hunting"),
    ("21", "Mining, Quarrying, and Oil and Gas Extraction"),
    ("22", "Utilities"),
    ("23", "Construction"),
    ("31", "Manufacturing"),
    ("32", "Manufacturing"),
    ("33", "Manufacturing"),
    ("42", "Wholesale Trade"),
    ("44", "Retail Trade"),
    ("45", "Retail Trade"),
    ("48", "Transportation and Warehousing"),
    ("49", "Transportation and Warehousing"),
    ("51", "Information"),
    ("52", "Finance and Insurance"),
    ("53", "Real Estate and Rental and Leasing"),
    ("54", "Professional, Scientific, and Technical Services"),
    ("55", "Management of Companies and Enterprises"),
    ("56", "Administrative and Support and Waste Management"),
    ("61", "Educational Services"),
    ("62", "Health Care and Social Assistance"),
    ("71", "Arts, Entertainment, and Recreation"),
    ("72", "Accommodation and Food Services"),
    ("81", "Other Services"),
    ("92", "Public Administration"),
];

/// Maps a NAICS code to its sector, falling back to the catch-all sector of
/// `fallback_code` for unknown prefixes.
pub fn sector_for(naics: &NaicsCode, fallback_code: &str) -> SectorInfo {
    let prefix = naics.sector_prefix();
    match SECTORS.iter().find(|(code, _)| *code == prefix) {
        Some((code, name)) => SectorInfo {
            sector_code: (*code).to_string(),
            sector_name: (*name).to_string(),
            is_fallback: false,
        },
        None => {
            let fallback_prefix = &fallback_code[..2.min(fallback_code.len())];
            let name = SECTORS
                .iter()
                .find(|(code, _)| *code == fallback_prefix)
                .map(|(_, name)| (*name).to_string())
                .unwrap_or_else(|| "Unclassified".to_string());
            SectorInfo {
                sector_code: fallback_prefix.to_string(),
                sector_name: name,
                is_fallback: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_sector() {
        let naics = NaicsCode::parse("541715").unwrap();
        let sector = sector_for(&naics, "541715");
        assert_eq!(sector.sector_code, "54");
        assert!(!sector.is_fallback);
        assert!(sector.sector_name.starts_with("Professional"));
    }

    #[test]
    fn test_unknown_prefix_falls_back() {
        let naics = NaicsCode::parse("990000").unwrap();
        let sector = sector_for(&naics, "541715");
        assert!(sector.is_fallback);
        assert_eq!(sector.sector_code, "54");
    }
}
