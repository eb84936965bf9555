// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Federal contract action extracted from the contracts dump. Identity is
//! the award PIID plus modification number; records are immutable once
//! extracted, and the recipient must resolve to an `Organization` before
//! load.

use crate::value_objects::{LegacyId, SupplierId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One contract action row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederalContract {
    pub piid: String,
    pub modification: String,
    pub recipient_supplier_id: Option<SupplierId>,
    pub recipient_legacy_id: Option<LegacyId>,
    pub recipient_name: String,
    pub amount: f64,
    pub action_date: NaiveDate,
    /// Product/service code classifying what was bought.
    pub psc: Option<String>,
}

impl FederalContract {
    /// Composite identity: `piid` alone repeats across modifications.
    pub fn contract_key(&self) -> String {
        format!("{}:{}", self.piid, self.modification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_key_includes_modification() {
        let c = FederalContract {
            piid: "W911NF20C0001".into(),
            modification: "P00003".into(),
            recipient_supplier_id: None,
            recipient_legacy_id: None,
            recipient_name: "Acme".into(),
            amount: 1000.0,
            action_date: NaiveDate::from_ymd_opt(2020, 3, 1).unwrap(),
            psc: None,
        };
        assert_eq!(c.contract_key(), "W911NF20C0001:P00003");
    }
}
