// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Critical and emerging technology category label, loaded from the
//! versioned taxonomy file. Identity is a stable slug; hierarchy is a
//! single optional parent slug.

use serde::{Deserialize, Serialize};

/// One taxonomy category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CetArea {
    /// Stable slug, e.g. `advanced-computing`.
    pub cet_id: String,
    pub display_name: String,
    pub parent: Option<String>,
    /// Taxonomy file version this label was loaded from.
    pub taxonomy_version: String,
}

impl CetArea {
    pub fn new(cet_id: impl Into<String>, display_name: impl Into<String>, taxonomy_version: impl Into<String>) -> Self {
        Self {
            cet_id: cet_id.into(),
            display_name: display_name.into(),
            parent: None,
            taxonomy_version: taxonomy_version.into(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}
