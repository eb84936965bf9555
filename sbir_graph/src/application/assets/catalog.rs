// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Asset Catalog
//!
//! The explicit asset list, registered at startup. Every asset names its
//! inputs, stage, checks, and configuration sections as data; the runtime
//! derives execution order from the declarations.
//!
//! ```text
//! suppliers_raw ───────────────────┐
//! contracts_raw ► contracts_validated ─┬──────────────────────────────────┐
//! awards_raw ──► awards_validated ──► awards_enriched ──► awards_categorized
//!                                          │                    │         │
//! assignments_raw ──► assignment_chains ───┼──────────────► graph_load ◄──┤
//!                                              company_rollup ◄───────────┘
//! ```
//!
//! The supplier registry and validated contracts both feed the enrichment
//! index; contracts also load as transaction nodes in their own right.

use crate::application::assets::extract::ExtractMaterializer;
use crate::application::assets::load::GraphLoadMaterializer;
use crate::application::assets::schemas;
use crate::application::assets::transform_assets::{
    CategorizeMaterializer, ChainMaterializer, RollupMaterializer,
};
use crate::application::assets::validate::ValidateMaterializer;
use crate::application::assets::{enrich, join_assignments};
use crate::infrastructure::config::EtlConfig;
use crate::infrastructure::extractors::{DelimitedSource, SqlDumpSource};
use crate::infrastructure::gates::{Comparison, QualityCheck, ROW_COUNT_METRIC};
use crate::infrastructure::lookup::SharedLookupIndex;
use crate::infrastructure::runtime::{AssetDefinition, AssetRegistry};
use crate::infrastructure::storage::Stage;
use sbir_graph_domain::repositories::GraphRepository;
use sbir_graph_domain::EtlError;
use std::sync::Arc;

// Asset keys, referenced across wiring and tests.
pub const SUPPLIERS_RAW: &str = "suppliers_raw";
pub const AWARDS_RAW: &str = "awards_raw";
pub const CONTRACTS_RAW: &str = "contracts_raw";
pub const ASSIGNMENTS_RAW: &str = "assignments_raw";
pub const AWARDS_VALIDATED: &str = "awards_validated";
pub const CONTRACTS_VALIDATED: &str = "contracts_validated";
pub const AWARDS_ENRICHED: &str = "awards_enriched";
pub const ASSIGNMENT_CHAINS: &str = "assignment_chains";
pub const AWARDS_CATEGORIZED: &str = "awards_categorized";
pub const COMPANY_ROLLUP: &str = "company_rollup";
pub const GRAPH_LOAD: &str = "graph_load";

/// Builds the full registry. `graph_repo` overrides the loader's database
/// connection (tests and dry runs); `None` connects from the secret env.
pub fn build_registry(
    config: &EtlConfig,
    graph_repo: Option<Arc<dyn GraphRepository>>,
) -> Result<AssetRegistry, EtlError> {
    let mut registry = AssetRegistry::new();
    let shared_index = SharedLookupIndex::new();
    let api_registry = enrich::registry_from_config(config);

    registry.register(AssetDefinition {
        key: SUPPLIERS_RAW.into(),
        inputs: vec![],
        stage: Stage::Raw,
        partitioning: None,
        streaming: true,
        checks: vec![QualityCheck::error(
            "suppliers_not_empty",
            ROW_COUNT_METRIC,
            Comparison::AtLeast,
            1.0,
            "supplier registry extract produced rows",
        )],
        config_sections: vec!["sources"],
        materializer: Arc::new(ExtractMaterializer::new(
            "suppliers",
            "suppliers",
            "entities.csv",
            Arc::new(DelimitedSource::new(
                schemas::supplier_schema(),
                config.sources.io_retry.clone(),
            )),
        )),
    })?;

    registry.register(AssetDefinition {
        key: AWARDS_RAW.into(),
        inputs: vec![],
        stage: Stage::Raw,
        partitioning: Some("source_drop_date"),
        streaming: true,
        checks: vec![
            QualityCheck::error(
                "awards_not_empty",
                ROW_COUNT_METRIC,
                Comparison::AtLeast,
                1.0,
                "awards extract produced rows",
            ),
            QualityCheck::error(
                "decode_failures_bounded",
                "decode_failure_fraction",
                Comparison::AtMost,
                config.sources.max_error_fraction,
                "row decode failures within tolerance",
            ),
        ],
        config_sections: vec!["sources"],
        materializer: Arc::new(ExtractMaterializer::new(
            "awards",
            "awards",
            "awards.csv",
            Arc::new(DelimitedSource::new(
                schemas::award_schema(),
                config.sources.io_retry.clone(),
            )),
        )),
    })?;

    registry.register(AssetDefinition {
        key: CONTRACTS_RAW.into(),
        inputs: vec![],
        stage: Stage::Raw,
        partitioning: Some("source_drop_date"),
        streaming: true,
        checks: vec![QualityCheck::warn(
            "contracts_not_empty",
            ROW_COUNT_METRIC,
            Comparison::AtLeast,
            1.0,
            "contracts extract produced rows",
        )],
        config_sections: vec!["sources"],
        materializer: Arc::new(ExtractMaterializer::new(
            "contracts",
            "contracts",
            "contracts.sql.gz",
            Arc::new(SqlDumpSource::new(
                schemas::contract_schema(),
                "contracts",
                schemas::contract_dump_columns(),
                config.sources.io_retry.clone(),
            )),
        )),
    })?;

    registry.register(AssetDefinition {
        key: ASSIGNMENTS_RAW.into(),
        inputs: vec![],
        stage: Stage::Raw,
        partitioning: Some("source_drop_date"),
        streaming: true,
        checks: vec![QualityCheck::warn(
            "assignments_not_empty",
            ROW_COUNT_METRIC,
            Comparison::AtLeast,
            1.0,
            "assignment join produced rows",
        )],
        config_sections: vec!["sources"],
        materializer: Arc::new(join_assignments::AssignmentJoinMaterializer::new("assignments")),
    })?;

    registry.register(AssetDefinition {
        key: CONTRACTS_VALIDATED.into(),
        inputs: vec![CONTRACTS_RAW.into()],
        stage: Stage::Validated,
        partitioning: None,
        streaming: true,
        checks: vec![QualityCheck::error(
            "no_error_records",
            "error_records",
            Comparison::AtMost,
            0.0,
            "no contract failed an ERROR-severity rule",
        )],
        config_sections: vec!["validation"],
        materializer: Arc::new(ValidateMaterializer::contracts(CONTRACTS_RAW)),
    })?;

    registry.register(AssetDefinition {
        key: AWARDS_VALIDATED.into(),
        inputs: vec![AWARDS_RAW.into()],
        stage: Stage::Validated,
        partitioning: None,
        streaming: true,
        checks: vec![
            QualityCheck::error(
                "no_error_records",
                "error_records",
                Comparison::AtMost,
                0.0,
                "no record failed an ERROR-severity rule",
            ),
            QualityCheck::error(
                "no_aggregate_rule_failures",
                "aggregate_rule_failures",
                Comparison::AtMost,
                0.0,
                "uniqueness and completeness rules hold",
            ),
        ],
        config_sections: vec!["validation"],
        materializer: Arc::new(ValidateMaterializer::awards(AWARDS_RAW)),
    })?;

    registry.register(AssetDefinition {
        key: AWARDS_ENRICHED.into(),
        inputs: vec![
            AWARDS_VALIDATED.into(),
            SUPPLIERS_RAW.into(),
            CONTRACTS_VALIDATED.into(),
        ],
        stage: Stage::Enriched,
        partitioning: None,
        streaming: true,
        checks: vec![
            QualityCheck::error(
                "recipient_match_rate_floor",
                "recipient_ref_match_rate",
                Comparison::AtLeast,
                config.enrichment.min_match_rate,
                "recipient resolution rate acceptable",
            ),
            QualityCheck::warn(
                "naics_fallback_bounded",
                "naics_fallback_rate",
                Comparison::AtMost,
                0.5,
                "NAICS resolution not dominated by fallbacks",
            ),
        ],
        config_sections: vec!["enrichment"],
        materializer: Arc::new(enrich::EnrichMaterializer::new(
            AWARDS_VALIDATED,
            SUPPLIERS_RAW,
            CONTRACTS_VALIDATED,
            shared_index,
            api_registry,
        )),
    })?;

    registry.register(AssetDefinition {
        key: ASSIGNMENT_CHAINS.into(),
        inputs: vec![ASSIGNMENTS_RAW.into()],
        stage: Stage::Transformed,
        partitioning: None,
        streaming: false,
        checks: vec![QualityCheck::warn(
            "few_rejected_chains",
            "chains_rejected",
            Comparison::AtMost,
            100.0,
            "corrupt chain rate within expectations",
        )],
        config_sections: vec!["sources"],
        materializer: Arc::new(ChainMaterializer::new(ASSIGNMENTS_RAW)),
    })?;

    registry.register(AssetDefinition {
        key: AWARDS_CATEGORIZED.into(),
        inputs: vec![AWARDS_ENRICHED.into()],
        stage: Stage::Transformed,
        partitioning: None,
        streaming: true,
        checks: vec![QualityCheck::warn(
            "classified_majority",
            "classified_fraction",
            Comparison::AtLeast,
            0.5,
            "most awards with abstracts received a category",
        )],
        config_sections: vec!["classifier"],
        materializer: Arc::new(CategorizeMaterializer::new(AWARDS_ENRICHED)),
    })?;

    registry.register(AssetDefinition {
        key: COMPANY_ROLLUP.into(),
        inputs: vec![AWARDS_ENRICHED.into(), AWARDS_CATEGORIZED.into()],
        stage: Stage::Transformed,
        partitioning: None,
        streaming: false,
        checks: vec![QualityCheck::error(
            "companies_present",
            "companies",
            Comparison::AtLeast,
            1.0,
            "rollup resolved at least one company",
        )],
        config_sections: vec!["enrichment"],
        materializer: Arc::new(RollupMaterializer::new(AWARDS_ENRICHED, AWARDS_CATEGORIZED)),
    })?;

    let load = match graph_repo {
        Some(repo) => GraphLoadMaterializer::new(
            AWARDS_ENRICHED,
            CONTRACTS_VALIDATED,
            ASSIGNMENT_CHAINS,
            AWARDS_CATEGORIZED,
            COMPANY_ROLLUP,
        )
        .with_repository(repo),
        None => GraphLoadMaterializer::new(
            AWARDS_ENRICHED,
            CONTRACTS_VALIDATED,
            ASSIGNMENT_CHAINS,
            AWARDS_CATEGORIZED,
            COMPANY_ROLLUP,
        ),
    };
    registry.register(AssetDefinition {
        key: GRAPH_LOAD.into(),
        inputs: vec![
            AWARDS_ENRICHED.into(),
            CONTRACTS_VALIDATED.into(),
            ASSIGNMENT_CHAINS.into(),
            AWARDS_CATEGORIZED.into(),
            COMPANY_ROLLUP.into(),
        ],
        stage: Stage::Loaded,
        partitioning: None,
        streaming: false,
        checks: vec![QualityCheck::error(
            "load_failures_bounded",
            "failed_records",
            Comparison::AtMost,
            0.0,
            "no record was abandoned by the loader",
        )],
        config_sections: vec!["loader", "graph"],
        materializer: Arc::new(load),
    })?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_wires_and_orders() {
        let config = EtlConfig::default();
        let registry = build_registry(&config, None).unwrap();
        let expanded = registry.expand_selection(&[GRAPH_LOAD.to_string()]).unwrap();
        // graph_load pulls every source subtree: awards, suppliers,
        // contracts, and assignments.
        assert!(expanded.contains(AWARDS_RAW));
        assert!(expanded.contains(SUPPLIERS_RAW));
        assert!(expanded.contains(CONTRACTS_RAW));
        assert!(expanded.contains(CONTRACTS_VALIDATED));
        assert!(expanded.contains(ASSIGNMENTS_RAW));

        let order = registry.topo_order(&expanded).unwrap();
        let pos = |k: &str| order.iter().position(|x| x == k).unwrap();
        assert!(pos(AWARDS_RAW) < pos(AWARDS_VALIDATED));
        assert!(pos(AWARDS_VALIDATED) < pos(AWARDS_ENRICHED));
        assert!(pos(CONTRACTS_RAW) < pos(CONTRACTS_VALIDATED));
        assert!(pos(CONTRACTS_VALIDATED) < pos(AWARDS_ENRICHED));
        assert!(pos(AWARDS_ENRICHED) < pos(GRAPH_LOAD));
        assert!(pos(CONTRACTS_VALIDATED) < pos(GRAPH_LOAD));
        assert!(pos(ASSIGNMENTS_RAW) < pos(ASSIGNMENT_CHAINS));
    }
}
