// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Graph Load Materializer
//!
//! The loaded-stage asset. Projects the transformed artifacts into the
//! property graph through the loader: organizations, award and contract
//! transactions, patents, assignment chains, and taxonomy categories as
//! nodes, then the relationship edges; nodes always complete before edges
//! begin. The artifact it writes is a small per-target load summary; the
//! graph itself is the real output.
//!
//! ## Derived provenance edges
//!
//! - `PARTICIPATED_IN`: recipient organization → funding agency, stamped
//!   with the program name, one edge per (company, agency) pair.
//! - `GENERATED_FROM`: patent → award transaction, when an assignment's
//!   assignee resolves to the same normalized name as an award recipient
//!   and the award predates that assignment's record date. The matching
//!   method is recorded on the edge.

use crate::application::assets::enrich::enriched_from_record;
use crate::application::assets::schemas;
use crate::infrastructure::enrichment::FIELD_RECIPIENT;
use crate::infrastructure::graph::{GraphLoader, LoadReport, SqliteGraphStore};
use crate::infrastructure::runtime::{AssetContext, ChunkSink, Materializer};
use crate::infrastructure::storage::ColumnarReader;
use crate::infrastructure::transform::OrganizationResolver;
use async_trait::async_trait;
use sbir_graph_domain::entities::OrganizationType;
use sbir_graph_domain::repositories::{EdgeSpec, GraphRepository, NodeLabel, NodeSpec, RelType};
use sbir_graph_domain::services::normalizer::normalize_name;
use sbir_graph_domain::value_objects::{FieldValue, OrganizationId, Record, RecordChunk, RecordSchema};
use sbir_graph_domain::EtlError;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// The graph-load asset.
pub struct GraphLoadMaterializer {
    enriched_key: String,
    contracts_key: String,
    chains_key: String,
    categories_key: String,
    rollup_key: String,
    repo: OnceCell<Arc<dyn GraphRepository>>,
    injected: Option<Arc<dyn GraphRepository>>,
}

impl GraphLoadMaterializer {
    pub fn new(
        enriched_key: impl Into<String>,
        contracts_key: impl Into<String>,
        chains_key: impl Into<String>,
        categories_key: impl Into<String>,
        rollup_key: impl Into<String>,
    ) -> Self {
        Self {
            enriched_key: enriched_key.into(),
            contracts_key: contracts_key.into(),
            chains_key: chains_key.into(),
            categories_key: categories_key.into(),
            rollup_key: rollup_key.into(),
            repo: OnceCell::new(),
            injected: None,
        }
    }

    /// Test hook: load into the given repository instead of connecting.
    pub fn with_repository(mut self, repo: Arc<dyn GraphRepository>) -> Self {
        self.injected = Some(repo);
        self
    }

    async fn repository(&self, ctx: &AssetContext) -> Result<Arc<dyn GraphRepository>, EtlError> {
        if let Some(repo) = &self.injected {
            return Ok(Arc::clone(repo));
        }
        let url_env = ctx.config.loader.database_url_env.clone();
        self.repo
            .get_or_try_init(|| async move {
                let url = crate::infrastructure::config::EtlConfig::secret_from_env(&url_env)?;
                let store = SqliteGraphStore::connect(&url).await?;
                Ok(Arc::new(store) as Arc<dyn GraphRepository>)
            })
            .await
            .cloned()
    }
}

/// Deterministic organization identity for a bare name (assignors and
/// assignees arrive without registry ids or addresses).
fn org_for_name(name: &str) -> (OrganizationId, NodeSpec) {
    let normalized = normalize_name(name);
    let id = OrganizationId::from_name_key(&normalized, "", "");
    let spec = NodeSpec::new(NodeLabel::Organization, id.as_str())
        .with_property("name", serde_json::json!(normalized))
        .with_property("organization_type", serde_json::json!(OrganizationType::Company.as_str()));
    (id, spec)
}

fn summary_record(target: &str, report: &LoadReport) -> Record {
    Record::new()
        .with("target", FieldValue::Str(target.to_string()))
        .with("created", FieldValue::Int(report.created as i64))
        .with("updated", FieldValue::Int(report.updated as i64))
        .with(
            "constraint_skipped",
            FieldValue::Int(report.constraint_skipped.len() as i64),
        )
        .with("failed", FieldValue::Int(report.failed_records.len() as i64))
}

#[async_trait]
impl Materializer for GraphLoadMaterializer {
    fn schema(&self) -> RecordSchema {
        schemas::load_summary_schema()
    }

    async fn materialize(
        &self,
        ctx: &AssetContext,
        sink: &mut dyn ChunkSink,
    ) -> Result<BTreeMap<String, f64>, EtlError> {
        let repo = self.repository(ctx).await?;
        let loader = GraphLoader::new(
            Arc::clone(&repo),
            ctx.config.loader.clone(),
            ctx.config.graph.expected_schema_version,
        );
        loader.bootstrap().await?;

        // ---- gather node and edge specs from the upstream artifacts ----

        let mut org_nodes: BTreeMap<String, NodeSpec> = BTreeMap::new();
        let mut txn_nodes: Vec<NodeSpec> = Vec::new();
        let mut edges: Vec<EdgeSpec> = Vec::new();
        let mut txn_keys: HashSet<String> = HashSet::new();

        // Enriched awards: organizations, transactions, RECIPIENT_OF and
        // FUNDED_BY edges.
        let enriched_path = ctx.upstream_artifact(&self.enriched_key)?.data_path.clone();
        let mut reader = ColumnarReader::open(&enriched_path).await?;
        let mut resolver = OrganizationResolver::new();
        let mut resolved_awards = Vec::new();
        while let Some(group) = reader.next_group().await? {
            ctx.check_cancelled()?;
            let enriched = group
                .iter()
                .map(enriched_from_record)
                .collect::<Result<Vec<_>, _>>()?;
            resolved_awards.extend(resolver.resolve_chunk("awards", enriched));
        }

        // Normalized name per resolved org, for patent provenance matching.
        let mut org_names: BTreeMap<String, String> = BTreeMap::new();
        for organization in resolver.into_organizations() {
            org_names.insert(
                organization.organization_id.as_str().to_string(),
                organization.normalized_name.clone(),
            );
            let spec = NodeSpec::new(NodeLabel::Organization, organization.organization_id.as_str())
                .with_property("name", serde_json::json!(organization.normalized_name))
                .with_property("raw_names", serde_json::json!(organization.raw_names))
                .with_property(
                    "organization_type",
                    serde_json::json!(organization.organization_type.as_str()),
                )
                .with_property("state", serde_json::json!(organization.address.state))
                .with_property("postcode", serde_json::json!(organization.address.postcode))
                .with_property("source_contexts", serde_json::json!(organization.source_contexts));
            org_nodes.insert(organization.organization_id.as_str().to_string(), spec);
        }

        let mut agencies: BTreeSet<String> = BTreeSet::new();
        // Award ids and dates per normalized recipient name, feeding the
        // patent GENERATED_FROM match below.
        let mut awards_by_name: BTreeMap<String, Vec<(String, chrono::NaiveDate)>> = BTreeMap::new();
        for resolved in &resolved_awards {
            let award = &resolved.enriched.award;
            agencies.insert(award.agency.clone());
            txn_keys.insert(award.award_id.clone());
            if let Some(name) = org_names.get(resolved.organization_id.as_str()) {
                awards_by_name
                    .entry(name.clone())
                    .or_default()
                    .push((award.award_id.clone(), award.award_date));
            }

            let naics = resolved
                .enriched
                .results
                .iter()
                .find(|r| r.field_name == "naics")
                .and_then(|r| r.enriched_value.as_ref())
                .and_then(|v| v.as_str())
                .map(str::to_string);
            txn_nodes.push(
                NodeSpec::new(NodeLabel::FinancialTransaction, &award.award_id)
                    .with_property("kind", serde_json::json!("award"))
                    .with_property("amount", serde_json::json!(award.amount))
                    .with_property("agency", serde_json::json!(award.agency))
                    .with_property("program", serde_json::json!(award.program))
                    .with_property("phase", serde_json::json!(award.phase.as_str()))
                    .with_property("award_date", serde_json::json!(award.award_date.to_string()))
                    .with_property("naics", serde_json::json!(naics)),
            );

            let recipient = resolved
                .enriched
                .result_for(FIELD_RECIPIENT)
                .filter(|r| !r.is_miss());
            if let Some(result) = recipient {
                edges.push(
                    EdgeSpec::new(
                        NodeLabel::FinancialTransaction,
                        &award.award_id,
                        RelType::RecipientOf,
                        NodeLabel::Organization,
                        resolved.organization_id.as_str(),
                    )
                    .with_property("method", serde_json::json!(result.method))
                    .with_property("confidence", serde_json::json!(result.confidence.value()))
                    .with_property("source", serde_json::json!(result.source.as_str())),
                );
            }
            edges.push(EdgeSpec::new(
                NodeLabel::FinancialTransaction,
                &award.award_id,
                RelType::FundedBy,
                NodeLabel::Organization,
                format!("AGENCY-{}", award.agency),
            ));
            // One PARTICIPATED_IN per (company, agency); the edge key makes
            // repeats idempotent, the program property is last-writer-wins.
            edges.push(
                EdgeSpec::new(
                    NodeLabel::Organization,
                    resolved.organization_id.as_str(),
                    RelType::ParticipatedIn,
                    NodeLabel::Organization,
                    format!("AGENCY-{}", award.agency),
                )
                .with_property("program", serde_json::json!(award.program)),
            );
        }
        for agency in &agencies {
            org_nodes.insert(
                format!("AGENCY-{}", agency),
                NodeSpec::new(NodeLabel::Organization, format!("AGENCY-{}", agency))
                    .with_property("name", serde_json::json!(agency))
                    .with_property(
                        "organization_type",
                        serde_json::json!(OrganizationType::Agency.as_str()),
                    ),
            );
        }

        // Contracts: one transaction node per piid+modification, recipient
        // resolved to an organization (registry id when the action carries
        // one, deterministic name identity otherwise).
        let contracts_path = ctx.upstream_artifact(&self.contracts_key)?.data_path.clone();
        let mut reader = ColumnarReader::open(&contracts_path).await?;
        let mut contract_count = 0u64;
        while let Some(group) = reader.next_group().await? {
            ctx.check_cancelled()?;
            for record in &group {
                let contract = schemas::contract_from_record(record)?;
                let contract_key = contract.contract_key();
                txn_keys.insert(contract_key.clone());
                contract_count += 1;

                txn_nodes.push(
                    NodeSpec::new(NodeLabel::FinancialTransaction, &contract_key)
                        .with_property("kind", serde_json::json!("contract"))
                        .with_property("piid", serde_json::json!(contract.piid))
                        .with_property("modification", serde_json::json!(contract.modification))
                        .with_property("amount", serde_json::json!(contract.amount))
                        .with_property("action_date", serde_json::json!(contract.action_date.to_string()))
                        .with_property("psc", serde_json::json!(contract.psc)),
                );

                let (recipient_id, method) = match &contract.recipient_supplier_id {
                    Some(sid) => (OrganizationId::from_supplier(sid), "identifier_exact"),
                    None => (org_for_name(&contract.recipient_name).0, "name_key"),
                };
                org_nodes.entry(recipient_id.as_str().to_string()).or_insert_with(|| {
                    NodeSpec::new(NodeLabel::Organization, recipient_id.as_str())
                        .with_property("name", serde_json::json!(normalize_name(&contract.recipient_name)))
                        .with_property(
                            "organization_type",
                            serde_json::json!(OrganizationType::Company.as_str()),
                        )
                });
                edges.push(
                    EdgeSpec::new(
                        NodeLabel::FinancialTransaction,
                        &contract_key,
                        RelType::RecipientOf,
                        NodeLabel::Organization,
                        recipient_id.as_str(),
                    )
                    .with_property("method", serde_json::json!(method)),
                );
            }
        }

        // Chains: patents, assignments (ordered), conveyance edges, OWNS.
        let chains_path = ctx.upstream_artifact(&self.chains_key)?.data_path.clone();
        let mut reader = ColumnarReader::open(&chains_path).await?;
        let mut patent_nodes: BTreeMap<String, NodeSpec> = BTreeMap::new();
        let mut assignment_nodes: Vec<NodeSpec> = Vec::new();
        while let Some(group) = reader.next_group().await? {
            ctx.check_cancelled()?;
            for record in &group {
                let assignment = schemas::assignment_from_record(record)?;

                patent_nodes
                    .entry(assignment.patent_key.clone())
                    .or_insert_with(|| NodeSpec::new(NodeLabel::Patent, &assignment.patent_key));

                assignment_nodes.push(
                    NodeSpec::new(NodeLabel::PatentAssignment, &assignment.rf_id)
                        .with_property("conveyance", serde_json::json!(assignment.conveyance.as_str()))
                        .with_property("record_date", serde_json::json!(assignment.record_date.to_string()))
                        .with_property("employer_assignment", serde_json::json!(assignment.employer_assignment)),
                );
                edges.push(EdgeSpec::new(
                    NodeLabel::Patent,
                    &assignment.patent_key,
                    RelType::AssignedVia,
                    NodeLabel::PatentAssignment,
                    &assignment.rf_id,
                ));
                if let Some(predecessor) = &assignment.predecessor_rf_id {
                    edges.push(EdgeSpec::new(
                        NodeLabel::PatentAssignment,
                        &assignment.rf_id,
                        RelType::ChainOf,
                        NodeLabel::PatentAssignment,
                        predecessor,
                    ));
                }
                for assignor in &assignment.assignors {
                    let (id, spec) = org_for_name(assignor);
                    org_nodes.entry(id.as_str().to_string()).or_insert(spec);
                    edges.push(EdgeSpec::new(
                        NodeLabel::PatentAssignment,
                        &assignment.rf_id,
                        RelType::AssignedFrom,
                        NodeLabel::Organization,
                        id.as_str(),
                    ));
                }
                for assignee in &assignment.assignees {
                    let (id, spec) = org_for_name(assignee);
                    org_nodes.entry(id.as_str().to_string()).or_insert(spec);
                    edges.push(EdgeSpec::new(
                        NodeLabel::PatentAssignment,
                        &assignment.rf_id,
                        RelType::AssignedTo,
                        NodeLabel::Organization,
                        id.as_str(),
                    ));
                    // Provenance: the patent came out of this company's
                    // awards that predate the conveyance being recorded.
                    if let Some(awards) = awards_by_name.get(&normalize_name(assignee)) {
                        for (award_id, award_date) in awards {
                            if *award_date <= assignment.record_date {
                                edges.push(
                                    EdgeSpec::new(
                                        NodeLabel::Patent,
                                        &assignment.patent_key,
                                        RelType::GeneratedFrom,
                                        NodeLabel::FinancialTransaction,
                                        award_id,
                                    )
                                    .with_property(
                                        "method",
                                        serde_json::json!("assignee_name_match"),
                                    ),
                                );
                            }
                        }
                    }
                }
                if let Some(owner) = record.get_str("current_owner") {
                    let (id, spec) = org_for_name(owner);
                    org_nodes.entry(id.as_str().to_string()).or_insert(spec);
                    edges.push(EdgeSpec::new(
                        NodeLabel::Organization,
                        id.as_str(),
                        RelType::Owns,
                        NodeLabel::Patent,
                        &assignment.patent_key,
                    ));
                }
            }
        }

        // Categories: CET areas and APPLICABLE_TO edges.
        let categories_path = ctx.upstream_artifact(&self.categories_key)?.data_path.clone();
        let mut reader = ColumnarReader::open(&categories_path).await?;
        let mut cet_nodes: BTreeMap<String, NodeSpec> = BTreeMap::new();
        while let Some(group) = reader.next_group().await? {
            ctx.check_cancelled()?;
            for record in &group {
                let Some(award_id) = record.get_str("award_id") else {
                    continue;
                };
                let mut labels: Vec<String> = Vec::new();
                if let Some(primary) = record.get_str("primary_category") {
                    labels.push(primary.to_string());
                }
                if let Some(supporting) = record.get_str("supporting_categories") {
                    labels.extend(supporting.split(';').filter(|s| !s.is_empty()).map(str::to_string));
                }
                for (position, label) in labels.iter().enumerate() {
                    cet_nodes
                        .entry(label.clone())
                        .or_insert_with(|| NodeSpec::new(NodeLabel::CetArea, label).with_property("name", serde_json::json!(label)));
                    edges.push(
                        EdgeSpec::new(
                            NodeLabel::FinancialTransaction,
                            award_id,
                            RelType::ApplicableTo,
                            NodeLabel::CetArea,
                            label,
                        )
                        .with_property("rank", serde_json::json!(position)),
                    );
                }
            }
        }

        // Rollup: SPECIALIZES_IN edges from each company's top category.
        let rollup_path = ctx.upstream_artifact(&self.rollup_key)?.data_path.clone();
        let mut reader = ColumnarReader::open(&rollup_path).await?;
        while let Some(group) = reader.next_group().await? {
            for record in &group {
                let (Some(org_id), Some(distribution)) = (
                    record.get_str("organization_id"),
                    record.get_str("category_distribution"),
                ) else {
                    continue;
                };
                let distribution: BTreeMap<String, u64> =
                    serde_json::from_str(distribution).unwrap_or_default();
                let top = distribution.iter().max_by_key(|(_, count)| **count);
                if let Some((category, count)) = top {
                    if cet_nodes.contains_key(category) {
                        edges.push(
                            EdgeSpec::new(
                                NodeLabel::Organization,
                                org_id,
                                RelType::SpecializesIn,
                                NodeLabel::CetArea,
                                category,
                            )
                            .with_property("award_count", serde_json::json!(count)),
                        );
                    }
                }
            }
        }

        // ---- load: nodes first, assignment chains in order, then edges ----

        let mut node_report = LoadReport::default();
        node_report.merge(loader.load_nodes(org_nodes.into_values().collect(), &ctx.cancel).await?);
        let org_report = node_report.clone();
        let txn_report = loader.load_nodes(txn_nodes, &ctx.cancel).await?;
        node_report.merge(txn_report.clone());
        let patent_report = loader
            .load_nodes(patent_nodes.into_values().collect(), &ctx.cancel)
            .await?;
        node_report.merge(patent_report.clone());
        // Chain artifact order is the global record-date order.
        let assignment_report = loader.load_nodes_ordered(assignment_nodes, &ctx.cancel).await?;
        node_report.merge(assignment_report.clone());
        let cet_report = loader
            .load_nodes(cet_nodes.into_values().collect(), &ctx.cancel)
            .await?;
        node_report.merge(cet_report.clone());

        let edge_report = loader.load_edges(edges, &ctx.cancel).await?;

        if ctx.config.loader.tombstone_missing {
            loader
                .tombstone_missing(NodeLabel::FinancialTransaction, &txn_keys)
                .await?;
        }

        info!(
            nodes_created = node_report.created,
            edges_created = edge_report.created,
            failed = node_report.failed_records.len() + edge_report.failed_records.len(),
            "graph load complete"
        );

        let records = vec![
            summary_record("organizations", &org_report),
            summary_record("transactions", &txn_report),
            summary_record("patents", &patent_report),
            summary_record("assignments", &assignment_report),
            summary_record("cet_areas", &cet_report),
            summary_record("edges", &edge_report),
        ];
        sink.write_chunk(RecordChunk::new(0, records)).await?;

        let mut metrics = BTreeMap::new();
        metrics.insert("contracts_loaded".to_string(), contract_count as f64);
        metrics.insert("nodes_created".to_string(), node_report.created as f64);
        metrics.insert("nodes_updated".to_string(), node_report.updated as f64);
        metrics.insert("edges_created".to_string(), edge_report.created as f64);
        metrics.insert(
            "failed_records".to_string(),
            (node_report.failed_records.len() + edge_report.failed_records.len()) as f64,
        );
        metrics.insert(
            "constraint_skipped".to_string(),
            (node_report.constraint_skipped.len() + edge_report.constraint_skipped.len()) as f64,
        );
        metrics.insert("loader_retries".to_string(), (node_report.retries + edge_report.retries) as f64);
        Ok(metrics)
    }
}
