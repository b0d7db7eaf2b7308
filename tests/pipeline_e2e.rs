//! End-to-end pipeline tests: classify a document, resolve conflicting
//! extractions, write the winners to production, mirror audit facts,
//! and assess model readiness.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;

use terrafact::{
    assumption_predicate, canonical, classify, ConflictResolver, DocumentType, EntitySpec,
    EntityType, ExtractionCandidate, ExtractionWriter, FieldRegistry, InMemoryEntityStore,
    InMemoryFactStore, InMemoryProductionStore, KnowledgeGraph, ModelReadinessCalculator,
    ProductionStore, Row, SourceType, WriteContext,
};

const CATALOG: &str = "\
field_key,label,field_type,scope,extract_policy,db_write_type,target_table,target_column,selector_json,evidence_types,field_role,analytical_tier,extractability
purchase_price,Purchase Price,currency,project,extractable,column,projects,purchase_price,,offering_memorandum|appraisal,input,critical,high
cap_rate,Cap Rate,percent,assumption,extractable,row_assumption,assumptions,value,\"{\"\"label\"\": \"\"cap_rate\"\"}\",offering_memorandum|appraisal,input,critical,high
market_rent,Market Rent,currency,unit_type,extractable,column,unit_types,market_rent,,rent_roll|offering_memorandum,input,critical,high
unit_count,Unit Count,integer,project,extractable,column,projects,unit_count,,offering_memorandum|rent_roll,input,important,high
year_built,Year Built,integer,project,extractable,column,projects,year_built,,offering_memorandum,input,supporting,medium
";

struct Pipeline {
    registry: FieldRegistry,
    production: Arc<InMemoryProductionStore>,
    graph: Arc<KnowledgeGraph>,
}

fn pipeline() -> Pipeline {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut registry = FieldRegistry::new();
    registry
        .load_catalog_str("multifamily", CATALOG)
        .expect("catalog loads");
    Pipeline {
        registry,
        production: Arc::new(InMemoryProductionStore::new()),
        graph: Arc::new(KnowledgeGraph::new(
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(InMemoryFactStore::new()),
        )),
    }
}

fn ctx(project_id: i64) -> WriteContext {
    WriteContext {
        property_type: "multifamily".to_string(),
        project_id,
        scope_id: None,
        source_doc_id: "doc-om-1".to_string(),
    }
}

fn candidate(
    extraction_id: u64,
    doc_type: DocumentType,
    field_key: &str,
    value: &str,
    confidence: f64,
) -> ExtractionCandidate {
    ExtractionCandidate {
        extraction_id,
        doc_id: format!("doc-{extraction_id}"),
        doc_type,
        field_key: field_key.to_string(),
        value: value.to_string(),
        confidence,
        source_snippet: None,
        page_number: None,
    }
}

#[test]
fn extract_resolve_write_and_supersede() {
    let p = pipeline();
    let writer = ExtractionWriter::new(&p.registry, p.production.clone(), p.graph.clone());

    // Upload one: the offering memorandum says 5.5% going-in.
    let doc_type = classify("OM", "offering memorandum investment highlights");
    assert_eq!(doc_type, DocumentType::OfferingMemorandum);

    let resolver = ConflictResolver::new(&p.registry, "multifamily");
    let first = resolver
        .resolve(&[candidate(1, doc_type, "cap_rate", "0.055", 0.9)])
        .unwrap();
    writer
        .write("cap_rate", &json!(first.winner.value), &ctx(42))
        .unwrap();

    // Exactly one current fact exists for the assumption.
    let project = p.graph.get_entity(&canonical::project(42)).unwrap().unwrap();
    let current = p
        .graph
        .get_current_facts(project.id, Some("has_assumption"))
        .unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].object.as_literal(), Some("0.055"));

    // Upload two: the appraisal comes back at 6%.
    let second = resolver
        .resolve(&[candidate(2, DocumentType::Appraisal, "cap_rate", "0.06", 0.92)])
        .unwrap();
    writer
        .write("cap_rate", &json!(second.winner.value), &ctx(42))
        .unwrap();

    // Still exactly one current fact, with a two-deep chain behind it.
    let current = p
        .graph
        .get_current_facts(project.id, Some("has_assumption"))
        .unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].object.as_literal(), Some("0.06"));

    let history = p
        .graph
        .get_history(project.id, &assumption_predicate("cap_rate"))
        .unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].is_current);
    assert!(!history[1].is_current);
    assert_eq!(history[1].superseded_by, Some(history[0].id));

    // The production row holds the latest value.
    let mut selector = Row::new();
    selector.insert("project_id".to_string(), json!(42));
    selector.insert("label".to_string(), json!("cap_rate"));
    let row = p.production.get("assumptions", &selector).unwrap().unwrap();
    assert_eq!(row["value"], json!("0.06"));
}

#[test]
fn rent_conflict_prefers_rent_roll_and_keeps_loser() {
    let p = pipeline();
    let resolver = ConflictResolver::new(&p.registry, "multifamily");

    let resolution = resolver
        .resolve(&[
            candidate(1, DocumentType::OfferingMemorandum, "market_rent", "1450", 0.95),
            candidate(2, DocumentType::RentRoll, "market_rent", "1500", 0.80),
        ])
        .unwrap();

    assert_eq!(resolution.winner.doc_type, DocumentType::RentRoll);
    let pct = resolution.rejected[0].difference_percent.unwrap();
    assert!((pct - 3.448_275_8).abs() < 0.001);
    // The rent roll outranks the offering memorandum even though the
    // extractor was more confident about the latter, so flag it.
    assert!(resolution.flagged);
}

#[test]
fn matching_values_across_formats_do_not_conflict() {
    let p = pipeline();
    let resolver = ConflictResolver::new(&p.registry, "multifamily");
    let resolution = resolver
        .resolve(&[
            candidate(1, DocumentType::OfferingMemorandum, "market_rent", "1,500", 0.85),
            candidate(2, DocumentType::RentRoll, "market_rent", "$1500.00", 0.90),
        ])
        .unwrap();
    assert!(resolution.rejected.is_empty());
    assert_eq!(resolution.winner.extraction_id, 2);
}

#[test]
fn currency_round_trips_through_production() {
    let p = pipeline();
    let writer = ExtractionWriter::new(&p.registry, p.production.clone(), p.graph.clone());
    writer
        .write("purchase_price", &json!("$1,234.56"), &ctx(7))
        .unwrap();

    let mut selector = Row::new();
    selector.insert("project_id".to_string(), json!(7));
    let row = p.production.get("projects", &selector).unwrap().unwrap();
    assert_eq!(row["purchase_price"], json!("1234.56"));
}

#[test]
fn user_correction_beats_repeated_extraction() {
    let p = pipeline();
    let writer = ExtractionWriter::new(&p.registry, p.production.clone(), p.graph.clone());

    writer.write("cap_rate", &json!("0.055"), &ctx(42)).unwrap();
    let project = p.graph.get_entity(&canonical::project(42)).unwrap().unwrap();

    // Re-extracting the same value is a no-op.
    writer.write("cap_rate", &json!("0.055"), &ctx(42)).unwrap();
    let history = p
        .graph
        .get_history(project.id, &assumption_predicate("cap_rate"))
        .unwrap();
    assert_eq!(history.len(), 1);

    // A user correction to the same value still creates.
    let current = history.into_iter().next().unwrap();
    let corrected = p
        .graph
        .record_user_correction(&current, "0.055", Some("verified against appraisal".into()), None)
        .unwrap();
    assert_eq!(corrected.provenance.source_type, SourceType::UserCorrection);

    let history = p
        .graph
        .get_history(project.id, &assumption_predicate("cap_rate"))
        .unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].is_current);
}

#[test]
fn idempotent_entity_creation_across_writes() {
    let p = pipeline();
    let a = p
        .graph
        .get_or_create_entity(EntitySpec::new(EntityType::Project, canonical::project(42)))
        .unwrap();
    let writer = ExtractionWriter::new(&p.registry, p.production.clone(), p.graph.clone());
    writer.write("cap_rate", &json!("0.055"), &ctx(42)).unwrap();

    let b = p.graph.get_entity(&canonical::project(42)).unwrap().unwrap();
    assert_eq!(a.id, b.id);
}

#[test]
fn readiness_tracks_pipeline_progress() {
    let p = pipeline();
    let writer = ExtractionWriter::new(&p.registry, p.production.clone(), p.graph.clone());
    let calc = ModelReadinessCalculator::new(&p.registry, "multifamily");

    let mut populated: HashSet<String> = HashSet::new();
    let report = calc.assess(&populated);
    assert!(!report.can_run_model);
    assert_eq!(report.missing_critical.len(), 3);

    for (field, value) in [
        ("purchase_price", json!("$45,000,000")),
        ("cap_rate", json!("5.5%")),
        ("unit_count", json!(220)),
    ] {
        let outcome = writer.write(field, &value, &ctx(42)).unwrap();
        assert!(outcome.success);
        populated.insert(outcome.field_key);
    }

    let report = calc.assess(&populated);
    // market_rent is still missing, so the model stays gated.
    assert!(!report.can_run_model);
    assert_eq!(report.missing_critical, vec!["market_rent"]);

    populated.insert("market_rent".to_string());
    let report = calc.assess(&populated);
    assert!(report.can_run_model);
    assert!(report.score > 90.0);
}
