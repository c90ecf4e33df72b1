//! Migration Tests
//!
//! Resolution properties over observation orders, synthesis over table
//! documents, and full runs over the fixture corpora.

use std::fs;
use std::path::Path;

use relation_migrator::config::MigrationConfig;
use relation_migrator::diagnostics::{Diagnostics, ObservationKind};
use relation_migrator::document::Element;
use relation_migrator::model::{Relation, RelationSource};
use relation_migrator::reader::{read_extended_type, read_table};
use relation_migrator::resolve::{ResolutionRegistry, ResolvedRecords};
use relation_migrator::synthesize::synthesize;
use relation_migrator::writeback::apply_patches;
use relation_migrator::{Migrator, Origin};
use tempfile::TempDir;

// =============================================================================
// Helpers
// =============================================================================

fn edt(name: &str, parent: Option<&str>, relation: Option<(&str, &str)>) -> Element {
    let mut doc = Element::new("AxEdt").child_element(Element::with_text("Name", name));
    if let Some(parent) = parent {
        doc = doc.child_element(Element::with_text("Extends", parent));
    }
    let mut relations = Element::new("Relations");
    if let Some((table, field)) = relation {
        relations = relations.child_element(
            Element::new("AxEdtRelation")
                .child_element(Element::with_text("RelatedField", field))
                .child_element(Element::with_text("Table", table)),
        );
    }
    doc.child_element(relations)
        .child_element(Element::new("TableReferences"))
}

fn table(name: &str, fields: &[(&str, &str)]) -> Element {
    let mut container = Element::new("Fields");
    for (field, edt) in fields {
        container = container.child_element(
            Element::new("AxTableField")
                .child_element(Element::with_text("Name", *field))
                .child_element(Element::with_text("ExtendedDataType", *edt)),
        );
    }
    Element::new("AxTable")
        .child_element(Element::with_text("Name", name))
        .child_element(container)
}

/// Observe every document as a target, in the given order
fn resolve_targets(docs: &[&Element]) -> relation_migrator::Resolution {
    let mut registry = ResolutionRegistry::new();
    for doc in docs {
        registry.observe_target(doc);
    }
    registry.finish()
}

fn records(docs: &[Element]) -> ResolvedRecords {
    let refs: Vec<&Element> = docs.iter().collect();
    resolve_targets(&refs).records
}

/// All orderings of `items`
fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut result = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let first = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, first.clone());
            result.push(tail);
        }
    }
    result
}

const FIXTURES: &[(&str, &str)] = &[
    ("target/MyModel/AxEdt/CustAccount.xml", include_str!("fixtures/target/MyModel/AxEdt/CustAccount.xml")),
    ("target/MyModel/AxEdt/CustInvoiceAccount.xml", include_str!("fixtures/target/MyModel/AxEdt/CustInvoiceAccount.xml")),
    ("target/MyModel/AxEdt/DimensionArray.xml", include_str!("fixtures/target/MyModel/AxEdt/DimensionArray.xml")),
    ("target/MyModel/AxEdt/ItemMixed.xml", include_str!("fixtures/target/MyModel/AxEdt/ItemMixed.xml")),
    ("target/MyModel/AxEdt/ProjOrphan.xml", include_str!("fixtures/target/MyModel/AxEdt/ProjOrphan.xml")),
    ("target/MyModel/AxEdt/VendInvoiceAccount.xml", include_str!("fixtures/target/MyModel/AxEdt/VendInvoiceAccount.xml")),
    ("target/MyModel/AxTable/CustTable.xml", include_str!("fixtures/target/MyModel/AxTable/CustTable.xml")),
    ("target/MyModel/AxTable/SalesTable.xml", include_str!("fixtures/target/MyModel/AxTable/SalesTable.xml")),
    ("target/MyModel/AxTableExtension/SalesLine.MyModel.xml", include_str!("fixtures/target/MyModel/AxTableExtension/SalesLine.MyModel.xml")),
    ("reference/ApplicationSuite/AxEdt/AccountNum.xml", include_str!("fixtures/reference/ApplicationSuite/AxEdt/AccountNum.xml")),
    ("reference/ApplicationSuite/AxEdt/VendAccount.xml", include_str!("fixtures/reference/ApplicationSuite/AxEdt/VendAccount.xml")),
];

/// Lay the fixture corpora out under a fresh directory
fn corpus_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, content) in FIXTURES {
        let path = dir.path().join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    dir
}

fn config_for(root: &Path, dry_run: bool) -> MigrationConfig {
    let mut config = MigrationConfig::default();
    config.corpus.targets = vec![root.join("target")];
    config.corpus.references = vec![root.join("reference")];
    config.output.report_dir = root.join("reports");
    config.output.dry_run = dry_run;
    config
}

// =============================================================================
// Resolution
// =============================================================================

#[test]
fn test_identity_resolution() {
    let doc = edt("CustAccount", None, Some(("CustTable", "AccountNum")));
    let resolution = resolve_targets(&[&doc]);

    let record = resolution.records.get("custaccount").unwrap();
    assert_eq!(record.source, RelationSource::Own);
    assert_eq!(record.relation(), Some(&Relation::new("CustTable", "AccountNum")));
    assert!(resolution.diagnostics.is_empty());
}

#[test]
fn test_chain_resolves_in_every_order() {
    let root = edt("CustAccount", None, Some(("CustTable", "AccountNum")));
    let middle = edt("CustInvoiceAccount", Some("CustAccount"), None);
    let leaf = edt("CustInvoiceAccountOverride", Some("CustInvoiceAccount"), None);
    let expected = Relation::new("CustTable", "AccountNum");

    for order in permutations(&[&root, &middle, &leaf]) {
        let resolution = resolve_targets(&order);
        for name in ["CustInvoiceAccount", "CustInvoiceAccountOverride"] {
            let record = resolution.records.get(name).unwrap();
            assert_eq!(record.relation(), Some(&expected), "{} in {:?}", name, order);
            assert_eq!(record.source, RelationSource::Inherited("CustAccount".to_string()));
        }
        assert_eq!(resolution.diagnostics.count(ObservationKind::UnresolvedParent), 0);
    }
}

#[test]
fn test_nearest_ancestor_wins() {
    let root = edt("AccountBase", None, Some(("LedgerTable", "AccountNum")));
    let middle = edt("CustAccount", Some("AccountBase"), Some(("CustTable", "AccountNum")));
    let leaf = edt("CustInvoiceAccount", Some("CustAccount"), None);

    for order in permutations(&[&root, &middle, &leaf]) {
        let resolution = resolve_targets(&order);
        assert_eq!(
            resolution.records.relation_for("CustInvoiceAccount"),
            Some(&Relation::new("CustTable", "AccountNum"))
        );
    }
}

#[test]
fn test_deeper_ancestor_in_reference_corpus() {
    // Leaf and middle are targets; only the reference corpus knows the root
    let leaf = edt("CustInvoiceAccountOverride", Some("CustInvoiceAccount"), None);
    let middle = edt("CustInvoiceAccount", Some("CustAccount"), None);
    let root = edt("CustAccount", None, Some(("CustTable", "AccountNum")));

    let mut registry = ResolutionRegistry::new();
    registry.observe_target(&leaf);
    registry.observe_target(&middle);
    assert_eq!(registry.pending_count(), 1);
    assert_eq!(registry.pending_children("CustAccount").len(), 2);

    registry.observe_reference(&root);
    assert_eq!(registry.pending_count(), 0);

    let resolution = registry.finish();
    for name in ["CustInvoiceAccount", "CustInvoiceAccountOverride"] {
        assert_eq!(
            resolution.records.relation_for(name),
            Some(&Relation::new("CustTable", "AccountNum"))
        );
    }
    assert_eq!(resolution.records.get("CustAccount").unwrap().origin, Origin::Reference);
}

#[test]
fn test_reference_records_fill_chain_lazily() {
    let mut registry = ResolutionRegistry::new();
    registry.observe_reference(&edt("CustAccount", None, Some(("CustTable", "AccountNum"))));
    registry.observe_reference(&edt("Unrelated", None, None));
    registry.observe_target(&edt("CustInvoiceAccount", Some("CustAccount"), None));

    assert!(registry.record("CustAccount").is_some());
    assert!(registry.record("Unrelated").is_none());

    let resolution = registry.finish();
    assert_eq!(
        resolution.records.relation_for("CustInvoiceAccount"),
        Some(&Relation::new("CustTable", "AccountNum"))
    );
}

#[test]
fn test_unresolved_parent_reported_once_per_child() {
    let child = edt("ProjOrphan", Some("ProjIdBase"), None);
    let grandchild = edt("ProjOrphanOverride", Some("ProjOrphan"), None);

    for order in permutations(&[&child, &grandchild]) {
        let resolution = resolve_targets(&order);
        let unresolved: Vec<_> = resolution
            .diagnostics
            .of_kind(ObservationKind::UnresolvedParent)
            .map(|o| o.subject.clone())
            .collect();
        assert_eq!(unresolved.len(), 2, "{:?}", unresolved);
        assert!(unresolved.contains(&"ProjOrphan".to_string()));
        assert!(unresolved.contains(&"ProjOrphanOverride".to_string()));
        assert!(resolution.records.relation_for("ProjOrphanOverride").is_none());
    }
}

#[test]
fn test_cycle_is_reported_and_terminates() {
    let a = edt("LoopA", Some("LoopB"), None);
    let b = edt("LoopB", Some("LoopA"), None);
    let resolution = resolve_targets(&[&a, &b]);

    assert_eq!(resolution.diagnostics.count(ObservationKind::InheritanceCycle), 1);
    assert!(resolution.records.relation_for("LoopA").is_none());
    assert!(resolution.records.relation_for("LoopB").is_none());
}

// =============================================================================
// Reading
// =============================================================================

#[test]
fn test_same_table_relations_are_read_together() {
    let doc = Element::new("AxEdt")
        .child_element(Element::with_text("Name", "InventDimCombo"))
        .child_element(
            Element::new("Relations")
                .child_element(
                    Element::new("AxEdtRelation")
                        .child_element(Element::with_text("RelatedField", "InventDimId"))
                        .child_element(Element::with_text("Table", "InventDim")),
                )
                .child_element(
                    Element::new("AxEdtRelation")
                        .child_element(Element::with_text("RelatedField", "ConfigId"))
                        .child_element(Element::with_text("Table", "inventdim")),
                ),
        );

    let record = read_extended_type(&doc, Origin::Target).unwrap();
    assert_eq!(record.relations.len(), 2);
    assert!(record.relation().is_none());

    // More than one relation is evicted at the end of resolution
    let resolution = resolve_targets(&[&doc]);
    assert!(resolution.records.get("InventDimCombo").is_none());
    assert_eq!(resolution.diagnostics.count(ObservationKind::MultiRelationRecord), 1);
}

#[test]
fn test_mixed_table_relations_are_a_violation() {
    let doc = Element::parse(include_str!("fixtures/target/MyModel/AxEdt/ItemMixed.xml")).unwrap();
    let err = read_extended_type(&doc, Origin::Target).unwrap_err();
    assert!(err.is_schema_violation());

    let resolution = resolve_targets(&[&doc]);
    assert_eq!(resolution.diagnostics.count(ObservationKind::SchemaViolation), 1);
    assert!(resolution.records.get("ItemMixed").is_none());
}

// =============================================================================
// Synthesis
// =============================================================================

#[test]
fn test_primary_key_detected() {
    let resolved = records(&[edt("CustAccount", None, Some(("CustTable", "AccountNum")))]);
    let table = read_table(&table("CustTable", &[("AccountNum", "CustAccount")])).unwrap();

    let mut diags = Diagnostics::new();
    let patches = synthesize(&table, &resolved, &mut diags);
    assert!(patches.is_empty());
    assert_eq!(diags.count(ObservationKind::PrimaryKeyDetected), 1);
}

#[test]
fn test_repeated_type_gets_role_qualified_keys() {
    let resolved = records(&[edt("CustAccount", None, Some(("CustTable", "AccountNum")))]);
    let mut doc = table(
        "SalesTable",
        &[("CustAccount", "CustAccount"), ("InvoiceAccount", "CustAccount")],
    );

    let mut diags = Diagnostics::new();
    let patches = synthesize(&read_table(&doc).unwrap(), &resolved, &mut diags);
    let names: Vec<&str> = patches.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["CustTable_CustAccount", "CustTable_InvoiceAccount"]);

    let roles: Vec<_> = patches.iter().map(|p| p.roles.clone().unwrap()).collect();
    assert_eq!(roles[0].role, "SalesTable_CustAccount");
    assert_eq!(roles[1].role, "SalesTable_InvoiceAccount");
    assert_ne!(roles[0].related_role, roles[1].related_role);

    // A second pass over the patched table changes nothing
    apply_patches(&mut doc, &patches);
    let reparsed = Element::parse(&doc.to_xml().unwrap()).unwrap();
    let mut again = Diagnostics::new();
    let patches = synthesize(&read_table(&reparsed).unwrap(), &resolved, &mut again);
    assert!(patches.is_empty());
    assert_eq!(again.count(ObservationKind::ExistingForeignKeyDetected), 2);
    assert_eq!(again.count(ObservationKind::ForeignKeyCreated), 0);
}

#[test]
fn test_existing_foreign_key_detected() {
    let resolved = records(&[
        edt("CustAccount", None, Some(("CustTable", "AccountNum"))),
        edt("CustInvoiceAccount", Some("CustAccount"), None),
    ]);
    let doc = Element::parse(include_str!("fixtures/target/MyModel/AxTable/CustTable.xml")).unwrap();

    let mut diags = Diagnostics::new();
    let patches = synthesize(&read_table(&doc).unwrap(), &resolved, &mut diags);
    assert!(patches.is_empty());
    assert_eq!(diags.count(ObservationKind::ExistingForeignKeyDetected), 1);
    assert_eq!(diags.count(ObservationKind::PrimaryKeyDetected), 1);
}

#[test]
fn test_extension_patch_targets_extension_document() {
    let resolved = records(&[
        edt("CustAccount", None, Some(("CustTable", "AccountNum"))),
        edt("CustInvoiceAccount", Some("CustAccount"), None),
    ]);
    let doc = Element::parse(include_str!(
        "fixtures/target/MyModel/AxTableExtension/SalesLine.MyModel.xml"
    ))
    .unwrap();
    let table = read_table(&doc).unwrap();
    assert_eq!(table.table, "SalesLine");

    let mut diags = Diagnostics::new();
    let patches = synthesize(&table, &resolved, &mut diags);
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].table, "SalesLine.MyModel");
    assert_eq!(patches[0].name, "CustTable");
    assert!(patches[0].roles.is_none());
}

// =============================================================================
// Full Runs
// =============================================================================

#[test]
fn test_full_run_over_fixture_corpus() {
    let dir = corpus_dir();
    let outcome = Migrator::new(config_for(dir.path(), false)).run().unwrap();
    let summary = &outcome.summary;

    assert_eq!(summary.extended_types_read, 6);
    assert_eq!(summary.tables_read, 3);
    assert_eq!(summary.foreign_keys_created, 4);
    assert_eq!(summary.tables_rewritten, 2);
    assert_eq!(summary.extended_types_rewritten, 1);

    let diags = &outcome.diagnostics;
    assert_eq!(diags.count(ObservationKind::ForeignKeyCreated), 4);
    assert_eq!(diags.count(ObservationKind::PrimaryKeyDetected), 1);
    assert_eq!(diags.count(ObservationKind::ExistingForeignKeyDetected), 1);
    assert_eq!(diags.count(ObservationKind::UnresolvedParent), 1);
    assert_eq!(diags.count(ObservationKind::ArrayTypeSkipped), 1);
    assert_eq!(diags.count(ObservationKind::SchemaViolation), 1);

    let names: Vec<&str> = outcome.patches.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["CustTable_CustAccount", "CustTable_InvoiceAccount", "VendTable", "CustTable"]
    );

    // CustAccount moved to the table-reference form
    let root = dir.path().join("target/MyModel/AxEdt/CustAccount.xml");
    let doc = Element::parse(&fs::read_to_string(root).unwrap()).unwrap();
    let record = read_extended_type(&doc, Origin::Target).unwrap();
    assert_eq!(record.source, RelationSource::Migrated);
    assert_eq!(doc.child_text("ReferenceTable"), Some("CustTable"));

    // Inherited and reference records are left alone
    let child = fs::read_to_string(dir.path().join("target/MyModel/AxEdt/CustInvoiceAccount.xml")).unwrap();
    assert!(!child.contains("ReferenceTable"));
    let reference = dir.path().join("reference/ApplicationSuite/AxEdt/VendAccount.xml");
    assert_eq!(
        fs::read_to_string(reference).unwrap(),
        include_str!("fixtures/reference/ApplicationSuite/AxEdt/VendAccount.xml")
    );

    let reports = dir.path().join("reports");
    let unresolved = fs::read_to_string(reports.join("unresolved_parents.txt")).unwrap();
    assert_eq!(unresolved.lines().count(), 1);
    assert!(unresolved.starts_with("ProjOrphan:"));
    assert!(reports.join("summary.json").exists());
}

#[test]
fn test_second_run_is_idempotent() {
    let dir = corpus_dir();
    Migrator::new(config_for(dir.path(), false)).run().unwrap();

    let outcome = Migrator::new(config_for(dir.path(), false)).run().unwrap();
    assert_eq!(outcome.summary.foreign_keys_created, 0);
    assert_eq!(outcome.summary.tables_rewritten, 0);
    assert_eq!(outcome.summary.extended_types_rewritten, 0);
    assert_eq!(
        outcome.diagnostics.count(ObservationKind::ExistingForeignKeyDetected),
        5
    );
}

#[test]
fn test_dry_run_writes_only_reports() {
    let dir = corpus_dir();
    let outcome = Migrator::new(config_for(dir.path(), true)).run().unwrap();
    assert_eq!(outcome.summary.foreign_keys_created, 4);
    assert!(outcome.summary.dry_run);

    for (path, content) in FIXTURES {
        assert_eq!(&fs::read_to_string(dir.path().join(path)).unwrap(), content, "{}", path);
    }
    assert!(dir.path().join("reports/created_foreign_keys.txt").exists());
}

#[test]
fn test_extension_is_judged_with_its_base_table() {
    let dir = TempDir::new().unwrap();
    let model = dir.path().join("target/MyModel");
    for (path, content) in [
        ("AxEdt/CustAccount.xml", include_str!("fixtures/target/MyModel/AxEdt/CustAccount.xml")),
        ("AxEdt/CustInvoiceAccount.xml", include_str!("fixtures/target/MyModel/AxEdt/CustInvoiceAccount.xml")),
        ("AxTable/SalesLine.xml", include_str!("fixtures/base_tables/AxTable/SalesLine.xml")),
        ("AxTableExtension/SalesLine.MyModel.xml", include_str!("fixtures/target/MyModel/AxTableExtension/SalesLine.MyModel.xml")),
    ] {
        let path = model.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    let mut config = config_for(dir.path(), false);
    config.corpus.references.clear();

    // CustInvoiceAccount types one field on the base table and one on the
    // extension, and the base table already has a relation named CustTable
    let outcome = Migrator::new(config.clone()).run().unwrap();
    assert_eq!(outcome.patches.len(), 1);
    let patch = &outcome.patches[0];
    assert_eq!(patch.table, "SalesLine.MyModel");
    assert_eq!(patch.name, "CustTable_MyInvoiceAccount");
    let roles = patch.roles.as_ref().unwrap();
    assert_eq!(roles.role, "SalesLine_MyInvoiceAccount");
    assert_eq!(roles.related_role, "CustTable_MyInvoiceAccount");
    assert_eq!(outcome.diagnostics.count(ObservationKind::ExistingForeignKeyDetected), 1);
    assert_eq!(outcome.summary.tables_rewritten, 1);

    let again = Migrator::new(config).run().unwrap();
    assert!(again.patches.is_empty());
    assert_eq!(again.diagnostics.count(ObservationKind::ExistingForeignKeyDetected), 2);
}

#[test]
fn test_graph_covers_both_corpora() {
    let dir = corpus_dir();
    let resolution = Migrator::new(config_for(dir.path(), true)).resolve().unwrap();
    let graph = &resolution.graph;

    assert!(graph.cycles().is_empty());
    let ancestors = graph.ancestors("CustInvoiceAccount");
    assert_eq!(ancestors, vec!["CustAccount".to_string(), "AccountNum".to_string()]);
    assert!(graph.to_dot().contains("ProjIdBase"));
}
