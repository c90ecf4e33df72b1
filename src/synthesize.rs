//! Table Relation Synthesizer
//!
//! Decides, per typed field of a table, whether the table needs a foreign key
//! for the relation its extended data type resolved to, and builds the patch.
//! Synthesis is idempotent: a relation that already covers the field is
//! detected and never duplicated.
//!
//! A table can be spread over a base document and any number of extensions.
//! Occurrence counts, relation names and existing relations are all judged
//! table-wide through a [`TableScope`] shared by every document of the table.

use std::collections::{HashMap, HashSet};

use crate::diagnostics::{Diagnostics, ObservationKind};
use crate::model::{
    same_name, ConstraintPair, ExistingRelation, FieldDeclaration, ForeignKeyPatch, RecordKey,
    Relation, RolePair, TableRecord,
};
use crate::resolve::ResolvedRecords;

/// Fields, relations and relation names of one table across all its documents
#[derive(Debug, Clone, Default)]
pub struct TableScope {
    occurrences: HashMap<RecordKey, usize>,
    relations: Vec<ExistingRelation>,
    /// Lowercased relation names, existing and emitted
    taken: HashSet<String>,
}

impl TableScope {
    pub fn new<'a>(documents: impl IntoIterator<Item = &'a TableRecord>) -> Self {
        let mut scope = Self::default();
        for document in documents {
            scope.add(document);
        }
        scope
    }

    /// Add one document (base table or extension) of the table
    pub fn add(&mut self, document: &TableRecord) {
        for field in &document.fields {
            *self
                .occurrences
                .entry(RecordKey::new(&field.extended_type))
                .or_default() += 1;
        }
        for relation in &document.relations {
            self.taken.insert(relation.name.to_lowercase());
            self.relations.push(relation.clone());
        }
    }

    fn is_repeated(&self, extended_type: &str) -> bool {
        self.occurrences
            .get(&RecordKey::new(extended_type))
            .map_or(false, |n| *n > 1)
    }
}

/// Synthesize the foreign keys `table` is missing, judging it on its own
///
/// An empty result means the table needs no change.
pub fn synthesize(
    table: &TableRecord,
    resolved: &ResolvedRecords,
    diagnostics: &mut Diagnostics,
) -> Vec<ForeignKeyPatch> {
    let mut scope = TableScope::new([table]);
    synthesize_in(&mut scope, table, resolved, diagnostics)
}

/// Synthesize the foreign keys one document of a table is missing
///
/// `scope` must cover every document of the table; names emitted here are
/// claimed in it so later documents cannot reuse them.
pub fn synthesize_in(
    scope: &mut TableScope,
    table: &TableRecord,
    resolved: &ResolvedRecords,
    diagnostics: &mut Diagnostics,
) -> Vec<ForeignKeyPatch> {
    let mut patches = Vec::new();

    for field in &table.fields {
        let Some(relation) = resolved.relation_for(&field.extended_type) else {
            continue;
        };

        if same_name(&table.table, &relation.table) && same_name(&field.field, &relation.related_field) {
            diagnostics.record(
                ObservationKind::PrimaryKeyDetected,
                table.document_name.as_str(),
                format!("{} is the key of {} ({})", field.field, relation.table, field.extended_type),
            );
            continue;
        }

        let repeated = scope.is_repeated(&field.extended_type);

        let matches: Vec<&ExistingRelation> = scope
            .relations
            .iter()
            .filter(|r| same_name(&r.related_table, &relation.table) && r.constrains(&field.field))
            .filter(|r| !repeated || covers_role(r, table, field, relation))
            .collect();

        match matches.as_slice() {
            [] => {
                let patch = build_patch(table, field, relation, repeated, &mut scope.taken);
                diagnostics.record(
                    ObservationKind::ForeignKeyCreated,
                    table.document_name.as_str(),
                    patch_message(&patch),
                );
                patches.push(patch);
            }
            [existing] if repeated => diagnostics.record(
                ObservationKind::ExistingForeignKeyDetected,
                table.document_name.as_str(),
                format!("{} already covers {}", existing.name, field.field),
            ),
            [existing] => classify_existing(table, field, relation, existing, diagnostics),
            many => {
                let names: Vec<&str> = many.iter().map(|r| r.name.as_str()).collect();
                diagnostics.record(
                    ObservationKind::AnomalyDetected,
                    table.document_name.as_str(),
                    format!(
                        "duplicate relations to {} on {}: {}",
                        relation.table,
                        field.field,
                        names.join(", ")
                    ),
                );
            }
        }
    }

    patches
}

/// Role-qualified match for a field whose extended data type is repeated:
/// the relation carries this field's role pair, or constrains it to the
/// resolved related field
fn covers_role(
    existing: &ExistingRelation,
    table: &TableRecord,
    field: &FieldDeclaration,
    relation: &Relation,
) -> bool {
    let roles = match (&existing.role, &existing.related_role) {
        (Some(role), Some(related_role)) => {
            same_name(role, &format!("{}_{}", table.table, field.field))
                && same_name(related_role, &format!("{}_{}", relation.table, field.field))
        }
        _ => false,
    };

    roles
        || existing.constraints.iter().any(|c| {
            c.field.as_deref().map_or(false, |f| same_name(f, &field.field))
                && c.related_field
                    .as_deref()
                    .map_or(false, |r| same_name(r, &relation.related_field))
        })
}

/// One existing relation covers a field whose extended data type is used once
fn classify_existing(
    table: &TableRecord,
    field: &FieldDeclaration,
    relation: &Relation,
    existing: &ExistingRelation,
    diagnostics: &mut Diagnostics,
) {
    let subject = table.document_name.as_str();

    if existing.constraints.len() > 1 {
        diagnostics.record(
            ObservationKind::MultiKeyForeignKeyDetected,
            subject,
            format!(
                "{} constrains {} with {} fields",
                existing.name,
                field.field,
                existing.constraints.len()
            ),
        );
        return;
    }

    let related = existing
        .constraints
        .first()
        .and_then(|c| c.related_field.as_deref())
        .unwrap_or_default();

    if same_name(related, &relation.related_field) {
        diagnostics.record(
            ObservationKind::ExistingForeignKeyDetected,
            subject,
            format!("{} already covers {}", existing.name, field.field),
        );
    } else {
        diagnostics.record(
            ObservationKind::AnomalyDetected,
            subject,
            format!(
                "unexpected existing relation {}: {} -> {}.{}, expected {}.{}",
                existing.name,
                field.field,
                existing.related_table,
                related,
                relation.table,
                relation.related_field
            ),
        );
    }
}

fn build_patch(
    table: &TableRecord,
    field: &FieldDeclaration,
    relation: &Relation,
    repeated: bool,
    taken: &mut HashSet<String>,
) -> ForeignKeyPatch {
    let (base, roles) = if repeated {
        (
            format!("{}_{}", relation.table, field.field),
            Some(RolePair {
                role: format!("{}_{}", table.table, field.field),
                related_role: format!("{}_{}", relation.table, field.field),
            }),
        )
    } else {
        (relation.table.clone(), None)
    };

    ForeignKeyPatch {
        table: table.document_name.clone(),
        name: unique_name(&base, taken),
        related_table: relation.table.clone(),
        roles,
        constraints: vec![ConstraintPair {
            field: field.field.clone(),
            related_field: relation.related_field.clone(),
        }],
    }
}

/// First of `base`, `base1`, `base2`, ... not yet taken on the table
fn unique_name(base: &str, taken: &mut HashSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut suffix = 1;
    while taken.contains(&candidate.to_lowercase()) {
        candidate = format!("{}{}", base, suffix);
        suffix += 1;
    }
    taken.insert(candidate.to_lowercase());
    candidate
}

fn patch_message(patch: &ForeignKeyPatch) -> String {
    let pairs: Vec<String> = patch
        .constraints
        .iter()
        .map(|c| format!("{} -> {}.{}", c.field, patch.related_table, c.related_field))
        .collect();
    format!("relation {}: {}", patch.name, pairs.join(", "))
}
