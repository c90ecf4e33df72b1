//! Relation Reader
//!
//! Turns extended data type and table documents into model records. Reading is
//! pure: a document that breaks an invariant fails with a schema violation and
//! nothing else is touched.

use crate::document::Element;
use crate::error::{MigrationError, Result};
use crate::model::{
    same_name, ExistingConstraint, ExistingRelation, ExtendedTypeRecord, FieldDeclaration,
    Origin, Relation, RelationSource, TableRecord,
};

/// Element name of a legacy relation entry
pub const RELATION_ENTRY: &str = "AxEdtRelation";
/// Element name of a migrated table reference
pub const TABLE_REFERENCE: &str = "AxEdtTableReference";
/// Element name of a table relation definition
pub const TABLE_RELATION: &str = "AxTableRelation";

/// Read a legacy `Relations` container
///
/// Entries without both `Table` and `RelatedField` are placeholders and are
/// dropped. All remaining entries must target the same table.
pub fn read_relations(record: &str, container: &Element) -> Result<Vec<Relation>> {
    let mut relations = Vec::new();

    for entry in &container.children {
        if entry.name != RELATION_ENTRY {
            return Err(MigrationError::violation(
                record,
                format!("unrecognized relation entry <{}>", entry.name),
            ));
        }

        match (entry.child_text("Table"), entry.child_text("RelatedField")) {
            (Some(table), Some(related_field)) => relations.push(Relation {
                table: table.to_string(),
                related_field: related_field.to_string(),
                value: entry.child_text("Value").map(str::to_string),
            }),
            _ => tracing::debug!("{}: dropping relation entry without field data", record),
        }
    }

    if let Some(first) = relations.first() {
        if relations.iter().any(|r| !same_name(&r.table, &first.table)) {
            let tables: Vec<&str> = relations.iter().map(|r| r.table.as_str()).collect();
            return Err(MigrationError::violation(
                record,
                format!("relations target different tables: {}", tables.join(", ")),
            ));
        }
    }

    Ok(relations)
}

// =============================================================================
// Extended Data Types
// =============================================================================

/// Identity of an extended data type document, read without its relations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedTypeHeader {
    pub name: String,
    pub parent: Option<String>,
    /// The type declares array elements and is left alone
    pub is_array: bool,
}

pub fn read_header(doc: &Element) -> Result<ExtendedTypeHeader> {
    let name = doc
        .child_text("Name")
        .ok_or_else(|| MigrationError::violation(doc.name.as_str(), "document has no Name"))?;

    Ok(ExtendedTypeHeader {
        name: name.to_string(),
        parent: doc.child_text("Extends").map(str::to_string),
        is_array: doc
            .child("ArrayElements")
            .map_or(false, Element::has_children),
    })
}

/// Read an extended data type into a record with its own relations
///
/// A record already in the migrated form (`ReferenceTable` plus one
/// `AxEdtTableReference`) yields that reference as its relation.
pub fn read_extended_type(doc: &Element, origin: Origin) -> Result<ExtendedTypeRecord> {
    let header = read_header(doc)?;
    let name = header.name.as_str();

    let relations = match doc.child("Relations") {
        Some(container) => read_relations(name, container)?,
        None => Vec::new(),
    };

    let reference_table = doc.child_text("ReferenceTable");
    let references: Vec<&Element> = doc
        .child("TableReferences")
        .map(|c| c.children_named(TABLE_REFERENCE).collect())
        .unwrap_or_default();

    let (relations, source) = if !relations.is_empty() {
        if reference_table.is_some() || !references.is_empty() {
            return Err(MigrationError::violation(
                name,
                "legacy relations present but ReferenceTable/TableReferences already populated",
            ));
        }
        (relations, RelationSource::Own)
    } else if let Some(table) = reference_table {
        let relation = read_table_reference(name, table, &references)?;
        (vec![relation], RelationSource::Migrated)
    } else {
        (Vec::new(), RelationSource::None)
    };

    Ok(ExtendedTypeRecord {
        name: header.name,
        parent: header.parent,
        relations,
        source,
        origin,
    })
}

fn read_table_reference(record: &str, table: &str, references: &[&Element]) -> Result<Relation> {
    let reference = match references {
        [] => {
            return Err(MigrationError::MissingTableReference {
                record: record.to_string(),
                table: table.to_string(),
            })
        }
        [reference] => reference,
        _ => {
            return Err(MigrationError::violation(
                record,
                format!("{} table references, expected one", references.len()),
            ))
        }
    };

    if let Some(referenced) = reference.child_text("Table") {
        if !same_name(referenced, table) {
            return Err(MigrationError::violation(
                record,
                format!("ReferenceTable {} does not match table reference {}", table, referenced),
            ));
        }
    }

    let related_field = reference.child_text("RelatedField").ok_or_else(|| {
        MigrationError::violation(record, "table reference has no RelatedField")
    })?;

    Ok(Relation::new(table, related_field))
}

// =============================================================================
// Tables
// =============================================================================

/// Read an `AxTable` or `AxTableExtension` document
pub fn read_table(doc: &Element) -> Result<TableRecord> {
    if doc.name != "AxTable" && doc.name != "AxTableExtension" {
        return Err(MigrationError::violation(
            doc.name.as_str(),
            "not a table document",
        ));
    }

    let document_name = doc
        .child_text("Name")
        .ok_or_else(|| MigrationError::violation(doc.name.as_str(), "document has no Name"))?;

    // Extensions are named `Table.Suffix`; their fields belong to `Table`
    let table = if doc.name == "AxTableExtension" {
        document_name.split('.').next().unwrap_or(document_name)
    } else {
        document_name
    };

    let fields = doc
        .child("Fields")
        .map(|fields| {
            fields
                .children
                .iter()
                .filter_map(|field| {
                    Some(FieldDeclaration {
                        table: table.to_string(),
                        field: field.child_text("Name")?.to_string(),
                        extended_type: field.child_text("ExtendedDataType")?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let relations = doc
        .child("Relations")
        .map(|relations| {
            relations
                .children_named(TABLE_RELATION)
                .filter_map(read_existing_relation)
                .collect()
        })
        .unwrap_or_default();

    Ok(TableRecord {
        table: table.to_string(),
        document_name: document_name.to_string(),
        fields,
        relations,
    })
}

fn read_existing_relation(relation: &Element) -> Option<ExistingRelation> {
    let constraints = relation
        .child("Constraints")
        .map(|c| {
            c.children
                .iter()
                .map(|constraint| ExistingConstraint {
                    field: constraint.child_text("Field").map(str::to_string),
                    related_field: constraint.child_text("RelatedField").map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();

    Some(ExistingRelation {
        name: relation.child_text("Name").unwrap_or_default().to_string(),
        related_table: relation.child_text("RelatedTable")?.to_string(),
        role: relation.child_text("Role").map(str::to_string),
        related_role: relation.child_text("RelatedTableRole").map(str::to_string),
        constraints,
    })
}
