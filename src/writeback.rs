//! Document Write-Back
//!
//! Applies resolution and synthesis results to metadata documents in memory.
//! Persisting the documents is left to the caller.

use crate::document::Element;
use crate::error::{MigrationError, Result};
use crate::model::{ForeignKeyPatch, Relation};
use crate::reader::{TABLE_REFERENCE, TABLE_RELATION};

const XSI_TYPE: &str = "i:type";
const FIELD_CONSTRAINT: &str = "AxTableRelationConstraintField";

/// Move an extended data type to the table-reference model
///
/// Drops the legacy `Relations` container, sets `ReferenceTable` and adds the
/// single `AxEdtTableReference`.
pub fn migrate_extended_type(doc: &mut Element, relation: &Relation) -> Result<()> {
    let name = doc.child_text("Name").unwrap_or_default().to_string();

    if doc.child_text("ReferenceTable").is_some() {
        return Err(MigrationError::violation(name, "ReferenceTable is already populated"));
    }
    if doc.child("TableReferences").map_or(false, Element::has_children) {
        return Err(MigrationError::violation(name, "TableReferences is already populated"));
    }

    doc.remove_child("Relations");
    doc.set_child_text("ReferenceTable", relation.table.as_str());
    doc.ensure_child("TableReferences").children.push(
        Element::new(TABLE_REFERENCE)
            .attribute("xmlns", "")
            .child_element(Element::with_text("RelatedField", relation.related_field.as_str()))
            .child_element(Element::with_text("Table", relation.table.as_str())),
    );
    Ok(())
}

/// Append synthesized relations to a table document
pub fn apply_patches(doc: &mut Element, patches: &[ForeignKeyPatch]) {
    if patches.is_empty() {
        return;
    }
    let relations = doc.ensure_child("Relations");
    for patch in patches {
        relations.children.push(relation_element(patch));
    }
}

fn relation_element(patch: &ForeignKeyPatch) -> Element {
    let mut relation = Element::new(TABLE_RELATION)
        .attribute("xmlns", "")
        .child_element(Element::with_text("Name", patch.name.as_str()))
        .child_element(Element::with_text("RelatedTable", patch.related_table.as_str()));

    if let Some(roles) = &patch.roles {
        relation = relation
            .child_element(Element::with_text("RelatedTableRole", roles.related_role.as_str()))
            .child_element(Element::with_text("Role", roles.role.as_str()));
    }

    let mut constraints = Element::new("Constraints");
    for pair in &patch.constraints {
        constraints.children.push(
            Element::new("AxTableRelationConstraint")
                .attribute("xmlns", "")
                .attribute(XSI_TYPE, FIELD_CONSTRAINT)
                .child_element(Element::with_text("Name", pair.field.as_str()))
                .child_element(Element::with_text("Field", pair.field.as_str()))
                .child_element(Element::with_text("RelatedField", pair.related_field.as_str())),
        );
    }
    relation.child_element(constraints)
}
