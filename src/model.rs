//! Relation Model
//!
//! Plain data: extended data type records, their relations, table field
//! declarations, existing table relations and synthesized foreign-key patches.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Record Key
// =============================================================================

/// Case-insensitive identity of a named record
///
/// Metadata names compare case-insensitively. The key is normalized once when a
/// name enters the registry and every lookup after that is an exact match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Case-insensitive name comparison for table and field names
pub fn same_name(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

// =============================================================================
// Relations
// =============================================================================

/// A (target table, related field) pair on an extended data type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub table: String,
    pub related_field: String,
    /// Fixed literal the relation is restricted to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Relation {
    pub fn new(table: impl Into<String>, related_field: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            related_field: related_field.into(),
            value: None,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.related_field)?;
        if let Some(value) = &self.value {
            write!(f, " = {}", value)?;
        }
        Ok(())
    }
}

/// Which corpus group a record was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Read and possibly rewritten
    Target,
    /// Read only, consulted to resolve ancestors
    Reference,
}

/// Where a record's relation list came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationSource {
    /// Legacy `Relations` entries on the record itself
    Own,
    /// Already expressed as `ReferenceTable` + `TableReferences`
    Migrated,
    /// Inherited from the named ancestor
    Inherited(String),
    /// No relation
    None,
}

// =============================================================================
// Extended Data Type Record
// =============================================================================

/// An extended data type after its document has been read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedTypeRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// 0 or 1 entries once resolved; more is an anomaly evicted before synthesis
    pub relations: Vec<Relation>,
    pub source: RelationSource,
    pub origin: Origin,
}

impl ExtendedTypeRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.name)
    }

    pub fn parent_key(&self) -> Option<RecordKey> {
        self.parent.as_deref().map(RecordKey::new)
    }

    /// The single usable relation, if the record has exactly one
    pub fn relation(&self) -> Option<&Relation> {
        match self.relations.as_slice() {
            [relation] => Some(relation),
            _ => None,
        }
    }

    /// Attach a relation found on an ancestor
    pub fn inherit(&mut self, relation: Relation, ancestor: impl Into<String>) {
        self.relations = vec![relation];
        self.source = RelationSource::Inherited(ancestor.into());
    }
}

// =============================================================================
// Tables
// =============================================================================

/// A typed field declared on a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDeclaration {
    pub table: String,
    pub field: String,
    pub extended_type: String,
}

/// One constraint of an existing table relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_field: Option<String>,
}

/// A relation definition already present on a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingRelation {
    pub name: String,
    pub related_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_role: Option<String>,
    pub constraints: Vec<ExistingConstraint>,
}

impl ExistingRelation {
    /// Does any constraint of this relation constrain `field`?
    pub fn constrains(&self, field: &str) -> bool {
        self.constraints
            .iter()
            .any(|c| c.field.as_deref().map_or(false, |f| same_name(f, field)))
    }
}

/// A table (or table extension) with its fields and existing relations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRecord {
    /// Name of the table the fields belong to (base name for extensions)
    pub table: String,
    /// Name of the document itself (`SalesLine.MyExtension` for extensions)
    pub document_name: String,
    pub fields: Vec<FieldDeclaration>,
    pub relations: Vec<ExistingRelation>,
}

// =============================================================================
// Foreign Key Patch
// =============================================================================

/// Role pair used when several fields of a table share an extended data type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePair {
    pub role: String,
    pub related_role: String,
}

/// A field -> related field constraint of a synthesized relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintPair {
    pub field: String,
    pub related_field: String,
}

/// A relation definition to be appended to a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyPatch {
    /// Table document the patch is applied to
    pub table: String,
    /// Relation name, unique within the table
    pub name: String,
    pub related_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<RolePair>,
    pub constraints: Vec<ConstraintPair>,
}

impl fmt::Display for ForeignKeyPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .constraints
            .iter()
            .map(|c| format!("{} -> {}.{}", c.field, self.related_table, c.related_field))
            .collect();
        write!(f, "{}.{} ({})", self.table, self.name, pairs.join(", "))
    }
}
