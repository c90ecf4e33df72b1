//! Observations
//!
//! Every ambiguous branch of resolution and synthesis produces a classified
//! observation instead of failing. Each kind maps to one report file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Observation Kinds
// =============================================================================

/// Fixed taxonomy of observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObservationKind {
    // === Synthesis outcomes ===
    /// A new foreign key was synthesized
    ForeignKeyCreated,
    /// The table already carries the expected relation
    ExistingForeignKeyDetected,
    /// The field is the key the extended data type refers to
    PrimaryKeyDetected,

    // === Needs review ===
    /// Record carries more than one relation after resolution
    MultiRelationRecord,
    /// An ancestor of the record carries more than one relation
    MultiRelationAncestor,
    /// Parent was never observed in any corpus
    UnresolvedParent,
    /// Duplicate or mismatched existing relation
    AnomalyDetected,
    /// Matching existing relation has several constraints
    MultiKeyForeignKeyDetected,
    /// Array-typed record skipped
    ArrayTypeSkipped,
    /// An ancestor failed validation
    InvalidAncestor,

    // === Invalid input ===
    /// Records whose inheritance chain loops
    InheritanceCycle,
    /// `ReferenceTable` set without its `AxEdtTableReference` detail
    MissingTableReference,
    /// Document aborted during reading
    SchemaViolation,
}

impl ObservationKind {
    pub const ALL: [ObservationKind; 13] = [
        Self::ForeignKeyCreated,
        Self::ExistingForeignKeyDetected,
        Self::PrimaryKeyDetected,
        Self::MultiRelationRecord,
        Self::MultiRelationAncestor,
        Self::UnresolvedParent,
        Self::AnomalyDetected,
        Self::MultiKeyForeignKeyDetected,
        Self::ArrayTypeSkipped,
        Self::InvalidAncestor,
        Self::InheritanceCycle,
        Self::MissingTableReference,
        Self::SchemaViolation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ForeignKeyCreated => "I001",
            Self::ExistingForeignKeyDetected => "I002",
            Self::PrimaryKeyDetected => "I003",
            Self::MultiRelationRecord => "W001",
            Self::MultiRelationAncestor => "W002",
            Self::UnresolvedParent => "W003",
            Self::AnomalyDetected => "W004",
            Self::MultiKeyForeignKeyDetected => "W005",
            Self::ArrayTypeSkipped => "W006",
            Self::InvalidAncestor => "W007",
            Self::InheritanceCycle => "E001",
            Self::MissingTableReference => "E002",
            Self::SchemaViolation => "E003",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::ForeignKeyCreated
            | Self::ExistingForeignKeyDetected
            | Self::PrimaryKeyDetected => Severity::Info,

            Self::MultiRelationRecord
            | Self::MultiRelationAncestor
            | Self::UnresolvedParent
            | Self::AnomalyDetected
            | Self::MultiKeyForeignKeyDetected
            | Self::ArrayTypeSkipped
            | Self::InvalidAncestor => Severity::Warning,

            Self::InheritanceCycle
            | Self::MissingTableReference
            | Self::SchemaViolation => Severity::Error,
        }
    }

    /// Report file this kind is written to
    pub fn report_file(&self) -> &'static str {
        match self {
            Self::ForeignKeyCreated => "created_foreign_keys.txt",
            Self::ExistingForeignKeyDetected => "existing_foreign_keys.txt",
            Self::PrimaryKeyDetected => "primary_keys.txt",
            Self::MultiRelationRecord => "multi_relation_records.txt",
            Self::MultiRelationAncestor => "multi_relation_ancestors.txt",
            Self::UnresolvedParent => "unresolved_parents.txt",
            Self::AnomalyDetected => "anomalies.txt",
            Self::MultiKeyForeignKeyDetected => "multi_key_foreign_keys.txt",
            Self::ArrayTypeSkipped => "array_types.txt",
            Self::InvalidAncestor => "invalid_ancestors.txt",
            Self::InheritanceCycle => "inheritance_cycles.txt",
            Self::MissingTableReference => "missing_table_references.txt",
            Self::SchemaViolation => "schema_violations.txt",
        }
    }
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Observation
// =============================================================================

/// A single classified observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub kind: ObservationKind,
    /// Record or table the observation is about
    pub subject: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl Observation {
    pub fn new(kind: ObservationKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    /// One report line: `subject: message [| context ...]`
    pub fn report_line(&self) -> String {
        let mut line = format!("{}: {}", self.subject, self.message);
        for ctx in &self.context {
            line.push_str(" | ");
            line.push_str(ctx);
        }
        line
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.kind,
            self.kind.severity(),
            self.message,
            self.subject
        )?;
        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }
        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Observations collected over a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<Observation>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Observation) {
        tracing::debug!("{}", item);
        self.items.push(item);
    }

    pub fn record(
        &mut self,
        kind: ObservationKind,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.push(Observation::new(kind, subject, message));
    }

    pub fn of_kind(&self, kind: ObservationKind) -> impl Iterator<Item = &Observation> {
        self.items.iter().filter(move |i| i.kind == kind)
    }

    pub fn count(&self, kind: ObservationKind) -> usize {
        self.of_kind(kind).count()
    }

    /// Count per kind, every kind present
    pub fn counts(&self) -> BTreeMap<ObservationKind, usize> {
        let mut counts: BTreeMap<ObservationKind, usize> =
            ObservationKind::ALL.iter().map(|k| (*k, 0)).collect();
        for item in &self.items {
            *counts.entry(item.kind).or_default() += 1;
        }
        counts
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.kind.severity() == Severity::Error)
    }

    pub fn all(&self) -> &[Observation] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    /// Short per-kind summary, skipping kinds with nothing to report
    pub fn format_summary(&self) -> String {
        let mut output = String::new();
        for (kind, count) in self.counts() {
            if count > 0 {
                output.push_str(&format!("{:>6}  {:?}\n", count, kind));
            }
        }
        output
    }
}

impl IntoIterator for Diagnostics {
    type Item = Observation;
    type IntoIter = std::vec::IntoIter<Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
