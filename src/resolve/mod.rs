//! Resolution Registry
//!
//! Holds every extended data type observed during a run and settles, for each
//! one, the single relation it contributes. Records arrive in any order:
//!
//! 1. target corpora are observed first; each record is read, resolved against
//!    what is already known, and registered as waiting when an ancestor has not
//!    been seen yet;
//! 2. reference corpora follow; their documents are kept raw and only parsed
//!    when some record needs them as an ancestor;
//! 3. `finish` closes the phase: unresolved parents and cycles are reported,
//!    relations inherited through a cycle are dropped, and multi-relation
//!    records are evicted.
//!
//! All state lives on the registry value itself, so partial corpora can be
//! resolved in isolation.

pub mod graph;
pub mod inheritance;

pub use graph::InheritanceGraph;
pub use inheritance::Inheritance;

use std::collections::{HashMap, HashSet};

use crate::diagnostics::{Diagnostics, Observation, ObservationKind};
use crate::document::Element;
use crate::error::MigrationError;
use crate::model::{ExtendedTypeRecord, Origin, RecordKey, Relation, RelationSource};
use crate::reader::{self, ExtendedTypeHeader};

/// A reference document seen but not parsed yet
#[derive(Debug, Clone)]
pub(crate) struct RawRecord {
    pub header: ExtendedTypeHeader,
    pub document: Element,
}

/// Children waiting for a parent that has not been observed
#[derive(Debug, Clone)]
pub struct PendingParentEntry {
    /// Parent name as first referenced
    pub name: String,
    /// Waiting children, in registration order
    pub children: Vec<RecordKey>,
}

/// Process-scoped resolution state for one run
#[derive(Debug, Default)]
pub struct ResolutionRegistry {
    pub(crate) raw: HashMap<RecordKey, RawRecord>,
    pub(crate) resolved: HashMap<RecordKey, ExtendedTypeRecord>,
    pub(crate) pending: HashMap<RecordKey, PendingParentEntry>,
    /// Records whose document failed reading
    pub(crate) invalid: HashMap<RecordKey, String>,
    /// Array types, left out of resolution
    pub(crate) skipped: HashMap<RecordKey, ExtendedTypeHeader>,
    pub(crate) diagnostics: Diagnostics,
}

impl ResolutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Observe a document from a target corpus: read, resolve, reconcile
    pub fn observe_target(&mut self, doc: &Element) {
        let Some(header) = self.read_header(doc) else {
            return;
        };
        let key = RecordKey::new(&header.name);
        if self.is_known(&key) {
            tracing::debug!("{}: already observed, ignoring duplicate", header.name);
            return;
        }

        if header.is_array {
            self.diagnostics.record(
                ObservationKind::ArrayTypeSkipped,
                header.name.as_str(),
                "array elements present, record skipped",
            );
            self.skipped.insert(key.clone(), header);
            self.reconcile(&key);
            return;
        }

        self.admit(key, &header.name, doc, Origin::Target);
    }

    /// Observe a document from a reference-only corpus
    ///
    /// Kept raw unless a record is already waiting for it.
    pub fn observe_reference(&mut self, doc: &Element) {
        let Some(header) = self.read_header(doc) else {
            return;
        };
        let key = RecordKey::new(&header.name);
        if self.is_known(&key) {
            return;
        }

        if header.is_array {
            self.skipped.insert(key.clone(), header);
            self.reconcile(&key);
            return;
        }

        if self.pending.contains_key(&key) {
            let name = header.name.clone();
            self.admit(key, &name, doc, Origin::Reference);
        } else {
            self.raw.insert(
                key,
                RawRecord {
                    header,
                    document: doc.clone(),
                },
            );
        }
    }

    fn read_header(&mut self, doc: &Element) -> Option<ExtendedTypeHeader> {
        match reader::read_header(doc) {
            Ok(header) => Some(header),
            Err(e) => {
                self.report_violation(doc.name.as_str(), &e);
                None
            }
        }
    }

    fn is_known(&self, key: &RecordKey) -> bool {
        self.resolved.contains_key(key)
            || self.raw.contains_key(key)
            || self.invalid.contains_key(key)
            || self.skipped.contains_key(key)
    }

    /// Read the record, settle its inheritance if it is a target, then release
    /// every child waiting for it
    fn admit(&mut self, key: RecordKey, name: &str, doc: &Element, origin: Origin) {
        match reader::read_extended_type(doc, origin) {
            Ok(record) => {
                let needs_parent = record.relations.is_empty() && record.parent.is_some();
                self.resolved.insert(key.clone(), record);
                if needs_parent && origin == Origin::Target {
                    self.settle(&key);
                }
            }
            Err(e) => {
                self.report_violation(name, &e);
                self.invalid.insert(key.clone(), name.to_string());
            }
        }
        self.reconcile(&key);
    }

    /// Parse a raw reference record now that an inheritance walk needs it
    pub(crate) fn parse_raw(&mut self, key: &RecordKey) {
        let Some(raw) = self.raw.remove(key) else {
            return;
        };
        match reader::read_extended_type(&raw.document, Origin::Reference) {
            Ok(record) => {
                self.resolved.insert(key.clone(), record);
            }
            Err(e) => {
                self.report_violation(&raw.header.name, &e);
                self.invalid.insert(key.clone(), raw.header.name);
            }
        }
    }

    fn report_violation(&mut self, subject: &str, error: &MigrationError) {
        tracing::warn!("{}", error);
        let kind = match error {
            MigrationError::MissingTableReference { .. } => ObservationKind::MissingTableReference,
            _ => ObservationKind::SchemaViolation,
        };
        self.diagnostics
            .push(Observation::new(kind, subject, error.to_string()));
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// A record that has been read, by case-insensitive name
    pub fn record(&self, name: &str) -> Option<&ExtendedTypeRecord> {
        self.resolved.get(&RecordKey::new(name))
    }

    /// Children currently waiting for `parent`
    pub fn pending_children(&self, parent: &str) -> Vec<RecordKey> {
        self.pending
            .get(&RecordKey::new(parent))
            .map(|entry| entry.children.clone())
            .unwrap_or_default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    // =========================================================================
    // Finish
    // =========================================================================

    /// Close the resolution phase
    ///
    /// Reports every child still waiting as an unresolved parent (once per
    /// child), reports inheritance cycles, and evicts records that still carry
    /// more than one relation.
    pub fn finish(mut self) -> Resolution {
        let mut pending: Vec<(RecordKey, PendingParentEntry)> = self.pending.drain().collect();
        pending.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, entry) in pending {
            for child in entry.children {
                let subject = self
                    .resolved
                    .get(&child)
                    .map(|r| r.name.clone())
                    .unwrap_or_else(|| child.to_string());
                self.diagnostics.record(
                    ObservationKind::UnresolvedParent,
                    subject,
                    format!("parent {} was never observed", entry.name),
                );
            }
        }

        let graph = self.inheritance_graph();
        let cycles = graph.cycles();
        for cycle in &cycles {
            for member in cycle {
                if let Some(record) = self.resolved.get_mut(&RecordKey::new(member)) {
                    if matches!(record.source, RelationSource::Inherited(_)) {
                        record.relations.clear();
                        record.source = RelationSource::None;
                    }
                }
            }
            let subject = cycle.first().cloned().unwrap_or_default();
            self.diagnostics.record(
                ObservationKind::InheritanceCycle,
                subject,
                format!("inheritance cycle: {}", cycle.join(" -> ")),
            );
        }
        self.clear_inherited_through(&graph, &cycles);

        let mut multi: Vec<RecordKey> = self
            .resolved
            .iter()
            .filter(|(_, record)| record.relations.len() > 1)
            .map(|(key, _)| key.clone())
            .collect();
        multi.sort();
        for key in multi {
            if let Some(record) = self.resolved.remove(&key) {
                let relations: Vec<String> = record.relations.iter().map(|r| r.to_string()).collect();
                self.diagnostics.record(
                    ObservationKind::MultiRelationRecord,
                    record.name.as_str(),
                    format!("{} relations: {}", relations.len(), relations.join(", ")),
                );
            }
        }

        tracing::info!(
            "resolution finished: {} records, {} with a relation",
            self.resolved.len(),
            self.resolved.values().filter(|r| r.relation().is_some()).count()
        );

        Resolution {
            records: ResolvedRecords {
                records: self.resolved,
            },
            diagnostics: self.diagnostics,
            graph,
        }
    }

    /// Drop relations that descendants outside a cycle inherited through it
    fn clear_inherited_through(&mut self, graph: &InheritanceGraph, cycles: &[Vec<String>]) {
        let members: HashSet<RecordKey> = cycles
            .iter()
            .flatten()
            .map(|name| RecordKey::new(name))
            .collect();
        if members.is_empty() {
            return;
        }

        let mut through: Vec<(RecordKey, String)> = self
            .resolved
            .iter()
            .filter(|(key, _)| !members.contains(*key))
            .filter_map(|(key, record)| {
                let RelationSource::Inherited(ancestor) = &record.source else {
                    return None;
                };
                let source = RecordKey::new(ancestor);
                // Only the chain below the contributing ancestor matters
                for name in graph.ancestors(&record.name) {
                    let step = RecordKey::new(&name);
                    if step == source {
                        break;
                    }
                    if members.contains(&step) {
                        return Some((key.clone(), name));
                    }
                }
                None
            })
            .collect();
        through.sort();

        for (key, member) in through {
            let Some(record) = self.resolved.get_mut(&key) else {
                continue;
            };
            record.relations.clear();
            record.source = RelationSource::None;
            let subject = record.name.clone();
            self.diagnostics.record(
                ObservationKind::InheritanceCycle,
                subject,
                format!("inherited relation dropped, ancestor {} is part of a cycle", member),
            );
        }
    }

    /// Inheritance graph over every record observed so far
    pub fn inheritance_graph(&self) -> InheritanceGraph {
        let mut graph = InheritanceGraph::new();

        let mut records: Vec<(&str, Option<&str>, bool)> = self
            .resolved
            .values()
            .map(|r| (r.name.as_str(), r.parent.as_deref(), r.relation().is_some()))
            .collect();
        records.extend(
            self.raw
                .values()
                .map(|r| (r.header.name.as_str(), r.header.parent.as_deref(), false)),
        );
        records.extend(
            self.skipped
                .values()
                .map(|h| (h.name.as_str(), h.parent.as_deref(), false)),
        );
        records.sort();

        for (name, parent, has_relation) in records {
            graph.add_record(name, parent, has_relation);
        }
        graph
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Stable outcome of the resolution phase, input to synthesis
#[derive(Debug)]
pub struct Resolution {
    pub records: ResolvedRecords,
    pub diagnostics: Diagnostics,
    pub graph: InheritanceGraph,
}

/// Resolved records by case-insensitive name
#[derive(Debug, Clone, Default)]
pub struct ResolvedRecords {
    records: HashMap<RecordKey, ExtendedTypeRecord>,
}

impl ResolvedRecords {
    pub fn get(&self, name: &str) -> Option<&ExtendedTypeRecord> {
        self.records.get(&RecordKey::new(name))
    }

    /// The single relation an extended data type contributes, if any
    pub fn relation_for(&self, name: &str) -> Option<&Relation> {
        self.get(name).and_then(ExtendedTypeRecord::relation)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtendedTypeRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Names of records whose relation is their own legacy relation
    pub fn migratable(&self) -> HashSet<RecordKey> {
        self.records
            .iter()
            .filter(|(_, r)| r.source == RelationSource::Own && r.relation().is_some())
            .map(|(k, _)| k.clone())
            .collect()
    }
}

impl FromIterator<ExtendedTypeRecord> for ResolvedRecords {
    fn from_iter<I: IntoIterator<Item = ExtendedTypeRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().map(|r| (r.key(), r)).collect(),
        }
    }
}
