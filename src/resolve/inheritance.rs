//! Inheritance Resolver
//!
//! Walks a record's ancestor chain until it finds the relation the record
//! inherits, proves there is none, or hits an ancestor that has not been
//! observed yet. In the last case the record waits in the pending registry
//! under the deepest missing ancestor, and the walk is re-run when that
//! ancestor arrives.

use std::collections::HashSet;

use super::{PendingParentEntry, ResolutionRegistry};
use crate::diagnostics::ObservationKind;
use crate::model::{RecordKey, Relation, RelationSource};

/// Outcome of walking an ancestor chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inheritance {
    /// Exactly one relation found on `ancestor`
    Relation { relation: Relation, ancestor: String },
    /// The chain ends without a relation
    NoRelation,
    /// `name` has not been observed yet
    Deferred { awaiting: RecordKey, name: String },
    /// `ancestor` carries more than one relation
    MultiRelation { ancestor: String, count: usize },
    /// `ancestor` failed validation
    Invalid { ancestor: String },
    /// The chain loops back on itself
    Cycle,
}

impl ResolutionRegistry {
    /// Determine the relation `requester` inherits through `parent`
    ///
    /// Returns `None` when there is nothing to inherit, when the chain is
    /// ambiguous (classified as an observation), or when an ancestor is still
    /// missing (the requester is then registered as waiting).
    pub fn resolve_for_parent(&mut self, parent: &str, requester: &str) -> Option<Relation> {
        let requester_key = RecordKey::new(requester);
        match self.walk(parent, &mut HashSet::new()) {
            Inheritance::Relation { relation, .. } => Some(relation),
            outcome => {
                self.classify(&requester_key, requester, outcome);
                None
            }
        }
    }

    /// Evaluate the decision procedure for `parent`
    pub(crate) fn walk(&mut self, parent: &str, visited: &mut HashSet<RecordKey>) -> Inheritance {
        let key = RecordKey::new(parent);
        if !visited.insert(key.clone()) {
            return Inheritance::Cycle;
        }
        if let Some(name) = self.invalid.get(&key) {
            return Inheritance::Invalid {
                ancestor: name.clone(),
            };
        }
        if self.skipped.contains_key(&key) {
            return Inheritance::NoRelation;
        }

        if !self.resolved.contains_key(&key) {
            if !self.raw.contains_key(&key) {
                return Inheritance::Deferred {
                    awaiting: key,
                    name: parent.to_string(),
                };
            }
            self.parse_raw(&key);
            if let Some(name) = self.invalid.get(&key) {
                return Inheritance::Invalid {
                    ancestor: name.clone(),
                };
            }
        }

        let Some(record) = self.resolved.get(&key) else {
            return Inheritance::NoRelation;
        };

        match record.relations.as_slice() {
            [relation] => Inheritance::Relation {
                relation: relation.clone(),
                ancestor: match &record.source {
                    RelationSource::Inherited(ancestor) => ancestor.clone(),
                    _ => record.name.clone(),
                },
            },
            [] => match record.parent.clone() {
                Some(grandparent) => self.walk(&grandparent, visited),
                None => Inheritance::NoRelation,
            },
            relations => Inheritance::MultiRelation {
                ancestor: record.name.clone(),
                count: relations.len(),
            },
        }
    }

    /// Resolve the inheritance of an already admitted record in place
    pub(crate) fn settle(&mut self, key: &RecordKey) {
        let Some((name, parent)) = self
            .resolved
            .get(key)
            .and_then(|r| Some((r.name.clone(), r.parent.clone()?)))
        else {
            return;
        };

        match self.walk(&parent, &mut HashSet::new()) {
            Inheritance::Relation { relation, ancestor } => {
                tracing::debug!("{}: inherits {} from {}", name, relation, ancestor);
                if let Some(record) = self.resolved.get_mut(key) {
                    record.inherit(relation, ancestor);
                }
            }
            outcome => self.classify(key, &name, outcome),
        }
    }

    /// Record what a non-relation outcome means for `requester`
    fn classify(&mut self, requester_key: &RecordKey, requester: &str, outcome: Inheritance) {
        match outcome {
            Inheritance::Relation { .. } | Inheritance::NoRelation | Inheritance::Cycle => {}
            Inheritance::Deferred { awaiting, name } => {
                tracing::debug!("{}: waiting for {}", requester, name);
                let entry = self
                    .pending
                    .entry(awaiting)
                    .or_insert_with(|| PendingParentEntry {
                        name,
                        children: Vec::new(),
                    });
                if !entry.children.contains(requester_key) {
                    entry.children.push(requester_key.clone());
                }
            }
            Inheritance::MultiRelation { ancestor, count } => self.diagnostics.record(
                ObservationKind::MultiRelationAncestor,
                requester,
                format!("ancestor {} carries {} relations", ancestor, count),
            ),
            Inheritance::Invalid { ancestor } => self.diagnostics.record(
                ObservationKind::InvalidAncestor,
                requester,
                format!("ancestor {} failed validation", ancestor),
            ),
        }
    }

    /// Release every child waiting for `key`, which has just been observed
    ///
    /// The entry is removed before any child is re-walked; a child whose chain
    /// is still incomplete re-registers under the next missing ancestor.
    pub(crate) fn reconcile(&mut self, key: &RecordKey) {
        let Some(entry) = self.pending.remove(key) else {
            return;
        };
        tracing::debug!("{}: releasing {} waiting record(s)", entry.name, entry.children.len());
        for child in entry.children {
            self.settle(&child);
        }
    }
}
