//! Migration Pipeline
//!
//! Runs the phases in their required order over the configured corpora:
//!
//! 1. target extended data types, resolved as they are observed;
//! 2. reference extended data types, consulted only for missing ancestors;
//! 3. `finish`, after which the resolved records no longer change;
//! 4. synthesis over every target table, then write-back of tables and
//!    extended data types (skipped in dry-run mode);
//! 5. reports.
//!
//! A schema violation in one document is recorded and the run continues. An
//! unreadable document stops the run.
//!
//! Only extended data types carrying their own legacy relation are rewritten to
//! the table-reference form. Inherited relations are left implicit: in the new
//! model they follow from the ancestor's `ReferenceTable`.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::MigrationConfig;
use crate::corpus::{self, Corpus};
use crate::diagnostics::{Diagnostics, Observation, ObservationKind};
use crate::error::{MigrationError, Result};
use crate::model::{ForeignKeyPatch, Origin, RecordKey};
use crate::reader;
use crate::report::{self, RunSummary};
use crate::resolve::{InheritanceGraph, Resolution, ResolutionRegistry};
use crate::synthesize::{synthesize_in, TableScope};
use crate::writeback;

/// Everything a run computed
#[derive(Debug)]
pub struct MigrationOutcome {
    pub summary: RunSummary,
    pub diagnostics: Diagnostics,
    pub graph: InheritanceGraph,
    pub patches: Vec<ForeignKeyPatch>,
}

/// A target extended data type document, by path and record name
#[derive(Debug, Clone)]
struct TargetDocument {
    path: PathBuf,
    name: Option<String>,
}

pub struct Migrator {
    config: MigrationConfig,
}

impl Migrator {
    pub fn new(config: MigrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    fn scan(&self) -> Result<(Vec<Corpus>, Vec<Corpus>)> {
        let targets = self
            .config
            .corpus
            .targets
            .iter()
            .map(|root| Corpus::scan(root, Origin::Target, &self.config))
            .collect::<Result<Vec<_>>>()?;
        let references = self
            .config
            .corpus
            .references
            .iter()
            .map(|root| Corpus::scan(root, Origin::Reference, &self.config))
            .collect::<Result<Vec<_>>>()?;
        Ok((targets, references))
    }

    /// Run the resolution phases only
    pub fn resolve(&self) -> Result<Resolution> {
        let (targets, references) = self.scan()?;
        let (resolution, _) = self.resolve_corpora(&targets, &references)?;
        Ok(resolution)
    }

    fn resolve_corpora(
        &self,
        targets: &[Corpus],
        references: &[Corpus],
    ) -> Result<(Resolution, Vec<TargetDocument>)> {
        let mut registry = ResolutionRegistry::new();
        let mut documents = Vec::new();

        for file in targets.iter().flat_map(Corpus::extended_types) {
            let doc = corpus::load(&file.path)?;
            registry.observe_target(&doc);
            documents.push(TargetDocument {
                path: file.path.clone(),
                name: doc.child_text("Name").map(str::to_string),
            });
        }
        tracing::info!(
            "phase 1: {} target extended data types, {} parents pending",
            documents.len(),
            registry.pending_count()
        );

        let mut reference_count = 0;
        for file in references.iter().flat_map(Corpus::extended_types) {
            let doc = corpus::load(&file.path)?;
            registry.observe_reference(&doc);
            reference_count += 1;
        }
        tracing::info!(
            "phase 2: {} reference extended data types, {} parents pending",
            reference_count,
            registry.pending_count()
        );

        Ok((registry.finish(), documents))
    }

    /// Run the full migration
    pub fn run(&self) -> Result<MigrationOutcome> {
        let dry_run = self.config.output.dry_run;
        let mut summary = RunSummary::new(dry_run);

        let (targets, references) = self.scan()?;
        let (resolution, documents) = self.resolve_corpora(&targets, &references)?;
        let Resolution {
            records,
            mut diagnostics,
            graph,
        } = resolution;
        summary.extended_types_read = documents.len();

        // Phase 3: synthesis. A base table and its extensions share one scope,
        // so every document of the table is read before any is synthesized.
        let mut tables = Vec::new();
        for file in targets.iter().flat_map(Corpus::tables) {
            let doc = corpus::load(&file.path)?;
            summary.tables_read += 1;
            match reader::read_table(&doc) {
                Ok(table) => tables.push((file.path.clone(), table)),
                Err(e) => record_local(&mut diagnostics, &file.path, e)?,
            }
        }

        let mut scopes: HashMap<RecordKey, TableScope> = HashMap::new();
        for (_, table) in &tables {
            scopes
                .entry(RecordKey::new(&table.table))
                .or_default()
                .add(table);
        }

        let mut patches = Vec::new();
        for (path, table) in &tables {
            let Some(scope) = scopes.get_mut(&RecordKey::new(&table.table)) else {
                continue;
            };
            let table_patches = synthesize_in(scope, table, &records, &mut diagnostics);
            if table_patches.is_empty() {
                continue;
            }

            let mut doc = corpus::load(path)?;
            writeback::apply_patches(&mut doc, &table_patches);
            if !dry_run {
                corpus::save(path, &doc)?;
            }
            summary.tables_rewritten += 1;
            patches.extend(table_patches);
        }
        summary.foreign_keys_created = patches.len();
        tracing::info!(
            "phase 3: {} tables, {} foreign keys in {} tables",
            summary.tables_read,
            patches.len(),
            summary.tables_rewritten
        );

        // Extended data types carrying their own relation move to the
        // table-reference form; only the document that was admitted is touched.
        let mut migratable = records.migratable();
        for document in &documents {
            let Some(name) = &document.name else {
                continue;
            };
            if !migratable.remove(&RecordKey::new(name)) {
                continue;
            }
            let Some(relation) = records.relation_for(name) else {
                continue;
            };

            let mut doc = corpus::load(&document.path)?;
            match writeback::migrate_extended_type(&mut doc, relation) {
                Ok(()) => {
                    if !dry_run {
                        corpus::save(&document.path, &doc)?;
                    }
                    summary.extended_types_rewritten += 1;
                }
                Err(e) => record_local(&mut diagnostics, &document.path, e)?,
            }
        }
        tracing::info!(
            "write-back: {} extended data types{}",
            summary.extended_types_rewritten,
            if dry_run { " (dry run)" } else { "" }
        );

        summary.count_observations(&diagnostics);
        report::write_reports(&self.config.output.report_dir, &diagnostics, &summary)?;

        Ok(MigrationOutcome {
            summary,
            diagnostics,
            graph,
            patches,
        })
    }
}

/// Record a schema violation and carry on; anything else stops the run
fn record_local(diagnostics: &mut Diagnostics, path: &std::path::Path, error: MigrationError) -> Result<()> {
    if !error.is_schema_violation() {
        return Err(error.in_document(path));
    }
    tracing::warn!("{}: {}", path.display(), error);
    diagnostics.push(
        Observation::new(ObservationKind::SchemaViolation, path.display().to_string(), error.to_string()),
    );
    Ok(())
}
