//! Relation Migrator
//!
//! Moves legacy extended data type relations onto the tables that use them.
//!
//! ## Features
//!
//! - **Inheritance Resolution**: Extended data types without a relation of
//!   their own inherit the nearest ancestor's, in any observation order
//! - **Reference Corpora**: Ancestors outside the migrated models are read on
//!   demand and never rewritten
//! - **Foreign Key Synthesis**: Each typed table field gets an explicit
//!   relation, unless an equivalent one already exists
//! - **Anomaly Reports**: One report per observation kind, plus a run summary
//!
//! ## Architecture
//!
//! ```text
//! corpus ──► reader ──► resolve ──► synthesize ──► writeback
//!                          │             │
//!                          └─► diagnostics ◄┘──► report
//! ```

pub mod config;
pub mod corpus;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod migration;
pub mod model;
pub mod reader;
pub mod report;
pub mod resolve;
pub mod synthesize;
pub mod writeback;

pub use config::MigrationConfig;
pub use diagnostics::{Diagnostics, Observation, ObservationKind, Severity};
pub use document::Element;
pub use error::{MigrationError, Result};
pub use migration::{MigrationOutcome, Migrator};
pub use model::{ExtendedTypeRecord, ForeignKeyPatch, Origin, Relation, RelationSource, TableRecord};
pub use report::RunSummary;
pub use resolve::{InheritanceGraph, Resolution, ResolutionRegistry, ResolvedRecords};
pub use synthesize::{synthesize, synthesize_in, TableScope};
