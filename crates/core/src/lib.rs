#![allow(clippy::result_large_err)]
//! fieldprune-core: post-construction cleanup for scoped model documents.
//!
//! A [`Document`] is an arena of model nodes with a global field dictionary.
//! [`clean()`] runs the fixed five-pass battery over it: validation,
//! liveness, relocation of derived fields to their minimal scope, deletion
//! of dead dictionary/schema/verification entries, and verification.
//!
//! # Public API
//!
//! - [`clean()`] -- run the battery; all-or-nothing
//! - [`plan()`] -- dry run returning liveness and planned moves
//! - [`DocumentBuilder`] -- construction API with name interning
//! - [`CleanOptions`], [`CleanReport`], [`CleanError`]
//!
//! Individual pass entry points are re-exported for callers that want to run
//! part of the pipeline (e.g. liveness only).

pub mod battery;
pub mod builder;
pub mod document;
pub mod error;
pub mod expand;
pub mod finder;
pub mod intern;
pub mod options;
pub mod pass1_validate;
pub mod pass2_liveness;
pub mod pass3_relocate;
pub mod pass4_clean;
pub mod pass5_verify;
pub mod report;
pub mod scope;
pub mod topology;

// ── Convenience re-exports: key types ────────────────────────────────

pub use builder::{DocumentBuilder, NodeBuilder};
pub use document::{
    BodyTerm, BoolOp, CombineMethod, CompareOp, Document, Expr, FieldDef, Literal, Name, Node,
    NodeChildren, NodeIndex, OutputField, OutputKind, Predicate, Role, Segment, SetOp,
    Verification, VerificationColumn,
};
pub use error::{CleanError, Site};
pub use intern::NameInterner;
pub use options::CleanOptions;
pub use report::{CleanAction, CleanPlan, CleanReport, CleanSummary, NodeSummary};
pub use scope::{FieldKey, FieldLocation, Placement};

// ── Convenience re-exports: pipeline entry points ────────────────────

pub use battery::{clean, passes, plan, Stage};
pub use expand::{expand, DefinitionPool};
pub use finder::{find_direct_references, find_references};
pub use pass1_validate::validate;
pub use pass2_liveness::{compute_liveness, Liveness, NodeLiveness};
pub use pass3_relocate::{apply_relocations, plan_relocations, Relocation};
pub use pass5_verify::{
    check_minimal_scope, check_no_dead_fields, check_references, check_required_structure,
};
pub use scope::{resolve, resolve_all};
pub use topology::Topology;
