//! CleanReport: what a battery run did, in the order it did it.

use crate::battery::Stage;
use crate::document::{Name, NodeIndex, Role};
use crate::pass3_relocate::Relocation;
use crate::scope::{FieldKey, Placement};
use serde::Serialize;
use std::fmt;

/// One change made to the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CleanAction {
    DerivedFieldRemoved {
        scope: Placement,
        name: Name,
    },
    InputFieldRemoved {
        name: Name,
    },
    Relocated {
        name: Name,
        from: Placement,
        to: Placement,
    },
    SchemaEntryRemoved {
        node: NodeIndex,
        name: Name,
        role: Role,
    },
    SchemaEntryAdded {
        node: NodeIndex,
        name: Name,
        role: Role,
    },
    VerificationColumnRemoved {
        node: NodeIndex,
        name: Name,
    },
    VerificationTableDropped {
        node: NodeIndex,
    },
}

impl fmt::Display for CleanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanAction::DerivedFieldRemoved { scope, name } => {
                write!(f, "removed derived field '{}' ({})", name, scope)
            }
            CleanAction::InputFieldRemoved { name } => write!(f, "removed input field '{}'", name),
            CleanAction::Relocated { name, from, to } => {
                write!(f, "moved '{}' from {} to {}", name, from, to)
            }
            CleanAction::SchemaEntryRemoved { node, name, role } => {
                write!(f, "{}: removed schema entry '{}' ({:?})", node, name, role)
            }
            CleanAction::SchemaEntryAdded { node, name, role } => {
                write!(f, "{}: added schema entry '{}' ({:?})", node, name, role)
            }
            CleanAction::VerificationColumnRemoved { node, name } => {
                write!(f, "{}: removed verification column '{}'", node, name)
            }
            CleanAction::VerificationTableDropped { node } => {
                write!(f, "{}: dropped empty verification table", node)
            }
        }
    }
}

/// Per-kind action counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanSummary {
    pub derived_fields_removed: usize,
    pub input_fields_removed: usize,
    pub relocated: usize,
    pub schema_entries_removed: usize,
    pub schema_entries_added: usize,
    pub verification_columns_removed: usize,
    pub verification_tables_dropped: usize,
}

impl CleanSummary {
    pub fn total(&self) -> usize {
        self.derived_fields_removed
            + self.input_fields_removed
            + self.relocated
            + self.schema_entries_removed
            + self.schema_entries_added
            + self.verification_columns_removed
            + self.verification_tables_dropped
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    /// Stages reached, starting with `Built`.
    pub stages: Vec<Stage>,
    pub actions: Vec<CleanAction>,
    pub summary: CleanSummary,
}

impl CleanReport {
    pub fn new() -> Self {
        CleanReport {
            stages: vec![Stage::Built],
            actions: Vec::new(),
            summary: CleanSummary::default(),
        }
    }

    pub fn record(&mut self, action: CleanAction) {
        let counter = match &action {
            CleanAction::DerivedFieldRemoved { .. } => &mut self.summary.derived_fields_removed,
            CleanAction::InputFieldRemoved { .. } => &mut self.summary.input_fields_removed,
            CleanAction::Relocated { .. } => &mut self.summary.relocated,
            CleanAction::SchemaEntryRemoved { .. } => &mut self.summary.schema_entries_removed,
            CleanAction::SchemaEntryAdded { .. } => &mut self.summary.schema_entries_added,
            CleanAction::VerificationColumnRemoved { .. } => {
                &mut self.summary.verification_columns_removed
            }
            CleanAction::VerificationTableDropped { .. } => {
                &mut self.summary.verification_tables_dropped
            }
        };
        *counter += 1;
        self.actions.push(action);
    }

    /// True when the run changed nothing.
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for CleanReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Liveness of one node, as shown by [`CleanPlan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub node: NodeIndex,
    pub active: Vec<Name>,
    pub live_local: Vec<Name>,
}

/// Dry-run result: what a cleanup would remove and move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanPlan {
    pub nodes: Vec<NodeSummary>,
    pub live_global: Vec<Name>,
    pub dead_fields: Vec<FieldKey>,
    pub relocations: Vec<Relocation>,
}

impl CleanPlan {
    pub fn is_clean(&self) -> bool {
        self.dead_fields.is_empty() && self.relocations.is_empty()
    }
}
