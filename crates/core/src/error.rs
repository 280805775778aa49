use crate::document::{Name, NodeIndex};
use crate::scope::FieldLocation;
use serde::Serialize;
use std::fmt;

/// Where inside a node a field reference was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    Body,
    Output(usize),
    /// Gating predicate of the segment at this position.
    SegmentPredicate(usize),
    /// Expression of a derived field in the node's local dictionary.
    LocalDefinition(Name),
    /// Expression of a global derived field.
    GlobalDefinition(Name),
    Schema,
    Pinned,
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Site::Body => write!(f, "model body"),
            Site::Output(i) => write!(f, "output field #{}", i),
            Site::SegmentPredicate(k) => write!(f, "predicate of segment #{}", k),
            Site::LocalDefinition(name) => write!(f, "local definition of '{}'", name),
            Site::GlobalDefinition(name) => write!(f, "global definition of '{}'", name),
            Site::Schema => write!(f, "usage schema"),
            Site::Pinned => write!(f, "pinned fields"),
        }
    }
}

/// A fatal cleanup failure. The battery never hands out a partially cleaned
/// document when one of these is raised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CleanError {
    #[error("unresolvable reference to field '{name}' in {site} of {node}")]
    UnresolvableReference { name: Name, node: NodeIndex, site: Site },

    #[error("field '{name}' is ambiguous at {node}: visible from {}", join_locations(.locations))]
    AmbiguousDefinition {
        name: Name,
        node: NodeIndex,
        locations: Vec<FieldLocation>,
    },

    #[error("{structure} of {node} is empty")]
    EmptyRequiredStructure {
        node: NodeIndex,
        structure: &'static str,
    },

    #[error("derived field '{name}' depends on itself")]
    CyclicDefinition { name: Name },

    #[error("malformed tree at {node}: {reason}")]
    MalformedTree { node: NodeIndex, reason: String },

    #[error("postcondition '{check}' violated: {detail}")]
    PostconditionViolated { check: &'static str, detail: String },
}

fn join_locations(locations: &[FieldLocation]) -> String {
    locations
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
