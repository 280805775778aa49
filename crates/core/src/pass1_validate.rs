//! Pass 1: precondition checks.
//!
//! Confirms the arena is a tree, that every reference anywhere in the
//! document (live or not) resolves, and that no name is visible from two
//! definitions at any site or local definition.

use crate::document::{Document, Name, NodeIndex};
use crate::error::{CleanError, Site};
use crate::finder::find_references;
use crate::scope::{ancestor_frames, resolve_all, FieldLocation, Frame, Scope};
use crate::topology::Topology;
use tracing::debug;

/// Validate `doc`, returning its topology for the passes that follow.
pub fn validate(doc: &Document, pinned: &[Name]) -> Result<Topology, CleanError> {
    let topo = Topology::build(doc)?;
    check_document(doc, &topo, pinned)?;
    Ok(topo)
}

/// Reference and ambiguity checks over a document whose tree shape has
/// already been established.
pub fn check_document(doc: &Document, topo: &Topology, pinned: &[Name]) -> Result<(), CleanError> {
    let mut checked = 0usize;

    for (name, def) in &doc.global {
        if let Some(expr) = def.expr() {
            for r in expr.refs() {
                let site = Site::GlobalDefinition(name.clone());
                check_reference(doc, &r, &Scope::global(), doc.root, site)?;
                checked += 1;
            }
        }
    }

    for &node in topo.post_order() {
        let frames = ancestor_frames(doc, topo, node);
        let content = Scope::new(&frames, Frame::content(doc, node));
        let model = doc.node(node);

        for (key, expr) in &model.local_dict {
            let locations = resolve_all(doc, key.as_str(), &content);
            if locations.len() > 1 {
                return Err(CleanError::AmbiguousDefinition {
                    name: key.clone(),
                    node,
                    locations,
                });
            }
            for r in expr.refs() {
                let site = Site::LocalDefinition(key.clone());
                check_reference(doc, &r, &content, node, site)?;
                checked += 1;
            }
        }

        for reference in find_references(model) {
            let scope = Scope::new(&frames, reference.frame(doc, node));
            check_reference(doc, &reference.name, &scope, node, reference.site)?;
            checked += 1;
        }
    }

    let root_scope = Scope::new(&[], Frame::content(doc, doc.root));
    for name in pinned {
        check_reference(doc, name, &root_scope, doc.root, Site::Pinned)?;
    }

    debug!(
        nodes = doc.nodes.len(),
        references = checked,
        pinned = pinned.len(),
        "document validated"
    );
    Ok(())
}

/// Resolve `name` and require exactly one visible definition.
pub(crate) fn check_reference(
    doc: &Document,
    name: &Name,
    scope: &Scope<'_>,
    node: NodeIndex,
    site: Site,
) -> Result<FieldLocation, CleanError> {
    let locations = resolve_all(doc, name.as_str(), scope);
    match locations.as_slice() {
        [] => Err(CleanError::UnresolvableReference {
            name: name.clone(),
            node,
            site,
        }),
        [only] => Ok(*only),
        _ => Err(CleanError::AmbiguousDefinition {
            name: name.clone(),
            node,
            locations,
        }),
    }
}
