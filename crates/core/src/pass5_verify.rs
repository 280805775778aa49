//! Pass 5: postconditions.
//!
//! The required-structure check always runs. The remaining checks re-derive
//! the cleanup facts from scratch and are enabled through
//! [`CleanOptions::verify_postconditions`](crate::CleanOptions).

use crate::document::{Document, Expr, FieldDef, Name, NodeChildren, NodeIndex};
use crate::error::CleanError;
use crate::options::CleanOptions;
use crate::pass1_validate;
use crate::pass2_liveness::{compute_liveness, Liveness};
use crate::scope::{ancestor_frames, resolve, FieldKey, FieldLocation, Frame, Placement, Scope};
use crate::topology::Topology;
use indexmap::IndexSet;
use tracing::debug;

type Uses = Vec<(Name, FieldLocation)>;

pub fn verify(doc: &Document, options: &CleanOptions) -> Result<(), CleanError> {
    check_required_structure(doc)?;
    if options.verify_postconditions {
        check_references(doc, &options.pinned)?;
        check_no_dead_fields(doc, &options.pinned)?;
        check_minimal_scope(doc, &options.pinned)?;
        debug!("postconditions hold");
    }
    Ok(())
}

/// Every composite node keeps at least one child.
pub fn check_required_structure(doc: &Document) -> Result<(), CleanError> {
    for node in doc.indices() {
        let structure = match &doc.node(node).children {
            NodeChildren::None => continue,
            NodeChildren::Segments { segments, .. } if segments.is_empty() => "segment list",
            NodeChildren::Chain(nodes) if nodes.is_empty() => "chain",
            _ => continue,
        };
        return Err(CleanError::EmptyRequiredStructure { node, structure });
    }
    Ok(())
}

/// Every reference resolves to exactly one visible definition.
pub fn check_references(doc: &Document, pinned: &[Name]) -> Result<(), CleanError> {
    pass1_validate::validate(doc, pinned)
        .map(|_| ())
        .map_err(|e| violated("no-dangling-reference", e))
}

/// Every dictionary entry is live and every non-sink schema entry is active.
pub fn check_no_dead_fields(doc: &Document, pinned: &[Name]) -> Result<(), CleanError> {
    let topo = Topology::build(doc).map_err(|e| violated("no-dead-field", e))?;
    let liveness = compute_liveness(doc, &topo, pinned).map_err(|e| violated("no-dead-field", e))?;

    if let Some(dead) = liveness.dead_fields(doc, &topo).first() {
        return Err(CleanError::PostconditionViolated {
            check: "no-dead-field",
            detail: format!("field {} is not live", dead),
        });
    }

    for &node in topo.post_order() {
        let active = &liveness.node(node).active;
        for (name, role) in &doc.node(node).schema {
            if !role.is_sink() && !active.contains_key(name) {
                return Err(CleanError::PostconditionViolated {
                    check: "no-dead-field",
                    detail: format!("schema entry '{}' of {} is not active", name, node),
                });
            }
        }
    }
    Ok(())
}

/// Every live derived field sits in the lowest dictionary that covers all of
/// its users. A definition may sit higher only where every lower scope would
/// resolve one of its names to a different field.
pub fn check_minimal_scope(doc: &Document, pinned: &[Name]) -> Result<(), CleanError> {
    let topo = Topology::build(doc).map_err(|e| violated("minimal-scope", e))?;
    let liveness = compute_liveness(doc, &topo, pinned).map_err(|e| violated("minimal-scope", e))?;
    let definitions = live_definitions(doc, &topo, &liveness);

    let mut sites = liveness.referencers.clone();
    let mut global_users: IndexSet<FieldKey> = IndexSet::new();
    for (key, uses) in &definitions {
        for (name, location) in uses {
            let used = FieldKey::new(*location, name.clone());
            match Placement::of(key.location) {
                Some(Placement::Node(node)) => {
                    sites.entry(used).or_default().insert(node);
                }
                Some(Placement::Global) => {
                    global_users.insert(used);
                }
                None => {}
            }
        }
    }

    for (key, uses) in &definitions {
        let Some(holder) = Placement::of(key.location) else {
            continue;
        };
        if global_users.contains(key) {
            continue;
        }
        let users = sites.get(key).cloned().unwrap_or_default();
        let Some(lca) = topo.lca_all(users.iter().copied()) else {
            continue;
        };
        let root = topo.root();
        let expected = match holder {
            Placement::Global => lowest_seeing(doc, &topo, uses, lca, root)
                .map_or(Placement::Global, Placement::Node),
            Placement::Node(home) if !topo.is_ancestor_or_self(home, lca) => continue,
            Placement::Node(home)
                if home == root
                    && lca == root
                    && users.len() > 1
                    && uses.iter().all(|(_, l)| *l == FieldLocation::Global) =>
            {
                Placement::Global
            }
            Placement::Node(home) => {
                Placement::Node(lowest_seeing(doc, &topo, uses, lca, home).unwrap_or(home))
            }
        };
        if expected != holder {
            return Err(CleanError::PostconditionViolated {
                check: "minimal-scope",
                detail: format!(
                    "'{}' is defined in {} but its users meet at {}",
                    key.name, holder, expected
                ),
            });
        }
    }
    Ok(())
}

/// Live derived definitions with each name they use, resolved where they
/// are defined. Locals come in post-order, then the global dictionary.
fn live_definitions(doc: &Document, topo: &Topology, liveness: &Liveness) -> Vec<(FieldKey, Uses)> {
    let mut found = Vec::new();
    for &node in topo.post_order() {
        let frames = ancestor_frames(doc, topo, node);
        let scope = Scope::new(&frames, Frame::content(doc, node));
        for (name, expr) in &doc.node(node).local_dict {
            if liveness.node(node).live_local.contains(name) {
                let key = FieldKey::new(FieldLocation::Local(node), name.clone());
                found.push((key, uses_at(doc, expr, &scope)));
            }
        }
    }
    for (name, def) in &doc.global {
        if let FieldDef::Derived(expr) = def {
            if liveness.live_global.contains(name) {
                let key = FieldKey::new(FieldLocation::Global, name.clone());
                found.push((key, uses_at(doc, expr, &Scope::global())));
            }
        }
    }
    found
}

fn uses_at(doc: &Document, expr: &Expr, scope: &Scope<'_>) -> Uses {
    expr.refs()
        .into_iter()
        .filter_map(|name| {
            let location = resolve(doc, name.as_str(), scope)?;
            Some((name, location))
        })
        .collect()
}

/// The first node from `from` toward `stop` (exclusive) where every use
/// resolves to the same field it does at the definition.
fn lowest_seeing(
    doc: &Document,
    topo: &Topology,
    uses: &[(Name, FieldLocation)],
    from: NodeIndex,
    stop: NodeIndex,
) -> Option<NodeIndex> {
    let mut node = from;
    while node != stop {
        let frames = ancestor_frames(doc, topo, node);
        let scope = Scope::new(&frames, Frame::content(doc, node));
        let same = uses
            .iter()
            .all(|(name, location)| resolve(doc, name.as_str(), &scope) == Some(*location));
        if same {
            return Some(node);
        }
        node = topo.parent(node)?;
    }
    None
}

fn violated(check: &'static str, cause: CleanError) -> CleanError {
    CleanError::PostconditionViolated {
        check,
        detail: cause.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DocumentBuilder;
    use crate::document::{CombineMethod, OutputField, Predicate};

    #[test]
    fn empty_segment_list_is_rejected() {
        let mut b = DocumentBuilder::new();
        let root = b
            .node()
            .segments(CombineMethod::Average, Vec::new())
            .finish();
        let doc = b.build(root);
        assert_eq!(
            check_required_structure(&doc),
            Err(CleanError::EmptyRequiredStructure {
                node: NodeIndex(0),
                structure: "segment list"
            })
        );
    }

    #[test]
    fn dead_local_fails_check() {
        let mut b = DocumentBuilder::new();
        let leaf = b.node().local("x", Expr::number("1")).finish();
        let doc = b.build(leaf);
        let err = check_no_dead_fields(&doc, &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "postcondition 'no-dead-field' violated: field 'x' (local dictionary of node 0) is not live"
        );
        // Pinning makes it live.
        assert!(check_no_dead_fields(&doc, &[Name::new("x")]).is_ok());
    }

    #[test]
    fn misplaced_global_fails_minimal_scope() {
        let mut b = DocumentBuilder::new();
        b.derived("g", Expr::number("1"));
        let left = b.node().body_expr(Expr::field("g")).finish();
        let root = b.node().chain([left]).finish();
        let doc = b.build(root);
        let err = check_minimal_scope(&doc, &[]).unwrap_err();
        assert!(matches!(err, CleanError::PostconditionViolated { check: "minimal-scope", .. }));
    }

    #[test]
    fn root_local_shared_by_children_fails_minimal_scope() {
        let mut b = DocumentBuilder::new();
        b.input("c");
        let left = b.node().body_expr(Expr::field("h")).finish();
        let right = b.node().body_expr(Expr::field("h")).finish();
        let root = b
            .node()
            .local("h", Expr::field("c"))
            .segments(CombineMethod::Sum, [(Predicate::True, left), (Predicate::True, right)])
            .finish();
        let doc = b.build(root);
        assert_eq!(
            check_minimal_scope(&doc, &[]).unwrap_err().to_string(),
            "postcondition 'minimal-scope' violated: 'h' is defined in node 2 but its users meet at global"
        );
    }

    #[test]
    fn definition_held_above_a_segment_that_cannot_see_its_inputs_passes() {
        let mut b = DocumentBuilder::new();
        let first = b
            .node()
            .body_expr(Expr::field("h"))
            .output(OutputField::predicted("p"))
            .finish();
        let chain = b.node().local("h", Expr::field("p")).chain([first]).finish();
        let doc = b.build(chain);
        assert!(check_minimal_scope(&doc, &[]).is_ok());
    }
}
