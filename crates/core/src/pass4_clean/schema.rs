use crate::document::{Document, Name, NodeIndex, Role};
use crate::pass2_liveness::Liveness;
use crate::report::{CleanAction, CleanReport};
use indexmap::IndexMap;
use tracing::trace;

// ── Usage schemas ─────────────────────────────────────────────────────────────

/// Keep entries that are sinks or still active, add an `Active` entry for
/// every active name that lacks one, then group sink roles first.
pub(super) fn clean_schema(
    doc: &mut Document,
    node: NodeIndex,
    liveness: &Liveness,
    report: &mut CleanReport,
) {
    let active = &liveness.node(node).active;
    let schema = &mut doc.node_mut(node).schema;

    schema.retain(|name, role| {
        if role.is_sink() || active.contains_key(name) {
            return true;
        }
        trace!(node = %node, field = %name, "schema entry removed");
        report.record(CleanAction::SchemaEntryRemoved {
            node,
            name: name.clone(),
            role: *role,
        });
        false
    });

    for name in active.keys() {
        if !schema.contains_key(name) {
            schema.insert(name.clone(), Role::Active);
            report.record(CleanAction::SchemaEntryAdded {
                node,
                name: name.clone(),
                role: Role::Active,
            });
        }
    }

    order_schema(schema);
}

/// Stable reorder: target and predicted entries first.
pub fn order_schema(schema: &mut IndexMap<Name, Role>) {
    schema.sort_by(|_, a, _, b| b.is_sink().cmp(&a.is_sink()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sinks_first_otherwise_stable() {
        let mut schema: IndexMap<Name, Role> = [
            ("a", Role::Active),
            ("t", Role::Target),
            ("b", Role::Supplementary),
            ("p", Role::Predicted),
            ("c", Role::Active),
        ]
        .into_iter()
        .map(|(n, r)| (Name::new(n), r))
        .collect();
        order_schema(&mut schema);
        let order: Vec<&str> = schema.keys().map(|n| n.as_str()).collect();
        assert_eq!(order, vec!["t", "p", "a", "b", "c"]);
    }
}
