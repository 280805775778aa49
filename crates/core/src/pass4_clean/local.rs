use crate::document::{Document, NodeIndex};
use crate::pass2_liveness::Liveness;
use crate::report::{CleanAction, CleanReport};
use crate::scope::Placement;
use tracing::trace;

// ── Local dictionaries ────────────────────────────────────────────────────────

pub(super) fn clean_local(
    doc: &mut Document,
    node: NodeIndex,
    liveness: &Liveness,
    report: &mut CleanReport,
) {
    let live = &liveness.node(node).live_local;
    doc.node_mut(node).local_dict.retain(|name, _| {
        if live.contains(name) {
            return true;
        }
        trace!(node = %node, field = %name, "local field removed");
        report.record(CleanAction::DerivedFieldRemoved {
            scope: Placement::Node(node),
            name: name.clone(),
        });
        false
    });
}
