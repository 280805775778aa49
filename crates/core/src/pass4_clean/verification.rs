use crate::document::{Document, NodeIndex};
use crate::pass2_liveness::Liveness;
use crate::report::{CleanAction, CleanReport};
use tracing::trace;

// ── Verification tables ───────────────────────────────────────────────────────

/// Keep columns for active fields and the node's own outputs; drop the
/// table once no column is left.
pub(super) fn clean_verification(
    doc: &mut Document,
    node: NodeIndex,
    liveness: &Liveness,
    report: &mut CleanReport,
) {
    let active = &liveness.node(node).active;
    let model = doc.node_mut(node);
    let Some(table) = model.verification.as_mut() else {
        return;
    };

    let outputs = &model.outputs;
    table.columns.retain(|column| {
        let keep = active.contains_key(&column.field)
            || outputs.iter().any(|o| o.name == column.field);
        if !keep {
            trace!(node = %node, field = %column.field, "verification column removed");
            report.record(CleanAction::VerificationColumnRemoved {
                node,
                name: column.field.clone(),
            });
        }
        keep
    });

    if table.columns.is_empty() {
        model.verification = None;
        report.record(CleanAction::VerificationTableDropped { node });
    }
}
