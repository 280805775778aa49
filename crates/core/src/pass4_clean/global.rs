use crate::document::{Document, FieldDef};
use crate::pass2_liveness::Liveness;
use crate::report::{CleanAction, CleanReport};
use crate::scope::Placement;
use tracing::trace;

// ── Global dictionary ─────────────────────────────────────────────────────────

pub(super) fn clean_global(doc: &mut Document, liveness: &Liveness, report: &mut CleanReport) {
    doc.global.retain(|name, def| {
        if liveness.live_global.contains(name) {
            return true;
        }
        trace!(field = %name, "global field removed");
        report.record(match def {
            FieldDef::Input => CleanAction::InputFieldRemoved { name: name.clone() },
            FieldDef::Derived(_) => CleanAction::DerivedFieldRemoved {
                scope: Placement::Global,
                name: name.clone(),
            },
        });
        false
    });
}
