//! Pass 4: deletion sweep.
//!
//! Liveness is recomputed on the relocated document first, since a moved
//! definition changes which names are active at its new home. Each sweep
//! then keeps survivors in their original relative order.

mod global;
mod local;
mod schema;
mod verification;

use crate::document::{Document, Name};
use crate::error::CleanError;
use crate::pass2_liveness::{compute_liveness, Liveness};
use crate::report::CleanReport;
use crate::topology::Topology;
use tracing::debug;

pub use schema::order_schema;

/// Run the global, local, schema and verification sweeps. Returns the
/// liveness the sweeps were based on.
pub fn clean(
    doc: &mut Document,
    topo: &Topology,
    pinned: &[Name],
    report: &mut CleanReport,
) -> Result<Liveness, CleanError> {
    let liveness = compute_liveness(doc, topo, pinned)?;
    let before = report.actions.len();

    global::clean_global(doc, &liveness, report);
    for &node in topo.post_order() {
        local::clean_local(doc, node, &liveness, report);
        schema::clean_schema(doc, node, &liveness, report);
        verification::clean_verification(doc, node, &liveness, report);
    }

    debug!(
        actions = report.actions.len() - before,
        "dictionaries, schemas and verification cleaned"
    );
    Ok(liveness)
}
