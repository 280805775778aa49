//! The cleanup battery: a thin orchestrator over the five passes.
//!
//! The pass order lives in one table, [`PASSES`]. Each entry names the stage
//! it expects and the stage it leaves the document in. The battery works on
//! a copy and only writes back when every pass succeeded.

use crate::document::Document;
use crate::error::CleanError;
use crate::options::CleanOptions;
use crate::pass1_validate;
use crate::pass2_liveness::{compute_liveness, Liveness};
use crate::pass3_relocate::{apply_relocations, plan_relocations};
use crate::pass4_clean;
use crate::pass5_verify;
use crate::report::{CleanAction, CleanPlan, CleanReport, NodeSummary};
use crate::topology::Topology;
use serde::Serialize;
use tracing::{debug, debug_span};

/// Document lifecycle during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Built,
    ActiveFieldsComputed,
    Relocated,
    SchemaAndDictionariesCleaned,
    Done,
}

struct Battery<'o> {
    doc: Document,
    topology: Topology,
    options: &'o CleanOptions,
    stage: Stage,
    liveness: Option<Liveness>,
    report: CleanReport,
}

type PassFn = fn(&mut Battery<'_>) -> Result<(), CleanError>;

struct Pass {
    name: &'static str,
    from: Stage,
    to: Stage,
    run: PassFn,
}

static PASSES: [Pass; 5] = [
    Pass {
        name: "validate",
        from: Stage::Built,
        to: Stage::Built,
        run: run_validate,
    },
    Pass {
        name: "liveness",
        from: Stage::Built,
        to: Stage::ActiveFieldsComputed,
        run: run_liveness,
    },
    Pass {
        name: "relocate",
        from: Stage::ActiveFieldsComputed,
        to: Stage::Relocated,
        run: run_relocate,
    },
    Pass {
        name: "clean",
        from: Stage::Relocated,
        to: Stage::SchemaAndDictionariesCleaned,
        run: run_clean,
    },
    Pass {
        name: "verify",
        from: Stage::SchemaAndDictionariesCleaned,
        to: Stage::Done,
        run: run_verify,
    },
];

/// Pass names in execution order with their stage transitions.
pub fn passes() -> impl Iterator<Item = (&'static str, Stage, Stage)> {
    PASSES.iter().map(|p| (p.name, p.from, p.to))
}

/// Run the full battery on `doc`.
///
/// On success `doc` holds the cleaned document and the report lists every
/// change. On failure `doc` is left exactly as it was.
pub fn clean(doc: &mut Document, options: &CleanOptions) -> Result<CleanReport, CleanError> {
    let span = debug_span!("clean", nodes = doc.nodes.len(), globals = doc.global.len());
    let _enter = span.enter();

    let topology = Topology::build(doc)?;
    let mut battery = Battery {
        doc: doc.clone(),
        topology,
        options,
        stage: Stage::Built,
        liveness: None,
        report: CleanReport::new(),
    };

    for pass in &PASSES {
        debug_assert_eq!(battery.stage, pass.from, "pass '{}' out of order", pass.name);
        (pass.run)(&mut battery)?;
        if pass.to != battery.stage {
            battery.stage = pass.to;
            battery.report.stages.push(pass.to);
        }
        debug!(pass = pass.name, stage = ?battery.stage, "pass complete");
    }

    *doc = battery.doc;
    debug!(actions = battery.report.actions.len(), "battery complete");
    Ok(battery.report)
}

/// Dry run: validate, compute liveness and plan relocations without
/// touching `doc`.
pub fn plan(doc: &Document, options: &CleanOptions) -> Result<CleanPlan, CleanError> {
    let topology = pass1_validate::validate(doc, &options.pinned)?;
    let liveness = compute_liveness(doc, &topology, &options.pinned)?;
    let relocations = plan_relocations(doc, &topology, &liveness)?;

    let nodes = topology
        .post_order()
        .iter()
        .map(|&node| {
            let live = liveness.node(node);
            NodeSummary {
                node,
                active: live.active.keys().cloned().collect(),
                live_local: live.live_local.iter().cloned().collect(),
            }
        })
        .collect();

    Ok(CleanPlan {
        nodes,
        live_global: liveness.live_global.iter().cloned().collect(),
        dead_fields: liveness.dead_fields(doc, &topology),
        relocations,
    })
}

// ── Pass adapters ─────────────────────────────────────────────────────────────

fn run_validate(b: &mut Battery<'_>) -> Result<(), CleanError> {
    pass1_validate::check_document(&b.doc, &b.topology, &b.options.pinned)
}

fn run_liveness(b: &mut Battery<'_>) -> Result<(), CleanError> {
    b.liveness = Some(compute_liveness(&b.doc, &b.topology, &b.options.pinned)?);
    Ok(())
}

fn run_relocate(b: &mut Battery<'_>) -> Result<(), CleanError> {
    let liveness = match b.liveness.take() {
        Some(liveness) => liveness,
        None => compute_liveness(&b.doc, &b.topology, &b.options.pinned)?,
    };
    let moves = plan_relocations(&b.doc, &b.topology, &liveness)?;
    apply_relocations(&mut b.doc, &moves);
    for relocation in moves {
        b.report.record(CleanAction::Relocated {
            name: relocation.name,
            from: relocation.from,
            to: relocation.to,
        });
    }
    Ok(())
}

fn run_clean(b: &mut Battery<'_>) -> Result<(), CleanError> {
    let liveness = pass4_clean::clean(&mut b.doc, &b.topology, &b.options.pinned, &mut b.report)?;
    b.liveness = Some(liveness);
    Ok(())
}

fn run_verify(b: &mut Battery<'_>) -> Result<(), CleanError> {
    pass5_verify::verify(&b.doc, b.options)
}
