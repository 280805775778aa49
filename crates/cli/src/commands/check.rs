use std::path::Path;
use std::process;

use fieldprune_core::{plan, CleanOptions, CleanPlan, Document};

use super::load_document;
use crate::{report_error, OutputFormat};

pub(crate) fn cmd_check(file: &Path, options: &CleanOptions, output: OutputFormat, quiet: bool) {
    let doc = match load_document(file) {
        Ok(doc) => doc,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    let plan = match plan(&doc, options) {
        Ok(plan) => plan,
        Err(e) => {
            report_error(&format!("check failed: {}", e), output, quiet);
            process::exit(1);
        }
    };

    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&plan)
                .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
            println!("{}", json);
        }
        OutputFormat::Text => print_plan(&doc, &plan),
    }
}

fn print_plan(doc: &Document, plan: &CleanPlan) {
    println!(
        "Document OK: {} node(s), {} global field(s)",
        doc.nodes.len(),
        doc.global.len()
    );
    println!();

    for summary in &plan.nodes {
        let label = doc.node(summary.node).label(summary.node);
        println!("  {}: active [{}]", label, join(&summary.active));
        if !summary.live_local.is_empty() {
            println!("    live local [{}]", join(&summary.live_local));
        }
    }
    println!("  Live global fields: [{}]", join(&plan.live_global));
    println!();

    if plan.is_clean() {
        println!("Nothing to clean");
        return;
    }
    if !plan.dead_fields.is_empty() {
        println!("Dead fields ({}):", plan.dead_fields.len());
        for key in &plan.dead_fields {
            println!("  {}", key);
        }
    }
    if !plan.relocations.is_empty() {
        println!("Planned relocations ({}):", plan.relocations.len());
        for relocation in &plan.relocations {
            println!(
                "  '{}': {} -> {}",
                relocation.name, relocation.from, relocation.to
            );
        }
    }
}

fn join(names: &[fieldprune_core::Name]) -> String {
    names
        .iter()
        .map(|n| n.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
