use std::path::Path;
use std::process;

use fieldprune_core::{clean, CleanOptions, CleanReport};

use super::load_document;
use crate::{report_error, OutputFormat};

pub(crate) fn cmd_clean(
    file: &Path,
    options: &CleanOptions,
    show_report: bool,
    output: OutputFormat,
    quiet: bool,
) {
    let mut doc = match load_document(file) {
        Ok(doc) => doc,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    let report = match clean(&mut doc, options) {
        Ok(report) => report,
        Err(e) => {
            report_error(&format!("cleanup failed: {}", e), output, quiet);
            process::exit(1);
        }
    };

    if quiet {
        return;
    }

    if !show_report {
        // The cleaned document is JSON in either output format.
        let json = serde_json::to_string_pretty(&doc)
            .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
        println!("{}", json);
        return;
    }

    match output {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
            println!("{}", json);
        }
        OutputFormat::Text => print_report(&report),
    }
}

fn print_report(report: &CleanReport) {
    println!("Cleanup Report");
    println!("==============");
    println!();
    if report.is_noop() {
        println!("  Nothing to clean");
        return;
    }
    for action in &report.actions {
        println!("  {}", action);
    }
    println!();

    let s = &report.summary;
    println!(
        "  Fields: {} derived removed, {} inputs removed, {} relocated",
        s.derived_fields_removed, s.input_fields_removed, s.relocated
    );
    println!(
        "  Schemas: {} entries removed, {} entries added",
        s.schema_entries_removed, s.schema_entries_added
    );
    if s.verification_columns_removed > 0 || s.verification_tables_dropped > 0 {
        println!(
            "  Verification: {} columns removed, {} tables dropped",
            s.verification_columns_removed, s.verification_tables_dropped
        );
    }
    println!();
    println!("{} change(s)", s.total());
}
