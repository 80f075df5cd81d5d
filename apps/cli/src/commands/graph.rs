//! Task graph printing command.

use assist_abstraction::Algorithm;
use assist_core::TaskDescriptor;
use colored::Colorize;
use std::fmt::Write;
use std::path::PathBuf;

/// Execute the graph command.
///
/// Prints every task reachable from `entry` in breadth-first order along
/// with its outgoing edges.
pub fn execute(files: &[PathBuf], entry: &str) -> anyhow::Result<()> {
    let store = super::load_store(files)?;
    let order = store.reachable_from(entry)?;

    println!("{}", format!("assist graph: {entry}").bold().cyan());
    println!();
    for name in &order {
        let task = store.require(name)?;
        print!("{}", describe(&task));
    }
    println!();
    println!("  {} task(s) reachable, {} defined", order.len(), store.len());
    Ok(())
}

fn describe(task: &TaskDescriptor) -> String {
    let mut out = String::new();
    let budget = task.max_times.map_or_else(|| "unbounded".to_string(), |max| format!("max {max}"));
    let _ = writeln!(
        out,
        "  {} [{}, {}, {}]",
        task.name.bold(),
        task.algorithm.kind(),
        task.action,
        budget
    );

    if let Algorithm::MatchTemplate(params) = &task.algorithm {
        let templates: Vec<String> =
            params.pairs().map(|(template, threshold)| format!("{template} >= {threshold}")).collect();
        let _ = writeln!(out, "    {}: {}", "templates".dimmed(), templates.join(", "));
    }

    let mut fields: Vec<(&str, Vec<&str>)> = Vec::new();
    for (field, reference) in task.references() {
        match fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, names)) => names.push(reference),
            None => fields.push((field, vec![reference])),
        }
    }
    for (field, names) in fields {
        let _ = writeln!(out, "    {}: {}", field.dimmed(), names.join(", "));
    }
    out
}
