//! Definition validation command.
//!
//! Loads definition files into one store and reports whether every task
//! reference resolves.

use assist_core::TaskStore;
use colored::Colorize;
use serde_json::json;
use std::collections::HashSet;
use std::path::PathBuf;

/// Execute the validate command.
pub fn execute(files: &[PathBuf], json: bool) -> anyhow::Result<()> {
    if !json {
        println!("{}", "assist validate".bold().cyan());
        println!();
        println!("  Validating {} file(s)...", files.len());
        println!();
    }

    let store = match super::load_store(files) {
        Ok(store) => store,
        Err(e) if json => {
            let output = json!({ "valid": false, "files": files.len(), "error": format!("{e:#}") });
            println!("{}", serde_json::to_string_pretty(&output)?);
            std::process::exit(1);
        }
        Err(e) => return Err(e),
    };

    let roots = roots(&store);
    if json {
        let output = json!({ "valid": true, "files": files.len(), "tasks": store.len(), "roots": roots });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        output_human(&store, &roots);
    }
    Ok(())
}

/// Tasks no other task refers to; these are the likely chain entries.
fn roots(store: &TaskStore) -> Vec<String> {
    let referenced: HashSet<String> = store
        .names()
        .into_iter()
        .filter_map(|name| store.get(name))
        .flat_map(|task| {
            let own = task.name.clone();
            task.references()
                .filter(move |(_, reference)| *reference != own)
                .map(|(_, reference)| reference.to_string())
                .collect::<Vec<_>>()
        })
        .collect();
    store.names().into_iter().filter(|name| !referenced.contains(*name)).map(str::to_string).collect()
}

fn output_human(store: &TaskStore, roots: &[String]) {
    println!("  {} {} task(s) loaded", "✓".green().bold(), store.len());
    if !roots.is_empty() {
        println!("    Entries: {}", roots.join(", ").dimmed());
    }
    println!();
    println!("{}", "✓ All references resolve".green().bold());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roots_ignore_self_references() {
        let store = TaskStore::from_json_str(
            r#"{
                "Start": { "algorithm": "JustReturn", "next": ["Battle", "Start"] },
                "Battle": { "algorithm": "JustReturn", "next": ["Battle"] },
                "Other": { "algorithm": "JustReturn", "reduceOtherTimes": ["Battle"] }
            }"#,
        )
        .unwrap();
        assert_eq!(roots(&store), vec!["Other".to_string(), "Start".to_string()]);
    }
}
