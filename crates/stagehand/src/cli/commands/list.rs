//! List command - show the configured tasks

use console::style;
use serde_json::json;
use tracing::info;

use stagehand_core::config::SERVE_TASK;
use stagehand_tasks::{build_registry, TaskRegistry};

use crate::cli::output;
use crate::cli::{Cli, OutputFormat, Project};

const SERVE_DESCRIPTION: &str = "Serve the project and re-run tasks when files change";

/// List tasks
#[derive(Debug, Default)]
pub struct ListCommand;

/// One listed task
#[derive(Debug, PartialEq)]
struct Entry {
    name: String,
    description: Option<String>,
    definition: String,
}

impl ListCommand {
    pub fn execute(&self, cli: &Cli, project: &Project) -> anyhow::Result<()> {
        info!("executing list command");
        let registry = build_registry(&project.config)?;
        let entries = entries(&registry);

        if cli.format == OutputFormat::Json {
            let tasks: Vec<_> = entries
                .iter()
                .map(|e| {
                    json!({
                        "name": e.name,
                        "description": e.description,
                        "definition": e.definition,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&tasks)?);
            return Ok(());
        }

        match &project.config_path {
            Some(path) => println!(
                "{} {}",
                output::header("Tasks from"),
                output::path_style().apply_to(path.display())
            ),
            None => println!("{}", output::header("Built-in tasks")),
        }
        println!();

        let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
        for entry in &entries {
            let detail = entry.description.as_deref().unwrap_or(&entry.definition);
            println!(
                "  {:width$}  {}",
                output::task_style().apply_to(&entry.name),
                style(detail).dim(),
                width = width
            );
            if cli.verbose && entry.description.is_some() {
                println!("  {:width$}  {}", "", style(&entry.definition).dim(), width = width);
            }
        }
        Ok(())
    }
}

fn entries(registry: &TaskRegistry) -> Vec<Entry> {
    let mut entries: Vec<Entry> = registry
        .names()
        .into_iter()
        .map(|name| Entry {
            description: registry.description(&name),
            definition: registry
                .get(&name)
                .map(|task| task.to_string())
                .unwrap_or_default(),
            name,
        })
        .collect();

    entries.push(Entry {
        name: SERVE_TASK.to_string(),
        description: Some(SERVE_DESCRIPTION.to_string()),
        definition: "static server + watchers".to_string(),
    });
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_core::config::TaskConfig;
    use stagehand_core::Config;

    #[test]
    fn test_entries_include_serve_and_composites() {
        let mut config = Config::default();
        config.tasks.clear();
        config.watch.bindings.clear();
        config.tasks.insert(
            "js".to_string(),
            TaskConfig::command("npx rollup").with_description("Bundle"),
        );
        config.tasks.insert(
            "build".to_string(),
            TaskConfig::parallel(vec!["js".into()]),
        );

        let registry = build_registry(&config).unwrap();
        let entries = entries(&registry);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["build", "js", "serve"]);

        assert_eq!(entries[0].definition, "parallel(js)");
        assert_eq!(entries[1].description.as_deref(), Some("Bundle"));
        assert_eq!(entries[1].definition, "npx rollup");
    }
}
