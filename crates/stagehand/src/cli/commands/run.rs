//! Run command - execute a task and everything it is composed of

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use console::style;
use serde_json::{json, Value};
use tracing::info;

use stagehand_core::Config;

use stagehand_tasks::scheduler::SchedulerOptions;
use stagehand_tasks::{
    build_registry, PlanKind, PlanNode, SuiteResult, Task, TaskEvent, TaskRegistry, TaskReporter,
    TaskReporterRegistry, TaskScheduler, TestRunRecord, TracingReporter,
};

use crate::cli::output;
use crate::cli::{Cli, Interrupted, OutputFormat, Project};

/// Run a named task
#[derive(Debug)]
pub struct RunCommand {
    pub task: String,
    pub dry_run: bool,
    /// Overrides `test.root`
    pub root: Option<PathBuf>,
}

impl RunCommand {
    pub fn new(task: &str, dry_run: bool) -> Self {
        Self {
            task: task.to_string(),
            dry_run,
            root: None,
        }
    }

    pub fn with_root(mut self, root: Option<PathBuf>) -> Self {
        self.root = root;
        self
    }

    /// The project config with command-line overrides applied
    fn config(&self, project: &Project) -> Config {
        let mut config = project.config.clone();
        if let Some(root) = &self.root {
            config.test.root = Some(root.clone());
        }
        config
    }

    pub fn execute(&self, cli: &Cli, project: &Project) -> anyhow::Result<()> {
        info!(task = %self.task, dry_run = self.dry_run, "executing run command");
        let registry = Arc::new(build_registry(&self.config(project))?);
        let task = Task::from(self.task.as_str());

        if self.dry_run {
            let plan = registry.resolve(&task)?;
            return print_plan(cli, &self.task, &plan);
        }

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli, project, registry, task))
    }

    async fn execute_async(
        &self,
        cli: &Cli,
        project: &Project,
        registry: Arc<TaskRegistry>,
        task: Task,
    ) -> anyhow::Result<()> {
        let suites = Arc::new(SuiteCollector::default());
        let mut reporters = TaskReporterRegistry::empty();
        reporters.register_shared(console_reporter(cli));
        reporters.register_shared(suites.clone());

        let scheduler = TaskScheduler::new(
            registry,
            SchedulerOptions {
                root_dir: project.root_dir.clone(),
            },
            Arc::new(reporters),
        );

        let started = Instant::now();
        let result = tokio::select! {
            result = scheduler.run(&task) => result,
            Ok(()) = tokio::signal::ctrl_c() => return Err(Interrupted.into()),
        };

        if cli.format == OutputFormat::Json {
            let summary = json!({
                "task": self.task,
                "succeeded": result.is_ok(),
                "duration_ms": started.elapsed().as_millis() as u64,
                "leaves": result.as_ref().map(|s| s.leaves).ok(),
                "error": result.as_ref().err().map(|e| e.to_string()),
                "tests": suites.results().iter().map(suite_json).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        result?;
        Ok(())
    }
}

/// The reporter used for interactive output
pub(crate) fn console_reporter(cli: &Cli) -> Arc<dyn TaskReporter> {
    if cli.quiet || cli.format == OutputFormat::Json {
        Arc::new(TracingReporter)
    } else {
        Arc::new(ConsoleReporter::new(cli.verbose))
    }
}

fn print_plan(cli: &Cli, task: &str, plan: &PlanNode) -> anyhow::Result<()> {
    if cli.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&plan_json(plan))?);
        return Ok(());
    }

    println!(
        "{} {} ({})",
        style("→").blue(),
        output::header(&format!("Execution plan for {}", task)),
        output::plural(plan.leaf_count(), "task")
    );
    println!();
    print!("{}", plan.execution_plan());
    println!();
    println!(
        "{}",
        style("[DRY RUN - no tasks will be executed]").yellow().bold()
    );
    Ok(())
}

fn plan_json(node: &PlanNode) -> Value {
    match &node.kind {
        PlanKind::Leaf(body) => json!({
            "name": node.label,
            "kind": "task",
            "run": body.describe(),
        }),
        PlanKind::Series(children) | PlanKind::Parallel(children) => json!({
            "name": node.label,
            "kind": if matches!(node.kind, PlanKind::Series(_)) { "series" } else { "parallel" },
            "children": children.iter().map(plan_json).collect::<Vec<_>>(),
        }),
    }
}

fn record_json(record: &TestRunRecord) -> Value {
    json!({
        "target": record.target,
        "passed": record.passed,
        "failed": record.failed,
        "total": record.total,
        "duration_ms": record.duration.as_millis() as u64,
        "error": record.error,
        "failures": record.failures,
    })
}

fn suite_json(result: &SuiteResult) -> Value {
    json!({
        "total": result.total,
        "passed": result.passed,
        "failed": result.failed,
        "duration_ms": result.duration.as_millis() as u64,
        "targets": result.records.iter().map(record_json).collect::<Vec<_>>(),
    })
}

/// Keeps every finished suite result for the JSON summary
#[derive(Default)]
struct SuiteCollector {
    results: Mutex<Vec<SuiteResult>>,
}

impl SuiteCollector {
    fn results(&self) -> Vec<SuiteResult> {
        self.results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl TaskReporter for SuiteCollector {
    fn report(&self, event: &TaskEvent) {
        if let TaskEvent::SuiteCompleted { result } = event {
            self.results
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(result.clone());
        }
    }
}

/// Lines of a failed task's output shown without `--verbose`
const FAILURE_OUTPUT_LINES: usize = 40;

/// Console reporter with live output.
///
/// Without `--verbose`, command output is held back per task and only the
/// tail is printed if the task fails.
pub(crate) struct ConsoleReporter {
    verbose: bool,
    held: Mutex<HashMap<String, VecDeque<String>>>,
}

impl ConsoleReporter {
    pub(crate) fn new(verbose: bool) -> Self {
        Self {
            verbose,
            held: Mutex::new(HashMap::new()),
        }
    }

    fn held(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<String>>> {
        self.held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn hold(&self, task: &str, line: &str) {
        let mut held = self.held();
        let lines = held.entry(task.to_string()).or_default();
        if lines.len() == FAILURE_OUTPUT_LINES {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }

    /// Take the held output of a task
    fn release(&self, task: &str) -> Vec<String> {
        self.held()
            .remove(task)
            .map(Vec::from)
            .unwrap_or_default()
    }

    fn target_line(record: &TestRunRecord) -> String {
        let line = format!(
            "{} [{}/{}] in {}ms",
            record.target,
            record.passed,
            record.total,
            record.duration.as_millis()
        );
        if record.is_passed() {
            format!("  {} {}", style("✔").green(), style(line).green())
        } else {
            format!("  {} {}", style("!").red().bold(), style(line).red())
        }
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { task } => {
                println!("  {} {}", style("▸").dim(), output::task_style().apply_to(task));
            }
            TaskEvent::Output {
                task,
                line,
                is_stderr,
            } => {
                if !self.verbose {
                    self.hold(task, line);
                } else if *is_stderr {
                    println!("    {} {}", style(format!("[{}]", task)).red().dim(), line);
                } else {
                    println!("    {} {}", style(format!("[{}]", task)).dim(), line);
                }
            }
            TaskEvent::Completed { task, duration } => {
                self.release(task);
                println!(
                    "  {} {} {}",
                    style("✓").green(),
                    style(task).green(),
                    style(output::seconds(*duration)).dim()
                );
            }
            TaskEvent::Failed {
                task,
                duration,
                error,
            } => {
                println!(
                    "  {} {} {} {}",
                    style("✗").red(),
                    style(task).red(),
                    style(output::seconds(*duration)).dim(),
                    style(error).red().dim()
                );
                for line in self.release(task) {
                    println!("    {} {}", style(format!("[{}]", task)).dim(), line);
                }
            }
            TaskEvent::TargetCompleted { record } => {
                println!("{}", Self::target_line(record));
                for failure in &record.failures {
                    println!(
                        "      {} > {}: {}",
                        style(&failure.module).red(),
                        style(&failure.name).red(),
                        style(&failure.message).dim()
                    );
                }
                if let Some(error) = &record.error {
                    println!("      {}", style(error).red().dim());
                }
            }
            TaskEvent::SuiteCompleted { result } => {
                println!();
                if result.is_success() {
                    println!(
                        "  {}",
                        style(format!("Passed {} tests", result.total)).green().bold()
                    );
                } else {
                    println!(
                        "  {}",
                        style(format!("{}/{} tests failed", result.failed, result.total))
                            .red()
                            .bold()
                    );
                }
                println!();
            }
            TaskEvent::WatchTriggered { task, changed } => {
                let files: Vec<String> = changed.iter().map(|p| p.display().to_string()).collect();
                println!();
                output::info(&format!(
                    "{} changed: {}",
                    output::plural(files.len(), "file"),
                    output::path_style().apply_to(files.join(", "))
                ));
                if self.verbose {
                    println!("  {} {}", style("running").dim(), task);
                }
            }
            TaskEvent::AllCompleted {
                task,
                succeeded,
                duration,
            } => {
                println!();
                println!(
                    "  {} {} {} ({})",
                    if *succeeded {
                        style("✓").green().bold()
                    } else {
                        style("✗").red().bold()
                    },
                    output::task_style().apply_to(task),
                    if *succeeded { "finished" } else { "failed" },
                    output::seconds(*duration)
                );
            }
        }
    }
}
