//! Serve command - development server plus file watchers

use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::style;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stagehand_tasks::scheduler::SchedulerOptions;
use stagehand_tasks::task::resolve_path;
use stagehand_tasks::{
    binding_task, build_registry, StaticServer, TaskScheduler, TestServer, WatchOptions, Watcher,
};

use crate::cli::output;
use crate::cli::{Cli, OutputFormat, Project};

use super::run::console_reporter;

/// Serve the project and re-run tasks when watched files change
#[derive(Debug)]
pub struct ServeCommand {
    /// Overrides `serve.root`
    pub root: Option<PathBuf>,
    /// Overrides `serve.port`
    pub port: Option<u16>,
}

impl ServeCommand {
    pub fn new(root: Option<PathBuf>, port: Option<u16>) -> Self {
        Self { root, port }
    }

    /// Directory and port to serve, after applying overrides
    fn target(&self, project: &Project) -> (PathBuf, u16) {
        let serve = &project.config.serve;
        let root = self.root.as_deref().unwrap_or(serve.root.as_path());
        (
            resolve_path(&project.root_dir, root),
            self.port.unwrap_or(serve.port),
        )
    }

    pub fn execute(&self, cli: &Cli, project: &Project) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli, project))
    }

    async fn execute_async(&self, cli: &Cli, project: &Project) -> anyhow::Result<()> {
        let config = &project.config;
        let (root, port) = self.target(project);
        info!(root = %root.display(), port, "executing serve command");

        let registry = Arc::new(build_registry(config)?);
        let scheduler = Arc::new(TaskScheduler::new(
            registry,
            SchedulerOptions {
                root_dir: project.root_dir.clone(),
            },
            console_reporter(cli),
        ));

        let mut watcher = Watcher::new(
            scheduler,
            WatchOptions {
                root_dir: project.root_dir.clone(),
                poll_interval: config.watch.poll_interval(),
                debounce: config.watch.debounce(),
            },
        );
        for binding in &config.watch.bindings {
            watcher.watch(binding.paths.iter().cloned(), binding_task(binding))?;
        }
        let bindings = watcher.bindings().len();

        let server = StaticServer::start("dev server", &root, &config.serve.host, port).await?;
        print_banner(cli, &server.base_url(), &root, bindings)?;

        let shutdown = CancellationToken::new();
        let watching = tokio::spawn(watcher.run(shutdown.clone()));

        tokio::signal::ctrl_c().await?;
        info!("shutting down");
        shutdown.cancel();
        if let Err(err) = watching.await {
            warn!(error = %err, "watchers did not shut down cleanly");
        }
        server.stop();

        if !cli.quiet && cli.format == OutputFormat::Text {
            println!();
            output::success("Stopped");
        }
        Ok(())
    }
}

fn print_banner(cli: &Cli, url: &str, root: &Path, bindings: usize) -> anyhow::Result<()> {
    if cli.format == OutputFormat::Json {
        let banner = serde_json::json!({
            "url": url,
            "root": root.display().to_string(),
            "watch_bindings": bindings,
        });
        println!("{}", serde_json::to_string(&banner)?);
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }

    output::info(&format!(
        "Serving {} at {}",
        output::path_style().apply_to(root.display()),
        output::path_style().apply_to(url)
    ));
    if bindings == 0 {
        output::warning("No watch bindings configured; serving only");
    }
    output::info(&format!(
        "Watching {} {}",
        output::plural(bindings, "binding"),
        style("(Ctrl+C to stop)").dim()
    ));
    Ok(())
}
