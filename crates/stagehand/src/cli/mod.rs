//! CLI definition and command handling

pub mod commands;
pub mod output;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use stagehand_core::config::{load_config, load_config_or_default, DEFAULT_TASK, SERVE_TASK};
use stagehand_core::Config;

use commands::{InitCommand, ListCommand, RunCommand, ServeCommand};

/// Stagehand - build, test and watch pipeline runner
#[derive(Debug, Parser)]
#[command(name = "stagehand")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Task to run (`serve` starts the dev server and watchers)
    #[arg(default_value = DEFAULT_TASK)]
    pub task: String,

    /// Directory served by `serve` and by test suites
    /// (default: `serve.root` / `test.root` from the config)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Port used by `serve` (default: `serve.port` from the config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Configuration file (default: searched upward from the working directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// List the configured tasks and exit
    #[arg(long)]
    pub list: bool,

    /// Show the execution plan without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Write a default stagehand.toml to the working directory
    #[arg(long)]
    pub init: bool,

    /// Overwrite an existing configuration with --init
    #[arg(long, requires = "init")]
    pub force: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long)]
    pub directory: Option<PathBuf>,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Raised when the user interrupts a run
#[derive(Debug, thiserror::Error)]
#[error("Interrupted")]
pub struct Interrupted;

/// The loaded configuration and the directory tasks run in
#[derive(Debug)]
pub struct Project {
    pub config: Config,
    /// File the configuration came from; `None` for built-in defaults
    pub config_path: Option<PathBuf>,
    pub root_dir: PathBuf,
}

impl Project {
    /// Load the configuration for `dir`, or from an explicit file
    pub fn load(dir: &Path, explicit: Option<&Path>) -> anyhow::Result<Self> {
        let (config, config_path) = match explicit {
            Some(path) => {
                let config = load_config(path)
                    .with_context(|| format!("Failed to load {}", path.display()))?;
                (config, Some(path.to_path_buf()))
            }
            None => load_config_or_default(dir)?,
        };

        // Tasks run next to the config file so relative paths in it hold
        let root_dir = config_path
            .as_deref()
            .and_then(Path::parent)
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dir.to_path_buf());

        match &config_path {
            Some(path) => info!(config = %path.display(), "loaded configuration"),
            None => info!("no configuration file found, using defaults"),
        }
        debug!(root = %root_dir.display(), tasks = config.tasks.len(), "project loaded");

        Ok(Self {
            config,
            config_path,
            root_dir,
        })
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)
                .with_context(|| format!("Cannot change to {}", dir.display()))?;
        }
        let cwd = std::env::current_dir()?;

        if self.init {
            return InitCommand::new(self.force).execute(&self, &cwd);
        }

        let project = Project::load(&cwd, self.config.as_deref())?;

        if self.list {
            return ListCommand.execute(&self, &project);
        }

        if self.task == SERVE_TASK {
            return ServeCommand::new(self.root.clone(), self.port).execute(&self, &project);
        }

        RunCommand::new(&self.task, self.dry_run)
            .with_root(self.root.clone())
            .execute(&self, &project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["stagehand"]);
        assert_eq!(cli.task, "default");
        assert!(cli.root.is_none());
        assert!(cli.port.is_none());
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::parse_from(["stagehand", "serve", "--root", "site", "--port", "9000"]);
        assert_eq!(cli.task, "serve");
        assert_eq!(cli.root, Some(PathBuf::from("site")));
        assert_eq!(cli.port, Some(9000));
    }

    #[test]
    fn test_force_requires_init() {
        assert!(Cli::try_parse_from(["stagehand", "--force"]).is_err());
        assert!(Cli::try_parse_from(["stagehand", "--init", "--force"]).is_ok());
    }

    #[test]
    fn test_project_defaults_without_config() {
        let temp = TempDir::new().unwrap();
        let project = Project::load(temp.path(), None).unwrap();
        assert!(project.config_path.is_none());
        assert_eq!(project.root_dir, temp.path());
        assert!(project.config.tasks.contains_key("default"));
    }

    #[test]
    fn test_project_root_follows_config_file() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("site");
        std::fs::create_dir_all(&nested).unwrap();
        let config_path = nested.join("stagehand.toml");
        std::fs::write(&config_path, "[tasks.default]\ncommand = \"true\"\n").unwrap();

        let project = Project::load(temp.path(), Some(&config_path)).unwrap();
        assert_eq!(project.root_dir, nested);
        assert_eq!(project.config.tasks.len(), 1);
    }
}
