//! Init command - write a starter configuration

use std::path::{Path, PathBuf};

use tracing::info;

use stagehand_core::config::{DEFAULT_CONFIG_TEMPLATE, DEFAULT_CONFIG_TOML};

use crate::cli::output;
use crate::cli::Cli;

/// Write the default stagehand.toml
#[derive(Debug)]
pub struct InitCommand {
    /// Overwrite an existing file
    pub force: bool,
}

impl InitCommand {
    pub fn new(force: bool) -> Self {
        Self { force }
    }

    /// Write the configuration into `dir`, returning the file written
    pub fn write(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let config_path = dir.join(DEFAULT_CONFIG_TOML);
        if config_path.exists() && !self.force {
            anyhow::bail!(
                "Configuration file already exists at {}. Use --force to overwrite.",
                config_path.display()
            );
        }

        std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)?;
        info!(path = %config_path.display(), "wrote configuration");
        Ok(config_path)
    }

    pub fn execute(&self, cli: &Cli, dir: &Path) -> anyhow::Result<()> {
        let config_path = self.write(dir)?;
        if !cli.quiet {
            output::success(&format!(
                "Created {}",
                output::path_style().apply_to(config_path.display())
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_core::config::load_config;
    use tempfile::TempDir;

    #[test]
    fn test_written_config_loads() {
        let temp = TempDir::new().unwrap();
        let path = InitCommand::new(false).write(temp.path()).unwrap();

        let config = load_config(&path).unwrap();
        assert!(config.tasks.contains_key("default"));
        assert_eq!(config.watch.bindings.len(), 5);
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(DEFAULT_CONFIG_TOML), "# mine").unwrap();

        assert!(InitCommand::new(false).write(temp.path()).is_err());
        assert_eq!(
            std::fs::read_to_string(temp.path().join(DEFAULT_CONFIG_TOML)).unwrap(),
            "# mine"
        );

        InitCommand::new(true).write(temp.path()).unwrap();
        assert!(std::fs::read_to_string(temp.path().join(DEFAULT_CONFIG_TOML))
            .unwrap()
            .contains("[tasks.default]"));
    }
}
