//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::defaults::SERVE_TASK;
use super::types::{Config, StepConfig};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_tasks(config)?;
    validate_test(config)?;
    validate_watch(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_tasks(config: &Config) -> Result<()> {
    if config.tasks.contains_key(SERVE_TASK) {
        return Err(invalid(
            format!("tasks.{}", SERVE_TASK),
            "name is reserved for the development server",
        ));
    }

    for (name, task) in &config.tasks {
        if name.is_empty() {
            return Err(invalid("tasks", "task name cannot be empty"));
        }

        if task.declared_kinds() != 1 {
            return Err(invalid(
                format!("tasks.{}", name),
                "must declare exactly one of: command, series, parallel, test_suite",
            ));
        }

        for (i, step) in task.series.iter().chain(&task.parallel).enumerate() {
            validate_step(config, &format!("tasks.{}[{}]", name, i), step)?;
        }
    }

    Ok(())
}

fn validate_step(config: &Config, field: &str, step: &StepConfig) -> Result<()> {
    match step {
        StepConfig::Name(name) => {
            if !config.tasks.contains_key(name) {
                return Err(invalid(field, format!("unknown task '{}'", name)));
            }
        }
        StepConfig::Series { series: steps } | StepConfig::Parallel { parallel: steps } => {
            if steps.is_empty() {
                return Err(invalid(field, "inline group cannot be empty"));
            }
            for (i, inner) in steps.iter().enumerate() {
                validate_step(config, &format!("{}[{}]", field, i), inner)?;
            }
        }
    }
    Ok(())
}

fn validate_test(config: &Config) -> Result<()> {
    let test = &config.test;

    if test.pattern.is_empty() {
        return Err(invalid("test.pattern", "pattern cannot be empty"));
    }

    if test.port == 0 {
        return Err(invalid("test.port", "must be greater than zero"));
    }

    if test.timeout_secs == 0 {
        return Err(invalid("test.timeout_secs", "must be greater than zero"));
    }

    if !test.runner.contains("{url}") {
        return Err(invalid("test.runner", "must contain {url} placeholder"));
    }

    Ok(())
}

fn validate_watch(config: &Config) -> Result<()> {
    if config.watch.poll_interval_ms == 0 {
        return Err(invalid("watch.poll_interval_ms", "must be greater than zero"));
    }

    for (i, binding) in config.watch.bindings.iter().enumerate() {
        if binding.paths.is_empty() {
            return Err(ConfigError::MissingField(format!("watch.bindings[{}].paths", i)).into());
        }
        if binding.run.is_empty() {
            return Err(ConfigError::MissingField(format!("watch.bindings[{}].run", i)).into());
        }
        for (j, step) in binding.run.iter().enumerate() {
            validate_step(config, &format!("watch.bindings[{}].run[{}]", i, j), step)?;
        }
    }

    Ok(())
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> crate::error::StagehandError {
    ConfigError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TaskConfig, WatchBindingConfig};

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_unknown_step() {
        let mut config = Config::default();
        config.tasks.insert(
            "broken".to_string(),
            TaskConfig::series(vec!["js".into(), "missing".into()]),
        );

        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("unknown task 'missing'"));
        assert!(err.to_string().contains("tasks.broken[1]"));
    }

    #[test]
    fn test_validate_ambiguous_task() {
        let mut config = Config::default();
        let mut task = TaskConfig::command("echo one");
        task.parallel = vec!["js".into()];
        config.tasks.insert("both".to_string(), task);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_reserved_serve() {
        let mut config = Config::default();
        config
            .tasks
            .insert("serve".to_string(), TaskConfig::command("python -m http.server"));
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_inline_group() {
        let mut config = Config::default();
        config.tasks.insert(
            "hollow".to_string(),
            TaskConfig::series(vec![StepConfig::Parallel { parallel: vec![] }]),
        );
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_runner_placeholder() {
        let mut config = Config::default();
        config.test.runner = "node harness.js".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_watch_binding_without_paths() {
        let mut config = Config::default();
        config.watch.bindings.push(WatchBindingConfig {
            paths: vec![],
            run: vec!["js".into()],
        });
        assert!(validate_config(&config).is_err());
    }
}
