//! Builds a task registry from the `[tasks]` configuration

use stagehand_core::config::{StepConfig, TaskConfig, WatchBindingConfig};
use stagehand_core::{Config, ConfigError, StagehandError};
use tracing::{debug, instrument};

use crate::error::{Result, TaskError};
use crate::registry::TaskRegistry;
use crate::task::{parallel, series, ShellTask, Task};
use crate::testing::TestSuiteTask;

/// Register every configured task and check that all references resolve
#[instrument(skip_all, fields(tasks = config.tasks.len()))]
pub fn build_registry(config: &Config) -> Result<TaskRegistry> {
    let registry = TaskRegistry::new();

    for (name, task_config) in &config.tasks {
        registry.register(name.clone(), task_for(name, task_config, config)?);
        if let Some(description) = &task_config.description {
            registry.describe(name.clone(), description.clone());
        }
    }

    for name in registry.names() {
        registry.validate(&Task::from(name))?;
    }

    debug!(tasks = registry.len(), "task registry built");
    Ok(registry)
}

fn task_for(name: &str, task_config: &TaskConfig, config: &Config) -> Result<Task> {
    if let Some(command) = &task_config.command {
        return Ok(Task::inline(
            ShellTask::new(command.clone()).with_env(task_config.env.clone()),
        ));
    }
    if task_config.test_suite {
        return Ok(Task::inline(TestSuiteTask::new(config.test.clone())));
    }
    if !task_config.series.is_empty() {
        return Ok(series(task_config.series.iter().map(step_to_task)));
    }
    if !task_config.parallel.is_empty() {
        return Ok(parallel(task_config.parallel.iter().map(step_to_task)));
    }

    Err(TaskError::Config(StagehandError::Config(
        ConfigError::InvalidValue {
            field: format!("tasks.{}", name),
            message: "task declares nothing to run".to_string(),
        },
    )))
}

/// Convert a configured step into a task reference or composite
pub fn step_to_task(step: &StepConfig) -> Task {
    match step {
        StepConfig::Name(name) => Task::from(name.as_str()),
        StepConfig::Series { series: steps } => series(steps.iter().map(step_to_task)),
        StepConfig::Parallel { parallel: steps } => parallel(steps.iter().map(step_to_task)),
    }
}

/// The task a watch binding runs: its steps in order
pub fn binding_task(binding: &WatchBindingConfig) -> Task {
    match binding.run.as_slice() {
        [single] => step_to_task(single),
        steps => series(steps.iter().map(step_to_task)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PlanKind;

    #[test]
    fn test_default_pipeline() {
        let registry = build_registry(&Config::default()).unwrap();

        for name in ["js", "css", "test", "build", "default", "package"] {
            assert!(registry.contains(name), "missing {}", name);
        }

        let plan = registry.resolve(&Task::from("default")).unwrap();
        match &plan.kind {
            PlanKind::Series(children) => {
                assert!(matches!(children[0].kind, PlanKind::Parallel(_)));
                assert_eq!(children[1].label, "test");
            }
            _ => panic!("default should be a series"),
        }
    }

    #[test]
    fn test_descriptions_registered() {
        let mut config = Config::default();
        config.tasks.clear();
        config.tasks.insert(
            "lint".to_string(),
            TaskConfig::command("npx eslint js").with_description("Lint sources"),
        );

        let registry = build_registry(&config).unwrap();
        assert_eq!(registry.description("lint").as_deref(), Some("Lint sources"));
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let mut config = Config::default();
        config.tasks.clear();
        config.tasks.insert(
            "build".to_string(),
            TaskConfig::parallel(vec!["js".into(), "missing".into()]),
        );
        config
            .tasks
            .insert("js".to_string(), TaskConfig::command("true"));

        let err = build_registry(&config).err().unwrap();
        assert!(matches!(err, TaskError::UnknownTask(ref name) if name == "missing"));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut config = Config::default();
        config.tasks.clear();
        config
            .tasks
            .insert("a".to_string(), TaskConfig::series(vec!["b".into()]));
        config
            .tasks
            .insert("b".to_string(), TaskConfig::series(vec!["a".into()]));

        assert!(matches!(
            build_registry(&config).err().unwrap(),
            TaskError::Cycle(_)
        ));
    }

    #[test]
    fn test_inline_groups() {
        let step = StepConfig::Series {
            series: vec![
                StepConfig::Parallel {
                    parallel: vec!["js".into(), "css".into()],
                },
                "test".into(),
            ],
        };
        assert_eq!(
            step_to_task(&step).to_string(),
            "series(parallel(js, css), test)"
        );
    }

    #[test]
    fn test_binding_task() {
        let single = WatchBindingConfig {
            paths: vec!["js/**".to_string()],
            run: vec!["js".into()],
        };
        assert_eq!(binding_task(&single).to_string(), "js");

        let several = WatchBindingConfig {
            paths: vec!["css/**/*.scss".to_string()],
            run: vec!["css-themes".into(), "css-core".into()],
        };
        assert_eq!(
            binding_task(&several).to_string(),
            "series(css-themes, css-core)"
        );
    }
}
