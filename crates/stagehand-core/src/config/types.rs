//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for Stagehand
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project name
    pub name: Option<String>,

    /// Task definitions, keyed by task name
    pub tasks: BTreeMap<String, TaskConfig>,

    /// Browser test suite configuration
    pub test: TestConfig,

    /// Development server configuration
    pub serve: ServeConfig,

    /// File watching configuration. A file without `[watch]` has no
    /// bindings; the built-in groups only come with the built-in tasks.
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: None,
            tasks: super::defaults::default_tasks(),
            test: TestConfig::default(),
            serve: ServeConfig::default(),
            watch: WatchConfig {
                bindings: super::defaults::default_watch_bindings(),
                ..WatchConfig::default()
            },
        }
    }
}

/// A task in the pipeline configuration.
///
/// Exactly one of `command`, `series`, `parallel` or `test_suite` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Human readable description shown by `--list`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Shell command to execute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Steps run one after another
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<StepConfig>,

    /// Steps run concurrently
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parallel: Vec<StepConfig>,

    /// Run the browser test suite described by `[test]`
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub test_suite: bool,

    /// Environment variables passed to `command`
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

impl TaskConfig {
    /// Task running a shell command
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::default()
        }
    }

    /// Task running its steps in order
    pub fn series(steps: Vec<StepConfig>) -> Self {
        Self {
            series: steps,
            ..Self::default()
        }
    }

    /// Task running its steps concurrently
    pub fn parallel(steps: Vec<StepConfig>) -> Self {
        Self {
            parallel: steps,
            ..Self::default()
        }
    }

    /// Task running the browser test suite
    pub fn test_suite() -> Self {
        Self {
            test_suite: true,
            ..Self::default()
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Number of task kinds declared (valid configurations declare exactly one)
    pub fn declared_kinds(&self) -> usize {
        [
            self.command.is_some(),
            !self.series.is_empty(),
            !self.parallel.is_empty(),
            self.test_suite,
        ]
        .iter()
        .filter(|declared| **declared)
        .count()
    }
}

/// A step inside a composite: a task name or an inline composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepConfig {
    /// Reference to a named task
    Name(String),
    /// Inline sequential group
    Series { series: Vec<StepConfig> },
    /// Inline concurrent group
    Parallel { parallel: Vec<StepConfig> },
}

impl StepConfig {
    /// Reference a task by name
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Collect every task name referenced by this step
    pub fn referenced_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Name(name) => out.push(name),
            Self::Series { series: steps } | Self::Parallel { parallel: steps } => {
                for step in steps {
                    step.referenced_names(out);
                }
            }
        }
    }
}

impl From<&str> for StepConfig {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// Browser test suite configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Glob (relative to `root`) selecting one file per test target
    pub pattern: String,

    /// Directory the test server serves and targets are found under
    /// (default: the project root)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Host the test server binds to
    pub host: String,

    /// Port the test server binds to
    pub port: u16,

    /// Per-target timeout in seconds
    pub timeout_secs: u64,

    /// Page harness command; `{url}` is replaced by the target URL
    pub runner: String,
}

impl TestConfig {
    /// Per-target timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            pattern: "test/*.html".to_string(),
            root: None,
            host: "127.0.0.1".to_string(),
            port: 8009,
            timeout_secs: 20,
            runner: "node test/harness.js {url}".to_string(),
        }
    }
}

/// Development server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Directory served
    pub root: PathBuf,

    /// Host to bind
    pub host: String,

    /// Port to bind
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// File watching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// How often the watched paths are scanned, in milliseconds
    pub poll_interval_ms: u64,

    /// Window in which further changes are folded into one run, in milliseconds
    pub debounce_ms: u64,

    /// Glob sets and the steps they trigger
    pub bindings: Vec<WatchBindingConfig>,
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            debounce_ms: 100,
            bindings: Vec::new(),
        }
    }
}

/// A set of globs and the steps run (in series) when they change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchBindingConfig {
    /// Glob patterns relative to the project root
    pub paths: Vec<String>,

    /// Steps run in series on change
    pub run: Vec<StepConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_config_untagged() {
        let task: TaskConfig = toml::from_str(
            r#"series = [{ parallel = ["js", "css"] }, "test", { series = ["a", "b"] }]"#,
        )
        .unwrap();

        assert_eq!(
            task.series,
            vec![
                StepConfig::Parallel {
                    parallel: vec!["js".into(), "css".into()]
                },
                StepConfig::name("test"),
                StepConfig::Series {
                    series: vec!["a".into(), "b".into()]
                },
            ]
        );
    }

    #[test]
    fn test_referenced_names() {
        let step = StepConfig::Series {
            series: vec![
                StepConfig::Parallel {
                    parallel: vec!["js".into(), "css".into()],
                },
                "test".into(),
            ],
        };
        let mut names = Vec::new();
        step.referenced_names(&mut names);
        assert_eq!(names, vec!["js", "css", "test"]);
    }

    #[test]
    fn test_declared_kinds() {
        assert_eq!(TaskConfig::command("echo hi").declared_kinds(), 1);
        assert_eq!(TaskConfig::default().declared_kinds(), 0);

        let mut both = TaskConfig::test_suite();
        both.command = Some("echo".to_string());
        assert_eq!(both.declared_kinds(), 2);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: Config = toml::from_str("[test]\nport = 9100\n").unwrap();
        assert_eq!(config.test.port, 9100);
        assert_eq!(config.test.pattern, "test/*.html");
        assert_eq!(config.serve.port, 8000);
        assert!(config.tasks.contains_key("default"));
        assert!(config.watch.bindings.is_empty());
        assert_eq!(config.watch.poll_interval_ms, 250);
    }
}
