//! Default configuration values

use std::collections::BTreeMap;

use super::types::{StepConfig, TaskConfig, WatchBindingConfig};

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "stagehand.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "stagehand.yaml";

/// Task run when no task name is given
pub const DEFAULT_TASK: &str = "default";

/// Task name reserved for the development server and watchers
pub const SERVE_TASK: &str = "serve";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".stagehand.toml",
        ".stagehand.yaml",
    ]
}

/// The built-in pipeline: bundle, compile styles, lint, browser tests, package
pub fn default_tasks() -> BTreeMap<String, TaskConfig> {
    let mut tasks = BTreeMap::new();

    tasks.insert(
        "js".to_string(),
        TaskConfig::command("npx rollup --config rollup.config.js")
            .with_description("Bundle the core library as ES module and UMD"),
    );
    tasks.insert(
        "plugins".to_string(),
        TaskConfig::command("npx rollup --config rollup.plugins.config.js")
            .with_description("Bundle the bundled plugins"),
    );
    tasks.insert(
        "css-themes".to_string(),
        TaskConfig::command("npx sass --no-source-map css/theme/source:dist/theme")
            .with_description("Compile theme stylesheets"),
    );
    tasks.insert(
        "css-core".to_string(),
        TaskConfig::command(
            "npx sass --no-source-map --style=compressed css/reveal.scss dist/reveal.css",
        )
        .with_description("Compile and minify the core stylesheet"),
    );
    tasks.insert(
        "css".to_string(),
        TaskConfig::parallel(vec!["css-themes".into(), "css-core".into()])
            .with_description("Compile all stylesheets"),
    );
    tasks.insert(
        "eslint".to_string(),
        TaskConfig::command("npx eslint js").with_description("Lint the sources"),
    );
    tasks.insert(
        "qunit".to_string(),
        TaskConfig::test_suite().with_description("Run every browser test page"),
    );
    tasks.insert(
        "test".to_string(),
        TaskConfig::series(vec!["eslint".into(), "qunit".into()])
            .with_description("Lint, then run the browser tests"),
    );
    tasks.insert(
        "build".to_string(),
        TaskConfig::parallel(vec!["js".into(), "css".into(), "plugins".into()])
            .with_description("Build all artifacts"),
    );
    tasks.insert(
        "default".to_string(),
        TaskConfig::series(vec![
            StepConfig::Parallel {
                parallel: vec!["js".into(), "css".into(), "plugins".into()],
            },
            "test".into(),
        ])
        .with_description("Build all artifacts, then test"),
    );
    tasks.insert(
        "package-zip".to_string(),
        TaskConfig::command(
            "zip -r reveal-js-presentation.zip index.html dist lib images plugin *.md",
        )
        .with_description("Zip the presentation files"),
    );
    tasks.insert(
        "package".to_string(),
        TaskConfig::series(vec!["default".into(), "package-zip".into()])
            .with_description("Build, test and zip a distributable presentation"),
    );

    tasks
}

/// The built-in watch bindings used by `serve`
pub fn default_watch_bindings() -> Vec<WatchBindingConfig> {
    fn binding(paths: &[&str], run: &[&str]) -> WatchBindingConfig {
        WatchBindingConfig {
            paths: paths.iter().map(|p| p.to_string()).collect(),
            run: run.iter().map(|&name| StepConfig::from(name)).collect(),
        }
    }

    vec![
        binding(&["js/**"], &["js", "test"]),
        binding(&["plugin/**/*.js"], &["plugins"]),
        binding(&["test/*.html"], &["test"]),
        binding(
            &[
                "css/theme/source/*.{sass,scss}",
                "css/theme/template/*.{sass,scss}",
            ],
            &["css-themes"],
        ),
        binding(&["css/reveal.scss", "css/print/*.{sass,scss,css}"], &["css-core"]),
    ]
}

/// Default configuration template written by `--init`
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Stagehand configuration

[tasks.js]
description = "Bundle the core library as ES module and UMD"
command = "npx rollup --config rollup.config.js"

[tasks.plugins]
description = "Bundle the bundled plugins"
command = "npx rollup --config rollup.plugins.config.js"

[tasks.css-themes]
description = "Compile theme stylesheets"
command = "npx sass --no-source-map css/theme/source:dist/theme"

[tasks.css-core]
description = "Compile and minify the core stylesheet"
command = "npx sass --no-source-map --style=compressed css/reveal.scss dist/reveal.css"

[tasks.css]
description = "Compile all stylesheets"
parallel = ["css-themes", "css-core"]

[tasks.eslint]
description = "Lint the sources"
command = "npx eslint js"

[tasks.qunit]
description = "Run every browser test page"
test_suite = true

[tasks.test]
description = "Lint, then run the browser tests"
series = ["eslint", "qunit"]

[tasks.build]
description = "Build all artifacts"
parallel = ["js", "css", "plugins"]

[tasks.default]
description = "Build all artifacts, then test"
series = [{ parallel = ["js", "css", "plugins"] }, "test"]

[tasks.package-zip]
description = "Zip the presentation files"
command = "zip -r reveal-js-presentation.zip index.html dist lib images plugin *.md"

[tasks.package]
description = "Build, test and zip a distributable presentation"
series = ["default", "package-zip"]

[test]
pattern = "test/*.html"
host = "127.0.0.1"
port = 8009
timeout_secs = 20
# Must print a JSON line such as {"passed": 5, "failed": 0, "total": 5, "runtime": 120}
runner = "node test/harness.js {url}"

[serve]
root = "."
host = "0.0.0.0"
port = 8000

[watch]
poll_interval_ms = 250
debounce_ms = 100

[[watch.bindings]]
paths = ["js/**"]
run = ["js", "test"]

[[watch.bindings]]
paths = ["plugin/**/*.js"]
run = ["plugins"]

[[watch.bindings]]
paths = ["test/*.html"]
run = ["test"]

[[watch.bindings]]
paths = ["css/theme/source/*.{sass,scss}", "css/theme/template/*.{sass,scss}"]
run = ["css-themes"]

[[watch.bindings]]
paths = ["css/reveal.scss", "css/print/*.{sass,scss,css}"]
run = ["css-core"]
"#;
