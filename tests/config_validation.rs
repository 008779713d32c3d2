use sitepipe::config::{
    load_and_validate, load_or_default, ConfigFile, PathConfig, PathsSection, TaskKind,
};
use sitepipe::engine::TaskGraph;
use sitepipe::errors::SitepipeError;
use sitepipe_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use sitepipe_test_utils::init_tracing;
use sitepipe_test_utils::project::TempProject;

fn copy_task(input: &str) -> TaskConfigBuilder {
    TaskConfigBuilder::new(TaskKind::Copy, input)
}

#[test]
fn cycle_is_rejected_before_anything_runs() {
    init_tracing();

    let err = ConfigFileBuilder::new()
        .with_task("a", copy_task("a/*").after("c").build())
        .with_task("b", copy_task("b/*").after("a").build())
        .with_task("c", copy_task("c/*").after("b").build())
        .try_build()
        .unwrap_err();

    assert!(matches!(err, SitepipeError::DagCycle(_)), "got {err:?}");
    assert!(err.is_configuration());
}

#[test]
fn unknown_dependency_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_task("html", copy_task("views/*").after("images").build())
        .try_build()
        .unwrap_err();

    match err {
        SitepipeError::TaskNotFound(msg) => assert!(msg.contains("images"), "{msg}"),
        other => panic!("expected TaskNotFound, got {other:?}"),
    }
}

#[test]
fn self_dependency_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_task("html", copy_task("views/*").after("html").build())
        .try_build()
        .unwrap_err();

    assert!(matches!(err, SitepipeError::ConfigError(_)), "got {err:?}");
}

#[test]
fn invalid_glob_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_task("styles", copy_task("assets/[*.scss").build())
        .try_build()
        .unwrap_err();

    match err {
        SitepipeError::ConfigError(msg) => assert!(msg.contains("styles"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn invalid_browser_target_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_browser_target("chrome", "one hundred")
        .try_build()
        .unwrap_err();
    assert!(matches!(err, SitepipeError::ConfigError(_)), "got {err:?}");

    let err = ConfigFileBuilder::new()
        .with_browser_target("netscape", "4")
        .try_build()
        .unwrap_err();
    assert!(matches!(err, SitepipeError::ConfigError(_)), "got {err:?}");
}

#[test]
fn invalid_rename_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_task("html", copy_task("views/*").rename("home", "../index").build())
        .try_build()
        .unwrap_err();
    assert!(matches!(err, SitepipeError::ConfigError(_)), "got {err:?}");
}

#[test]
fn empty_task_map_uses_default_pipeline() {
    let cfg = ConfigFileBuilder::new().build();

    let names: Vec<&str> = cfg.tasks().keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec!["favicon", "fonts", "html", "images", "scripts", "styles"]
    );

    let html = &cfg.tasks()["html"];
    assert_eq!(html.kind, TaskKind::Markup);
    assert_eq!(html.after, vec!["images".to_string()]);
    assert_eq!(html.rename.get("home").map(String::as_str), Some("index"));
    assert!(cfg.tasks()["images"].effective_incremental());
    assert!(!cfg.tasks()["styles"].effective_incremental());
}

#[test]
fn toml_config_is_parsed_and_validated() {
    let project = TempProject::new();
    let path = project.write_root(
        "Sitepipe.toml",
        r#"
[paths]
source = "src"
output = "public"

[build]
watch_debounce_ms = 50
private_prefix = "_"

[task.pages]
kind = "markup"
input = ["views/*.html"]
base = "views"
rename = { home = "index" }

[task.styles]
kind = "styles"
input = ["css/*.scss"]
watch = ["css/**/*.scss"]
output = "css"
after = ["pages"]
"#,
    );

    let cfg = load_and_validate(&path).expect("valid config");
    assert_eq!(cfg.paths().output, "public");
    assert_eq!(cfg.build().watch_debounce_ms, 50);
    assert_eq!(cfg.tasks().len(), 2);
    assert_eq!(cfg.tasks()["styles"].after, vec!["pages".to_string()]);
    assert_eq!(
        cfg.tasks()["styles"].watch.as_deref(),
        Some(&["css/**/*.scss".to_string()][..])
    );
}

#[test]
fn malformed_toml_is_a_configuration_error() {
    let project = TempProject::new();
    let path = project.write_root("Sitepipe.toml", "[task.html\nkind = ");

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, SitepipeError::TomlError(_)), "got {err:?}");
    assert!(err.is_configuration());
}

#[test]
fn missing_config_file_means_defaults() {
    let project = TempProject::new();
    let cfg = load_or_default(project.root().join("Sitepipe.toml")).expect("defaults");
    assert_eq!(cfg.tasks().len(), 6);
    assert_eq!(cfg.server().port, 3000);
    assert_eq!(cfg.server().reload_port, 35729);
}

#[test]
fn missing_source_root_is_rejected() {
    let project = TempProject::new();
    let paths = PathsSection {
        source: "does-not-exist".to_string(),
        ..PathsSection::default()
    };

    let err = PathConfig::resolve(&project.root(), &paths).unwrap_err();
    assert!(matches!(err, SitepipeError::ConfigError(_)), "got {err:?}");
}

#[test]
fn output_inside_source_is_rejected() {
    let project = TempProject::new();
    let paths = PathsSection {
        output: "src/build".to_string(),
        ..PathsSection::default()
    };

    let err = PathConfig::resolve(&project.root(), &paths).unwrap_err();
    assert!(matches!(err, SitepipeError::ConfigError(_)), "got {err:?}");
}

#[test]
fn paths_are_resolved_under_the_project_root() {
    let project = TempProject::new();
    let paths = project.paths();

    assert_eq!(paths.source(), project.source());
    assert_eq!(paths.output(), project.output());
    assert_eq!(paths.views(), project.src("views"));
    assert_eq!(paths.data(), project.src("data"));
    assert_eq!(
        paths.source_relative(&project.src("views/home.html")).as_deref(),
        Some("views/home.html")
    );
    assert_eq!(paths.source_relative(&project.out("index.html")), None);
}

#[test]
fn malformed_data_json_is_a_startup_error() {
    init_tracing();
    let project = TempProject::new();
    project.write("views/home.html", "<p>{{ page.title }}</p>");
    project.write("data/home.json", "{ \"title\": ");

    let cfg: ConfigFile = ConfigFileBuilder::new()
        .with_task(
            "html",
            TaskConfigBuilder::new(TaskKind::Markup, "views/*.html")
                .base("views")
                .build(),
        )
        .build();

    let err = TaskGraph::from_config(&cfg, project.paths()).unwrap_err();
    match err {
        SitepipeError::ConfigError(msg) => assert!(msg.contains("home.json"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}
