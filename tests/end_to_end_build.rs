use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use sitepipe::cli::{BuildOptions, CliArgs, Command};
use sitepipe::config::{ConfigFile, TaskKind};
use sitepipe::engine::TaskGraph;
use sitepipe::types::{ChangeEvent, ChangeKind};
use sitepipe::watch::settle_change;
use sitepipe_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use sitepipe_test_utils::project::TempProject;
use sitepipe_test_utils::{init_tracing, with_timeout};

const HOME: &str = r#"<!doctype html>
<html>
  <head>
    <title>{{ page.title }} | {{ _.site }}</title>
  </head>
  <body>
    <!-- navigation -->
    {% include "partials/_nav.html" %}
    <h1>{{ page.title }}</h1>
    <pre>  keep
   this  </pre>
  </body>
</html>
"#;

const ABOUT: &str = "<html><body>\n  <h1>About {{ _.site }}</h1>\n</body></html>\n";

fn site() -> TempProject {
    let project = TempProject::new();
    project.write("views/home.html", HOME);
    project.write("views/about.html", ABOUT);
    project.write("views/partials/_nav.html", "<nav>{{ _.site }}</nav>\n");
    project.write("data/_.json", r#"{ "site": "Demo" }"#);
    project.write("data/home.json", r#"{ "title": "Home" }"#);
    project
}

fn markup(rename_home: bool) -> ConfigFile {
    let mut task = TaskConfigBuilder::new(TaskKind::Markup, "views/*.html")
        .base("views")
        .watch("views/**/*.html")
        .watch("data/**/*.json");
    if rename_home {
        task = task.rename("home", "index");
    }
    ConfigFileBuilder::new().with_task("html", task.build()).build()
}

fn graph(project: &TempProject, cfg: &ConfigFile) -> TaskGraph {
    TaskGraph::from_config(cfg, project.paths()).expect("valid graph")
}

#[tokio::test]
async fn views_render_with_global_and_page_data() {
    init_tracing();
    let project = site();
    let graph = graph(&project, &markup(true));

    let results = with_timeout(graph.run_all()).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].success, "{:?}", results[0].error);

    let index = project.read_output("index.html");
    assert!(index.contains("<title>Home | Demo</title>"), "{index}");
    assert!(index.contains("<nav>Demo</nav>"), "{index}");
    assert!(index.contains("<h1>Home</h1>"), "{index}");
    assert!(!index.contains("<!--"), "{index}");
    assert!(!index.contains("\n    <h1>"), "{index}");
    assert!(index.contains("<pre>  keep\n   this  </pre>"), "{index}");

    // No page data: `page.title` is empty but rendering succeeds.
    let about = project.read_output("about.html");
    assert!(about.contains("<h1>About Demo</h1>"), "{about}");

    // Private partials are never rendered on their own.
    assert!(!project.output_exists("partials/_nav.html"));
}

#[tokio::test]
async fn rebuilding_unchanged_sources_is_byte_identical() {
    init_tracing();
    let project = site();
    let graph = graph(&project, &markup(true));

    with_timeout(graph.run_all()).await;
    let first = project.read_output_bytes("index.html");
    with_timeout(graph.run_all()).await;
    let second = project.read_output_bytes("index.html");

    assert_eq!(first, second);
}

#[tokio::test]
async fn entries_are_renamed_only_when_configured() {
    init_tracing();
    let project = site();
    let graph = graph(&project, &markup(false));

    with_timeout(graph.run_all()).await;
    assert!(project.output_exists("home.html"));
    assert!(!project.output_exists("index.html"));
}

#[tokio::test]
async fn data_changes_rebuild_only_their_views() {
    init_tracing();
    let project = site();
    let graph = graph(&project, &markup(true));
    with_timeout(graph.run_all()).await;

    project.write("data/home.json", r#"{ "title": "Welcome" }"#);
    let results =
        with_timeout(graph.run_one(ChangeEvent::modified(project.src("data/home.json")))).await;
    let written: BTreeSet<String> = results[0]
        .artifact_paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    assert_eq!(written, BTreeSet::from(["index.html".to_string()]));
    assert!(project.read_output("index.html").contains("<h1>Welcome</h1>"));

    project.write("data/_.json", r#"{ "site": "Renamed" }"#);
    let results =
        with_timeout(graph.run_one(ChangeEvent::modified(project.src("data/_.json")))).await;
    assert_eq!(results[0].artifact_paths.len(), 2);
    assert!(project.read_output("about.html").contains("About Renamed"));
}

#[tokio::test]
async fn partial_changes_rebuild_including_views() {
    init_tracing();
    let project = site();
    let graph = graph(&project, &markup(true));
    with_timeout(graph.run_all()).await;

    project.write("views/partials/_nav.html", "<nav>menu</nav>");
    let results = with_timeout(
        graph.run_one(ChangeEvent::modified(project.src("views/partials/_nav.html"))),
    )
    .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].artifact_paths.len(), 1);
    assert!(project.read_output("index.html").contains("<nav>menu</nav>"));
}

#[tokio::test]
async fn renamed_view_replaces_its_old_output() {
    init_tracing();
    let project = site();
    let graph = graph(&project, &markup(true));
    with_timeout(graph.run_all()).await;
    assert!(project.output_exists("about.html"));

    let old = project.src("views/about.html");
    let new = project.src("views/team.html");
    std::fs::rename(&old, &new).unwrap();

    // A single-event rename reports both names as modified.
    let changes = vec![
        ChangeEvent::new(old.clone(), settle_change(ChangeKind::Modified, &old)),
        ChangeEvent::new(new.clone(), settle_change(ChangeKind::Modified, &new)),
    ];
    assert_eq!(changes[0].kind, ChangeKind::Deleted);

    let results = with_timeout(graph.run_changes(&changes)).await;
    assert!(results[0].success, "{:?}", results[0].error);
    assert!(!project.output_exists("about.html"));
    assert!(project.read_output("team.html").contains("<h1>About Demo</h1>"));
}

#[tokio::test]
async fn template_errors_fail_the_task_without_stopping_other_views() {
    init_tracing();
    let project = site();
    project.write("views/broken.html", "<p>{% if %}</p>");
    let graph = graph(&project, &markup(true));

    let results = with_timeout(graph.run_all()).await;
    assert!(!results[0].success);
    let detail = results[0].error.as_ref().unwrap();
    assert!(detail.path.as_ref().unwrap().ends_with("views/broken.html"));
    assert_eq!(detail.failed_entries, 1);

    assert!(project.output_exists("index.html"));
    assert!(project.output_exists("about.html"));
}

#[tokio::test]
async fn incremental_tasks_skip_fresh_outputs() {
    init_tracing();
    let project = TempProject::new();
    project.write("assets/fonts/body.woff2", "font-a");
    project.write("assets/fonts/head.woff2", "font-b");

    let cfg = ConfigFileBuilder::new()
        .with_task(
            "fonts",
            TaskConfigBuilder::new(TaskKind::Copy, "assets/fonts/*")
                .base("assets")
                .incremental(true)
                .build(),
        )
        .build();
    let graph = graph(&project, &cfg);

    let first = with_timeout(graph.run_all()).await;
    assert_eq!(first[0].skipped, 0);
    assert_eq!(project.read_output("fonts/body.woff2"), "font-a");

    let second = with_timeout(graph.run_all()).await;
    assert!(second[0].success);
    assert_eq!(second[0].skipped, 2);
    assert!(second[0].artifact_paths.is_empty());

    // Make sure the new mtime is strictly newer on coarse filesystems.
    std::thread::sleep(Duration::from_millis(1100));
    project.write("assets/fonts/body.woff2", "font-c");
    let third = with_timeout(graph.run_all()).await;
    assert_eq!(third[0].skipped, 1);
    assert_eq!(project.read_output("fonts/body.woff2"), "font-c");
}

#[tokio::test]
async fn unchanged_content_is_filtered_when_hashing() {
    init_tracing();
    let project = TempProject::new();
    project.write("assets/js/app.js", "let a = 1;");

    let cfg = ConfigFileBuilder::new()
        .with_task(
            "scripts",
            TaskConfigBuilder::new(TaskKind::Copy, "assets/js/*.js")
                .use_hash(true)
                .build(),
        )
        .build();
    let graph = graph(&project, &cfg);
    let change = ChangeEvent::modified(project.src("assets/js/app.js"));

    assert_eq!(with_timeout(graph.run_one(change.clone())).await.len(), 1);
    assert!(with_timeout(graph.run_one(change.clone())).await.is_empty());

    project.write("assets/js/app.js", "let a = 2;");
    assert_eq!(with_timeout(graph.run_one(change)).await.len(), 1);
}

fn build_args(project: &TempProject) -> CliArgs {
    CliArgs {
        config: project.root().join("Sitepipe.toml").to_string_lossy().into_owned(),
        log_level: None,
        dry_run: false,
        command: Some(Command::Build(BuildOptions::default())),
    }
}

#[tokio::test]
async fn build_command_writes_the_site_and_cleans_stale_output() {
    init_tracing();
    let project = site();
    project.write_root(
        "Sitepipe.toml",
        r#"
[task.html]
kind = "markup"
input = ["views/*.html"]
base = "views"
rename = { home = "index" }
"#,
    );
    std::fs::create_dir_all(project.output()).unwrap();
    std::fs::write(project.out("stale.html"), "old").unwrap();

    let ok = with_timeout(sitepipe::run(build_args(&project))).await.unwrap();

    assert!(ok);
    assert!(project.output_exists("index.html"));
    assert!(!project.output_exists("stale.html"));
}

#[tokio::test]
async fn default_pipeline_builds_a_site_without_a_config_file() {
    init_tracing();
    let project = site();
    project.write("views/partials/menu.html", "<ul><li>menu</li></ul>");
    project.write(
        "views/contact.html",
        "<html><body>{{ inline_image(\"dot.svg\") }}{% include \"partials/menu.html\" %}</body></html>",
    );
    project.write("assets/images/dot.svg", "<svg><circle r=\"1\"></circle></svg>");
    project.write("assets/sass/_vars.scss", "$ink: #333;\n");
    project.write("assets/sass/main.scss", "@import \"vars\";\nbody { color: $ink; }\n");
    project.write("assets/js/_util.js", "export const answer = 42;\n");
    project.write(
        "assets/js/app.js",
        "import { answer } from './_util';\nconsole.log(answer);\n",
    );

    let ok = with_timeout(sitepipe::run(build_args(&project))).await.unwrap();
    assert!(ok);

    // `views/*.html` does not reach into subdirectories.
    assert!(project.output_exists("index.html"));
    assert!(!project.output_exists("partials/menu.html"));
    assert!(!project.output_exists("partials/_nav.html"));

    let contact = project.read_output("contact.html");
    assert!(contact.contains("<svg"), "{contact}");
    assert!(contact.contains("<li>menu</li>"), "{contact}");
    assert!(project.output_exists("images/dot.svg"));

    assert!(project.read_output("css/main.min.css").contains("color:#333"));
    assert!(project.output_exists("maps/main.min.css.map"));

    let js = project.read_output("js/app.min.js");
    assert!(!js.contains("import"), "{js}");
    assert!(!project.output_exists("js/_util.min.js"));
}

#[tokio::test]
async fn build_command_reports_failure() {
    init_tracing();
    let project = site();
    project.write("views/broken.html", "{% endfor %}");
    project.write_root(
        "Sitepipe.toml",
        "[task.html]\nkind = \"markup\"\ninput = [\"views/*.html\"]\nbase = \"views\"\n",
    );

    let ok = with_timeout(sitepipe::run(build_args(&project))).await.unwrap();
    assert!(!ok);
}

#[tokio::test]
async fn invalid_config_fails_before_building() {
    init_tracing();
    let project = site();
    project.write_root(
        "Sitepipe.toml",
        r#"
[task.a]
kind = "copy"
input = ["a/*"]
after = ["b"]

[task.b]
kind = "copy"
input = ["b/*"]
after = ["a"]
"#,
    );

    let ok = with_timeout(sitepipe::run(build_args(&project))).await.unwrap();
    assert!(!ok);
    assert!(!project.output().exists());
}

#[tokio::test]
async fn dry_run_builds_nothing() {
    init_tracing();
    let project = site();
    let mut args = build_args(&project);
    args.dry_run = true;

    let ok = with_timeout(sitepipe::run(args)).await.unwrap();
    assert!(ok);
    assert!(!project.output().exists());
}

#[test]
fn shared_graph_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Arc<TaskGraph>>();
}
