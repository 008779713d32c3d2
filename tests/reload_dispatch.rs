use std::path::PathBuf;

use serde_json::json;
use sitepipe::engine::dispatch_results;
use sitepipe::errors::ErrorDetail;
use sitepipe::serve::reload::reload_message;
use sitepipe::types::{ArtifactKind, BuildResult};
use sitepipe_test_utils::fakes::{RecordingReloader, RecordingSink};

fn success(task: &str, kind: ArtifactKind, paths: &[&str]) -> BuildResult {
    let mut result = BuildResult::succeeded(task, kind);
    result.artifact_paths = paths.iter().map(PathBuf::from).collect();
    result
}

#[test]
fn failures_never_reach_the_reload_channel() {
    let sink = RecordingSink::new();
    let reloader = RecordingReloader::new();

    let results = vec![
        success("styles", ArtifactKind::Style, &["css/main.min.css"]),
        BuildResult::failed("html", ArtifactKind::Markup, ErrorDetail::panic("boom")),
        BuildResult::failed("images", ArtifactKind::Image, ErrorDetail::blocked("html")),
    ];

    dispatch_results(&results, Some(&reloader), &sink);

    let reloads = reloader.reloads();
    assert_eq!(reloads.len(), 1);
    assert_eq!(reloads[0].task_name, "styles");

    assert_eq!(sink.reported_tasks(), vec!["html", "images"]);
    let errors: Vec<String> = reloader.errors().into_iter().map(|(t, _)| t).collect();
    assert_eq!(errors, vec!["html", "images"]);
}

#[test]
fn failure_without_detail_is_still_reported() {
    let sink = RecordingSink::new();
    let mut result = BuildResult::succeeded("scripts", ArtifactKind::Script);
    result.success = false;

    dispatch_results(&[result], None, &sink);

    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "scripts");
    assert!(!reports[0].1.message.is_empty());
}

#[test]
fn successes_without_reloader_are_quiet() {
    let sink = RecordingSink::new();
    dispatch_results(
        &[success("html", ArtifactKind::Markup, &["index.html"])],
        None,
        &sink,
    );
    assert!(sink.reports().is_empty());
}

#[test]
fn stylesheet_results_swap_in_place() {
    let result = success(
        "styles",
        ArtifactKind::Style,
        &["css/main.min.css", "maps/main.min.css.map", "css/print.min.css"],
    );
    assert_eq!(
        reload_message(&result),
        json!({ "type": "css", "paths": ["/css/main.min.css", "/css/print.min.css"] })
    );
}

#[test]
fn other_results_reload_the_page() {
    for kind in [
        ArtifactKind::Markup,
        ArtifactKind::Script,
        ArtifactKind::Image,
        ArtifactKind::Static,
    ] {
        let result = success("t", kind, &["index.html"]);
        assert_eq!(reload_message(&result), json!({ "type": "reload" }), "{kind:?}");
    }

    // A style task that only removed maps has nothing to swap.
    let result = success("styles", ArtifactKind::Style, &["maps/old.min.css.map"]);
    assert_eq!(reload_message(&result), json!({ "type": "reload" }));
}
