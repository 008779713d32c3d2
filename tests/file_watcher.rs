use std::path::Path;
use std::time::Duration;

use notify::event::{CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind, RenameMode};
use notify::EventKind;
use sitepipe::engine::RuntimeEvent;
use sitepipe::types::ChangeKind;
use sitepipe::watch::path_utils::{is_temp_file, relative_str};
use sitepipe::watch::{classify_event, settle_change, spawn_watcher};
use sitepipe_test_utils::init_tracing;
use sitepipe_test_utils::project::TempProject;
use tokio::sync::mpsc;

#[test]
fn notify_kinds_map_to_change_kinds() {
    assert_eq!(
        classify_event(&EventKind::Create(CreateKind::File)),
        Some(ChangeKind::Created)
    );
    assert_eq!(
        classify_event(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
        Some(ChangeKind::Modified)
    );
    assert_eq!(
        classify_event(&EventKind::Remove(RemoveKind::File)),
        Some(ChangeKind::Deleted)
    );
    assert_eq!(
        classify_event(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime))),
        None
    );
    assert_eq!(classify_event(&EventKind::Any), None);
}

#[test]
fn renames_delete_the_old_name_and_create_the_new_one() {
    assert_eq!(
        classify_event(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
        Some(ChangeKind::Deleted)
    );
    assert_eq!(
        classify_event(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
        Some(ChangeKind::Created)
    );

    let project = TempProject::new();
    let kept = project.write("views/new.html", "x");
    let gone = project.src("views/old.html");
    let both = classify_event(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))).unwrap();
    assert_eq!(settle_change(both, &gone), ChangeKind::Deleted);
    assert_eq!(settle_change(both, &kept), ChangeKind::Modified);
    assert_eq!(settle_change(ChangeKind::Created, &gone), ChangeKind::Deleted);
    assert_eq!(settle_change(ChangeKind::Deleted, &kept), ChangeKind::Deleted);
}

#[test]
fn editor_temp_files_are_ignored() {
    for name in [".home.html.swp", "home.html~", "#home.html#", "4913", "x.tmp", ".DS_Store"] {
        assert!(is_temp_file(Path::new(name)), "{name}");
    }
    assert!(!is_temp_file(Path::new("views/home.html")));
    assert!(!is_temp_file(Path::new("assets/sass/_vars.scss")));
}

#[test]
fn relative_paths_survive_deleted_files() {
    let project = TempProject::new();
    let path = project.write("views/gone.html", "x");
    std::fs::remove_file(&path).unwrap();

    assert_eq!(
        relative_str(&project.source(), &path).as_deref(),
        Some("views/gone.html")
    );
    assert_eq!(relative_str(&project.source(), Path::new("/elsewhere/x")), None);
}

#[tokio::test]
async fn saves_arrive_as_one_debounced_batch() {
    init_tracing();
    let project = TempProject::new();
    project.write("views/home.html", "v0");

    let (tx, mut rx) = mpsc::channel(8);
    let _watcher = spawn_watcher(project.source(), Duration::from_millis(150), tx).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    for i in 1..=5 {
        project.write("views/home.html", format!("v{i}"));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    project.write("views/.home.html.swp", "swap");

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("batch within timeout")
        .expect("watcher alive");

    let RuntimeEvent::FilesChanged(batch) = event else {
        panic!("expected a change batch, got {event:?}");
    };
    let home = project.src("views/home.html");
    assert_eq!(batch.iter().filter(|c| c.path == home).count(), 1, "{batch:?}");
    assert!(batch.iter().all(|c| !is_temp_file(&c.path)), "{batch:?}");
}

#[tokio::test]
async fn renamed_file_arrives_as_delete_plus_create() {
    init_tracing();
    let project = TempProject::new();
    let old = project.write("views/old.html", "page");
    let new = project.src("views/new.html");

    let (tx, mut rx) = mpsc::channel(8);
    let _watcher = spawn_watcher(project.source(), Duration::from_millis(150), tx).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    std::fs::rename(&old, &new).unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("batch within timeout")
        .expect("watcher alive");
    let RuntimeEvent::FilesChanged(batch) = event else {
        panic!("expected a change batch, got {event:?}");
    };

    let kind_of = |path: &Path| batch.iter().find(|c| c.path == path).map(|c| c.kind);
    assert_eq!(kind_of(&old), Some(ChangeKind::Deleted), "{batch:?}");
    assert_ne!(kind_of(&new), Some(ChangeKind::Deleted), "{batch:?}");
    assert!(kind_of(&new).is_some(), "{batch:?}");
}
