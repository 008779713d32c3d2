use sitepipe::types::{ChangeEvent, ChangeKind, HashStorageMode};
use sitepipe::watch::{ContentFilter, FileHashStore, HashStore, MemoryHashStore, HASH_FILE_PATH};
use sitepipe_test_utils::project::TempProject;

#[test]
fn unchanged_rewrite_is_dropped() {
    let project = TempProject::new();
    let path = project.write("views/home.html", "<p>hi</p>");
    let mut filter = ContentFilter::new(Box::new(MemoryHashStore::new()));
    let event = ChangeEvent::modified(&path);

    assert!(filter.content_changed("views/home.html", &event));
    assert!(!filter.content_changed("views/home.html", &event));

    project.write("views/home.html", "<p>hello</p>");
    assert!(filter.content_changed("views/home.html", &event));
}

#[test]
fn creations_and_deletions_always_count() {
    let project = TempProject::new();
    let path = project.write("views/home.html", "<p>hi</p>");
    let mut filter = ContentFilter::new(Box::new(MemoryHashStore::new()));

    assert!(filter.content_changed("views/home.html", &ChangeEvent::modified(&path)));
    assert!(filter.content_changed(
        "views/home.html",
        &ChangeEvent::new(&path, ChangeKind::Created)
    ));

    project.remove("views/home.html");
    assert!(filter.content_changed(
        "views/home.html",
        &ChangeEvent::new(&path, ChangeKind::Deleted)
    ));

    // The stored hash went with the deletion, so a restore counts again.
    project.write("views/home.html", "<p>hi</p>");
    assert!(filter.content_changed("views/home.html", &ChangeEvent::modified(&path)));
}

#[test]
fn unreadable_file_counts_as_changed() {
    let project = TempProject::new();
    let mut filter = ContentFilter::new(Box::new(MemoryHashStore::new()));
    let missing = project.src("views/ghost.html");

    assert!(filter.content_changed("views/ghost.html", &ChangeEvent::modified(&missing)));
    assert!(filter.content_changed("views/ghost.html", &ChangeEvent::modified(&missing)));
}

#[test]
fn file_store_survives_reopen() {
    let project = TempProject::new();
    let path = project.write("assets/js/app.js", "let a = 1;");
    let event = ChangeEvent::modified(&path);

    {
        let mut filter = ContentFilter::for_mode(HashStorageMode::File, &project.root()).unwrap();
        assert!(filter.content_changed("assets/js/app.js", &event));
    }
    assert!(project.root().join(HASH_FILE_PATH).is_file());

    let mut filter = ContentFilter::for_mode(HashStorageMode::File, &project.root()).unwrap();
    assert!(!filter.content_changed("assets/js/app.js", &event));
}

#[test]
fn file_store_handles_keys_with_spaces() {
    let project = TempProject::new();

    {
        let mut store = FileHashStore::open(project.root()).unwrap();
        store.save("views/my page.html", "abc123").unwrap();
        store.save("views/other.html", "def456").unwrap();
        store.remove("views/other.html").unwrap();
    }

    let store = FileHashStore::open(project.root()).unwrap();
    assert_eq!(
        store.load("views/my page.html").unwrap().as_deref(),
        Some("abc123")
    );
    assert_eq!(store.load("views/other.html").unwrap(), None);
}
