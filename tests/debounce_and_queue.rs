use std::path::PathBuf;
use std::time::{Duration, Instant};

use sitepipe::engine::ChangeQueue;
use sitepipe::types::{ChangeEvent, ChangeKind};
use sitepipe::watch::Debouncer;

const WINDOW: Duration = Duration::from_millis(100);

fn p(name: &str) -> PathBuf {
    PathBuf::from("/site/src").join(name)
}

#[test]
fn burst_of_events_becomes_one_batch() {
    let start = Instant::now();
    let mut debouncer = Debouncer::new(WINDOW);

    for i in 0..20u64 {
        let now = start + Duration::from_millis(i * 10);
        debouncer.push(p("views/home.html"), ChangeKind::Modified, now);
        debouncer.push(p("assets/sass/main.scss"), ChangeKind::Modified, now);
    }
    let last = start + Duration::from_millis(190);

    // Still inside the quiet window.
    assert!(debouncer.take_if_ready(last + Duration::from_millis(50)).is_none());

    let batch = debouncer
        .take_if_ready(last + WINDOW)
        .expect("quiet window elapsed");
    assert_eq!(batch.len(), 2);
    assert!(batch.iter().all(|c| c.kind == ChangeKind::Modified));
    assert!(debouncer.is_empty());

    // Nothing left for the next tick.
    assert!(debouncer.take_if_ready(last + WINDOW * 3).is_none());
}

#[test]
fn every_event_restarts_the_window() {
    let start = Instant::now();
    let mut debouncer = Debouncer::new(WINDOW);

    debouncer.push(p("a.html"), ChangeKind::Modified, start);
    assert_eq!(debouncer.time_until_ready(start), Some(WINDOW));

    let later = start + Duration::from_millis(80);
    debouncer.push(p("b.html"), ChangeKind::Modified, later);
    assert!(!debouncer.is_ready(start + WINDOW));
    assert_eq!(
        debouncer.time_until_ready(start + WINDOW),
        Some(Duration::from_millis(80))
    );
    assert!(debouncer.is_ready(later + WINDOW));
}

#[test]
fn time_until_ready_is_none_when_idle() {
    let debouncer = Debouncer::new(WINDOW);
    assert_eq!(debouncer.time_until_ready(Instant::now()), None);
    assert!(!debouncer.is_ready(Instant::now()));
}

#[test]
fn created_then_deleted_cancels_out() {
    let now = Instant::now();
    let mut debouncer = Debouncer::new(WINDOW);

    debouncer.push(p("tmp.html"), ChangeKind::Created, now);
    debouncer.push(p("tmp.html"), ChangeKind::Modified, now);
    debouncer.push(p("tmp.html"), ChangeKind::Deleted, now);

    assert!(debouncer.is_empty());
    assert!(debouncer.take_if_ready(now + WINDOW).is_none());
}

#[test]
fn change_kinds_merge_per_path() {
    use ChangeKind::*;

    assert_eq!(Deleted.merge(Created), Some(Created));
    assert_eq!(Deleted.merge(Modified), Some(Created));
    assert_eq!(Modified.merge(Deleted), Some(Deleted));
    assert_eq!(Created.merge(Deleted), None);
    assert_eq!(Created.merge(Modified), Some(Created));
    assert_eq!(Modified.merge(Modified), Some(Modified));
}

#[test]
fn queue_merges_batches_arriving_during_a_run() {
    let mut queue = ChangeQueue::new();
    assert!(queue.is_empty());

    queue.record(vec![
        ChangeEvent::modified(p("views/home.html")),
        ChangeEvent::new(p("views/new.html"), ChangeKind::Created),
    ]);
    queue.record(vec![
        ChangeEvent::modified(p("views/home.html")),
        ChangeEvent::new(p("views/new.html"), ChangeKind::Deleted),
        ChangeEvent::new(p("assets/js/app.js"), ChangeKind::Deleted),
    ]);
    queue.record(vec![ChangeEvent::modified(p("views/home.html"))]);

    assert_eq!(queue.len(), 2);
    let drained = queue.drain();
    assert!(queue.is_empty());

    let summary: Vec<(PathBuf, ChangeKind)> =
        drained.into_iter().map(|c| (c.path, c.kind)).collect();
    assert_eq!(
        summary,
        vec![
            (p("assets/js/app.js"), ChangeKind::Deleted),
            (p("views/home.html"), ChangeKind::Modified),
        ]
    );
}
