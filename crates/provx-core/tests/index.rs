mod common;

use std::fs;
use std::sync::Arc;

use provx_core::{
    encode_index, load_index, IndexHandle, ProfileIndex, ReconcileKind, SaveOutcome,
    CURRENT_INDEX_VERSION,
};
use time::OffsetDateTime;

use common::{counting_loader, set_mtime, Fixture, Workspace};

fn names(index: &ProfileIndex) -> Vec<String> {
    index
        .records()
        .iter()
        .map(|record| record.name.clone())
        .collect()
}

fn seed(workspace: &Workspace) {
    Fixture::new("Alpha", "u-a")
        .created_days_ago(30)
        .write(&workspace.profiles, "a.mobileprovision", 1);
    Fixture::new("Beta", "u-b")
        .created_days_ago(10)
        .write(&workspace.profiles, "b.mobileprovision", 2);
    Fixture::new("Gamma", "u-c")
        .created_days_ago(20)
        .platforms(&["OSX"])
        .write(&workspace.profiles, "c.provisionprofile", 3);
    workspace.settle(10);
}

#[test]
fn first_open_builds_sorted_index_and_saves_it() {
    let workspace = Workspace::new();
    seed(&workspace);
    let (loader, calls) = counting_loader();
    let handle = workspace.handle(loader);

    let reconciled = handle.refresh();
    assert_eq!(reconciled.report.kind, ReconcileKind::Rebuilt);
    assert_eq!(reconciled.report.added, 3);
    assert_eq!(reconciled.report.save, Some(SaveOutcome::Saved));
    assert_eq!(calls.get(), 3);
    assert_eq!(names(&reconciled.index), ["Beta", "Gamma", "Alpha"]);
    assert_eq!(reconciled.index.version(), CURRENT_INDEX_VERSION);

    let on_disk = load_index(&workspace.cache).expect("saved index");
    assert_eq!(on_disk, *reconciled.index);
}

#[test]
fn reopening_unchanged_directories_parses_nothing() {
    let workspace = Workspace::new();
    seed(&workspace);
    let (loader, calls) = counting_loader();
    let first = workspace.handle(loader.clone()).snapshot();
    assert_eq!(calls.get(), 3);

    let reopened = workspace.handle(loader);
    let reconciled = reopened.refresh();
    assert_eq!(reconciled.report.kind, ReconcileKind::Fresh);
    assert_eq!(reconciled.report.save, None);
    assert_eq!(calls.get(), 3);
    assert_eq!(*reconciled.index, *first);

    let again = reopened.refresh();
    assert_eq!(again.report.kind, ReconcileKind::Fresh);
    assert!(Arc::ptr_eq(&reconciled.index, &again.index));
}

#[test]
fn rewritten_file_replaces_only_its_record() {
    let workspace = Workspace::new();
    seed(&workspace);
    let (loader, calls) = counting_loader();
    let handle = workspace.handle(loader);
    let before = handle.snapshot();

    Fixture::new("Beta Renewed", "u-b2")
        .created_days_ago(1)
        .write(&workspace.profiles, "b.mobileprovision", 50);

    let reconciled = handle.refresh();
    assert_eq!(reconciled.report.kind, ReconcileKind::Synced);
    assert_eq!(reconciled.report.parsed, 1);
    assert_eq!(reconciled.report.replaced, 1);
    assert_eq!(reconciled.report.removed, 0);
    assert_eq!(calls.get(), 4);
    assert_eq!(names(&reconciled.index), ["Beta Renewed", "Gamma", "Alpha"]);

    let untouched = |name: &str| {
        let old = before.records().iter().find(|r| r.name == name).expect("old");
        let new = reconciled
            .index
            .records()
            .iter()
            .find(|r| r.name == name)
            .expect("new");
        assert_eq!(old, new);
    };
    untouched("Alpha");
    untouched("Gamma");
}

#[test]
fn deleted_file_removes_only_its_record() {
    let workspace = Workspace::new();
    seed(&workspace);
    let (loader, calls) = counting_loader();
    let handle = workspace.handle(loader);
    handle.snapshot();

    fs::remove_file(workspace.profiles.join("c.provisionprofile")).expect("remove");
    let reconciled = handle.refresh();
    assert_eq!(reconciled.report.kind, ReconcileKind::Synced);
    assert_eq!(reconciled.report.removed, 1);
    assert_eq!(reconciled.report.parsed, 0);
    assert_eq!(calls.get(), 3);
    assert_eq!(names(&reconciled.index), ["Beta", "Alpha"]);
}

#[test]
fn new_file_is_added_in_creation_order() {
    let workspace = Workspace::new();
    seed(&workspace);
    let (loader, calls) = counting_loader();
    let handle = workspace.handle(loader);
    handle.snapshot();

    Fixture::new("Delta", "u-d")
        .created_days_ago(15)
        .write(&workspace.profiles, "d.mobileprovision", 4);
    workspace.settle(60);

    let reconciled = handle.refresh();
    assert_eq!(reconciled.report.added, 1);
    assert_eq!(calls.get(), 4);
    assert_eq!(names(&reconciled.index), ["Beta", "Delta", "Gamma", "Alpha"]);
}

#[test]
fn cache_from_another_version_is_rebuilt() {
    let workspace = Workspace::new();
    seed(&workspace);
    fs::create_dir_all(workspace.cache.parent().expect("parent")).expect("cache dir");
    let stale = ProfileIndex::new(CURRENT_INDEX_VERSION - 1, OffsetDateTime::now_utc());
    fs::write(&workspace.cache, encode_index(&stale).expect("encode")).expect("write stale");

    let (loader, calls) = counting_loader();
    let reconciled = workspace.handle(loader).refresh();
    assert_eq!(reconciled.report.kind, ReconcileKind::Rebuilt);
    assert_eq!(calls.get(), 3);
    assert_eq!(
        load_index(&workspace.cache).expect("rewritten").version(),
        CURRENT_INDEX_VERSION
    );
}

#[test]
fn truncated_cache_is_rebuilt() {
    let workspace = Workspace::new();
    seed(&workspace);
    let (loader, _) = counting_loader();
    workspace.handle(loader).snapshot();

    let bytes = fs::read(&workspace.cache).expect("cache");
    fs::write(&workspace.cache, &bytes[..bytes.len() / 2]).expect("truncate");

    let (loader, calls) = counting_loader();
    let reconciled = workspace.handle(loader).refresh();
    assert_eq!(reconciled.report.kind, ReconcileKind::Rebuilt);
    assert_eq!(calls.get(), 3);
    assert_eq!(reconciled.index.len(), 3);
}

#[test]
fn unparseable_files_are_skipped() {
    let workspace = Workspace::new();
    seed(&workspace);
    fs::write(workspace.profiles.join("junk.mobileprovision"), b"not a profile").expect("junk");
    fs::write(workspace.profiles.join("notes.txt"), b"ignored").expect("notes");
    workspace.settle(20);

    let (loader, _) = counting_loader();
    let reconciled = workspace.handle(loader).refresh();
    assert_eq!(reconciled.report.failed, 1);
    assert_eq!(reconciled.index.len(), 3);
}

#[test]
fn rewrite_that_no_longer_parses_drops_the_record() {
    let workspace = Workspace::new();
    seed(&workspace);
    let (loader, _) = counting_loader();
    let handle = workspace.handle(loader);
    handle.snapshot();

    let path = workspace.profiles.join("a.mobileprovision");
    fs::write(&path, b"garbage").expect("overwrite");
    set_mtime(&path, 70);

    let reconciled = handle.refresh();
    assert_eq!(reconciled.report.failed, 1);
    assert_eq!(names(&reconciled.index), ["Beta", "Gamma"]);
}

#[test]
fn missing_directories_contribute_nothing() {
    let workspace = Workspace::new();
    seed(&workspace);
    let (loader, _) = counting_loader();
    let handle = IndexHandle::with_loader(
        vec![
            workspace.temp.path().join("does-not-exist"),
            workspace.profiles.clone(),
        ],
        workspace.cache.clone(),
        loader,
    );
    assert_eq!(handle.snapshot().len(), 3);
}

#[test]
fn forced_rebuild_reparses_everything() {
    let workspace = Workspace::new();
    seed(&workspace);
    let (loader, calls) = counting_loader();
    let handle = workspace.handle(loader);
    let first = handle.snapshot();

    let rebuilt = handle.rebuild();
    assert_eq!(rebuilt.report.kind, ReconcileKind::Rebuilt);
    assert_eq!(calls.get(), 6);
    assert_eq!(*rebuilt.index, *first);
}

#[test]
fn failed_save_keeps_the_index_and_retries_on_the_next_refresh() {
    let workspace = Workspace::new();
    Fixture::new("Alpha", "u-a").write(&workspace.profiles, "a.mobileprovision", 1);
    workspace.settle(10);
    let blocker = workspace.temp.path().join("blocker");
    fs::write(&blocker, b"not a directory").expect("write blocker");
    let cache = blocker.join("Provisioning Profiles.index");
    let (loader, calls) = counting_loader();
    let handle = IndexHandle::with_loader(vec![workspace.profiles.clone()], cache.clone(), loader);

    let first = handle.refresh();
    assert_eq!(first.report.kind, ReconcileKind::Rebuilt);
    assert_eq!(first.report.save, Some(SaveOutcome::Failed));
    assert_eq!(names(&first.index), ["Alpha"]);
    assert!(!cache.exists());

    fs::remove_file(&blocker).expect("remove blocker");
    let second = handle.refresh();
    assert_eq!(second.report.kind, ReconcileKind::Fresh);
    assert_eq!(second.report.save, Some(SaveOutcome::Saved));
    assert_eq!(calls.get(), 1);
    assert!(Arc::ptr_eq(&first.index, &second.index));
    assert_eq!(load_index(&cache).expect("saved index"), *second.index);

    let third = handle.refresh();
    assert_eq!(third.report.kind, ReconcileKind::Fresh);
    assert_eq!(third.report.save, None);
}

#[test]
fn deleted_cache_file_is_rewritten_without_reparsing() {
    let workspace = Workspace::new();
    seed(&workspace);
    let (loader, calls) = counting_loader();
    let handle = workspace.handle(loader);
    let first = handle.refresh();
    assert_eq!(first.report.save, Some(SaveOutcome::Saved));

    fs::remove_file(&workspace.cache).expect("remove cache");
    let second = handle.refresh();
    assert_eq!(second.report.kind, ReconcileKind::Fresh);
    assert_eq!(second.report.save, Some(SaveOutcome::Saved));
    assert_eq!(calls.get(), 3);
    assert_eq!(load_index(&workspace.cache).expect("rewritten index"), *first.index);
}
