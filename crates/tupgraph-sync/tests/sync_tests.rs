use std::fs;

use tempfile::TempDir;
use tupgraph_sync::{
    EntityId, EntityKind, FileTracker, GraphError, MemoryStore, Mtime, NodeStore, PathState,
    Resolution, ResolveMode, SourceLink, TrackerConfig, Variant, WarningKind, WorkList,
};

const ROOT: EntityId = EntityId::PROJECT_ROOT;

fn tracker() -> FileTracker<MemoryStore> {
    FileTracker::new(MemoryStore::new(), TrackerConfig::new("/work/project"))
}

fn insert(
    tracker: &mut FileTracker<MemoryStore>,
    parent: EntityId,
    name: &str,
    kind: EntityKind,
) -> EntityId {
    tracker
        .store_mut()
        .insert_entity(parent, name, kind, Mtime::new(10, 0), SourceLink::None)
        .unwrap()
        .id
}

fn kind_of(tracker: &FileTracker<MemoryStore>, id: EntityId) -> Option<EntityKind> {
    tracker.store().get(id).unwrap().map(|e| e.kind)
}

#[test]
fn test_ghosts_and_groups_survive_deletion() {
    let mut tracker = tracker();
    let ghost = insert(&mut tracker, ROOT, "missing.h", EntityKind::Ghost);
    let group = insert(&mut tracker, ROOT, "<libs>", EntityKind::Group);

    assert!(!tracker.observe_missing(ROOT, "missing.h").unwrap());
    assert!(!tracker.delete_forced(group, EntityKind::Group).unwrap());
    assert!(!tracker.delete_forced(ghost, EntityKind::Ghost).unwrap());

    assert_eq!(kind_of(&tracker, ghost), Some(EntityKind::Ghost));
    assert_eq!(kind_of(&tracker, group), Some(EntityKind::Group));
}

#[test]
fn test_real_file_makes_generated_chain_normal_for_good() {
    let mut tracker = tracker();
    let (res, _) = tracker
        .resolve_dir(ROOT, "out/gen/obj.o", ResolveMode::CreateDirs, false)
        .unwrap();
    let gen_dir = res.id().unwrap();
    let out = tracker.lookup_path(ROOT, "out").unwrap().unwrap().id;
    assert_eq!(kind_of(&tracker, out), Some(EntityKind::GeneratedDir));

    tracker
        .observe_change(gen_dir, "README", Mtime::new(5, 0), false, false)
        .unwrap();
    assert_eq!(kind_of(&tracker, gen_dir), Some(EntityKind::Dir));
    assert_eq!(kind_of(&tracker, out), Some(EntityKind::Dir));

    // Removing the file does not turn them back
    assert!(tracker.observe_missing(gen_dir, "README").unwrap());
    assert_eq!(kind_of(&tracker, gen_dir), Some(EntityKind::Dir));
    assert_eq!(kind_of(&tracker, out), Some(EntityKind::Dir));
}

#[test]
fn test_observe_change_is_idempotent() {
    let mut tracker = tracker();
    let mtime = Mtime::new(1_700_000_000, 42);

    let first = tracker.observe_change(ROOT, "main.c", mtime, false, false).unwrap();
    let second = tracker.observe_change(ROOT, "main.c", mtime, false, false).unwrap();

    assert!(first.modified);
    assert!(!second.modified);
    assert_eq!(first.id, second.id);
    assert!(!tracker.store().is_queued(WorkList::Modify, first.id).unwrap());
}

#[test]
fn test_directory_subtree_is_emptied_first() {
    let mut tracker = tracker();
    let src = insert(&mut tracker, ROOT, "src", EntityKind::Dir);
    let lib = insert(&mut tracker, src, "lib", EntityKind::Dir);
    let util = insert(&mut tracker, lib, "util", EntityKind::Dir);
    let file = insert(&mut tracker, util, "util.c", EntityKind::File);
    let mut removed_rx = tracker.subscribe();

    assert!(tracker.observe_missing(ROOT, "src").unwrap());

    assert_eq!(removed_rx.try_recv().unwrap(), util);
    assert_eq!(removed_rx.try_recv().unwrap(), lib);
    assert_eq!(removed_rx.try_recv().unwrap(), src);
    assert!(removed_rx.try_recv().is_err());

    for id in [src, lib, util, file] {
        assert!(!tracker.store().contains(id));
    }
    assert!(tracker.store().is_queued(WorkList::Create, ROOT).unwrap());
}

#[test]
fn test_config_file_becomes_ghost() {
    let mut tracker = tracker();
    let seen = tracker
        .observe_change(ROOT, "tup.config", Mtime::new(9, 0), false, false)
        .unwrap();
    assert_eq!(tracker.store_mut().drain(WorkList::Config), vec![seen.id]);

    tracker.observe_missing(ROOT, "tup.config").unwrap();

    assert_eq!(kind_of(&tracker, seen.id), Some(EntityKind::Ghost));
    assert_eq!(tracker.store().queued(WorkList::Config), vec![seen.id]);
}

#[test]
fn test_config_file_in_subdirectory_is_plain() {
    let mut tracker = tracker();
    let sub = insert(&mut tracker, ROOT, "sub", EntityKind::Dir);
    let seen = tracker
        .observe_change(sub, "tup.config", Mtime::new(9, 0), false, false)
        .unwrap();
    assert!(tracker.store().queued(WorkList::Config).is_empty());

    tracker.observe_missing(sub, "tup.config").unwrap();
    assert!(!tracker.store().contains(seen.id));
}

#[test]
fn test_output_path_scenario() {
    let mut tracker = tracker();
    let seen = tracker
        .observe_change_at(ROOT, "a/b/out.txt", ResolveMode::CreateDirs, Mtime::new(100, 0), false, false)
        .unwrap()
        .unwrap();

    let a = tracker.lookup_path(ROOT, "a").unwrap().unwrap();
    let b = tracker.lookup_path(ROOT, "a/b").unwrap().unwrap();
    assert_eq!(a.kind, EntityKind::Dir);
    assert_eq!(b.kind, EntityKind::Dir);
    assert_eq!(kind_of(&tracker, seen.id), Some(EntityKind::File));
    assert_eq!(tracker.entity_path(seen.id).unwrap(), "a/b/out.txt");
    assert!(tracker.store().is_queued(WorkList::Create, b.id).unwrap());
}

#[test]
fn test_deleted_output_warns_once() {
    let mut tracker = tracker();
    let out = insert(&mut tracker, ROOT, "out.txt", EntityKind::GeneratedFile);
    let cmd = tracker.create_command(ROOT, "cp in.txt out.txt").unwrap();
    tracker.store_mut().link_command(cmd, &[], &[out]).unwrap();

    assert!(tracker.observe_missing(ROOT, "out.txt").unwrap());
    assert_eq!(kind_of(&tracker, out), Some(EntityKind::GeneratedFile));
    assert!(tracker.store().is_queued(WorkList::Modify, cmd).unwrap());
    assert!(!tracker.store().is_queued(WorkList::Modify, out).unwrap());

    let warnings = tracker.take_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::GeneratedFileDeleted);
    assert!(warnings[0].message.contains("out.txt"));

    assert!(!tracker.observe_missing(ROOT, "out.txt").unwrap());
    assert!(tracker.warnings().is_empty());
}

#[test]
fn test_transient_output_is_silent() {
    let mut tracker = tracker();
    let out = insert(&mut tracker, ROOT, "tmp.o", EntityKind::GeneratedFile);
    let cmd = tracker.create_command(ROOT, "gcc -c x.c -o tmp.o").unwrap();
    tracker.store_mut().link_command(cmd, &[], &[out]).unwrap();
    tracker.store_mut().mark_transient(out);

    assert!(!tracker.observe_missing(ROOT, "tmp.o").unwrap());
    assert!(tracker.warnings().is_empty());
    assert!(tracker.store().is_queued(WorkList::Modify, cmd).unwrap());
}

#[test]
fn test_modified_output_warns() {
    let mut tracker = tracker();
    let out = insert(&mut tracker, ROOT, "out.txt", EntityKind::GeneratedFile);
    let cmd = tracker.create_command(ROOT, "cp in.txt out.txt").unwrap();
    tracker.store_mut().link_command(cmd, &[], &[out]).unwrap();

    let seen = tracker
        .observe_change(ROOT, "out.txt", Mtime::new(11, 0), false, true)
        .unwrap();

    assert!(seen.modified);
    let warnings = tracker.take_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::GeneratedFileModified);
}

#[test]
fn test_source_removal_marks_variant_shadow() {
    let mut tracker = tracker();
    let src = insert(&mut tracker, ROOT, "src", EntityKind::Dir);
    insert(&mut tracker, src, "main.c", EntityKind::File);
    let build = insert(&mut tracker, ROOT, "build", EntityKind::Dir);
    let shadow = tracker
        .store_mut()
        .insert_entity(build, "src", EntityKind::Dir, Mtime::Invalid, SourceLink::Source(src))
        .unwrap();
    tracker.store_mut().add_variant(Variant::shadow("build", build));

    tracker.observe_missing(ROOT, "src").unwrap();

    assert!(!tracker.store().contains(src));
    let shadow = tracker.store().get(shadow.id).unwrap().unwrap();
    assert_eq!(shadow.kind, EntityKind::Dir);
    assert_eq!(shadow.source, SourceLink::SourceRemoved);
}

#[test]
fn test_disabled_variant_keeps_source_link() {
    let mut tracker = tracker();
    let src = insert(&mut tracker, ROOT, "src", EntityKind::Dir);
    let build = insert(&mut tracker, ROOT, "build", EntityKind::Dir);
    let shadow = tracker
        .store_mut()
        .insert_entity(build, "src", EntityKind::Dir, Mtime::Invalid, SourceLink::Source(src))
        .unwrap();
    tracker
        .store_mut()
        .add_variant(Variant::shadow("build", build).with_enabled(false));

    tracker.observe_missing(ROOT, "src").unwrap();

    let shadow = tracker.store().get(shadow.id).unwrap().unwrap();
    assert_eq!(shadow.source, SourceLink::Source(src));
}

#[test]
fn test_missing_variant_directory_is_recreated() {
    let mut tracker = tracker();
    let src = insert(&mut tracker, ROOT, "src", EntityKind::Dir);
    let build = insert(&mut tracker, ROOT, "build", EntityKind::Dir);
    let shadow = tracker
        .store_mut()
        .insert_entity(build, "src", EntityKind::Dir, Mtime::Invalid, SourceLink::Source(src))
        .unwrap();
    tracker.store_mut().add_variant(Variant::shadow("build", build));

    tracker.reconcile_missing(shadow.id).unwrap();

    let warnings = tracker.take_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::VariantDirectoryDeleted);
    assert!(tracker.store().is_queued(WorkList::Create, src).unwrap());
    assert!(!tracker.store().contains(shadow.id));
}

#[test]
fn test_missing_variant_root_is_forced() {
    let mut tracker = tracker();
    let src = insert(&mut tracker, ROOT, "src", EntityKind::Dir);
    let build = tracker
        .store_mut()
        .insert_entity(ROOT, "build", EntityKind::Dir, Mtime::Invalid, SourceLink::Source(ROOT))
        .unwrap()
        .id;
    tracker
        .store_mut()
        .insert_entity(build, "src", EntityKind::Dir, Mtime::Invalid, SourceLink::Source(src))
        .unwrap();
    tracker.store_mut().add_variant(Variant::shadow("build", build));

    tracker.reconcile_missing(build).unwrap();

    assert!(tracker.warnings().is_empty());
    assert!(!tracker.store().is_queued(WorkList::Create, src).unwrap());
    assert!(!tracker.store().is_queued(WorkList::Create, ROOT).unwrap());
    assert!(!tracker.store().contains(build));
}

#[test]
fn test_resolved_path_round_trips() {
    let mut tracker = tracker();
    let cases = [
        ("a/b/../c/d.h", "a/c/d.h"),
        ("./x//y", "x/y"),
        ("/work/project/lib/z.c", "lib/z.c"),
    ];

    for (input, expected) in cases {
        let id = tracker
            .resolve_path(ROOT, input, ResolveMode::IgnoreDirs, false)
            .unwrap()
            .id()
            .unwrap();
        assert_eq!(tracker.entity_path(id).unwrap(), expected);

        let again = tracker
            .resolve_path(ROOT, expected, ResolveMode::Forbidden, false)
            .unwrap();
        assert_eq!(again, Resolution::Found(id));
    }
}

#[test]
fn test_outside_paths_with_full_deps() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("lib.h"), "#pragma once").unwrap();
    let dir = temp.path().to_str().unwrap().to_string();

    let mut tracker = tracker();
    let id = tracker
        .resolve_path(ROOT, &format!("{dir}/lib.h"), ResolveMode::IgnoreDirs, true)
        .unwrap()
        .id()
        .unwrap();
    let header = tracker.store().get(id).unwrap().unwrap();
    assert_eq!(header.kind, EntityKind::Ghost);
    assert!(header.mtime.is_real());
    assert_eq!(tracker.entity_path(id).unwrap(), format!("{dir}/lib.h"));

    let parent = tracker.store().get(header.parent.unwrap()).unwrap().unwrap();
    assert_eq!(parent.mtime, Mtime::ExternalDirectory);

    let missing = tracker
        .resolve_path(ROOT, &format!("{dir}/nope.h"), ResolveMode::IgnoreDirs, true)
        .unwrap()
        .id()
        .unwrap();
    assert_eq!(tracker.store().get(missing).unwrap().unwrap().mtime, Mtime::Invalid);
}

#[test]
fn test_output_through_file_is_kind_conflict() {
    let mut tracker = tracker();
    tracker
        .observe_change(ROOT, "config.h", Mtime::new(1, 0), false, false)
        .unwrap();

    let err = tracker
        .observe_change_at(ROOT, "config.h/out.o", ResolveMode::CreateDirs, Mtime::new(2, 0), false, false)
        .unwrap_err();
    assert!(matches!(err, GraphError::KindConflict { kind: EntityKind::File, .. }));
}

#[test]
fn test_overwrite_directory_with_file() {
    let mut tracker = tracker();
    let old = insert(&mut tracker, ROOT, "docs", EntityKind::Dir);
    insert(&mut tracker, old, "index.md", EntityKind::File);
    let mut removed_rx = tracker.subscribe();

    let seen = tracker
        .observe_change(ROOT, "docs", Mtime::new(3, 0), false, false)
        .unwrap();

    assert!(seen.modified);
    assert_ne!(seen.id, old);
    assert_eq!(kind_of(&tracker, seen.id), Some(EntityKind::File));
    assert_eq!(removed_rx.try_recv().unwrap(), old);
}

#[test]
fn test_overwrite_generated_dir_is_internal_error() {
    let mut tracker = tracker();
    insert(&mut tracker, ROOT, "gen", EntityKind::GeneratedDir);

    let err = tracker
        .observe_change(ROOT, "gen", Mtime::new(3, 0), false, false)
        .unwrap_err();
    assert!(matches!(err, GraphError::Internal { .. }));
}

#[test]
fn test_observe_path_against_disk() {
    let temp = TempDir::new().unwrap();
    let mut tracker = FileTracker::new(MemoryStore::new(), TrackerConfig::new(temp.path()));
    fs::create_dir(temp.path().join("src")).unwrap();
    fs::write(temp.path().join("src/main.c"), "int main;").unwrap();

    let PathState::Present(src) = tracker.observe_path(ROOT, "src").unwrap() else {
        panic!("src should exist");
    };
    assert_eq!(kind_of(&tracker, src.id), Some(EntityKind::Dir));

    let PathState::Present(main) = tracker.observe_path(src.id, "main.c").unwrap() else {
        panic!("main.c should exist");
    };
    assert!(main.modified);
    assert!(tracker.store().get(main.id).unwrap().unwrap().mtime.is_real());

    fs::remove_file(temp.path().join("src/main.c")).unwrap();
    assert_eq!(
        tracker.observe_path(src.id, "main.c").unwrap(),
        PathState::Missing { modified: true }
    );
    assert!(!tracker.store().contains(main.id));
}

#[test]
fn test_generated_ignore_file_keeps_its_row() {
    let mut tracker = tracker();
    let sub = insert(&mut tracker, ROOT, "sub", EntityKind::Dir);
    let ignore = insert(&mut tracker, sub, ".gitignore", EntityKind::GeneratedFile);
    let cmd = tracker.create_command(sub, "^ GITIGNORE^").unwrap();
    tracker.store_mut().link_command(cmd, &[], &[ignore]).unwrap();

    assert!(!tracker.observe_missing(sub, ".gitignore").unwrap());

    assert_eq!(kind_of(&tracker, ignore), Some(EntityKind::GeneratedFile));
    assert!(tracker.store().is_queued(WorkList::Create, sub).unwrap());
    assert!(!tracker.store().is_queued(WorkList::Modify, cmd).unwrap());
    assert!(tracker.warnings().is_empty());
}

#[test]
fn test_removed_build_file_reparses_readers() {
    let mut tracker = tracker();
    let src = insert(&mut tracker, ROOT, "src", EntityKind::Dir);
    let tupfile = insert(&mut tracker, src, "Tupfile", EntityKind::File);
    let other = insert(&mut tracker, ROOT, "other", EntityKind::Dir);
    tracker.store_mut().link_directory(tupfile, other).unwrap();

    assert!(tracker.observe_missing(ROOT, "src").unwrap());

    assert!(tracker.store().is_queued(WorkList::Create, other).unwrap());
    // Still read by `other`, so it lingers as a ghost
    assert_eq!(kind_of(&tracker, tupfile), Some(EntityKind::Ghost));
}

#[test]
fn test_shadow_removal_after_source_is_gone() {
    let mut tracker = tracker();
    let src = insert(&mut tracker, ROOT, "src", EntityKind::Dir);
    let build = insert(&mut tracker, ROOT, "build", EntityKind::Dir);
    let shadow = tracker
        .store_mut()
        .insert_entity(build, "src", EntityKind::Dir, Mtime::Invalid, SourceLink::Source(src))
        .unwrap();

    // Disabled while the source goes, so the shadow keeps a stale link
    tracker
        .store_mut()
        .add_variant(Variant::shadow("build", build).with_enabled(false));
    assert!(tracker.delete_forced(src, EntityKind::Dir).unwrap());
    assert!(!tracker.store().contains(src));
    tracker.store_mut().add_variant(Variant::shadow("build", build));

    assert!(tracker.observe_missing(build, "src").unwrap());

    assert!(!tracker.store().contains(shadow.id));
    assert!(!tracker.store().queued(WorkList::Create).contains(&src));
}

#[test]
fn test_variant_config_file() {
    let mut tracker = tracker();
    let build = insert(&mut tracker, ROOT, "build", EntityKind::Dir);
    tracker.store_mut().add_variant(Variant::shadow("build", build));

    let seen = tracker
        .observe_change(build, "tup.config", Mtime::new(9, 0), false, false)
        .unwrap();
    assert_eq!(tracker.store_mut().drain(WorkList::Config), vec![seen.id]);

    tracker.observe_missing(build, "tup.config").unwrap();

    assert_eq!(kind_of(&tracker, seen.id), Some(EntityKind::Ghost));
    assert_eq!(tracker.store().queued(WorkList::Config), vec![seen.id]);
}

#[test]
fn test_scanned_shadow_directory_reparses_source() {
    let mut tracker = tracker();
    let src = insert(&mut tracker, ROOT, "src", EntityKind::Dir);
    let build = insert(&mut tracker, ROOT, "build", EntityKind::Dir);
    tracker.store_mut().add_variant(Variant::shadow("build", build));

    let shadow = tracker.observe_dir(build, "src").unwrap();
    let entity = tracker.store().get(shadow.id).unwrap().unwrap();
    assert_eq!(entity.source, SourceLink::Source(src));

    tracker.store_mut().drain(WorkList::Create);
    assert!(tracker.observe_missing(build, "src").unwrap());

    assert!(!tracker.store().contains(shadow.id));
    assert_eq!(tracker.store().queued(WorkList::Create), vec![src]);
}
