//! Working copy database integration tests
//!
//! Each test builds a throwaway working copy under a temp directory and
//! drives the public interface the way checkout/update/commit callers do.

use dsvn_wc::{
    Checksum, Conflict, Depth, Kind, OpenMode, PristineCheckMode, PropertySet, Status, WcDb,
    WcError,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ROOT_URL: &str = "http://repos.example.com/";
const UUID: &str = "3d7b2f4e-58a3-4f0c-9d0a-7f2a8c91be55";

fn setup() -> (TempDir, WcDb, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let wc = tmp.path().join("wc");
    fs::create_dir_all(&wc).unwrap();
    let db = WcDb::open(OpenMode::ReadWrite, false, false);
    db.init(&wc, "proj/trunk", ROOT_URL, Some(UUID), 0, Depth::Infinity)
        .unwrap();
    (tmp, db, wc)
}

fn add_file(db: &WcDb, wc: &Path, name: &str, rev: i64, data: &[u8]) -> Checksum {
    let checksum = Checksum::sha1(data);
    db.base_add_file(
        &wc.join(name),
        &format!("proj/trunk/{name}"),
        ROOT_URL,
        UUID,
        rev,
        &PropertySet::new(),
        rev,
        1000,
        Some("author"),
        &checksum,
        Some(data.len() as i64),
    )
    .unwrap();
    checksum
}

fn add_dir(db: &WcDb, wc: &Path, name: &str, children: &[&str]) {
    let children: Vec<String> = children.iter().map(|c| c.to_string()).collect();
    db.base_add_directory(
        &wc.join(name),
        &format!("proj/trunk/{name}"),
        ROOT_URL,
        UUID,
        1,
        &PropertySet::new(),
        1,
        1000,
        Some("author"),
        &children,
        Depth::Infinity,
    )
    .unwrap();
}

#[test]
fn test_init_and_read_root_info() {
    let (_tmp, db, wc) = setup();

    let info = db.read_info(&wc).unwrap();
    assert_eq!(info.status, Status::Normal);
    assert_eq!(info.kind, Kind::Dir);
    assert_eq!(info.revision, Some(0));
    assert_eq!(info.repos_relpath.as_deref(), Some("proj/trunk"));
    assert_eq!(info.repos_root_url.as_deref(), Some(ROOT_URL));
    assert_eq!(info.repos_uuid.as_deref(), Some(UUID));
    assert_eq!(info.depth, Some(Depth::Infinity));
    assert!(!info.base_shadowed);
    assert!(!info.conflicted);
}

#[test]
fn test_init_nonzero_rev_is_incomplete() {
    let tmp = TempDir::new().unwrap();
    let wc = tmp.path().join("wc");
    fs::create_dir_all(&wc).unwrap();
    let db = WcDb::open(OpenMode::ReadWrite, false, false);
    db.init(&wc, "proj/trunk", ROOT_URL, None, 42, Depth::Infinity)
        .unwrap();

    let info = db.read_info(&wc).unwrap();
    assert_eq!(info.status, Status::Incomplete);
    assert_eq!(info.revision, Some(42));
    // No uuid was supplied, so one was generated for the repository row.
    assert_eq!(info.repos_uuid.map(|u| u.len()), Some(36));
}

#[test]
fn test_base_add_file_and_read_back() {
    let (_tmp, db, wc) = setup();
    let checksum = add_file(&db, &wc, "a.txt", 1, b"hello working copy");

    let info = db.read_info(&wc.join("a.txt")).unwrap();
    assert_eq!(info.status, Status::Normal);
    assert_eq!(info.kind, Kind::File);
    assert_eq!(info.revision, Some(1));
    assert_eq!(info.checksum, Some(checksum));
    assert_eq!(info.translated_size, Some(18));
    assert_eq!(info.changed_author.as_deref(), Some("author"));

    assert_eq!(db.read_children(&wc).unwrap(), vec!["a.txt".to_string()]);
}

#[test]
fn test_base_add_directory_seeds_incomplete_children() {
    let (_tmp, db, wc) = setup();
    add_dir(&db, &wc, "sub", &["a", "b"]);

    let children = db.base_get_children(&wc.join("sub")).unwrap();
    assert_eq!(children, vec!["a".to_string(), "b".to_string()]);

    let info = db.read_info(&wc.join("sub/a")).unwrap();
    assert_eq!(info.status, Status::Incomplete);

    // The placeholders inherit their repository location from the parent.
    let (relpath, root, uuid) = db.scan_base_repos(&wc.join("sub/b")).unwrap();
    assert_eq!(relpath, "proj/trunk/sub/b");
    assert_eq!(root, ROOT_URL);
    assert_eq!(uuid, UUID);
}

#[test]
fn test_base_add_symlink() {
    let (_tmp, db, wc) = setup();
    db.base_add_symlink(
        &wc.join("link"),
        "proj/trunk/link",
        ROOT_URL,
        UUID,
        3,
        &PropertySet::new(),
        3,
        0,
        Some("author"),
        "a.txt",
    )
    .unwrap();

    let info = db.read_info(&wc.join("link")).unwrap();
    assert_eq!(info.kind, Kind::Symlink);
    assert_eq!(info.target.as_deref(), Some("a.txt"));
}

#[test]
fn test_base_add_absent_node() {
    let (_tmp, db, wc) = setup();
    db.base_add_absent_node(
        &wc.join("secret"),
        "proj/trunk/secret",
        ROOT_URL,
        UUID,
        5,
        Kind::Dir,
        Status::Absent,
    )
    .unwrap();

    let info = db.read_info(&wc.join("secret")).unwrap();
    assert_eq!(info.status, Status::Absent);

    assert!(db.node_hidden(&wc.join("secret")).unwrap());
    assert!(!db.node_hidden(&wc).unwrap());
}

#[test]
fn test_base_remove_then_not_found() {
    let (_tmp, db, wc) = setup();
    add_file(&db, &wc, "gone.txt", 1, b"data");

    db.base_remove(&wc.join("gone.txt")).unwrap();
    match db.read_info(&wc.join("gone.txt")) {
        Err(WcError::PathNotFound(_)) => {}
        other => panic!("expected PathNotFound, got {other:?}"),
    }
    assert_eq!(
        db.read_kind(&wc.join("gone.txt"), true).unwrap(),
        Kind::Unknown
    );
}

#[test]
fn test_props_roundtrip_including_empty_value() {
    let (_tmp, db, wc) = setup();
    add_file(&db, &wc, "p.txt", 1, b"data");

    let mut props = PropertySet::new();
    props.set("svn:eol-style", b"native".to_vec());
    props.set("user:empty", Vec::new());
    props.set("user:binary", vec![0u8, 1, 2, 255]);

    db.op_set_props(&wc.join("p.txt"), Some(&props)).unwrap();

    let read_back = db.read_props(&wc.join("p.txt")).unwrap();
    assert_eq!(read_back, props);
    assert_eq!(read_back.get("user:empty"), Some(&[] as &[u8]));
    assert!(read_back.get("user:missing").is_none());

    // Clearing the local props falls back to the (empty) pristine set.
    db.op_set_props(&wc.join("p.txt"), None).unwrap();
    assert!(db.read_props(&wc.join("p.txt")).unwrap().is_empty());
}

#[test]
fn test_read_props_prefers_actual_over_base() {
    let (_tmp, db, wc) = setup();
    let path = wc.join("f.txt");
    add_file(&db, &wc, "f.txt", 1, b"data");

    let mut base_props = PropertySet::new();
    base_props.set("origin", b"base".to_vec());
    db.op_set_pristine_props(&path, &base_props, false).unwrap();

    assert_eq!(
        db.read_props(&path).unwrap().get("origin"),
        Some(b"base".as_slice())
    );
    assert_eq!(
        db.read_pristine_props(&path).unwrap().get("origin"),
        Some(b"base".as_slice())
    );

    let mut local_props = PropertySet::new();
    local_props.set("origin", b"actual".to_vec());
    db.op_set_props(&path, Some(&local_props)).unwrap();

    assert_eq!(
        db.read_props(&path).unwrap().get("origin"),
        Some(b"actual".as_slice())
    );
    // The pristine view is unaffected by local property edits.
    assert_eq!(
        db.read_pristine_props(&path).unwrap().get("origin"),
        Some(b"base".as_slice())
    );
}

#[test]
fn test_set_pristine_props_requires_row() {
    let (_tmp, db, wc) = setup();
    match db.op_set_pristine_props(&wc.join("absent.txt"), &PropertySet::new(), false) {
        Err(WcError::PathNotFound(_)) => {}
        other => panic!("expected PathNotFound, got {other:?}"),
    }
}

#[test]
fn test_changelist_lifecycle() {
    let (_tmp, db, wc) = setup();
    let path = wc.join("c.txt");
    add_file(&db, &wc, "c.txt", 1, b"data");

    // Clearing a membership that never existed is a no-op.
    db.op_set_changelist(&path, None).unwrap();
    assert!(db.read_info(&path).unwrap().changelist.is_none());

    db.op_set_changelist(&path, Some("wip")).unwrap();
    assert_eq!(
        db.read_info(&path).unwrap().changelist.as_deref(),
        Some("wip")
    );

    db.op_set_changelist(&path, Some("other")).unwrap();
    assert_eq!(
        db.read_info(&path).unwrap().changelist.as_deref(),
        Some("other")
    );

    db.op_set_changelist(&path, None).unwrap();
    assert!(db.read_info(&path).unwrap().changelist.is_none());
}

#[test]
fn test_tree_conflict_scenario() {
    let (_tmp, db, wc) = setup();
    add_dir(&db, &wc, "dir", &["c"]);
    let victim = wc.join("dir/c");

    let conflict_data = b"tree conflict: incoming delete".to_vec();
    db.op_set_tree_conflict(&victim, Some(&conflict_data)).unwrap();

    assert!(db.read_info(&victim).unwrap().conflicted);
    assert_eq!(
        db.op_read_tree_conflict(&victim).unwrap(),
        Some(conflict_data.clone())
    );

    let conflicts = db.read_conflicts(&victim).unwrap();
    assert!(conflicts.contains(&Conflict::Tree(conflict_data)));

    assert_eq!(
        db.read_conflict_victims(&wc.join("dir")).unwrap(),
        vec!["c".to_string()]
    );

    // Removing the entry retires the parent's (otherwise empty) row.
    db.op_set_tree_conflict(&victim, None).unwrap();
    assert!(!db.read_info(&victim).unwrap().conflicted);
    assert!(db.op_read_tree_conflict(&victim).unwrap().is_none());
    assert!(db.read_conflict_victims(&wc.join("dir")).unwrap().is_empty());

    // Removing again (no row at all) stays a no-op.
    db.op_set_tree_conflict(&victim, None).unwrap();
}

#[test]
fn test_tree_conflict_data_is_byte_faithful() {
    let (_tmp, db, wc) = setup();
    add_dir(&db, &wc, "d", &["x", "y"]);

    let blob_x: Vec<u8> = vec![0, 159, 146, 150, 255, 10, 13];
    let blob_y: Vec<u8> = Vec::new();
    db.op_set_tree_conflict(&wc.join("d/x"), Some(&blob_x)).unwrap();
    db.op_set_tree_conflict(&wc.join("d/y"), Some(&blob_y)).unwrap();

    assert_eq!(db.op_read_tree_conflict(&wc.join("d/x")).unwrap(), Some(blob_x));
    assert_eq!(db.op_read_tree_conflict(&wc.join("d/y")).unwrap(), Some(blob_y));
    assert_eq!(
        db.read_conflict_victims(&wc.join("d")).unwrap(),
        vec!["x".to_string(), "y".to_string()]
    );
}

#[test]
fn test_pristine_install_check_read() {
    let (_tmp, db, wc) = setup();
    let data = b"pristine text body";
    let checksum = Checksum::sha1(data);

    let tempdir = db.pristine_tempdir(&wc).unwrap();
    let staged = tempdir.join("staged.tmp");
    fs::write(&staged, data).unwrap();

    assert!(!db
        .pristine_check(&wc, &checksum, PristineCheckMode::Both)
        .unwrap());

    db.pristine_install(&staged, &checksum).unwrap();

    for mode in [
        PristineCheckMode::RowOnly,
        PristineCheckMode::FileOnly,
        PristineCheckMode::Both,
    ] {
        assert!(db.pristine_check(&wc, &checksum, mode).unwrap());
    }

    let mut contents = Vec::new();
    use std::io::Read;
    db.pristine_read(&wc, &checksum)
        .unwrap()
        .read_to_end(&mut contents)
        .unwrap();
    assert_eq!(contents, data);

    // Re-installing the same digest is tolerated.
    let staged2 = tempdir.join("staged2.tmp");
    fs::write(&staged2, data).unwrap();
    db.pristine_install(&staged2, &checksum).unwrap();
    assert!(db
        .pristine_check(&wc, &checksum, PristineCheckMode::Both)
        .unwrap());
}

#[test]
fn test_pristine_rejects_non_sha1_keys() {
    let (_tmp, db, wc) = setup();
    let checksum = Checksum::sha256(b"data");

    match db.pristine_check(&wc, &checksum, PristineCheckMode::Both) {
        Err(WcError::BadChecksumKind) => {}
        other => panic!("expected BadChecksumKind, got {other:?}"),
    }
    match db.pristine_read(&wc, &checksum) {
        Err(WcError::BadChecksumKind) => {}
        other => panic!("expected BadChecksumKind, got {other:?}"),
    }
}

#[test]
fn test_pristine_read_missing_is_not_found() {
    let (_tmp, db, wc) = setup();
    match db.pristine_read(&wc, &Checksum::sha1(b"never installed")) {
        Err(WcError::PathNotFound(_)) => {}
        other => panic!("expected PathNotFound, got {other:?}"),
    }
}

#[test]
fn test_work_queue_fifo() {
    let (_tmp, db, wc) = setup();

    assert!(db.wq_fetch(&wc).unwrap().is_none());

    let first = db.wq_add(&wc, b"(file-install a.txt)").unwrap();
    let second = db.wq_add(&wc, b"(file-remove b.txt)").unwrap();
    assert!(second > first);

    // Fetch does not remove; items stay visible until completed.
    let (id, skel) = db.wq_fetch(&wc).unwrap().unwrap();
    assert_eq!(id, first);
    assert_eq!(skel, b"(file-install a.txt)");
    let (id_again, _) = db.wq_fetch(&wc).unwrap().unwrap();
    assert_eq!(id_again, first);

    db.wq_completed(&wc, first).unwrap();
    let (id, skel) = db.wq_fetch(&wc).unwrap().unwrap();
    assert_eq!(id, second);
    assert_eq!(skel, b"(file-remove b.txt)");

    db.wq_completed(&wc, second).unwrap();
    assert!(db.wq_fetch(&wc).unwrap().is_none());
}

#[test]
fn test_open_with_enforce_empty_wq() {
    let (_tmp, db, wc) = setup();
    db.wq_add(&wc, b"(pending)").unwrap();

    let strict = WcDb::open(OpenMode::ReadWrite, false, true);
    match strict.read_info(&wc) {
        Err(WcError::CleanupRequired(_)) => {}
        other => panic!("expected CleanupRequired, got {other:?}"),
    }
}

#[test]
fn test_wclock_cycle() {
    let (_tmp, db, wc) = setup();

    assert!(!db.wclocked(&wc).unwrap());
    db.wclock_set(&wc).unwrap();
    assert!(db.wclocked(&wc).unwrap());

    match db.wclock_set(&wc) {
        Err(WcError::Locked(_)) => {}
        other => panic!("expected Locked, got {other:?}"),
    }

    db.wclock_remove(&wc).unwrap();
    assert!(!db.wclocked(&wc).unwrap());
    db.wclock_set(&wc).unwrap();
}

#[test]
fn test_own_lock_is_in_memory_only() {
    let (_tmp, db, wc) = setup();

    db.wclock_set(&wc).unwrap();
    // The row alone does not make the lock ours.
    assert!(!db.own_lock(&wc).unwrap());

    db.mark_locked(&wc).unwrap();
    assert!(db.own_lock(&wc).unwrap());

    db.wclock_remove(&wc).unwrap();
    assert!(!db.own_lock(&wc).unwrap());
}

#[test]
fn test_repository_lock_roundtrip() {
    let (_tmp, db, wc) = setup();
    let path = wc.join("locked.txt");
    add_file(&db, &wc, "locked.txt", 1, b"data");

    db.lock_add(
        &path,
        &dsvn_wc::LockInfo {
            token: "opaquelocktoken:1234".to_string(),
            owner: Some("holder".to_string()),
            comment: Some("editing".to_string()),
            date: Some(1_600_000_000),
        },
    )
    .unwrap();

    let info = db.read_info(&path).unwrap();
    let lock = info.lock.expect("lock should be visible");
    assert_eq!(lock.token, "opaquelocktoken:1234");
    assert_eq!(lock.owner.as_deref(), Some("holder"));

    db.lock_remove(&path).unwrap();
    assert!(db.read_info(&path).unwrap().lock.is_none());
}

#[test]
fn test_resolve_wcroot_is_empty_relpath() {
    let (_tmp, db, wc) = setup();
    let loc = db.resolve_location(&wc).unwrap();
    assert_eq!(loc.wcroot_abspath, wc);
    assert_eq!(loc.local_relpath, "");
    assert!(!loc.obstructed);
}

#[test]
fn test_resolve_deep_path_reaches_same_root() {
    let (_tmp, db, wc) = setup();

    let deep = db.resolve_location(&wc.join("A/B/C/deep.txt")).unwrap();
    assert_eq!(deep.wcroot_abspath, wc);
    assert_eq!(deep.local_relpath, "A/B/C/deep.txt");

    let root = db.resolve_location(&wc).unwrap();
    assert_eq!(root.wcroot_abspath, deep.wcroot_abspath);
}

#[test]
fn test_resolve_through_file_component() {
    let (_tmp, db, wc) = setup();
    add_file(&db, &wc, "plain.txt", 1, b"data");
    fs::write(wc.join("plain.txt"), b"data").unwrap();

    // An intermediate component that is a file on disk cannot hold an
    // administrative area; ascent still finds the enclosing root.
    let loc = db.resolve_location(&wc.join("plain.txt/below")).unwrap();
    assert_eq!(loc.wcroot_abspath, wc);
    assert_eq!(loc.local_relpath, "plain.txt/below");
}

#[test]
fn test_resolve_outside_any_working_copy() {
    let tmp = TempDir::new().unwrap();
    let stray = tmp.path().join("no-wc-here");
    fs::create_dir_all(&stray).unwrap();

    let db = WcDb::open(OpenMode::ReadWrite, false, false);
    match db.resolve_location(&stray) {
        Err(WcError::NotWorkingCopy(_)) => {}
        other => panic!("expected NotWorkingCopy, got {other:?}"),
    }
}

#[test]
fn test_legacy_marker_triggers_upgrade_path() {
    let tmp = TempDir::new().unwrap();
    let old = tmp.path().join("old-wc");
    fs::create_dir_all(old.join(".svn")).unwrap();
    fs::write(old.join(".svn/entries"), "8\n\ndir\n").unwrap();

    let db = WcDb::open(OpenMode::ReadWrite, true, false);

    // The root is located, but every operation refuses until an upgrade.
    let loc = db.resolve_location(&old).unwrap();
    assert_eq!(loc.wcroot_abspath, old);

    match db.read_info(&old) {
        Err(WcError::UpgradeRequired(_)) => {}
        other => panic!("expected UpgradeRequired, got {other:?}"),
    }
}

#[test]
fn test_obstructed_directory_resolves_to_parent() {
    let (_tmp, db, wc) = setup();
    // The parent's metadata says "d" is a file...
    add_file(&db, &wc, "d", 1, b"file body");

    // ...but on disk a whole (versioned) directory appeared there.
    let nested = wc.join("d");
    fs::create_dir_all(&nested).unwrap();
    db.init(&nested, "other/proj", "http://elsewhere/", None, 0, Depth::Infinity)
        .unwrap();

    // A fresh context sees the obstruction; the cached one that built the
    // nested root keeps its own handle.
    let fresh = WcDb::open(OpenMode::ReadWrite, false, false);
    let loc = fresh.resolve_location(&nested).unwrap();
    assert!(loc.obstructed);
    assert_eq!(loc.wcroot_abspath, wc);
    assert_eq!(loc.local_relpath, "d");
}

#[test]
fn test_forget_directory_drops_cached_handles() {
    let (_tmp, db, wc) = setup();
    add_dir(&db, &wc, "sub", &[]);
    fs::create_dir_all(wc.join("sub")).unwrap();

    db.wclock_set(&wc.join("sub")).unwrap();
    db.forget_directory(&wc.join("sub")).unwrap();
    // The advisory lock held on the forgotten subtree was released.
    assert!(!db.wclocked(&wc.join("sub")).unwrap());

    // Resolution still works afterwards via a fresh ascent.
    let loc = db.resolve_location(&wc.join("sub")).unwrap();
    assert_eq!(loc.wcroot_abspath, wc);
}

#[test]
fn test_global_relocate() {
    let (_tmp, db, wc) = setup();
    add_dir(&db, &wc, "A", &["f"]);
    add_file(&db, &wc, "A/g", 2, b"contents");
    db.lock_add(
        &wc.join("A/g"),
        &dsvn_wc::LockInfo {
            token: "opaquelocktoken:9".to_string(),
            owner: None,
            comment: None,
            date: None,
        },
    )
    .unwrap();

    db.global_relocate(&wc, "http://mirror.example.net/").unwrap();

    // Every descendant now reports the new root; uuid is untouched.
    for rel in ["", "A", "A/f", "A/g"] {
        let path = if rel.is_empty() { wc.clone() } else { wc.join(rel) };
        let (_, root, uuid) = db.scan_base_repos(&path).unwrap();
        assert_eq!(root, "http://mirror.example.net/");
        assert_eq!(uuid, UUID);
    }

    // The lock row moved with the repository id.
    let lock = db.read_info(&wc.join("A/g")).unwrap().lock;
    assert_eq!(lock.map(|l| l.token).as_deref(), Some("opaquelocktoken:9"));
}

#[test]
fn test_dav_cache_roundtrip() {
    let (_tmp, db, wc) = setup();
    add_file(&db, &wc, "d.txt", 1, b"data");

    assert!(db.base_get_dav_cache(&wc.join("d.txt")).unwrap().is_none());

    let mut cache = PropertySet::new();
    cache.set("version-url", b"/repos/!svn/ver/1/d.txt".to_vec());
    db.base_set_dav_cache(&wc.join("d.txt"), Some(&cache)).unwrap();

    assert_eq!(db.base_get_dav_cache(&wc.join("d.txt")).unwrap(), Some(cache));

    db.base_set_dav_cache(&wc.join("d.txt"), None).unwrap();
    assert!(db.base_get_dav_cache(&wc.join("d.txt")).unwrap().is_none());
}

#[test]
fn test_base_get_info_matches_read_info() {
    let (_tmp, db, wc) = setup();
    let checksum = add_file(&db, &wc, "x.txt", 4, b"1234");

    let base = db.base_get_info(&wc.join("x.txt")).unwrap();
    assert_eq!(base.status, Status::Normal);
    assert_eq!(base.kind, Kind::File);
    assert_eq!(base.revision, Some(4));
    assert_eq!(base.checksum, Some(checksum));
    assert_eq!(base.repos_relpath.as_deref(), Some("proj/trunk/x.txt"));
    assert_eq!(base.repos_root_url.as_deref(), Some(ROOT_URL));

    db.base_set_last_mod_time(&wc.join("x.txt"), 77_000).unwrap();
    assert_eq!(
        db.base_get_info(&wc.join("x.txt")).unwrap().last_mod_time,
        Some(77_000)
    );
}

#[test]
fn test_unimplemented_ops_refuse_loudly() {
    let (_tmp, db, wc) = setup();

    let results = [
        db.op_add_file(&wc.join("n.txt")),
        db.op_add_directory(&wc.join("nd")),
        db.op_delete(&wc.join("x")),
        db.op_copy(&wc.join("a"), &wc.join("b")),
        db.op_move(&wc.join("a"), &wc.join("b")),
        db.op_revert(&wc.join("a"), Depth::Infinity),
        db.op_mark_conflict(&wc.join("a")),
        db.op_modified(&wc.join("a")),
    ];
    for result in results {
        match result {
            Err(WcError::NotImplemented(_)) => {}
            other => panic!("expected NotImplemented, got {other:?}"),
        }
    }
}

#[test]
fn test_op_remove_node_clears_all_layers() {
    let (_tmp, db, wc) = setup();
    let path = wc.join("victim.txt");
    add_file(&db, &wc, "victim.txt", 1, b"data");
    db.op_set_changelist(&path, Some("cl")).unwrap();

    db.op_remove_node(&path).unwrap();
    match db.read_info(&path) {
        Err(WcError::PathNotFound(_)) => {}
        other => panic!("expected PathNotFound, got {other:?}"),
    }
}

#[test]
fn test_set_dir_depth() {
    let (_tmp, db, wc) = setup();
    add_dir(&db, &wc, "sparse", &[]);

    db.op_set_dir_depth(&wc.join("sparse"), Depth::Files).unwrap();
    assert_eq!(
        db.read_info(&wc.join("sparse")).unwrap().depth,
        Some(Depth::Files)
    );
}

#[test]
fn test_close_is_idempotent_and_reopenable() {
    let (_tmp, db, wc) = setup();
    add_file(&db, &wc, "a.txt", 1, b"data");

    db.close();
    db.close();

    // Handles are rebuilt on demand after close.
    let info = db.read_info(&wc.join("a.txt")).unwrap();
    assert_eq!(info.status, Status::Normal);
}

#[test]
fn test_entries_flush_callback_fires_on_mutation() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let (_tmp, db, wc) = setup();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_in_cb = hits.clone();
    db.set_entries_flush(Some(Box::new(move |_dir: &Path| {
        hits_in_cb.fetch_add(1, Ordering::SeqCst);
    })));

    add_file(&db, &wc, "cb.txt", 1, b"data");
    assert!(hits.load(Ordering::SeqCst) > 0);
}
