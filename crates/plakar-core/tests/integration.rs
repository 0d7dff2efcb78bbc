use plakar_core::commands::{cat, check, cleanup, find, ls, push, rm};
use plakar_core::config::CreateOptions;
use plakar_core::context::AppContext;
use plakar_core::repository::Repository;
use plakar_core::storage::fs_backend::FsBackend;

fn test_context() -> AppContext {
    let mut ctx = AppContext::new("plakar integration".into());
    ctx.cache_dir = None;
    ctx.num_cpu = 2;
    ctx
}

fn write(dir: &std::path::Path, name: &str, contents: &[u8]) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

#[test]
fn full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let repo_path = dir.path().join("repo");
    let source = dir.path().join("source");
    std::fs::create_dir_all(&source).unwrap();
    write(&source, "docs/readme.md", b"# readme\n");
    write(&source, "docs/guide.md", b"# guide\n");
    write(&source, "bin/blob.bin", &vec![0xAB; 2 * 1024 * 1024]);

    let ctx = test_context();

    // create
    let mut repo = Repository::create(
        Box::new(FsBackend::new(&repo_path)),
        CreateOptions {
            hashing: "sha256".into(),
            compression: true,
            passphrase: Some("integration".into()),
        },
    )
    .unwrap();

    // push
    let outcome = push::run(
        &ctx,
        &mut repo,
        &[source.display().to_string()],
        push::PushOptions {
            tags: vec!["nightly".into()],
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(outcome.stats.files, 3);
    assert!(outcome.stats.packfiles_written >= 1);

    // Reopen from disk like a second invocation would.
    let mut repo = Repository::open(
        Box::new(FsBackend::new(&repo_path)),
        Some("integration"),
        None,
    )
    .unwrap();

    // ls
    let summaries = ls::run(&repo).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].tags, vec!["nightly"]);
    assert_eq!(summaries[0].files_count, 3);

    // cat
    let canonical_source = std::fs::canonicalize(&source).unwrap();
    let readme = canonical_source.join("docs/readme.md");
    let target = format!("{}:{}", outcome.snapshot_id, readme.display());
    let mut out = Vec::new();
    cat::run(&repo, &target, &mut out).unwrap();
    assert_eq!(out, b"# readme\n");

    // find
    let matches = find::run(&repo, "guide").unwrap();
    assert_eq!(matches.len(), 1);
    assert!(matches[0].pathname.ends_with("guide.md"));

    // check
    let result = check::run(&repo, None).unwrap();
    assert!(result.is_clean());
    assert_eq!(result.objects_checked, 3);

    // rm + cleanup
    rm::run(&repo, &outcome.snapshot_id.to_string()).unwrap();
    let stats = cleanup::run(&ctx, &mut repo).unwrap();
    assert_eq!(stats.snapshots_live, 0);
    assert!(stats.packfiles_deleted >= 1);
    assert!(ls::run(&repo).unwrap().is_empty());
}

#[test]
fn second_process_sees_committed_state() {
    let dir = tempfile::tempdir().unwrap();
    let repo_path = dir.path().join("repo");
    let source = dir.path().join("source");
    std::fs::create_dir_all(&source).unwrap();
    write(&source, "note.txt", b"cross-process visibility");

    let ctx = test_context();
    let mut repo = Repository::create(
        Box::new(FsBackend::new(&repo_path)),
        CreateOptions {
            hashing: "sha256".into(),
            compression: false,
            passphrase: None,
        },
    )
    .unwrap();
    let outcome = push::run(
        &ctx,
        &mut repo,
        &[source.display().to_string()],
        push::PushOptions::default(),
    )
    .unwrap();
    drop(repo);

    // A fresh handle loads the persisted repository index and resolves
    // chunks through it.
    let repo = Repository::open(Box::new(FsBackend::new(&repo_path)), None, None).unwrap();
    assert!(!repo.index().is_empty());

    let note = std::fs::canonicalize(&source).unwrap().join("note.txt");
    let mut out = Vec::new();
    cat::run(
        &repo,
        &format!("{}:{}", outcome.snapshot_id, note.display()),
        &mut out,
    )
    .unwrap();
    assert_eq!(out, b"cross-process visibility");
}
