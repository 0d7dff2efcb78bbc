use std::path::{Path, PathBuf};

use crate::commands::push::{self, PushOptions};
use crate::config::CreateOptions;
use crate::context::AppContext;
use crate::repository::Repository;
use crate::storage::fs_backend::FsBackend;
use crate::testutil::test_context;

/// A filesystem-backed repository plus a source tree, both under one
/// tempdir.
pub struct TestEnv {
    pub dir: tempfile::TempDir,
    pub repo: Repository,
    pub source: PathBuf,
    pub ctx: AppContext,
}

pub fn fs_env(options: CreateOptions) -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let repo_path = dir.path().join("repo");
    let repo = Repository::create(Box::new(FsBackend::new(&repo_path)), options).unwrap();
    let source = dir.path().join("source");
    std::fs::create_dir_all(&source).unwrap();
    TestEnv {
        dir,
        repo,
        source,
        ctx: test_context(),
    }
}

/// Plaintext, uncompressed repository (scenario default).
pub fn plain_env() -> TestEnv {
    fs_env(CreateOptions {
        hashing: "sha256".into(),
        compression: false,
        passphrase: None,
    })
}

pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

impl TestEnv {
    /// Push the source tree and return the new snapshot's id.
    pub fn push(&mut self) -> uuid::Uuid {
        self.push_with(PushOptions::default())
    }

    pub fn push_with(&mut self, options: PushOptions) -> uuid::Uuid {
        let paths = vec![self.source.display().to_string()];
        let outcome = push::run(&self.ctx, &mut self.repo, &paths, options).unwrap();
        outcome.snapshot_id
    }

    /// The pathname a source entry gets inside snapshots: the canonicalized
    /// root joined with the relative name (symlinks stay unresolved).
    pub fn pathname(&self, name: &str) -> String {
        std::fs::canonicalize(&self.source)
            .unwrap()
            .join(name)
            .display()
            .to_string()
    }
}
