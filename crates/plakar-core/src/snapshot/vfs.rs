use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Platform-neutral stat record for one filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime: i64,
    pub uid: u32,
    pub gid: u32,
    #[serde(default)]
    pub xattrs: BTreeMap<String, Vec<u8>>,
}

/// The snapshot filesystem: file-info records keyed by pathname, with
/// auxiliary sets for symlinks and non-regular entries.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Filesystem {
    directories: BTreeMap<String, FileInfo>,
    files: BTreeMap<String, FileInfo>,
    /// pathname -> link target.
    symlinks: BTreeMap<String, String>,
    /// Stat records for symlinks, devices, fifos, sockets.
    non_regular: BTreeMap<String, FileInfo>,
}

impl Filesystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_directory(&mut self, pathname: &str, info: FileInfo) {
        self.directories.insert(pathname.to_string(), info);
    }

    pub fn record_file(&mut self, pathname: &str, info: FileInfo) {
        self.files.insert(pathname.to_string(), info);
    }

    pub fn record_symlink(&mut self, pathname: &str, target: String, info: FileInfo) {
        self.symlinks.insert(pathname.to_string(), target);
        self.non_regular.insert(pathname.to_string(), info);
    }

    pub fn record_special(&mut self, pathname: &str, info: FileInfo) {
        self.non_regular.insert(pathname.to_string(), info);
    }

    /// Stat lookup across all entry sets.
    pub fn info(&self, pathname: &str) -> Option<&FileInfo> {
        self.files
            .get(pathname)
            .or_else(|| self.directories.get(pathname))
            .or_else(|| self.non_regular.get(pathname))
    }

    pub fn symlink_target(&self, pathname: &str) -> Option<&str> {
        self.symlinks.get(pathname).map(String::as_str)
    }

    pub fn is_directory(&self, pathname: &str) -> bool {
        self.directories.contains_key(pathname)
    }

    /// Regular file pathnames, in sorted order.
    pub fn file_pathnames(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Every recorded pathname, in sorted order.
    pub fn pathnames(&self) -> impl Iterator<Item = &str> {
        let mut all: Vec<&str> = self
            .directories
            .keys()
            .chain(self.files.keys())
            .chain(self.non_regular.keys())
            .map(String::as_str)
            .collect();
        all.sort_unstable();
        all.dedup();
        all.into_iter()
    }

    /// Immediate children of a directory pathname.
    pub fn children(&self, pathname: &str) -> Vec<&str> {
        let prefix = if pathname.ends_with('/') {
            pathname.to_string()
        } else {
            format!("{pathname}/")
        };
        self.pathnames()
            .filter(|p| {
                p.starts_with(&prefix) && !p[prefix.len()..].is_empty() && !p[prefix.len()..].contains('/')
            })
            .collect()
    }

    pub fn file_count(&self) -> u64 {
        self.files.len() as u64
    }

    pub fn directory_count(&self) -> u64 {
        self.directories.len() as u64
    }

    pub fn symlink_count(&self) -> u64 {
        self.symlinks.len() as u64
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(data)?)
    }
}
