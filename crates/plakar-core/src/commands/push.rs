use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunker::{self, ChunkerConfig};
use crate::context::AppContext;
use crate::error::{PlakarError, Result};
use crate::objects::{Checksum, Chunk, Object};
use crate::packfile::{BlobType, PackWriter, DEFAULT_PACK_TARGET};
use crate::repository::{lock, Codec, Repository};
use crate::signify::SecretKey;
use crate::snapshot::vfs::FileInfo;
use crate::snapshot::Snapshot;

pub struct PushOptions {
    pub tags: Vec<String>,
    pub sign_key: Option<SecretKey>,
    /// Worker count; `0` selects `max(1, numCPU - 1)`.
    pub concurrency: usize,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            sign_key: None,
            concurrency: 0,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct PushStats {
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    pub bytes_read: u64,
    pub chunks_written: u64,
    pub objects_written: u64,
    pub packfiles_written: u64,
    pub bytes_written: u64,
    /// Files skipped because of soft I/O errors.
    pub errors: u64,
}

pub struct PushOutcome {
    pub snapshot_id: Uuid,
    pub stats: PushStats,
}

/// A regular file handed to the chunk workers.
struct FileTask {
    pathname: String,
    path: PathBuf,
    info: FileInfo,
}

/// Everything the committer needs for one processed file. Novel blobs are
/// already encoded; one payload per file keeps a file's chunks contiguous
/// inside packfiles.
struct FilePayload {
    pathname: String,
    info: FileInfo,
    object: Object,
    chunks: Vec<Chunk>,
    novel_chunks: Vec<(Checksum, Vec<u8>)>,
    novel_object: Option<Vec<u8>>,
    bytes_read: u64,
}

enum PipelineEvent {
    Directory { pathname: String, info: FileInfo },
    Symlink { pathname: String, target: String, info: FileInfo },
    Special { pathname: String, info: FileInfo },
    File(Box<FilePayload>),
    SoftError { pathname: String },
    /// Unrecoverable worker failure; aborts the push.
    Fatal(PlakarError),
}

enum WorkerError {
    /// Unreadable source file: logged, counted, skipped.
    Soft {
        pathname: String,
        error: std::io::Error,
    },
    Fatal(PlakarError),
}

/// Create a snapshot of `paths`.
///
/// Pipeline: walk -> chunk/hash/dedup/encode workers -> sequential committer,
/// connected by bounded queues. The committer owns the repository; workers
/// share the codec and a read-only snapshot of known checksums.
pub fn run(
    ctx: &AppContext,
    repo: &mut Repository,
    paths: &[String],
    options: PushOptions,
) -> Result<PushOutcome> {
    let guard = lock::acquire(repo.storage(), ctx, false)?;
    let result = push_locked(ctx, repo, paths, options);
    if let Err(e) = lock::release(repo.storage(), guard) {
        warn!("failed to release lock: {e}");
    }
    result
}

fn push_locked(
    ctx: &AppContext,
    repo: &mut Repository,
    paths: &[String],
    options: PushOptions,
) -> Result<PushOutcome> {
    let mut roots = Vec::with_capacity(paths.len());
    for path in paths {
        roots.push(std::fs::canonicalize(path)?);
    }
    if roots.is_empty() {
        return Err(PlakarError::Other("no directories to push".into()));
    }

    let workers = if options.concurrency == 0 {
        ctx.num_cpu
    } else {
        options.concurrency
    };

    let mut snapshot = Snapshot::new(ctx);
    snapshot.header.tags = options.tags.clone();
    snapshot.header.scanned_directories = roots
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    info!(snapshot = %snapshot.header.short_id(), roots = roots.len(), workers, "starting push");

    // Never descend into the repository or the cache while scanning them.
    let mut excludes: Vec<PathBuf> = Vec::new();
    if let Ok(repo_path) = std::fs::canonicalize(repo.location()) {
        excludes.push(repo_path);
    }
    if let Some(cache_dir) = &ctx.cache_dir {
        if let Ok(cache_path) = std::fs::canonicalize(cache_dir) {
            excludes.push(cache_path);
        }
    }
    let excludes = Arc::new(excludes);

    // Read-only dedup baseline for the workers; the committer re-checks
    // against the authoritative index before packing.
    let known_chunks = Arc::new(repo.index().chunk_checksums());
    let known_objects = Arc::new(repo.index().object_checksums());
    let session_chunks = Arc::new(Mutex::new(HashSet::<Checksum>::new()));
    let session_objects = Arc::new(Mutex::new(HashSet::<Checksum>::new()));

    let codec = Arc::clone(repo.codec());
    let chunker_config = ChunkerConfig::default();
    let cancel = Arc::new(AtomicBool::new(false));

    let (work_tx, work_rx) = crossbeam_channel::bounded::<FileTask>(workers * 2);
    let (event_tx, event_rx) = crossbeam_channel::bounded::<PipelineEvent>(workers * 2);

    let mut stats = PushStats::default();
    let mut packer = PackWriter::new(DEFAULT_PACK_TARGET);

    let pipeline_result: Result<()> = std::thread::scope(|scope| {
        // Walk stage.
        {
            let event_tx = event_tx.clone();
            let cancel = Arc::clone(&cancel);
            let excludes = Arc::clone(&excludes);
            let roots = roots.clone();
            scope.spawn(move || {
                walk_roots(&roots, &excludes, &cancel, &work_tx, &event_tx);
            });
        }

        // Chunk/hash/dedup/encode workers.
        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let event_tx = event_tx.clone();
            let cancel = Arc::clone(&cancel);
            let codec = Arc::clone(&codec);
            let known_chunks = Arc::clone(&known_chunks);
            let known_objects = Arc::clone(&known_objects);
            let session_chunks = Arc::clone(&session_chunks);
            let session_objects = Arc::clone(&session_objects);
            let chunker_config = chunker_config;
            scope.spawn(move || {
                for task in work_rx.iter() {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let event = match process_file(
                        task,
                        &codec,
                        &chunker_config,
                        &known_chunks,
                        &known_objects,
                        &session_chunks,
                        &session_objects,
                    ) {
                        Ok(payload) => PipelineEvent::File(Box::new(payload)),
                        Err(WorkerError::Soft { pathname, error }) => {
                            warn!(path = %pathname, "skipping unreadable file: {error}");
                            PipelineEvent::SoftError { pathname }
                        }
                        Err(WorkerError::Fatal(e)) => PipelineEvent::Fatal(e),
                    };
                    if event_tx.send(event).is_err() {
                        break;
                    }
                }
            });
        }
        drop(event_tx);
        drop(work_rx);

        // Sequential committer.
        let commit_result = commit_events(
            repo,
            &mut snapshot,
            &mut packer,
            &mut stats,
            &event_rx,
        );
        if commit_result.is_err() {
            // Stop producers and drain so the scope can join.
            cancel.store(true, Ordering::Relaxed);
            for _ in event_rx.iter() {}
        }
        commit_result
    });
    pipeline_result?;

    // Seal the final partial pack.
    if packer.has_pending() {
        seal_pack(repo, &mut packer, &mut stats)?;
    }

    // Publish order: packfiles are durable, then the repository index, then
    // the snapshot artifacts with the header last.
    repo.save_index()?;

    snapshot.header.files_count = snapshot.filesystem.file_count();
    snapshot.commit(repo, options.sign_key.as_ref())?;

    info!(
        snapshot = %snapshot.header.short_id(),
        files = stats.files,
        chunks = stats.chunks_written,
        packfiles = stats.packfiles_written,
        errors = stats.errors,
        "push complete"
    );

    Ok(PushOutcome {
        snapshot_id: snapshot.id,
        stats,
    })
}

fn walk_roots(
    roots: &[PathBuf],
    excludes: &[PathBuf],
    cancel: &AtomicBool,
    work_tx: &crossbeam_channel::Sender<FileTask>,
    event_tx: &crossbeam_channel::Sender<PipelineEvent>,
) {
    for root in roots {
        let excludes = excludes.to_vec();
        let walker = ignore::WalkBuilder::new(root)
            .hidden(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false)
            .follow_links(false)
            .filter_entry(move |entry| !excludes.iter().any(|ex| entry.path().starts_with(ex)))
            .build();

        for entry in walker {
            if cancel.load(Ordering::Relaxed) {
                return;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("walk error: {e}");
                    let event = PipelineEvent::SoftError {
                        pathname: root.display().to_string(),
                    };
                    if event_tx.send(event).is_err() {
                        return;
                    }
                    continue;
                }
            };
            let path = entry.path().to_path_buf();
            let pathname = path.display().to_string();
            let metadata = match std::fs::symlink_metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(path = %pathname, "stat failed: {e}");
                    if event_tx.send(PipelineEvent::SoftError { pathname }).is_err() {
                        return;
                    }
                    continue;
                }
            };
            let info = file_info_from(&path, &metadata);

            let file_type = metadata.file_type();
            let sent = if file_type.is_dir() {
                event_tx
                    .send(PipelineEvent::Directory { pathname, info })
                    .is_ok()
            } else if file_type.is_symlink() {
                let target = std::fs::read_link(&path)
                    .map(|t| t.display().to_string())
                    .unwrap_or_default();
                event_tx
                    .send(PipelineEvent::Symlink {
                        pathname,
                        target,
                        info,
                    })
                    .is_ok()
            } else if file_type.is_file() {
                work_tx
                    .send(FileTask {
                        pathname,
                        path,
                        info,
                    })
                    .is_ok()
            } else {
                event_tx
                    .send(PipelineEvent::Special { pathname, info })
                    .is_ok()
            };
            if !sent {
                return;
            }
        }
    }
}

fn process_file(
    task: FileTask,
    codec: &Codec,
    chunker_config: &ChunkerConfig,
    known_chunks: &HashSet<Checksum>,
    known_objects: &HashSet<Checksum>,
    session_chunks: &Mutex<HashSet<Checksum>>,
    session_objects: &Mutex<HashSet<Checksum>>,
) -> std::result::Result<FilePayload, WorkerError> {
    let data = std::fs::read(&task.path).map_err(|error| WorkerError::Soft {
        pathname: task.pathname.clone(),
        error,
    })?;

    let mut object_hasher = codec.hasher();
    let mut chunks = Vec::new();
    let mut novel_chunks = Vec::new();

    for (offset, length) in chunker::chunk_data(&data, chunker_config) {
        let bytes = &data[offset..offset + length];
        let checksum = codec.digest(bytes);
        object_hasher.update(bytes);
        chunks.push(Chunk {
            checksum,
            start: offset as u64,
            length: length as u64,
        });

        let novel =
            !known_chunks.contains(&checksum) && session_chunks.lock().unwrap().insert(checksum);
        if novel {
            let encoded = codec.encode(bytes).map_err(WorkerError::Fatal)?;
            novel_chunks.push((checksum, encoded));
        }
    }

    let object = Object {
        checksum: object_hasher.finalize(),
        chunks: chunks.iter().map(|c| c.checksum).collect(),
        content_type: content_type_for(&task.path).to_string(),
    };

    let object_novel = !known_objects.contains(&object.checksum)
        && session_objects.lock().unwrap().insert(object.checksum);
    let novel_object = if object_novel {
        let raw = rmp_serde::to_vec(&object)
            .map_err(|e| WorkerError::Fatal(PlakarError::Serialization(e)))?;
        let encoded = codec.encode(&raw).map_err(WorkerError::Fatal)?;
        Some(encoded)
    } else {
        None
    };

    Ok(FilePayload {
        pathname: task.pathname,
        info: task.info,
        object,
        chunks,
        novel_chunks,
        novel_object,
        bytes_read: data.len() as u64,
    })
}

fn commit_events(
    repo: &mut Repository,
    snapshot: &mut Snapshot,
    packer: &mut PackWriter,
    stats: &mut PushStats,
    event_rx: &crossbeam_channel::Receiver<PipelineEvent>,
) -> Result<()> {
    for event in event_rx.iter() {
        match event {
            PipelineEvent::Directory { pathname, info } => {
                snapshot.filesystem.record_directory(&pathname, info);
                *snapshot
                    .header
                    .file_kind
                    .entry("directory".into())
                    .or_insert(0) += 1;
                stats.directories += 1;
            }
            PipelineEvent::Symlink {
                pathname,
                target,
                info,
            } => {
                snapshot.filesystem.record_symlink(&pathname, target, info);
                *snapshot
                    .header
                    .file_kind
                    .entry("symlink".into())
                    .or_insert(0) += 1;
                stats.symlinks += 1;
            }
            PipelineEvent::Special { pathname, info } => {
                snapshot.filesystem.record_special(&pathname, info);
                *snapshot.header.file_kind.entry("other".into()).or_insert(0) += 1;
            }
            PipelineEvent::SoftError { .. } => {
                stats.errors += 1;
            }
            PipelineEvent::Fatal(e) => return Err(e),
            PipelineEvent::File(payload) => {
                commit_file(repo, snapshot, packer, stats, *payload)?;
            }
        }
    }
    Ok(())
}

fn commit_file(
    repo: &mut Repository,
    snapshot: &mut Snapshot,
    packer: &mut PackWriter,
    stats: &mut PushStats,
    payload: FilePayload,
) -> Result<()> {
    debug!(path = %payload.pathname, chunks = payload.chunks.len(), "committing file");

    for chunk in &payload.chunks {
        snapshot.index.add_chunk(*chunk);
    }
    snapshot.index.add_object(&payload.object)?;
    snapshot
        .index
        .link_pathname(&payload.pathname, &payload.object.checksum)?;
    snapshot.metadata.add(
        "content-type",
        &payload.object.content_type,
        payload.object.checksum,
    );

    snapshot
        .filesystem
        .record_file(&payload.pathname, payload.info);
    *snapshot
        .header
        .file_kind
        .entry("regular".into())
        .or_insert(0) += 1;
    *snapshot
        .header
        .file_type
        .entry(payload.object.content_type.clone())
        .or_insert(0) += 1;
    if let Some(ext) = Path::new(&payload.pathname)
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
    {
        *snapshot.header.file_extension.entry(ext).or_insert(0) += 1;
    }
    stats.files += 1;
    stats.bytes_read += payload.bytes_read;

    // The authoritative dedup check: the worker-side session set already
    // filtered most duplicates, the index and the unsealed pack cover the
    // rest.
    for (checksum, encoded) in payload.novel_chunks {
        if repo.index().has_chunk(&checksum) || packer.contains(&checksum) {
            continue;
        }
        packer.add_blob(BlobType::Chunk, checksum, &encoded);
        stats.chunks_written += 1;
        if packer.should_seal() {
            seal_pack(repo, packer, stats)?;
        }
    }
    if let Some(encoded) = payload.novel_object {
        let checksum = payload.object.checksum;
        if !repo.index().has_object(&checksum) && !packer.contains(&checksum) {
            packer.add_blob(BlobType::Object, checksum, &encoded);
            stats.objects_written += 1;
            if packer.should_seal() {
                seal_pack(repo, packer, stats)?;
            }
        }
    }
    Ok(())
}

fn seal_pack(repo: &mut Repository, packer: &mut PackWriter, stats: &mut PushStats) -> Result<()> {
    let (checksum, bytes, entries) = packer.seal(repo.codec().hashing())?;
    stats.packfiles_written += 1;
    stats.bytes_written += bytes.len() as u64;
    repo.commit_packfile(checksum, &bytes, &entries)
}

/// Coarse content-type classification from the file extension.
fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("txt") | Some("md") | Some("log") => "text/plain",
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("csv") => "text/csv",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("pdf") => "application/pdf",
        Some("gz") => "application/gzip",
        Some("zip") => "application/zip",
        Some("tar") => "application/x-tar",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(unix)]
fn file_info_from(path: &Path, metadata: &std::fs::Metadata) -> FileInfo {
    use std::os::unix::fs::MetadataExt;
    FileInfo {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size: metadata.len(),
        mode: metadata.mode(),
        mtime: metadata.mtime() * 1_000_000_000 + metadata.mtime_nsec(),
        uid: metadata.uid(),
        gid: metadata.gid(),
        xattrs: Default::default(),
    }
}

#[cfg(not(unix))]
fn file_info_from(path: &Path, metadata: &std::fs::Metadata) -> FileInfo {
    FileInfo {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size: metadata.len(),
        mode: if metadata.permissions().readonly() {
            0o444
        } else {
            0o644
        },
        mtime: metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0),
        uid: 0,
        gid: 0,
        xattrs: Default::default(),
    }
}
