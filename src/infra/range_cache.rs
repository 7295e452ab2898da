//! Single-slot cache of one file's full contents for byte-range serving.
//!
//! Media elements issue many small range requests against the same file while
//! a slide is showing. Keeping the most recent file in memory avoids one disk
//! read per range. Requests for different files replace the slot.

use std::{
    io,
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::SystemTime,
};

use bytes::Bytes;
use metrics::counter;
use tracing::debug;

use super::{
    files::content_type_for,
    lock::{self, LockSite},
    telemetry::{RANGE_CACHE_HIT, RANGE_CACHE_MISS},
};

/// Contents handed back to the HTTP layer for range slicing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeFile {
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug)]
struct CachedFile {
    path: PathBuf,
    modified: SystemTime,
    file: RangeFile,
}

#[derive(Debug, Default)]
pub struct FileRangeCache {
    slot: Mutex<Option<CachedFile>>,
    disk_reads: AtomicU64,
}

impl FileRangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the contents of `file`, reading from disk only when the slot
    /// holds a different file or an older modification time.
    pub fn fetch(&self, file: &Path) -> io::Result<RangeFile> {
        let path = std::fs::canonicalize(file)?;
        let modified = std::fs::metadata(&path)?.modified()?;

        let mut slot = lock::exclusive(&self.slot, LockSite::RangeSlot, "fetch");
        if let Some(cached) = slot.as_ref()
            && cached.path == path
            && cached.modified == modified
        {
            counter!(RANGE_CACHE_HIT).increment(1);
            return Ok(cached.file.clone());
        }

        counter!(RANGE_CACHE_MISS).increment(1);
        *slot = None;

        let contents = std::fs::read(&path)?;
        self.disk_reads.fetch_add(1, Ordering::Relaxed);

        let file = RangeFile {
            content_type: content_type_for(&path),
            bytes: Bytes::from(contents),
        };

        debug!(
            target = "infra::range_cache",
            op = "range_cache::fetch",
            result = "reloaded",
            path = %path.display(),
            bytes = file.bytes.len(),
            "Range cache slot replaced"
        );

        *slot = Some(CachedFile {
            path,
            modified,
            file: file.clone(),
        });
        Ok(file)
    }

    /// Number of full-file reads performed since construction.
    pub fn disk_reads(&self) -> u64 {
        self.disk_reads.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        *lock::exclusive(&self.slot, LockSite::RangeSlot, "clear") = None;
    }
}
