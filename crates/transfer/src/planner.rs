//! Batch planning: expand `(source, destination)` pairs into a sized
//! queue of operations.
//!
//! Planning is best-effort per entry. A local path that cannot be
//! inspected is dropped from the upload plan; a remote path that cannot
//! be sized becomes a single opaque item (size 0, shown as
//! "Calculating..." while it runs) rather than aborting the batch.

use std::path::Path;

use tracing::{debug, warn};

use crate::operation::TransferOperation;
use crate::queue::{TransferDirection, TransferQueue};
use crate::shell::{remote_file_name, remote_parent};
use crate::transport::{DirectoryEnumerator, RemoteEntry};

/// Builds an upload queue from `(local, remote)` pairs, sizing files and
/// directory trees from the local filesystem.
pub async fn plan_upload(pairs: &[(String, String)]) -> TransferQueue {
    let queue = TransferQueue::new(TransferDirection::Upload);
    let pairs = pairs.to_vec();

    let specs = tokio::task::spawn_blocking(move || {
        let mut specs = Vec::with_capacity(pairs.len());
        for (local, remote) in pairs {
            match std::fs::metadata(&local) {
                Ok(meta) if meta.is_dir() => {
                    let size = local_tree_size(Path::new(&local));
                    specs.push((local, remote, size, true));
                }
                Ok(meta) => {
                    specs.push((local, remote, meta.len(), false));
                }
                Err(e) => {
                    warn!(path = %local, error = %e, "skipping unreadable upload source");
                }
            }
        }
        specs
    })
    .await
    .unwrap_or_default();

    for (local, remote, size, is_directory) in specs {
        queue.add_operation(TransferOperation::new(&local, &remote, size, is_directory));
    }
    queue
}

/// Builds a download queue from `(remote, local)` pairs, sizing entries
/// through the enumerator.
pub async fn plan_download(
    pairs: &[(String, String)],
    lister: &dyn DirectoryEnumerator,
) -> TransferQueue {
    let queue = TransferQueue::new(TransferDirection::Download);
    for (remote, local) in pairs {
        let entry = lookup_remote(lister, remote).await;
        let (size, is_directory) = entry.map(|e| (e.size, e.is_directory)).unwrap_or((0, false));
        queue.add_operation(TransferOperation::new(remote, local, size, is_directory));
    }
    queue
}

/// Builds an on-device copy queue from `(source, destination)` pairs.
pub async fn plan_device_copy(
    pairs: &[(String, String)],
    lister: &dyn DirectoryEnumerator,
) -> TransferQueue {
    let queue = TransferQueue::new(TransferDirection::DeviceCopy);
    for (source, destination) in pairs {
        let entry = lookup_remote(lister, source).await;
        let (size, is_directory) = entry.map(|e| (e.size, e.is_directory)).unwrap_or((0, false));
        queue.add_operation(TransferOperation::new(source, destination, size, is_directory));
    }
    queue
}

async fn lookup_remote(lister: &dyn DirectoryEnumerator, path: &str) -> Option<RemoteEntry> {
    let parent = remote_parent(path);
    let name = remote_file_name(path);
    match lister.list(parent).await {
        Ok(entries) => entries.into_iter().find(|e| e.name == name),
        Err(e) => {
            debug!(path, error = %e, "could not size remote entry, degrading to opaque item");
            None
        }
    }
}

/// Total size of every regular file under `dir`; unreadable subtrees
/// contribute 0.
fn local_tree_size(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut size = 0u64;
    for entry in entries.flatten() {
        let Ok(meta) = entry.metadata() else { continue };
        if meta.is_dir() {
            size += local_tree_size(&entry.path());
        } else if meta.is_file() {
            size += meta.len();
        }
    }
    size
}
