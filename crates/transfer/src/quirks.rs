use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Session-wide registry of devices that reject adb's post-push
/// ownership repair and need the scratch-and-move fallback.
///
/// Entries are keyed by device serial, added on first sighting of the
/// rejection diagnostic, and never removed for the life of the process.
/// Clones share the same underlying set, so the registry can be handed to
/// several executors without the flag resetting between batches.
#[derive(Clone, Default)]
pub struct QuirkRegistry {
    flagged: Arc<RwLock<HashSet<String>>>,
}

impl QuirkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether uploads to `serial` must bypass the direct push.
    pub fn requires_push_workaround(&self, serial: &str) -> bool {
        self.flagged.read().unwrap().contains(serial)
    }

    /// Flags `serial` as needing the fallback. Returns `true` when the
    /// device was newly flagged.
    pub fn mark_push_workaround(&self, serial: &str) -> bool {
        let mut flagged = self.flagged.write().unwrap();
        let newly = flagged.insert(serial.to_string());
        if newly {
            tracing::info!(serial, "device rejects ownership repair, using scratch fallback");
        }
        newly
    }
}
