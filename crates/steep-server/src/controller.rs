//! The type-check controller.
//!
//! Tracks which files are dirty and which are priority (open in an
//! editor), and turns them into per-worker assignments. Assignment is
//! deterministic: priority paths first in lexicographic order,
//! round-robin over the code workers; remaining paths by stable hash of
//! the path modulo the worker count. Only workers the master still has
//! alive receive assignments: a dead worker's slot stays empty, so a
//! batch started after a crash can always complete.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHasher;
use tracing::debug;

use crate::protocol::RequestId;

/// An opaque process-unique identifier for a batch check.
pub fn fresh_guid() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{:08x}-{:06x}", std::process::id(), n)
}

/// An in-flight batch check.
#[derive(Clone, Debug)]
pub struct CheckRequest {
    pub guid: String,
    /// Remaining paths per code worker, priority paths first, each group
    /// in lexicographic order.
    pub assignments: Vec<Vec<PathBuf>>,
    pub completed: usize,
    pub total: usize,
    /// Client request to respond to once `completed == total`.
    pub client_request_id: Option<RequestId>,
}

impl CheckRequest {
    pub fn finished(&self) -> bool {
        self.completed == self.total
    }

    pub fn paths_for(&self, worker: usize) -> &[PathBuf] {
        self.assignments
            .get(worker)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Record one checked path. Returns false when the path is not part
    /// of any assignment (the counters stay untouched).
    pub fn mark_checked(&mut self, path: &Path) -> bool {
        for assignment in &mut self.assignments {
            if let Some(index) = assignment.iter().position(|p| p == path) {
                assignment.remove(index);
                self.completed += 1;
                return true;
            }
        }
        false
    }

    /// Every path still unchecked, across all workers.
    pub fn remaining_paths(&self) -> Vec<PathBuf> {
        self.assignments.iter().flatten().cloned().collect()
    }

    /// Drain one worker's remaining paths (after its process died).
    pub fn take_assignment(&mut self, worker: usize) -> Vec<PathBuf> {
        match self.assignments.get_mut(worker) {
            Some(assignment) => std::mem::take(assignment),
            None => Vec::new(),
        }
    }

    pub fn percentage(&self) -> u32 {
        if self.total == 0 {
            return 100;
        }
        (100 * self.completed / self.total) as u32
    }
}

#[derive(Debug)]
pub struct TypeCheckController {
    worker_count: usize,
    /// Ordinals of code workers still accepting work.
    live_workers: BTreeSet<usize>,
    changed_paths: BTreeSet<PathBuf>,
    priority_paths: BTreeSet<PathBuf>,
}

impl TypeCheckController {
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        TypeCheckController {
            worker_count,
            live_workers: (0..worker_count).collect(),
            changed_paths: BTreeSet::new(),
            priority_paths: BTreeSet::new(),
        }
    }

    /// A code worker died: stop assigning new work to its slot. Paths of
    /// the in-flight request are the master's to redistribute; this only
    /// affects requests built afterwards.
    pub fn remove_worker(&mut self, ordinal: usize) {
        self.live_workers.remove(&ordinal);
    }

    pub fn live_worker_count(&self) -> usize {
        self.live_workers.len()
    }

    pub fn push_change(&mut self, path: PathBuf) {
        self.changed_paths.insert(path);
    }

    pub fn update_priority(&mut self, opened: &[PathBuf], closed: &[PathBuf]) {
        for path in opened {
            self.priority_paths.insert(path.clone());
        }
        for path in closed {
            self.priority_paths.remove(path);
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.changed_paths.is_empty()
    }

    pub fn priority_paths(&self) -> &BTreeSet<PathBuf> {
        &self.priority_paths
    }

    /// Atomically drain the dirty set into a new request. Paths of an
    /// unfinished previous request are carried over. Returns None when
    /// there is nothing to check, or no worker is left to check it.
    pub fn make_request(
        &mut self,
        last_request: Option<&CheckRequest>,
        guid: String,
        client_request_id: Option<RequestId>,
    ) -> Option<CheckRequest> {
        let mut paths: BTreeSet<PathBuf> = std::mem::take(&mut self.changed_paths);
        if let Some(last) = last_request {
            if !last.finished() {
                paths.extend(last.remaining_paths());
            }
        }
        if paths.is_empty() {
            return None;
        }
        let live: Vec<usize> = self.live_workers.iter().copied().collect();
        if live.is_empty() {
            // Keep the paths dirty; nothing can check them right now.
            self.changed_paths = paths;
            return None;
        }

        // Assignment slots keep the original ordinals; dead workers'
        // slots stay empty and the hash ranges over the live ones only.
        let mut assignments = vec![Vec::new(); self.worker_count];

        // Priority paths first, spread round-robin; BTreeSet iteration
        // keeps each group lexicographic.
        let mut next_worker = 0usize;
        for path in paths.iter().filter(|p| self.priority_paths.contains(*p)) {
            assignments[live[next_worker % live.len()]].push(path.clone());
            next_worker += 1;
        }
        for path in paths.iter().filter(|p| !self.priority_paths.contains(*p)) {
            assignments[live[stable_hash(path) % live.len()]].push(path.clone());
        }

        let total = assignments.iter().map(Vec::len).sum();
        debug!(total, workers = live.len(), "built check request");
        Some(CheckRequest {
            guid,
            assignments,
            completed: 0,
            total,
            client_request_id,
        })
    }
}

/// Stable across runs: `FxHasher` is seed-free.
pub fn stable_hash(path: &Path) -> usize {
    let mut hasher = FxHasher::default();
    path.hash(&mut hasher);
    hasher.finish() as usize
}
