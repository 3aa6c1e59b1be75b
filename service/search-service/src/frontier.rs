//! Persistent BFS frontier: the queue of paths to visit and the seen-set
//! keyed by filesystem identity, checkpointed as a plain JSON document so a
//! human can inspect the crawl state.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Serialized checkpoint shape:
/// `{queue: [path…], seen: {path: [dev, ino]}, processed_files,
///   processed_dirs, errors: [string…]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrontierState {
    #[serde(default)]
    pub queue: VecDeque<String>,
    #[serde(default)]
    pub seen: HashMap<String, (u64, u64)>,
    #[serde(default)]
    pub processed_files: u64,
    #[serde(default)]
    pub processed_dirs: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}

pub struct Frontier {
    path: PathBuf,
    state: FrontierState,
}

impl Frontier {
    /// Restore the checkpoint at `path`, or start empty when it is missing.
    /// A corrupt checkpoint is logged and discarded rather than blocking the
    /// crawl.
    pub fn load(path: &Path) -> Self {
        let state = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(state) => state,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "discarding corrupt frontier checkpoint");
                    FrontierState::default()
                }
            },
            Err(_) => FrontierState::default(),
        };
        Self { path: path.to_path_buf(), state }
    }

    /// Persist the full state; called on every slice boundary.
    pub fn save(&self) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&self.state)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(&self.path, json)
    }

    /// Remove the checkpoint so the next crawl starts fresh.
    pub fn reset(path: &Path) -> std::io::Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Enqueue each existing root, but only when the queue is empty, so a
    /// resumed crawl keeps its position.
    pub fn seed(&mut self, roots: &[String]) {
        if !self.state.queue.is_empty() {
            return;
        }
        for root in roots {
            if Path::new(root).exists() {
                info!(root, "added root to frontier");
                self.state.queue.push_back(root.clone());
            } else {
                warn!(root, "root does not exist, skipping");
            }
        }
    }

    pub fn pop(&mut self) -> Option<String> {
        self.state.queue.pop_front()
    }

    pub fn enqueue(&mut self, path: String) {
        self.state.queue.push_back(path);
    }

    /// A path counts as visited only when it is present with the *same*
    /// `(device, inode)` pair; a re-created file at the same path is new
    /// work.
    pub fn is_seen(&self, path: &str, ident: (u64, u64)) -> bool {
        self.state.seen.get(path) == Some(&ident)
    }

    pub fn mark_seen(&mut self, path: String, ident: (u64, u64)) {
        self.state.seen.insert(path, ident);
    }

    pub fn record_error(&mut self, message: String) {
        debug!(error = %message, "frontier error recorded");
        self.state.errors.push(message);
    }

    pub fn inc_files(&mut self) {
        self.state.processed_files += 1;
    }

    pub fn inc_dirs(&mut self) {
        self.state.processed_dirs += 1;
    }

    pub fn queue_len(&self) -> usize {
        self.state.queue.len()
    }

    pub fn state(&self) -> &FrontierState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frontier.json");

        let mut frontier = Frontier::load(&path);
        frontier.seed(&[dir.path().to_string_lossy().to_string()]);
        frontier.enqueue("/q/next".to_string());
        frontier.mark_seen("/q/done".to_string(), (3, 99));
        frontier.inc_files();
        frontier.inc_dirs();
        frontier.record_error("boom".to_string());
        frontier.save().unwrap();

        let restored = Frontier::load(&path);
        assert_eq!(restored.queue_len(), 2);
        assert!(restored.is_seen("/q/done", (3, 99)));
        assert_eq!(restored.state().processed_files, 1);
        assert_eq!(restored.state().processed_dirs, 1);
        assert_eq!(restored.state().errors, vec!["boom".to_string()]);
    }

    #[test]
    fn seed_is_a_noop_on_a_resumed_queue() {
        let dir = tempfile::tempdir().unwrap();
        let mut frontier = Frontier::load(&dir.path().join("frontier.json"));
        frontier.enqueue("/pending".to_string());
        frontier.seed(&[dir.path().to_string_lossy().to_string()]);
        assert_eq!(frontier.queue_len(), 1);
    }

    #[test]
    fn seed_skips_missing_roots() {
        let dir = tempfile::tempdir().unwrap();
        let mut frontier = Frontier::load(&dir.path().join("frontier.json"));
        frontier.seed(&["/definitely/not/here".to_string()]);
        assert_eq!(frontier.queue_len(), 0);
    }

    #[test]
    fn changed_identity_means_not_seen() {
        let dir = tempfile::tempdir().unwrap();
        let mut frontier = Frontier::load(&dir.path().join("frontier.json"));
        frontier.mark_seen("/a".to_string(), (1, 10));
        assert!(frontier.is_seen("/a", (1, 10)));
        assert!(!frontier.is_seen("/a", (1, 11)));
        assert!(!frontier.is_seen("/b", (1, 10)));
    }

    #[test]
    fn corrupt_checkpoint_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frontier.json");
        std::fs::write(&path, "{not json").unwrap();
        let frontier = Frontier::load(&path);
        assert_eq!(frontier.queue_len(), 0);
    }

    #[test]
    fn reset_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frontier.json");
        Frontier::reset(&path).unwrap();
        std::fs::write(&path, "{}").unwrap();
        Frontier::reset(&path).unwrap();
        assert!(!path.exists());
    }
}
