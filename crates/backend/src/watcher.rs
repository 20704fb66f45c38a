//! Debounced file watcher feeding the index managers.
//!
//! A single recursive notify subscription on the project root. Events
//! normalize to add/change/delete on project-relative paths, coalesce in
//! a ~250 ms per-path debounce window (`change` overrides a prior `add`;
//! `delete` overrides everything), and settled events submit serially to
//! the code or docs manager by extension routing. Startup does not scan;
//! reconciling changes missed while stopped is an explicit reindex.
//!
//! The watcher holds a `Weak` reference to the project index, never
//! owning it: when the index is dropped the watcher task winds down on
//! its own.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::{Arc, Weak},
  time::{Duration, Instant},
};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
  domain::project::to_relative,
  error::{ErrorTag, Result, SearchError},
  manager::{ProjectIndex, ScanPolicy},
};

pub const DEBOUNCE: Duration = Duration::from_millis(250);

// ============================================================================
// Pending Changes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeKind {
  Add,
  Change,
  Delete,
}

#[derive(Debug)]
struct PendingChange {
  kind: ChangeKind,
  last_event: Instant,
}

impl PendingChange {
  fn new(kind: ChangeKind) -> Self {
    Self {
      kind,
      last_event: Instant::now(),
    }
  }

  fn update(&mut self, kind: ChangeKind) {
    self.last_event = Instant::now();
    self.kind = coalesce(self.kind, kind);
  }
}

/// Coalescing rules within the debounce window.
pub(crate) fn coalesce(prior: ChangeKind, next: ChangeKind) -> ChangeKind {
  match (prior, next) {
    // A change supersedes the add that preceded it.
    (ChangeKind::Add, ChangeKind::Change) => ChangeKind::Change,
    // Deleting wins over anything that came before.
    (_, ChangeKind::Delete) => ChangeKind::Delete,
    // Delete followed by re-create settles as a change.
    (ChangeKind::Delete, ChangeKind::Add) => ChangeKind::Change,
    (_, next) => next,
  }
}

// ============================================================================
// Watcher
// ============================================================================

/// Running watcher; dropping the handle does not stop the task, call
/// [`WatcherHandle::stop`].
pub struct WatcherHandle {
  cancel: CancellationToken,
  task: tokio::task::JoinHandle<()>,
}

impl WatcherHandle {
  pub async fn stop(self) {
    self.cancel.cancel();
    let _ = self.task.await;
  }

  pub fn cancel_token(&self) -> CancellationToken {
    self.cancel.clone()
  }
}

pub struct FileWatcher {
  root: PathBuf,
  project: Weak<ProjectIndex>,
  policy: ScanPolicy,
  gitignore: Option<Gitignore>,
  debounce: Duration,
  _watcher: RecommendedWatcher,
  event_rx: mpsc::Receiver<std::result::Result<Event, notify::Error>>,
  cancel: CancellationToken,
}

impl FileWatcher {
  /// Subscribe to the project root and spawn the dispatch task.
  pub fn start(project: &Arc<ProjectIndex>, debounce: Duration) -> Result<WatcherHandle> {
    let root = project.root().to_path_buf();
    let policy = ScanPolicy::from_config(project.config())?;
    let gitignore = if project.config().respect_gitignore {
      build_gitignore(&root)
    } else {
      None
    };

    let (event_tx, event_rx) = mpsc::channel::<std::result::Result<Event, notify::Error>>(256);
    let mut watcher = RecommendedWatcher::new(
      move |res| {
        // Runs on notify's thread; drop events when the channel is full.
        let _ = event_tx.blocking_send(res);
      },
      notify::Config::default(),
    )
    .map_err(|e| watch_error("Could not initialize the file watcher", &root, e))?;

    watcher
      .watch(&root, RecursiveMode::Recursive)
      .map_err(|e| watch_error("Could not watch the project directory", &root, e))?;

    let cancel = CancellationToken::new();
    let task = Self {
      root: root.clone(),
      project: Arc::downgrade(project),
      policy,
      gitignore,
      debounce,
      _watcher: watcher,
      event_rx,
      cancel: cancel.clone(),
    };

    info!(root = %root.display(), "File watcher started");
    Ok(WatcherHandle {
      cancel,
      task: tokio::spawn(task.run()),
    })
  }

  async fn run(mut self) {
    let mut pending: HashMap<String, PendingChange> = HashMap::new();
    let mut tick = tokio::time::interval(self.debounce);

    loop {
      tokio::select! {
        biased;

        _ = self.cancel.cancelled() => {
          info!("File watcher stopping (cancelled)");
          break;
        }

        event = self.event_rx.recv() => {
          match event {
            Some(Ok(event)) => self.absorb_event(&mut pending, event),
            Some(Err(e)) => warn!(error = %e, "Watcher error"),
            None => {
              info!("File watcher stopping (subscription closed)");
              break;
            }
          }
        }

        _ = tick.tick() => {
          if !self.flush_settled(&mut pending).await {
            break;
          }
        }
      }
    }

    if !pending.is_empty() {
      let _ = self.flush_all(&mut pending).await;
    }
    info!(root = %self.root.display(), "File watcher stopped");
  }

  fn is_ignored(&self, path: &Path) -> bool {
    match &self.gitignore {
      Some(gitignore) => gitignore.matched(path, path.is_dir()).is_ignore(),
      None => false,
    }
  }

  /// Fold one notify event into the pending map.
  fn absorb_event(&mut self, pending: &mut HashMap<String, PendingChange>, event: Event) {
    use notify::event::{ModifyKind, RenameMode};

    // Renames normalize to delete(from) + add(to).
    if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
      if event.paths.len() >= 2 {
        self.absorb_path(pending, &event.paths[0], ChangeKind::Delete);
        self.absorb_path(pending, &event.paths[1], ChangeKind::Add);
        return;
      }
    }

    let kind = match event.kind {
      EventKind::Create(_) => ChangeKind::Add,
      EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Delete,
      EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Add,
      EventKind::Modify(_) => ChangeKind::Change,
      EventKind::Remove(_) => ChangeKind::Delete,
      EventKind::Access(_) | EventKind::Any | EventKind::Other => {
        trace!(kind = ?event.kind, "Ignoring event");
        return;
      }
    };

    for path in &event.paths {
      self.absorb_path(pending, path, kind);
    }
  }

  fn absorb_path(&self, pending: &mut HashMap<String, PendingChange>, path: &Path, kind: ChangeKind) {
    if path.is_dir() {
      return;
    }
    if kind != ChangeKind::Delete && path.is_symlink() {
      trace!(path = %path.display(), "Ignoring symlink event");
      return;
    }
    if self.is_ignored(path) {
      return;
    }
    let Some(rel) = to_relative(&self.root, path) else {
      return;
    };
    if self.policy.classify(&rel).is_none() {
      trace!(path = %rel, "Event outside index policy");
      return;
    }

    match pending.get_mut(&rel) {
      Some(change) => change.update(kind),
      None => {
        pending.insert(rel, PendingChange::new(kind));
      }
    }
  }

  /// Submit changes whose debounce window has passed. Returns false when
  /// the project index is gone.
  async fn flush_settled(&mut self, pending: &mut HashMap<String, PendingChange>) -> bool {
    let now = Instant::now();
    let settled: Vec<String> = pending
      .iter()
      .filter(|(_, change)| now.duration_since(change.last_event) >= self.debounce)
      .map(|(path, _)| path.clone())
      .collect();

    for rel in settled {
      if let Some(change) = pending.remove(&rel) {
        if !self.submit(&rel, change.kind).await {
          return false;
        }
      }
    }
    true
  }

  async fn flush_all(&mut self, pending: &mut HashMap<String, PendingChange>) -> bool {
    let drained: Vec<(String, PendingChange)> = pending.drain().collect();
    for (rel, change) in drained {
      if !self.submit(&rel, change.kind).await {
        return false;
      }
    }
    true
  }

  /// Apply one settled change serially through the managers.
  async fn submit(&self, rel: &str, kind: ChangeKind) -> bool {
    let Some(project) = self.project.upgrade() else {
      debug!("Project index dropped; watcher winding down");
      return false;
    };
    let Ok(Some(chunk_kind)) = project.classify(rel) else {
      return true;
    };

    debug!(path = %rel, kind = ?kind, "Applying watched change");
    let result = match kind {
      ChangeKind::Add | ChangeKind::Change => project.update_file(chunk_kind, rel).await.map(|_| ()),
      ChangeKind::Delete => project.remove_file(chunk_kind, rel).await,
    };
    if let Err(e) = result {
      warn!(path = %rel, error = %e, "Watched change failed");
    }
    true
  }
}

fn watch_error(user: &str, root: &Path, err: notify::Error) -> SearchError {
  SearchError::new(
    ErrorTag::ExtractionFailed,
    user,
    format!("{}: {err}", root.display()),
  )
}

/// Gitignore matcher for the watcher's fast-path filtering (the managers
/// re-check policy on every update anyway).
fn build_gitignore(root: &Path) -> Option<Gitignore> {
  let gitignore_path = root.join(".gitignore");
  if !gitignore_path.exists() {
    return None;
  }
  let mut builder = GitignoreBuilder::new(root);
  if let Some(err) = builder.add(&gitignore_path) {
    warn!(error = %err, "Error parsing .gitignore, continuing with partial rules");
  }
  let _ = builder.add_line(None, ".git/");
  builder.build().ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_change_overrides_add() {
    assert_eq!(coalesce(ChangeKind::Add, ChangeKind::Change), ChangeKind::Change);
  }

  #[test]
  fn test_delete_overrides_everything() {
    assert_eq!(coalesce(ChangeKind::Add, ChangeKind::Delete), ChangeKind::Delete);
    assert_eq!(coalesce(ChangeKind::Change, ChangeKind::Delete), ChangeKind::Delete);
    assert_eq!(coalesce(ChangeKind::Delete, ChangeKind::Delete), ChangeKind::Delete);
  }

  #[test]
  fn test_delete_then_add_settles_as_change() {
    assert_eq!(coalesce(ChangeKind::Delete, ChangeKind::Add), ChangeKind::Change);
  }

  #[test]
  fn test_pending_change_updates_timestamp() {
    let mut change = PendingChange::new(ChangeKind::Add);
    let first = change.last_event;
    std::thread::sleep(Duration::from_millis(2));
    change.update(ChangeKind::Change);
    assert!(change.last_event > first);
    assert_eq!(change.kind, ChangeKind::Change);
  }
}
