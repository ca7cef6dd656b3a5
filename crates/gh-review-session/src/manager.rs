//! The session manager: tracks the current session and the editor buffers
//! that consume it.
//!
//! One manager is constructed at host startup and handed (by reference or
//! clone of an `Arc`) to every consumer — margins, taggers, view models.
//! There is no ambient global; consumers that need the current session read
//! it through the manager and must treat each read as a snapshot that may
//! be superseded after any await point.

use crate::error::SessionError;
use crate::git::GitProvider;
use crate::session::Session;
use gh_review_client::ReviewApi;
use log::{debug, info};
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{watch, OnceCell};

/// Stable identifier for an editor buffer, chosen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer-{}", self.0)
    }
}

/// Initialization state of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    Initializing,
    Ready,
}

/// What the manager knows about a registered editor buffer.
#[derive(Debug, Clone)]
pub struct TextBufferInfo {
    pub buffer: BufferId,
    /// Absolute path of the document the buffer edits.
    pub absolute_path: PathBuf,
    /// Path relative to the repository root; `None` when the buffer lies
    /// outside the tracked repository (inline review is inactive for it).
    pub relative_path: Option<String>,
}

struct BufferRecord {
    absolute_path: PathBuf,
    relative_path: Option<String>,
}

/// Coordinates the current review session and per-buffer state.
pub struct SessionManager {
    api: Arc<dyn ReviewApi>,
    git: Arc<dyn GitProvider>,
    init: OnceCell<()>,
    initializing: AtomicBool,
    current: watch::Sender<Option<Arc<Session>>>,
    buffers: StdMutex<HashMap<BufferId, BufferRecord>>,
    /// Quiet period between a buffer change and the remap it triggers.
    debounce: Duration,
}

impl SessionManager {
    /// Default quiet period between a buffer change and its remap.
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

    pub fn new(api: Arc<dyn ReviewApi>, git: Arc<dyn GitProvider>) -> Self {
        Self::with_debounce(api, git, Self::DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(
        api: Arc<dyn ReviewApi>,
        git: Arc<dyn GitProvider>,
        debounce: Duration,
    ) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            api,
            git,
            init: OnceCell::new(),
            initializing: AtomicBool::new(false),
            current,
            buffers: StdMutex::new(HashMap::new()),
            debounce,
        }
    }

    /// Current initialization state.
    pub fn state(&self) -> ManagerState {
        if self.init.initialized() {
            ManagerState::Ready
        } else if self.initializing.load(Ordering::SeqCst) {
            ManagerState::Initializing
        } else {
            ManagerState::Uninitialized
        }
    }

    /// Initialize the manager if it is not initialized yet.
    ///
    /// Idempotent and safe to call from many concurrent consumers: all
    /// awaiters of an in-flight initialization share its result, and once
    /// ready the call returns immediately. A failed initialization leaves
    /// the manager uninitialized so a later call can retry.
    pub async fn ensure_initialized(&self) -> Result<(), SessionError> {
        self.init
            .get_or_try_init(|| async {
                self.initializing.store(true, Ordering::SeqCst);
                let result = self.initialize().await;
                self.initializing.store(false, Ordering::SeqCst);
                result
            })
            .await?;
        Ok(())
    }

    async fn initialize(&self) -> Result<(), SessionError> {
        // Cheap idempotent probes: credentials work and the repository is
        // where the host says it is.
        let user = self.api.current_user().await?;
        let root = self.git.repository_root();
        info!("session manager ready (user {user}, repository {root:?})");
        Ok(())
    }

    /// The current session, if any. A snapshot: re-read after await points
    /// rather than holding on to it across them.
    pub fn current_session(&self) -> Option<Arc<Session>> {
        self.current.borrow().clone()
    }

    /// Subscribe to current-session changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Session>>> {
        self.current.subscribe()
    }

    /// Open a review session for a pull request and make it current.
    pub async fn open_session(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Arc<Session>, SessionError> {
        self.ensure_initialized().await?;

        let session = Session::open(
            Arc::clone(&self.api),
            Arc::clone(&self.git),
            owner,
            repo,
            number,
        )
        .await?;

        self.current.send_replace(Some(Arc::clone(&session)));
        info!("current session is now {}", session.handle());
        Ok(session)
    }

    /// Drop the current session (repository closed, branch switched away).
    pub fn close_session(&self) {
        if self.current.send_replace(None).is_some() {
            info!("current session closed");
        }
    }

    /// Register an editor buffer under a stable id.
    ///
    /// Returns the repository-relative path when the buffer belongs to the
    /// tracked repository; `None` means inline review stays inactive for
    /// this buffer.
    pub fn register_buffer(
        &self,
        id: BufferId,
        absolute_path: impl Into<PathBuf>,
    ) -> Option<String> {
        let absolute_path = absolute_path.into();
        let relative_path = self.resolve_relative(&absolute_path);
        debug!("registered {id} at {absolute_path:?} as {relative_path:?}");

        self.buffers.lock().unwrap().insert(
            id,
            BufferRecord {
                absolute_path,
                relative_path: relative_path.clone(),
            },
        );
        relative_path
    }

    /// Forget a buffer (editor closed it).
    pub fn release_buffer(&self, id: BufferId) {
        self.buffers.lock().unwrap().remove(&id);
    }

    /// Resolve a registered buffer to its repository-relative path.
    pub fn relative_path(&self, id: BufferId) -> Option<String> {
        self.buffers
            .lock()
            .unwrap()
            .get(&id)
            .and_then(|r| r.relative_path.clone())
    }

    /// What the manager knows about a registered buffer; `None` for
    /// buffers that were never registered.
    pub fn buffer_info(&self, id: BufferId) -> Option<TextBufferInfo> {
        self.buffers.lock().unwrap().get(&id).map(|r| TextBufferInfo {
            buffer: id,
            absolute_path: r.absolute_path.clone(),
            relative_path: r.relative_path.clone(),
        })
    }

    /// Feed a buffer's new text into the mapping pipeline.
    ///
    /// The remap runs on a background task after a debounce period; a remap
    /// superseded by a newer change is discarded, so the published mapping
    /// always reflects the latest edit. Buffers outside the repository, or
    /// files not yet opened in the current session, are ignored.
    pub fn buffer_changed(&self, id: BufferId, text: String) {
        let Some(path) = self.relative_path(id) else {
            return;
        };
        let Some(session) = self.current_session() else {
            return;
        };
        // Only already-constructed files remap; constructing one (network
        // fetches) on a keystroke is never right.
        let Some(file) = session.try_file(&path) else {
            return;
        };

        // Claim the ticket synchronously so event order decides which remap
        // survives, not task scheduling order.
        let generation = file.next_edit_generation();
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if !file.update_buffer(&text, generation).await {
                debug!("remap of {path} superseded by a newer edit");
            }
        });
    }

    fn resolve_relative(&self, absolute: &Path) -> Option<String> {
        let root = self.git.repository_root();
        let relative = absolute.strip_prefix(&root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }
}
