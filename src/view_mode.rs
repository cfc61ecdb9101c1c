// ABOUTME: View-mode store for the lecture-deck application
// ABOUTME: Persisted, observable linear/paginated flag with a viewport policy and scoped overrides

use crate::errors::{DeckError, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Storage key holding the persisted view mode
pub const VIEW_MODE_KEY: &str = "view-mode";

/// Viewport widths below this many logical pixels cannot stay paginated
pub const DEFAULT_BREAKPOINT_PX: f64 = 768.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Linear,
    Paginated,
}

impl ViewMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::Linear => "linear",
            ViewMode::Paginated => "paginated",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Linear => ViewMode::Paginated,
            ViewMode::Paginated => ViewMode::Linear,
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewMode {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(ViewMode::Linear),
            "paginated" => Ok(ViewMode::Paginated),
            other => Err(DeckError::ValidationError(format!(
                "Unknown view mode: {}",
                other
            ))),
        }
    }
}

/// String key-value storage backing the view mode
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process storage; the value lives as long as the process
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Storage persisted as a flat JSON object in a file
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let raw = fs::read_to_string(&self.path).map_err(DeckError::FileReadError)?;
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&raw)
            .map_err(|e| DeckError::StorageError(format!("{:?}: {}", self.path, e)))
    }

    fn write_all(&self, values: &HashMap<String, String>) -> Result<()> {
        let raw = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, raw).map_err(DeckError::FileReadError)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut values = self.read_all().unwrap_or_default();
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut values = self.read_all()?;
        if values.remove(key).is_some() {
            self.write_all(&values)?;
        }
        Ok(())
    }
}

type Listener = Arc<dyn Fn(ViewMode) + Send + Sync>;

struct StoreInner {
    storage: Arc<dyn Storage>,
    breakpoint: f64,
    viewport_width: Mutex<Option<f64>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
}

/// Observable, persisted view-mode flag.
///
/// Clones share the same state. Writes are last-write-wins; every write is
/// broadcast to all subscribers after the internal locks are released.
#[derive(Clone)]
pub struct ViewModeStore {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for ViewModeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewModeStore")
            .field("breakpoint", &self.inner.breakpoint)
            .field("viewport_width", &*self.inner.viewport_width.lock())
            .field("listeners", &self.inner.listeners.lock().len())
            .finish()
    }
}

impl ViewModeStore {
    pub fn new(storage: Arc<dyn Storage>, breakpoint: f64) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                storage,
                breakpoint,
                viewport_width: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// Store backed by process memory with the default breakpoint
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), DEFAULT_BREAKPOINT_PX)
    }

    pub fn breakpoint(&self) -> f64 {
        self.inner.breakpoint
    }

    /// Current persisted mode; `Linear` when unset, unreadable or invalid
    pub fn get(&self) -> ViewMode {
        match self.inner.storage.get(VIEW_MODE_KEY) {
            Ok(Some(raw)) => raw.parse().unwrap_or_else(|e| {
                debug!("Ignoring stored view mode {:?}: {}", raw, e);
                ViewMode::Linear
            }),
            Ok(None) => ViewMode::Linear,
            Err(e) => {
                warn!("View mode storage unavailable, using linear: {}", e);
                ViewMode::Linear
            }
        }
    }

    /// Persist `next`, coerced to `Linear` on narrow viewports, and broadcast
    /// the value actually stored.
    pub fn set(&self, next: ViewMode) -> ViewMode {
        let effective = if next == ViewMode::Paginated && self.is_narrow() {
            info!("Viewport below {}px, keeping linear view", self.inner.breakpoint);
            ViewMode::Linear
        } else {
            next
        };
        self.write(effective);
        effective
    }

    /// Record the viewport width. Crossing below the breakpoint while
    /// paginated flips the stored mode to linear.
    pub fn observe_viewport(&self, width: f64) -> ViewMode {
        *self.inner.viewport_width.lock() = Some(width);
        let current = self.get();
        if current == ViewMode::Paginated && self.is_narrow() {
            info!("Viewport narrowed to {}px, leaving paginated view", width);
            self.write(ViewMode::Linear);
            return ViewMode::Linear;
        }
        current
    }

    /// Remove the persisted value, returning to the default mode
    pub fn clear(&self) {
        if let Err(e) = self.inner.storage.remove(VIEW_MODE_KEY) {
            warn!("Failed to clear stored view mode: {}", e);
        }
        self.broadcast(ViewMode::Linear);
    }

    /// Register `listener` for every write. Dropping the returned
    /// subscription unregisters it.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(ViewMode) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        Subscription {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Whether the last observed viewport is below the breakpoint
    pub fn is_narrow(&self) -> bool {
        self.inner
            .viewport_width
            .lock()
            .is_some_and(|width| width < self.inner.breakpoint)
    }

    fn write(&self, mode: ViewMode) {
        if let Err(e) = self.inner.storage.set(VIEW_MODE_KEY, mode.as_str()) {
            warn!("Failed to persist view mode {}: {}", mode, e);
        }
        self.broadcast(mode);
    }

    fn broadcast(&self, mode: ViewMode) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        debug!("Broadcasting view mode {} to {} listeners", mode, listeners.len());
        for listener in listeners {
            listener(mode);
        }
    }
}

/// Handle for a store listener; unsubscribes on drop
pub struct Subscription {
    id: u64,
    store: Weak<StoreInner>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            inner.listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

/// View-mode context for one rendered subtree.
///
/// An override takes precedence over the store for this scope only and is
/// never persisted. The viewport policy still applies to it.
#[derive(Debug, Clone)]
pub struct ModeScope {
    store: ViewModeStore,
    override_mode: Option<ViewMode>,
}

impl ModeScope {
    pub fn new(store: ViewModeStore) -> Self {
        Self {
            store,
            override_mode: None,
        }
    }

    pub fn with_override(store: ViewModeStore, mode: Option<ViewMode>) -> Self {
        Self {
            store,
            override_mode: mode,
        }
    }

    /// Child scope; a `None` override inherits this scope's override
    pub fn nested(&self, mode: Option<ViewMode>) -> Self {
        Self {
            store: self.store.clone(),
            override_mode: mode.or(self.override_mode),
        }
    }

    /// Effective mode; a paginated override still yields to a narrow viewport
    pub fn mode(&self) -> ViewMode {
        match self.override_mode {
            Some(ViewMode::Paginated) if self.store.is_narrow() => ViewMode::Linear,
            Some(mode) => mode,
            None => self.store.get(),
        }
    }

    pub fn override_mode(&self) -> Option<ViewMode> {
        self.override_mode
    }

    pub fn store(&self) -> &ViewModeStore {
        &self.store
    }
}
