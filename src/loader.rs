// ABOUTME: Content loading for the lecture-deck application
// ABOUTME: Resolves content keys to parsed, segmented documents with caching and cancellable background loads

use crate::document::{table_of_contents, HeadingEntry};
use crate::errors::{DeckError, Result};
use crate::parse::{parse_file, ParseOptions};
use crate::segment::{SegmentConfig, Segmenter, SlideUnit};
use crate::utils::validate_relative_key;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

/// Heading depths listed in a document's table of contents
pub const TOC_DEPTHS: [u8; 1] = [2];

/// A loaded content key, ready to render in either mode
#[derive(Debug, Clone, Serialize)]
pub struct RenderedDocument {
    pub key: String,
    pub title: String,
    pub units: Vec<SlideUnit>,
    pub headings: Vec<HeadingEntry>,
}

impl RenderedDocument {
    pub fn unit_ids(&self) -> Vec<String> {
        self.units.iter().map(|u| u.id.clone()).collect()
    }
}

/// Resolves a content key to a renderable document
pub trait ContentLoader: Send + Sync {
    fn load(&self, key: &str) -> Result<Arc<RenderedDocument>>;
}

/// Loads `<root>/<key>.md` or `<root>/<key>/index.md`.
///
/// When `root` is a single Markdown file every key resolves to that file.
#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
    segmenter: Segmenter,
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>, config: SegmentConfig) -> Self {
        Self {
            root: root.into(),
            segmenter: Segmenter::new(config),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that static files are served from
    pub fn content_dir(&self) -> &Path {
        if self.root.is_file() {
            self.root.parent().unwrap_or(Path::new("."))
        } else {
            &self.root
        }
    }

    /// Markdown file backing `key`
    pub fn resolve(&self, key: &str) -> Result<PathBuf> {
        if self.root.is_file() {
            return Ok(self.root.clone());
        }
        validate_relative_key(key)?;

        let key = key.trim_matches('/');
        let candidates = [
            self.root.join(format!("{}.md", key)),
            self.root.join(key).join("index.md"),
        ];
        candidates
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| DeckError::ContentNotFound(key.to_string()))
    }

    /// URL prefix for assets written relative to the document at `path`
    fn asset_base(&self, path: &Path) -> String {
        let dir = path.parent().unwrap_or(Path::new(""));
        let relative = dir.strip_prefix(self.content_dir()).unwrap_or(Path::new(""));
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if segments.is_empty() {
            "/files".to_string()
        } else {
            format!("/files/{}", segments.join("/"))
        }
    }
}

impl ContentLoader for FileLoader {
    fn load(&self, key: &str) -> Result<Arc<RenderedDocument>> {
        let path = self.resolve(key)?;
        let options = ParseOptions {
            asset_base: Some(self.asset_base(&path)),
        };
        let doc = load_document(&path, key, &self.segmenter, &options)?;
        Ok(Arc::new(doc))
    }
}

/// Parse and segment one Markdown file
pub fn load_document(
    path: &Path,
    key: &str,
    segmenter: &Segmenter,
    options: &ParseOptions,
) -> Result<RenderedDocument> {
    let parsed = parse_file(path, options)?;
    let headings = table_of_contents(&parsed.nodes, &TOC_DEPTHS);
    let units = segmenter.segment(parsed.nodes);
    info!("Loaded {:?}: {} slide units", key, units.len());

    Ok(RenderedDocument {
        key: key.to_string(),
        title: parsed.title,
        units,
        headings,
    })
}

/// Caches loaded documents by key; safe to call repeatedly for one key
#[derive(Debug)]
pub struct CachedLoader<L> {
    inner: L,
    cache: Mutex<HashMap<String, Arc<RenderedDocument>>>,
}

impl<L: ContentLoader> CachedLoader<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Drop every cached document, e.g. after sources changed
    pub fn invalidate_all(&self) {
        let mut cache = self.cache.lock();
        debug!("Invalidating {} cached documents", cache.len());
        cache.clear();
    }

    pub fn cached_keys(&self) -> usize {
        self.cache.lock().len()
    }
}

impl<L: ContentLoader> ContentLoader for CachedLoader<L> {
    fn load(&self, key: &str) -> Result<Arc<RenderedDocument>> {
        if let Some(doc) = self.cache.lock().get(key) {
            return Ok(Arc::clone(doc));
        }
        // Loaded outside the lock; a concurrent load of the same key just
        // overwrites an equivalent entry.
        let doc = self.inner.load(key)?;
        self.cache.lock().insert(key.to_string(), Arc::clone(&doc));
        Ok(doc)
    }
}

#[derive(Debug, Clone)]
pub enum LoadState {
    Pending,
    Ready(Arc<RenderedDocument>),
    NotFound,
}

/// A load running on a background thread.
///
/// Dropping the handle (or calling `cancel`) clears its liveness flag; a
/// result arriving afterwards is discarded.
#[derive(Debug)]
pub struct PendingLoad {
    key: String,
    alive: Arc<AtomicBool>,
    receiver: Receiver<Result<Arc<RenderedDocument>>>,
    state: LoadState,
}

impl PendingLoad {
    pub fn spawn(loader: Arc<dyn ContentLoader>, key: &str) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let (sender, receiver) = mpsc::channel();

        let thread_alive = Arc::clone(&alive);
        let thread_key = key.to_string();
        thread::spawn(move || {
            let result = loader.load(&thread_key);
            if thread_alive.load(Ordering::Acquire) {
                let _ = sender.send(result);
            } else {
                debug!("Discarding late load of {:?}", thread_key);
            }
        });

        Self {
            key: key.to_string(),
            alive,
            receiver,
            state: LoadState::Pending,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn cancel(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Non-blocking check for the result
    pub fn poll(&mut self) -> LoadState {
        if matches!(self.state, LoadState::Pending) {
            match self.receiver.try_recv() {
                Ok(Ok(doc)) => self.state = LoadState::Ready(doc),
                Ok(Err(e)) => {
                    warn!("Failed to load {:?}: {}", self.key, e);
                    self.state = LoadState::NotFound;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    if self.alive.load(Ordering::Acquire) {
                        warn!("Loader for {:?} stopped without a result", self.key);
                    }
                    self.state = LoadState::NotFound;
                }
            }
        }
        self.state.clone()
    }
}

impl Drop for PendingLoad {
    fn drop(&mut self) {
        self.cancel();
    }
}
