// ABOUTME: Live preview sessions for the lecture-deck application
// ABOUTME: Turns one browser tab's messages into runtime, scroll spy and view-mode updates

use crate::effect::Effect;
use crate::errors::Result;
use crate::loader::{ContentLoader, LoadState, PendingLoad};
use crate::runtime::{decode_fragment, Key, PresentationRuntime, RuntimeConfig, TouchEvent};
use crate::scroll_spy::{HeadingPosition, ScrollSpy, ScrollViewport, SpyConfig};
use crate::view_mode::{Subscription, ViewMode, ViewModeStore};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Message sent by the page
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello {
        key: String,
        /// Mode forced by the page URL, if any
        #[serde(default)]
        mode: Option<ViewMode>,
        /// Mode the page was rendered in
        #[serde(default)]
        rendered: Option<ViewMode>,
        #[serde(default)]
        fragment: Option<String>,
        #[serde(default)]
        viewport_width: Option<f64>,
    },
    Key {
        key: String,
    },
    Touch(TouchEvent),
    Goto {
        index: i64,
    },
    Resize {
        width: f64,
    },
    Scroll {
        scroll_y: f64,
        height: f64,
        #[serde(default)]
        headings: Option<Vec<HeadingPosition>>,
    },
    Headings {
        headings: Vec<HeadingPosition>,
    },
    Navigate {
        id: String,
    },
    SetMode {
        mode: ViewMode,
    },
}

/// Session-level instructions that are not runtime effects
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Control {
    NotFound { key: String },
    Mode { mode: ViewMode },
    Reload,
}

/// Message sent to the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ServerCommand {
    Effect(Effect),
    Control(Control),
}

impl ServerCommand {
    pub fn not_found(key: &str) -> Self {
        ServerCommand::Control(Control::NotFound {
            key: key.to_string(),
        })
    }

    pub fn mode(mode: ViewMode) -> Self {
        ServerCommand::Control(Control::Mode { mode })
    }

    pub fn reload() -> Self {
        ServerCommand::Control(Control::Reload)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<Effect> for ServerCommand {
    fn from(effect: Effect) -> Self {
        ServerCommand::Effect(effect)
    }
}

fn commands(effects: Vec<Effect>) -> impl Iterator<Item = ServerCommand> {
    effects.into_iter().map(ServerCommand::from)
}

/// State behind one connected browser tab.
///
/// Everything runs on the caller's thread: feed messages with `handle`,
/// call `tick` regularly and send back whatever either returns.
pub struct Session {
    id: Uuid,
    loader: Arc<dyn ContentLoader>,
    store: ViewModeStore,
    runtime: PresentationRuntime,
    spy: ScrollSpy,
    key: Option<String>,
    override_mode: Option<ViewMode>,
    page_mode: ViewMode,
    fragment: Option<String>,
    pending: Option<PendingLoad>,
    subscription: Option<Subscription>,
    mode_events: Option<Receiver<ViewMode>>,
    closed: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("page_mode", &self.page_mode)
            .field("runtime", &self.runtime.state())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Session {
    pub fn new(
        loader: Arc<dyn ContentLoader>,
        store: ViewModeStore,
        runtime_config: RuntimeConfig,
        spy_config: SpyConfig,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!("Session {} created", id);
        Self {
            id,
            loader,
            store,
            runtime: PresentationRuntime::new(runtime_config),
            spy: ScrollSpy::new(spy_config),
            key: None,
            override_mode: None,
            page_mode: ViewMode::Linear,
            fragment: None,
            pending: None,
            subscription: None,
            mode_events: None,
            closed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Mode the page currently shows
    pub fn page_mode(&self) -> ViewMode {
        self.page_mode
    }

    pub fn runtime(&self) -> &PresentationRuntime {
        &self.runtime
    }

    pub fn spy(&self) -> &ScrollSpy {
        &self.spy
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Parse and handle a raw JSON message; malformed input is logged and ignored
    pub fn handle_text(&mut self, text: &str, now: Instant) -> Vec<ServerCommand> {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle(message, now),
            Err(e) => {
                warn!("Session {}: ignoring malformed message: {}", self.id, e);
                Vec::new()
            }
        }
    }

    pub fn handle(&mut self, message: ClientMessage, now: Instant) -> Vec<ServerCommand> {
        if self.closed {
            return Vec::new();
        }
        if self.key.is_none() && !matches!(message, ClientMessage::Hello { .. }) {
            debug!("Session {}: message before hello ignored", self.id);
            return Vec::new();
        }

        let mut out = Vec::new();
        match message {
            ClientMessage::Hello {
                key,
                mode,
                rendered,
                fragment,
                viewport_width,
            } => return self.hello(key, mode, rendered, fragment, viewport_width),
            ClientMessage::Key { key } => {
                out.extend(commands(self.runtime.handle_key(Key::from_dom(&key))));
            }
            ClientMessage::Touch(event) => {
                out.extend(commands(self.runtime.handle_touch(event)));
            }
            ClientMessage::Goto { index } => {
                let index = usize::try_from(index).unwrap_or(0);
                out.extend(commands(self.runtime.goto(index)));
            }
            ClientMessage::Resize { width } => {
                self.store.observe_viewport(width);
                if self.drop_narrow_override() && self.page_mode == ViewMode::Paginated {
                    self.page_mode = ViewMode::Linear;
                    self.leave_page();
                    out.push(ServerCommand::mode(ViewMode::Linear));
                    out.push(ServerCommand::reload());
                }
            }
            ClientMessage::Scroll {
                scroll_y,
                height,
                headings,
            } => {
                if self.page_mode == ViewMode::Linear {
                    if let Some(headings) = headings {
                        self.spy.observe(headings, now);
                    }
                    self.spy.on_scroll(ScrollViewport { scroll_y, height }, now);
                }
            }
            ClientMessage::Headings { headings } => {
                if self.page_mode == ViewMode::Linear {
                    self.spy.observe(headings, now);
                }
            }
            ClientMessage::Navigate { id } => {
                out.extend(commands(self.spy.navigate_to(&decode_fragment(&id), now)));
            }
            ClientMessage::SetMode { mode } => {
                let effective = self.store.set(mode);
                if effective != mode {
                    out.push(ServerCommand::mode(effective));
                }
            }
        }
        out.extend(self.apply_store_events());
        out
    }

    /// Flush background work: finished loads, store broadcasts and spy timers
    pub fn tick(&mut self, now: Instant) -> Vec<ServerCommand> {
        if self.closed {
            return Vec::new();
        }
        let mut out = self.apply_store_events();

        if let Some(pending) = self.pending.as_mut() {
            match pending.poll() {
                LoadState::Pending => {}
                LoadState::Ready(doc) => {
                    self.pending = None;
                    let effects = self.runtime.ready(doc.unit_ids(), self.fragment.as_deref());
                    out.extend(commands(effects));
                }
                LoadState::NotFound => {
                    let key = pending.key().to_string();
                    self.pending = None;
                    self.runtime.deactivate();
                    out.push(ServerCommand::not_found(&key));
                }
            }
        }

        out.extend(commands(self.spy.poll(now)));
        out
    }

    /// Earliest instant at which `tick` has timer work
    pub fn next_deadline(&self) -> Option<Instant> {
        self.spy.next_deadline()
    }

    /// Tear down the subscription, pending load and all observations
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        info!("Session {} closed", self.id);
        self.teardown();
        self.closed = true;
    }

    fn hello(
        &mut self,
        key: String,
        override_mode: Option<ViewMode>,
        rendered: Option<ViewMode>,
        fragment: Option<String>,
        viewport_width: Option<f64>,
    ) -> Vec<ServerCommand> {
        self.teardown();
        info!("Session {} opened for {:?}", self.id, key);

        self.key = Some(key);
        self.override_mode = override_mode;
        self.fragment = fragment.filter(|f| !f.trim_start_matches('#').is_empty());
        self.subscribe();

        if let Some(width) = viewport_width {
            self.store.observe_viewport(width);
        }
        self.drop_narrow_override();
        // Broadcasts caused by this hello are already reflected in `mode`
        self.drain_mode_events();

        let mode = self.effective_mode();
        self.page_mode = mode;
        if rendered.is_some_and(|r| r != mode) {
            debug!("Session {}: page rendered as {:?}, now {}", self.id, rendered, mode);
            return vec![ServerCommand::mode(mode), ServerCommand::reload()];
        }

        self.enter_mode(mode);
        vec![ServerCommand::mode(mode)]
    }

    fn effective_mode(&self) -> ViewMode {
        self.override_mode.unwrap_or_else(|| self.store.get())
    }

    /// A paginated override cannot survive a narrow viewport. Once dropped the
    /// session follows the store for the rest of its life.
    fn drop_narrow_override(&mut self) -> bool {
        if self.override_mode == Some(ViewMode::Paginated) && self.store.is_narrow() {
            info!(
                "Session {}: viewport below {}px, ignoring paginated override",
                self.id,
                self.store.breakpoint()
            );
            self.override_mode = None;
            return true;
        }
        false
    }

    fn subscribe(&mut self) {
        let (sender, receiver) = mpsc::channel();
        let sender = Mutex::new(sender);
        self.subscription = Some(self.store.subscribe(move |mode| {
            let _ = sender.lock().send(mode);
        }));
        self.mode_events = Some(receiver);
    }

    fn drain_mode_events(&mut self) -> Option<ViewMode> {
        self.mode_events
            .as_ref()
            .and_then(|events| events.try_iter().last())
    }

    fn apply_store_events(&mut self) -> Vec<ServerCommand> {
        let Some(mode) = self.drain_mode_events() else {
            return Vec::new();
        };
        if self.override_mode.is_some() || mode == self.page_mode {
            return Vec::new();
        }
        info!(
            "Session {}: view mode changed to {}, reloading page",
            self.id, mode
        );
        self.page_mode = mode;
        self.leave_page();
        vec![ServerCommand::mode(mode), ServerCommand::reload()]
    }

    /// The page is about to reload; drop everything tied to it
    fn leave_page(&mut self) {
        self.runtime.deactivate();
        self.spy.disconnect();
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
    }

    fn enter_mode(&mut self, mode: ViewMode) {
        let Some(key) = self.key.clone() else {
            return;
        };
        match mode {
            ViewMode::Paginated => {
                self.spy.disconnect();
                self.runtime.activate();
                self.pending = Some(PendingLoad::spawn(Arc::clone(&self.loader), &key));
            }
            ViewMode::Linear => {
                self.runtime.deactivate();
                self.pending = None;
            }
        }
    }

    fn teardown(&mut self) {
        self.subscription = None;
        self.mode_events = None;
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        self.runtime.deactivate();
        self.spy.disconnect();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
