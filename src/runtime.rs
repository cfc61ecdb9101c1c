// ABOUTME: Presentation runtime for the lecture-deck application
// ABOUTME: Navigation state machine over slide units with keyboard and swipe input

use crate::effect::{Effect, FragmentOrigin};
use log::{debug, info};
use percent_encoding::percent_decode_str;
use serde::Deserialize;

/// Configuration for the presentation runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Minimum horizontal drag, in pixels, that counts as a swipe
    pub swipe_threshold_px: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            swipe_threshold_px: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Linear mode; nothing is tracked
    Inactive,
    /// Paginated mode is starting and unit ids are being gathered
    Collecting,
    /// Stable index, responsive to input
    Ready,
}

/// Ordered unit ids and the index of the visible one.
///
/// `index` is always `< unit_ids.len()` when there are units, and `0`
/// otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationState {
    unit_ids: Vec<String>,
    index: usize,
}

impl NavigationState {
    pub fn new(unit_ids: Vec<String>) -> Self {
        Self { unit_ids, index: 0 }
    }

    pub fn len(&self) -> usize {
        self.unit_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unit_ids.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn unit_ids(&self) -> &[String] {
        &self.unit_ids
    }

    pub fn current_id(&self) -> Option<&str> {
        self.unit_ids.get(self.index).map(String::as_str)
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.unit_ids.iter().position(|u| u == id)
    }

    /// Move to `index` clamped to the valid range. Returns whether the index
    /// changed.
    pub fn goto(&mut self, index: usize) -> bool {
        if self.unit_ids.is_empty() {
            return false;
        }
        let clamped = index.min(self.unit_ids.len() - 1);
        let changed = clamped != self.index;
        self.index = clamped;
        changed
    }

    pub fn next(&mut self) -> bool {
        self.goto(self.index.saturating_add(1))
    }

    pub fn prev(&mut self) -> bool {
        self.goto(self.index.saturating_sub(1))
    }

    pub fn first(&mut self) -> bool {
        self.goto(0)
    }

    pub fn last(&mut self) -> bool {
        self.goto(self.unit_ids.len().saturating_sub(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowRight,
    ArrowLeft,
    PageDown,
    PageUp,
    Home,
    End,
    Other,
}

impl Key {
    /// Map a DOM `KeyboardEvent.key` value
    pub fn from_dom(key: &str) -> Self {
        match key {
            "ArrowRight" => Key::ArrowRight,
            "ArrowLeft" => Key::ArrowLeft,
            "PageDown" => Key::PageDown,
            "PageUp" => Key::PageUp,
            "Home" => Key::Home,
            "End" => Key::End,
            _ => Key::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TouchPhase {
    Start,
    Move,
    End,
    Cancel,
}

/// One touch or pointer event. `touches` is the number of contact points
/// still down after the event.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TouchEvent {
    pub phase: TouchPhase,
    pub touches: usize,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    /// Finger moved right to left: advance
    Left,
    /// Finger moved left to right: go back
    Right,
}

/// Horizontal swipe detector that ignores multi-finger gestures.
#[derive(Debug, Clone, Default)]
pub struct SwipeTracker {
    origin: Option<(f64, f64)>,
    last: (f64, f64),
    multi_touch: bool,
}

impl SwipeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_multi_touch(&self) -> bool {
        self.multi_touch
    }

    /// Feed one event; returns a direction when a single-finger gesture
    /// ends past `threshold`.
    pub fn track(&mut self, event: TouchEvent, threshold: f64) -> Option<SwipeDirection> {
        if event.touches > 1 {
            self.multi_touch = true;
        }

        match event.phase {
            TouchPhase::Start => {
                if self.origin.is_none() {
                    self.origin = Some((event.x, event.y));
                }
                self.last = (event.x, event.y);
                None
            }
            TouchPhase::Move => {
                self.last = (event.x, event.y);
                None
            }
            TouchPhase::Cancel => {
                if event.touches == 0 {
                    self.reset();
                }
                None
            }
            TouchPhase::End => {
                if event.touches > 0 {
                    // A finger lifted while others remain down
                    return None;
                }
                let origin = self.origin;
                let multi_touch = self.multi_touch;
                self.reset();

                if multi_touch {
                    debug!("Ignoring multi-finger gesture");
                    return None;
                }
                let (x0, y0) = origin?;
                let dx = event.x - x0;
                let dy = event.y - y0;
                if dx.abs() < threshold || dx.abs() <= dy.abs() {
                    return None;
                }
                Some(if dx < 0.0 {
                    SwipeDirection::Left
                } else {
                    SwipeDirection::Right
                })
            }
        }
    }
}

/// Navigation runtime for paginated mode.
#[derive(Debug, Clone)]
pub struct PresentationRuntime {
    config: RuntimeConfig,
    state: RuntimeState,
    nav: NavigationState,
    swipe: SwipeTracker,
}

impl Default for PresentationRuntime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl PresentationRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            state: RuntimeState::Inactive,
            nav: NavigationState::default(),
            swipe: SwipeTracker::new(),
        }
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn index(&self) -> usize {
        self.nav.index()
    }

    pub fn count(&self) -> usize {
        self.nav.len()
    }

    pub fn current_id(&self) -> Option<&str> {
        self.nav.current_id()
    }

    pub fn navigation(&self) -> &NavigationState {
        &self.nav
    }

    /// Paginated mode (re)activated; start gathering units
    pub fn activate(&mut self) {
        debug!("Presentation runtime collecting units");
        self.nav = NavigationState::default();
        self.swipe.reset();
        self.state = RuntimeState::Collecting;
    }

    /// Units are known. Picks the initial index from the URL fragment and
    /// becomes responsive to input.
    pub fn ready(&mut self, unit_ids: Vec<String>, fragment: Option<&str>) -> Vec<Effect> {
        self.nav = NavigationState::new(unit_ids);
        self.state = RuntimeState::Ready;

        if self.nav.is_empty() {
            info!("Presentation has no slide units");
            return vec![Effect::Placeholder];
        }

        let initial = fragment
            .map(decode_fragment)
            .and_then(|id| self.nav.position_of(&id))
            .unwrap_or(0);
        self.nav.goto(initial);
        info!(
            "Presentation ready with {} units, starting at {}",
            self.nav.len(),
            initial
        );

        let id = self.nav.current_id().unwrap_or_default().to_string();
        vec![
            Effect::ShowUnit {
                index: initial,
                id: id.clone(),
                count: self.nav.len(),
            },
            Effect::ReplaceFragment {
                id,
                origin: FragmentOrigin::Sync,
            },
        ]
    }

    /// Leave paginated mode, dropping all navigation state
    pub fn deactivate(&mut self) {
        debug!("Presentation runtime deactivated");
        self.nav = NavigationState::default();
        self.swipe.reset();
        self.state = RuntimeState::Inactive;
    }

    pub fn next(&mut self) -> Vec<Effect> {
        self.navigate(NavigationState::next)
    }

    pub fn prev(&mut self) -> Vec<Effect> {
        self.navigate(NavigationState::prev)
    }

    pub fn first(&mut self) -> Vec<Effect> {
        self.navigate(NavigationState::first)
    }

    pub fn last(&mut self) -> Vec<Effect> {
        self.navigate(NavigationState::last)
    }

    pub fn goto(&mut self, index: usize) -> Vec<Effect> {
        self.navigate(|nav| nav.goto(index))
    }

    pub fn handle_key(&mut self, key: Key) -> Vec<Effect> {
        match key {
            Key::ArrowRight | Key::PageDown => self.next(),
            Key::ArrowLeft | Key::PageUp => self.prev(),
            Key::Home => self.first(),
            Key::End => self.last(),
            Key::Other => Vec::new(),
        }
    }

    pub fn handle_touch(&mut self, event: TouchEvent) -> Vec<Effect> {
        if self.state != RuntimeState::Ready {
            return Vec::new();
        }
        match self.swipe.track(event, self.config.swipe_threshold_px) {
            Some(SwipeDirection::Left) => self.next(),
            Some(SwipeDirection::Right) => self.prev(),
            None => Vec::new(),
        }
    }

    fn navigate<F>(&mut self, step: F) -> Vec<Effect>
    where
        F: FnOnce(&mut NavigationState) -> bool,
    {
        if self.state != RuntimeState::Ready || !step(&mut self.nav) {
            return Vec::new();
        }
        let index = self.nav.index();
        let id = self.nav.current_id().unwrap_or_default().to_string();
        debug!("Showing unit {} ({})", index, id);
        vec![
            Effect::ShowUnit {
                index,
                id: id.clone(),
                count: self.nav.len(),
            },
            Effect::ReplaceFragment {
                id,
                origin: FragmentOrigin::Sync,
            },
            Effect::ScrollToTop,
        ]
    }
}

/// Strip a leading `#` and percent-decode a URL fragment
pub fn decode_fragment(fragment: &str) -> String {
    let raw = fragment.strip_prefix('#').unwrap_or(fragment);
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}
