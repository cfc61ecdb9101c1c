// ABOUTME: Scroll spy for the linear reading mode of the lecture-deck application
// ABOUTME: Tracks the active heading while scrolling and retries table-of-contents jumps

use crate::effect::{Effect, FragmentOrigin};
use log::debug;
use serde::Deserialize;
use std::time::{Duration, Instant};

/// Configuration for the scroll spy
#[derive(Debug, Clone)]
pub struct SpyConfig {
    /// Height of the sticky header; headings under it are not yet visible
    pub header_height: f64,
    /// Fraction of the viewport, measured from the bottom, that never counts
    pub bottom_exclusion: f64,
    /// Quiet time after the last scroll event before recomputing
    pub debounce: Duration,
    /// Delay between attempts to find a heading that is not rendered yet
    pub retry_interval: Duration,
    /// Attempts before a scroll-to request is abandoned
    pub max_attempts: u32,
}

impl Default for SpyConfig {
    fn default() -> Self {
        Self {
            header_height: 64.0,
            bottom_exclusion: 0.7,
            debounce: Duration::from_millis(50),
            retry_interval: Duration::from_millis(50),
            max_attempts: 30,
        }
    }
}

/// Document-relative geometry of one heading element
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HeadingPosition {
    pub id: String,
    pub top: f64,
    #[serde(default)]
    pub height: f64,
}

impl HeadingPosition {
    pub fn new(id: &str, top: f64, height: f64) -> Self {
        Self {
            id: id.to_string(),
            top,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScrollViewport {
    pub scroll_y: f64,
    pub height: f64,
}

/// Pick the active heading for a viewport.
///
/// The observed band starts below the header and ends where the excluded
/// bottom part of the viewport begins. The first heading in document order
/// inside the band wins; otherwise the last heading already scrolled above
/// the band's top edge.
pub fn active_heading<'a>(
    headings: &'a [HeadingPosition],
    viewport: ScrollViewport,
    config: &SpyConfig,
) -> Option<&'a str> {
    let band_top = viewport.scroll_y + config.header_height;
    let band_bottom = viewport.scroll_y + viewport.height * (1.0 - config.bottom_exclusion);

    let intersecting = headings.iter().find(|h| {
        let bottom = h.top + h.height.max(0.0);
        h.top <= band_bottom && bottom >= band_top && band_bottom > band_top
    });

    intersecting
        .or_else(|| headings.iter().filter(|h| h.top <= band_top).last())
        .map(|h| h.id.as_str())
}

#[derive(Debug, Clone)]
struct ScrollRequest {
    id: String,
    attempts: u32,
    next_attempt: Instant,
}

/// Active-heading tracker fed with heading geometry and scroll events.
///
/// Time is passed in by the caller; `poll` must be called regularly to
/// flush debounced recomputation and pending scroll retries.
#[derive(Debug, Clone)]
pub struct ScrollSpy {
    config: SpyConfig,
    connected: bool,
    headings: Vec<HeadingPosition>,
    viewport: Option<ScrollViewport>,
    recompute_at: Option<Instant>,
    active: Option<String>,
    pending_scroll: Option<ScrollRequest>,
}

impl ScrollSpy {
    pub fn new(config: SpyConfig) -> Self {
        Self {
            config,
            connected: false,
            headings: Vec::new(),
            viewport: None,
            recompute_at: None,
            active: None,
            pending_scroll: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn has_pending_scroll(&self) -> bool {
        self.pending_scroll.is_some()
    }

    /// Start observing a new set of headings (document order)
    pub fn observe(&mut self, headings: Vec<HeadingPosition>, now: Instant) {
        debug!("Scroll spy observing {} headings", headings.len());
        self.connected = true;
        self.headings = headings;
        self.schedule(now);
    }

    /// Stop observing; drops geometry, timers and pending scroll requests
    pub fn disconnect(&mut self) {
        if self.connected {
            debug!("Scroll spy disconnected");
        }
        self.connected = false;
        self.headings.clear();
        self.viewport = None;
        self.recompute_at = None;
        self.active = None;
        self.pending_scroll = None;
    }

    /// A scroll or resize happened; recomputation waits for the debounce
    pub fn on_scroll(&mut self, viewport: ScrollViewport, now: Instant) {
        if !self.connected {
            return;
        }
        self.viewport = Some(viewport);
        self.schedule(now);
    }

    /// Explicit navigation to a heading, e.g. a table-of-contents click
    pub fn navigate_to(&mut self, id: &str, now: Instant) -> Vec<Effect> {
        if !self.connected {
            return Vec::new();
        }
        self.pending_scroll = Some(ScrollRequest {
            id: id.to_string(),
            attempts: 0,
            next_attempt: now,
        });
        self.attempt_scroll(now)
    }

    /// Flush due work: debounced recomputation and scroll retries
    pub fn poll(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.connected {
            return effects;
        }

        if self.recompute_at.is_some_and(|due| now >= due) {
            self.recompute_at = None;
            effects.extend(self.recompute());
        }
        effects.extend(self.attempt_scroll(now));
        effects
    }

    /// Earliest instant at which `poll` has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        let retry = self.pending_scroll.as_ref().map(|r| r.next_attempt);
        match (self.recompute_at, retry) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn schedule(&mut self, now: Instant) {
        self.recompute_at = Some(now + self.config.debounce);
    }

    fn recompute(&mut self) -> Vec<Effect> {
        let Some(viewport) = self.viewport else {
            return Vec::new();
        };
        let Some(id) = active_heading(&self.headings, viewport, &self.config) else {
            return Vec::new();
        };
        if self.active.as_deref() == Some(id) {
            return Vec::new();
        }

        let id = id.to_string();
        debug!("Active heading is now {}", id);
        self.active = Some(id.clone());
        vec![
            Effect::ActiveHeading { id: id.clone() },
            Effect::ReplaceFragment {
                id,
                origin: FragmentOrigin::Sync,
            },
        ]
    }

    fn attempt_scroll(&mut self, now: Instant) -> Vec<Effect> {
        let Some(request) = self.pending_scroll.as_mut() else {
            return Vec::new();
        };
        if now < request.next_attempt {
            return Vec::new();
        }

        request.attempts += 1;
        if self.headings.iter().any(|h| h.id == request.id) {
            let id = request.id.clone();
            self.pending_scroll = None;
            return vec![
                Effect::ScrollTo {
                    id: id.clone(),
                    smooth: true,
                },
                Effect::ReplaceFragment {
                    id,
                    origin: FragmentOrigin::User,
                },
            ];
        }

        if request.attempts >= self.config.max_attempts {
            debug!(
                "Giving up on scrolling to {} after {} attempts",
                request.id, request.attempts
            );
            self.pending_scroll = None;
        } else {
            request.next_attempt = now + self.config.retry_interval;
        }
        Vec::new()
    }
}

impl Default for ScrollSpy {
    fn default() -> Self {
        Self::new(SpyConfig::default())
    }
}
